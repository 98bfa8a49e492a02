//! Durable, named storage of reference voice samples.
//!
//! The store is a flat directory of `<name>.wav` files on a volume shared by
//! every worker. Writes go through a temp file, `fsync`, and an atomic rename
//! so that a sample is either fully visible to other workers or not there at
//! all; a successful `put` happens-before any later `get` on any worker.

use crate::error::{Result, ServeError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-process counter distinguishing concurrent temp files for one name.
static WRITE_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// Durable voice sample store rooted at a shared directory.
#[derive(Debug, Clone)]
pub struct VoiceStore {
    root: PathBuf,
}

impl VoiceStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Storage`] if the root cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            ServeError::Storage(format!("failed to create voice dir {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    /// The directory this store reads and writes.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `bytes` under `name`, replacing any prior sample (last write
    /// wins). Returns the durable location.
    ///
    /// The write is committed (fsynced and renamed into place) before this
    /// returns, so other workers on the same volume observe the new bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::InvalidRequest`] for unsafe names and
    /// [`ServeError::Storage`] if the medium is unavailable or out of space.
    pub fn put(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        validate_name(name)?;
        let path = self.root.join(format!("{name}.wav"));
        // Temp name is unique per process and per write, so two workers
        // committing the same voice can never rename each other's
        // half-written file into place.
        let tmp = self.root.join(format!(
            ".{name}.{}.{}.tmp",
            std::process::id(),
            WRITE_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        ));

        let mut file = fs::File::create(&tmp)
            .map_err(|e| ServeError::Storage(format!("failed to create {}: {e}", tmp.display())))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| ServeError::Storage(format!("failed to write {}: {e}", tmp.display())))?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            ServeError::Storage(format!("failed to commit {}: {e}", path.display()))
        })?;

        // Sync the directory entry too, so the rename itself survives a crash.
        if let Ok(dir) = fs::File::open(&self.root) {
            let _ = dir.sync_all();
        }

        debug!("stored voice '{name}' ({} bytes) at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Read the sample stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::VoiceNotFound`] if nothing was ever stored under
    /// `name`, [`ServeError::Storage`] for any other read failure.
    pub fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        fs::read(&path)
            .map_err(|e| ServeError::Storage(format!("failed to read {}: {e}", path.display())))
    }

    /// Resolve `name` to the path of an existing sample.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::VoiceNotFound`] if no sample exists under `name`.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        let path = self.root.join(format!("{name}.wav"));
        if !path.is_file() {
            return Err(ServeError::VoiceNotFound(name.to_owned()));
        }
        Ok(path)
    }

    /// Names of all stored samples, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Storage`] if the root cannot be listed.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            ServeError::Storage(format!("failed to list {}: {e}", self.root.display()))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| ServeError::Storage(format!("failed to read dir entry: {e}")))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "wav")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && !stem.starts_with('.')
            {
                names.push(stem.to_owned());
            }
        }
        names.sort_unstable();
        Ok(names)
    }
}

/// Reject names that are empty or not safe as a single path component.
///
/// Names are case-sensitive keys; validation rejects rather than rewrites so
/// that `"Marco"` and `"marco"` stay distinct samples.
fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ServeError::InvalidRequest("voice name is empty".into()));
    }
    let safe = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !safe || name.starts_with('.') || name.contains("..") {
        return Err(ServeError::InvalidRequest(format!(
            "voice name '{name}' is not a safe path component"
        )));
    }
    Ok(())
}
