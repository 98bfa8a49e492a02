//! Service configuration.
//!
//! Loaded from a TOML file when one is provided, otherwise defaults. Every
//! section tolerates missing fields via `#[serde(default)]` so configs stay
//! forward-compatible.

use crate::engine::CHATTERBOX_REPO_ID;
use crate::error::{Result, ServeError};
use crate::model::Device;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Voice store settings.
    pub store: StoreConfig,
    /// Model settings.
    pub model: ModelConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind (0 auto-assigns).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
        }
    }
}

/// Voice store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the shared voice volume.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { root: voice_dir() }
    }
}

/// Model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// HuggingFace repo holding the ONNX model assets.
    pub repo_id: String,
    /// ONNX model variant: "fp32", "fp16", "q8".
    pub variant: String,
    /// Device selection policy.
    pub device: DevicePolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            repo_id: CHATTERBOX_REPO_ID.to_owned(),
            variant: "q8".to_owned(),
            device: DevicePolicy::default(),
        }
    }
}

/// How the worker picks its execution device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePolicy {
    /// Probe for an accelerator, fall back to CPU.
    #[default]
    Auto,
    /// Require CUDA.
    Cuda,
    /// Force CPU.
    Cpu,
}

impl DevicePolicy {
    /// Resolve the policy to a concrete device for this worker.
    pub fn resolve(self) -> Device {
        match self {
            DevicePolicy::Auto => Device::detect(),
            DevicePolicy::Cuda => Device::Cuda,
            DevicePolicy::Cpu => Device::Cpu,
        }
    }
}

/// Default voice store root.
///
/// Container deployments mount the shared volume and point
/// `VOXSERVE_VOICE_DIR` at it; local runs get a platform data directory.
#[must_use]
pub fn voice_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("VOXSERVE_VOICE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("voxserve").join("voices"))
        .unwrap_or_else(|| PathBuf::from("/tmp/voxserve-voices"))
}

impl ServeConfig {
    /// Load configuration from `path`, or defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Config`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServeError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| ServeError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = ServeConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.model.variant, "q8");
        assert_eq!(config.model.device, DevicePolicy::Auto);
        assert!(!config.store.root.as_os_str().is_empty());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: ServeConfig = toml::from_str("[server]\nport = 9000\n").expect("parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.model.variant, "q8");
    }

    #[test]
    fn device_policy_parses_lowercase() {
        let config: ServeConfig =
            toml::from_str("[model]\ndevice = \"cpu\"\n").expect("parse");
        assert_eq!(config.model.device, DevicePolicy::Cpu);
        assert_eq!(config.model.device.resolve(), Device::Cpu);
    }

    #[test]
    fn toml_round_trip() {
        let config = ServeConfig::default();
        let raw = toml::to_string(&config).expect("serialize");
        let parsed: ServeConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.model.repo_id, config.model.repo_id);
    }

    #[test]
    fn load_without_path_returns_defaults() {
        let config = ServeConfig::load(None).expect("defaults");
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn load_of_bad_toml_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not = [valid").expect("write");
        let err = ServeConfig::load(Some(&path)).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn voice_dir_override_via_env() {
        let key = "VOXSERVE_VOICE_DIR";
        let original = std::env::var_os(key);

        // SAFETY: Tests run single-threaded per module.
        unsafe { std::env::set_var(key, "/custom/voices") };
        assert_eq!(voice_dir(), PathBuf::from("/custom/voices"));

        match original {
            Some(val) => unsafe { std::env::set_var(key, val) },
            None => unsafe { std::env::remove_var(key) },
        }
    }
}
