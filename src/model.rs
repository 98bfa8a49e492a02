//! Model lifecycle management.
//!
//! One worker owns exactly one model instance, loaded once per process
//! lifetime at activation. The load is slow (seconds) and deliberately off
//! the request path; a failed load is sticky and the worker never becomes
//! ready.

use crate::error::{Result, ServeError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Resolved execution device for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// NVIDIA GPU via the CUDA execution provider.
    Cuda,
    /// CPU fallback. Functional but a latency cliff for real-time use.
    Cpu,
}

impl Device {
    /// Prefer CUDA when the host exposes an NVIDIA driver, else fall back
    /// to CPU with a warning.
    pub fn detect() -> Self {
        if Path::new("/proc/driver/nvidia/version").exists() {
            Device::Cuda
        } else {
            warn!("no CUDA device detected, falling back to CPU inference");
            Device::Cpu
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The opaque synthesis capability.
///
/// Implementations wrap whatever actually produces audio (an ONNX session,
/// a remote process, a test fake). Callers must not assume the capability is
/// reentrant; [`crate::service::SynthesisService`] serializes invocations.
#[async_trait]
pub trait SynthesisModel: Send + Sync {
    /// The model's native output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Synthesize `text` in the voice of the reference sample at
    /// `reference_wav`, returning f32 mono samples at [`Self::sample_rate`].
    async fn synthesize(&self, text: &str, reference_wav: &Path) -> Result<Vec<f32>>;
}

/// Factory for the one-time model load.
///
/// Separate from [`SynthesisModel`] so tests can count loads and inject
/// failures without a real model.
pub trait ModelLoader: Send + Sync + 'static {
    /// Load the model bound to `device`. Expected to be slow; called at most
    /// once per worker process.
    fn load(&self, device: Device) -> Result<Arc<dyn SynthesisModel>>;
}

/// Coarse lifecycle state, reported by the readiness endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    /// Process started, load not yet attempted.
    Cold,
    /// Load in progress.
    Loading,
    /// Model loaded; requests are served.
    Ready,
    /// Load failed; terminal for this worker.
    Failed,
}

impl ModelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelStatus::Cold => "cold",
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Failed => "failed",
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ModelStatus::Cold => 0,
            ModelStatus::Loading => 1,
            ModelStatus::Ready => 2,
            ModelStatus::Failed => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ModelStatus::Cold,
            1 => ModelStatus::Loading,
            2 => ModelStatus::Ready,
            _ => ModelStatus::Failed,
        }
    }
}

enum LifecycleState {
    Cold,
    Ready(Arc<dyn SynthesisModel>),
    Failed(String),
}

/// Owns the per-worker model lifecycle: `Cold → Loading → Ready`, with
/// `Loading → Failed` terminal.
///
/// Constructed once per worker and shared by reference into the service, so
/// tests can substitute a fake loader.
pub struct ModelManager {
    loader: Arc<dyn ModelLoader>,
    device: Device,
    state: Mutex<LifecycleState>,
    /// Lifecycle snapshot for `status()`, updated on state transitions.
    /// Kept outside the state mutex so readiness probes never contend with
    /// request traffic briefly holding the lock.
    status: AtomicU8,
}

impl ModelManager {
    pub fn new(loader: Arc<dyn ModelLoader>, device: Device) -> Self {
        Self {
            loader,
            device,
            state: Mutex::new(LifecycleState::Cold),
            status: AtomicU8::new(ModelStatus::Cold.as_u8()),
        }
    }

    /// The device this worker resolved at construction.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Load the model if this worker has not done so yet, and return it.
    ///
    /// The first call runs the loader (off the async runtime, via
    /// `spawn_blocking`); concurrent callers wait for that load rather than
    /// starting their own. Later calls are no-ops returning the shared
    /// handle.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::ModelLoad`] if the load failed, now or on any
    /// earlier attempt. Failure is sticky: the loader is never re-run.
    pub async fn ensure_loaded(&self) -> Result<Arc<dyn SynthesisModel>> {
        let mut state = self.state.lock().await;
        match &*state {
            LifecycleState::Ready(model) => Ok(Arc::clone(model)),
            LifecycleState::Failed(msg) => Err(ServeError::ModelLoad(msg.clone())),
            LifecycleState::Cold => {
                info!("loading model on {}", self.device);
                self.status
                    .store(ModelStatus::Loading.as_u8(), Ordering::SeqCst);
                let start = std::time::Instant::now();

                let loader = Arc::clone(&self.loader);
                let device = self.device;
                let loaded = match tokio::task::spawn_blocking(move || loader.load(device)).await {
                    Ok(result) => result,
                    Err(e) => Err(ServeError::ModelLoad(format!("load task panicked: {e}"))),
                };

                match loaded {
                    Ok(model) => {
                        info!(
                            "model ready on {} ({} Hz) in {:.1}s",
                            self.device,
                            model.sample_rate(),
                            start.elapsed().as_secs_f32()
                        );
                        *state = LifecycleState::Ready(Arc::clone(&model));
                        self.status
                            .store(ModelStatus::Ready.as_u8(), Ordering::SeqCst);
                        Ok(model)
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        tracing::error!("model load failed, worker will not become ready: {msg}");
                        *state = LifecycleState::Failed(msg.clone());
                        self.status
                            .store(ModelStatus::Failed.as_u8(), Ordering::SeqCst);
                        Err(ServeError::ModelLoad(msg))
                    }
                }
            }
        }
    }

    /// Non-blocking lifecycle snapshot.
    ///
    /// Reads the transition-tracked status rather than probing the state
    /// lock, so readiness never flickers just because a request is briefly
    /// holding the lock on an already-ready worker.
    pub fn status(&self) -> ModelStatus {
        ModelStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ModelStatus::Ready
    }
}
