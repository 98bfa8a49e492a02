//! voxserve: GPU-backed voice-cloning text-to-speech service.
//!
//! A long-lived worker process wraps an expensive TTS model behind a small
//! HTTP contract: upload a short reference voice sample once, then request
//! synthesized speech for arbitrary text against that sample.
//!
//! # Architecture
//!
//! - **Codec**: base64 transport encoding and WAV container handling
//! - **Voice store**: durable named samples on a volume shared across workers
//! - **Model manager**: one model load per worker lifetime, GPU with CPU
//!   fallback, sticky failure
//! - **Service**: composes the above into `upload_voice` and `generate`
//! - **Server**: axum HTTP surface with typed request/response records

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod server;
pub mod service;
pub mod store;

pub use config::ServeConfig;
pub use error::{Result, ServeError};
pub use model::{Device, ModelLoader, ModelManager, ModelStatus, SynthesisModel};
pub use server::TtsServer;
pub use service::{SynthesisResult, SynthesisService, UploadResult};
pub use store::VoiceStore;
