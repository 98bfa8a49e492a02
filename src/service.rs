//! The public synthesis service.
//!
//! Composes the codec, the voice store, and the model lifecycle manager into
//! the two operations the worker exposes: register a voice sample, and
//! synthesize speech against a registered voice.

use crate::codec;
use crate::error::{Result, ServeError};
use crate::model::{ModelManager, ModelStatus};
use crate::store::VoiceStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Voice name used by `generate` when the caller supplies none.
pub const DEFAULT_VOICE: &str = "default";

/// Result of a successful voice upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    /// Durable location the sample was written to.
    pub location: String,
}

/// Result of a successful synthesis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    /// WAV audio, base64-encoded for the text transport.
    pub audio_b64: String,
    /// Sample rate of the audio, also carried by the WAV header.
    pub sample_rate: u32,
    /// Character count of the input text, for observability.
    pub text_length: usize,
}

/// The worker's public surface: upload and generate.
///
/// One instance per worker, shared across request handlers. Synthesis calls
/// are serialized per worker because the model capability is not assumed to
/// be safely reentrant; everything around the inference call (store I/O,
/// codec work) runs concurrently.
pub struct SynthesisService {
    store: VoiceStore,
    model: Arc<ModelManager>,
    inference_lock: Mutex<()>,
}

impl SynthesisService {
    pub fn new(store: VoiceStore, model: Arc<ModelManager>) -> Self {
        Self {
            store,
            model,
            inference_lock: Mutex::new(()),
        }
    }

    /// Register (or replace) a named voice sample.
    ///
    /// Decodes the transport encoding and commits the bytes to the shared
    /// store; once this returns, `generate` on any worker observes the new
    /// sample.
    ///
    /// # Errors
    ///
    /// [`ServeError::MalformedAudioEncoding`] for undecodable payloads,
    /// [`ServeError::InvalidRequest`] for unsafe names,
    /// [`ServeError::Storage`] when the durable medium fails.
    pub async fn upload_voice(&self, voice_name: &str, audio_b64: &str) -> Result<UploadResult> {
        let bytes = codec::decode_audio(audio_b64)?;
        let location = self.store.put(voice_name, &bytes)?;

        match codec::wav_duration_secs(&bytes) {
            Some(secs) => info!(
                "uploaded voice '{voice_name}' ({} bytes, {secs:.1}s) to {}",
                bytes.len(),
                location.display()
            ),
            None => info!(
                "uploaded voice '{voice_name}' ({} bytes, unrecognized container) to {}",
                bytes.len(),
                location.display()
            ),
        }

        Ok(UploadResult {
            location: location.display().to_string(),
        })
    }

    /// Synthesize `text` in the voice registered under `voice_name`.
    ///
    /// The stored sample is resolved before the model is touched, so a
    /// missing voice never costs an inference. The model invocation itself
    /// holds the per-worker inference lock. Failures surface as-is: no
    /// retry, no fallback voice, no partial audio.
    ///
    /// # Errors
    ///
    /// [`ServeError::InvalidRequest`] for empty text,
    /// [`ServeError::VoiceNotFound`] when no sample exists,
    /// [`ServeError::ModelLoad`] when this worker never became ready,
    /// [`ServeError::Synthesis`] when the model capability fails.
    pub async fn generate(&self, text: &str, voice_name: &str) -> Result<SynthesisResult> {
        if text.trim().is_empty() {
            return Err(ServeError::InvalidRequest("text is empty".into()));
        }

        let reference = self.store.resolve(voice_name)?;
        let model = self.model.ensure_loaded().await?;

        let preview: String = text.chars().take(50).collect();
        info!("generating audio for text: {preview}...");
        let start = std::time::Instant::now();

        let samples = {
            let _guard = self.inference_lock.lock().await;
            model.synthesize(text, &reference).await?
        };

        let sample_rate = model.sample_rate();
        let wav = codec::wav_from_samples(&samples, sample_rate)?;
        info!(
            "generated {} samples for voice '{voice_name}' in {:.0}ms",
            samples.len(),
            start.elapsed().as_millis()
        );

        Ok(SynthesisResult {
            audio_b64: codec::encode_audio(&wav),
            sample_rate,
            text_length: text.chars().count(),
        })
    }

    /// Names of all registered voices.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Storage`] if the store cannot be listed.
    pub fn list_voices(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    /// Lifecycle state of this worker's model, for the readiness endpoint.
    pub fn model_status(&self) -> ModelStatus {
        self.model.status()
    }
}
