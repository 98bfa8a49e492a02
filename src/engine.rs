//! Chatterbox ONNX inference backend.
//!
//! Voice-cloning TTS: tokenize text, load the reference sample, run a single
//! ONNX session conditioned on the reference audio, get 24 kHz f32 mono
//! audio back. Model assets are fetched from HuggingFace Hub on first load
//! and cached; gated weights are fetched with the `HF_TOKEN` credential
//! supplied by the hosting platform.

use crate::codec;
use crate::config::ModelConfig;
use crate::error::{Result, ServeError};
use crate::model::{Device, ModelLoader, SynthesisModel};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

/// HuggingFace repo for the Chatterbox ONNX export.
pub const CHATTERBOX_REPO_ID: &str = "onnx-community/chatterbox-ONNX";

/// Native output sample rate in Hz.
const SAMPLE_RATE: u32 = 24_000;

/// Maximum reference audio fed to the model, in seconds. Longer samples are
/// truncated; the voice embedding saturates well before this.
const MAX_REFERENCE_SECS: f32 = 30.0;

/// Paths to downloaded model assets.
pub struct EnginePaths {
    /// Path to the ONNX model file.
    pub model_onnx: PathBuf,
    /// Path to `tokenizer.json`.
    pub tokenizer_json: PathBuf,
}

/// Map a user-facing variant name to the ONNX filename inside the repo.
///
/// # Errors
///
/// Returns [`ServeError::Config`] for unknown variants, so a config typo
/// fails activation instead of silently running different weights.
pub fn model_filename(variant: &str) -> Result<&'static str> {
    match variant {
        "fp32" => Ok("onnx/model.onnx"),
        "fp16" => Ok("onnx/model_fp16.onnx"),
        "q8" | "quantized" => Ok("onnx/model_quantized.onnx"),
        _ => Err(ServeError::Config(format!(
            "unknown model variant '{variant}' (expected fp32, fp16, or q8)"
        ))),
    }
}

/// Download (or verify cache of) all model assets from HuggingFace Hub.
///
/// Reads `HF_TOKEN` from the environment for gated repos; anonymous access
/// works for public ones.
///
/// # Errors
///
/// Returns [`ServeError::Config`] for an unknown variant and
/// [`ServeError::ModelLoad`] if any download fails.
pub fn download_engine_assets(repo_id: &str, variant: &str) -> Result<EnginePaths> {
    let api = hf_hub::api::sync::ApiBuilder::new()
        .with_token(std::env::var("HF_TOKEN").ok())
        .build()
        .map_err(|e| ServeError::ModelLoad(format!("HF Hub API init failed: {e}")))?;
    let repo = api.model(repo_id.to_owned());

    let model_file = model_filename(variant)?;
    info!("ensuring model: {repo_id}/{model_file}");
    let model_onnx = repo
        .get(model_file)
        .map_err(|e| ServeError::ModelLoad(format!("failed to download {model_file}: {e}")))?;

    info!("ensuring tokenizer.json");
    let tokenizer_json = repo
        .get("tokenizer.json")
        .map_err(|e| ServeError::ModelLoad(format!("failed to download tokenizer.json: {e}")))?;

    Ok(EnginePaths {
        model_onnx,
        tokenizer_json,
    })
}

/// Chatterbox TTS engine.
///
/// Wraps a single ONNX session plus the tokenizer. The session is behind a
/// mutex because `ort` inference takes `&mut Session`; the service layer
/// already serializes synthesis calls, so the lock is uncontended.
pub struct ChatterboxEngine {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    device: Device,
}

impl ChatterboxEngine {
    /// Load the engine from pre-downloaded asset paths.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::ModelLoad`] if the session or tokenizer cannot
    /// be created.
    pub fn from_paths(paths: EnginePaths, device: Device) -> Result<Self> {
        info!("loading Chatterbox ONNX model on {device}");
        let mut builder = Session::builder()
            .map_err(|e| ServeError::ModelLoad(format!("failed to create session builder: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| ServeError::ModelLoad(format!("failed to create session builder: {e}")))?;

        #[cfg(feature = "cuda")]
        let builder = if device == Device::Cuda {
            builder
                .with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                ])
                .map_err(|e| {
                    ServeError::ModelLoad(format!("failed to register CUDA provider: {e}"))
                })?
        } else {
            builder
        };
        #[cfg(not(feature = "cuda"))]
        if device == Device::Cuda {
            return Err(ServeError::ModelLoad(
                "CUDA device requested but this build has no `cuda` feature".into(),
            ));
        }

        let session = builder
            .commit_from_file(&paths.model_onnx)
            .map_err(|e| ServeError::ModelLoad(format!("failed to load ONNX model: {e}")))?;

        info!("loading tokenizer");
        let tokenizer = tokenizers::Tokenizer::from_file(&paths.tokenizer_json)
            .map_err(|e| ServeError::ModelLoad(format!("failed to load tokenizer: {e}")))?;

        info!("Chatterbox engine ready ({SAMPLE_RATE} Hz)");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            device,
        })
    }

    /// Download assets and load the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Config`] for an unknown variant and
    /// [`ServeError::ModelLoad`] if download or loading fails.
    pub fn load(config: &ModelConfig, device: Device) -> Result<Self> {
        let paths = download_engine_assets(&config.repo_id, &config.variant)?;
        Self::from_paths(paths, device)
    }

    /// The device this engine runs on.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Read, downmix, truncate, and resample the reference sample to the
    /// model's rate.
    fn prepare_reference(&self, reference_wav: &Path) -> Result<Vec<f32>> {
        let (samples, sr) = codec::read_wav_mono_f32(reference_wav)?;
        if samples.is_empty() {
            return Err(ServeError::Synthesis(format!(
                "reference sample {} is empty",
                reference_wav.display()
            )));
        }

        let mut samples = codec::resample_linear_mono(&samples, sr, SAMPLE_RATE);
        let max_samples = (MAX_REFERENCE_SECS * SAMPLE_RATE as f32) as usize;
        if samples.len() > max_samples {
            samples.truncate(max_samples);
        }
        Ok(samples)
    }

    /// Run a single ONNX inference call.
    fn run_inference(&self, token_ids: &[i64], reference: &[f32]) -> Result<Vec<f32>> {
        use ort::session::{SessionInputValue, SessionInputs};

        // input_ids: shape [1, seq_len]
        let input_ids = Tensor::from_array(([1_usize, token_ids.len()], token_ids.to_vec()))
            .map_err(|e| ServeError::Synthesis(format!("failed to create input_ids tensor: {e}")))?;

        // reference_audio: shape [1, num_samples]
        let reference_tensor = Tensor::from_array(([1_usize, reference.len()], reference.to_vec()))
            .map_err(|e| ServeError::Synthesis(format!("failed to create reference tensor: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert("input_ids".to_string(), input_ids.into());
        feed.insert("reference_audio".to_string(), reference_tensor.into());

        let mut session = self
            .session
            .lock()
            .map_err(|_| ServeError::Synthesis("session lock poisoned".into()))?;

        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(|e| ServeError::Synthesis(format!("ONNX inference failed: {e}")))?;

        // Output: shape [1, num_samples]
        let output_value = &outputs[0_usize];
        let (_shape, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| ServeError::Synthesis(format!("failed to extract output tensor: {e}")))?;

        Ok(data.to_vec())
    }
}

#[async_trait]
impl SynthesisModel for ChatterboxEngine {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    async fn synthesize(&self, text: &str, reference_wav: &Path) -> Result<Vec<f32>> {
        let start = std::time::Instant::now();

        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ServeError::Synthesis(format!("tokenization failed: {e}")))?;
        let token_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        if token_ids.is_empty() {
            return Err(ServeError::Synthesis("text produced no tokens".into()));
        }

        let reference = self.prepare_reference(reference_wav)?;

        // ONNX inference is synchronous; keep the runtime responsive.
        let samples =
            tokio::task::block_in_place(|| self.run_inference(&token_ids, &reference))?;

        info!(
            "synthesized {} samples ({:.1}s audio) in {:.0}ms",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32,
            start.elapsed().as_millis(),
        );
        Ok(samples)
    }
}

/// [`ModelLoader`] wiring for the production binary.
pub struct ChatterboxLoader {
    config: ModelConfig,
}

impl ChatterboxLoader {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for ChatterboxLoader {
    fn load(&self, device: Device) -> Result<Arc<dyn SynthesisModel>> {
        let engine = ChatterboxEngine::load(&self.config, device)?;
        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_maps_to_onnx_filename() {
        assert_eq!(model_filename("fp32").expect("fp32"), "onnx/model.onnx");
        assert_eq!(model_filename("fp16").expect("fp16"), "onnx/model_fp16.onnx");
        assert_eq!(model_filename("q8").expect("q8"), "onnx/model_quantized.onnx");
        assert_eq!(
            model_filename("quantized").expect("quantized"),
            "onnx/model_quantized.onnx"
        );
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let err = model_filename("pf16").unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("pf16"));
    }
}
