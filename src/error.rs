//! Error types for the voxserve service.

/// Top-level error type for the voice-cloning TTS service.
///
/// Every request-scoped failure is surfaced synchronously to the caller as
/// one of these variants; none are retried inside the service.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// `generate` referenced a voice name with no stored sample.
    #[error("voice not found: {0}")]
    VoiceNotFound(String),

    /// Upload payload was not valid base64-encoded audio.
    #[error("malformed audio encoding: {0}")]
    MalformedAudioEncoding(String),

    /// Request failed validation (empty text, unsafe voice name).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Durable voice store read/write error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Model download or load error. Fatal for the worker: the load is
    /// never retried and the worker never becomes ready.
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// The model capability failed during synthesis.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServeError {
    /// Stable machine-readable kind, carried in HTTP error bodies so callers
    /// can distinguish the failure classes without parsing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VoiceNotFound(_) => "voice_not_found",
            Self::MalformedAudioEncoding(_) => "malformed_audio_encoding",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Storage(_) => "storage",
            Self::ModelLoad(_) => "model_load",
            Self::Synthesis(_) => "synthesis",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ServeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct() {
        let errors = [
            ServeError::VoiceNotFound("v".into()),
            ServeError::MalformedAudioEncoding("x".into()),
            ServeError::InvalidRequest("x".into()),
            ServeError::Storage("x".into()),
            ServeError::ModelLoad("x".into()),
            ServeError::Synthesis("x".into()),
            ServeError::Config("x".into()),
        ];
        let mut kinds: Vec<_> = errors.iter().map(ServeError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn display_includes_detail() {
        let err = ServeError::VoiceNotFound("marco".into());
        assert_eq!(err.to_string(), "voice not found: marco");
    }
}
