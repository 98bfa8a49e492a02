//! HTTP surface for the synthesis service.
//!
//! ## Endpoints
//!
//! - `GET /health` — 200 once the model is loaded, 503 otherwise
//! - `GET /voices` — list registered voice names
//! - `POST /voices` — upload a base64-encoded voice sample
//! - `POST /generate` — synthesize text against a registered voice
//!
//! Audio crosses this boundary base64-encoded inside JSON; errors carry a
//! machine-readable kind so callers can tell a missing voice from a broken
//! payload without parsing messages.

use crate::config::ServerConfig;
use crate::error::ServeError;
use crate::model::ModelStatus;
use crate::service::{DEFAULT_VOICE, SynthesisService};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of `POST /voices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Name to register the sample under.
    pub voice_name: String,
    /// Base64-encoded WAV audio.
    pub audio_b64: String,
}

/// Body of `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Text to synthesize.
    pub text: String,
    /// Voice to clone; defaults to `"default"`.
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
}

fn default_voice_name() -> String {
    DEFAULT_VOICE.to_owned()
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Lifecycle state: `cold`, `loading`, `ready`, or `failed`.
    pub status: String,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The error details.
    pub error: ErrorBody,
}

/// Error details within an [`ErrorResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable error kind (e.g. `"voice_not_found"`).
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state for axum handlers.
#[derive(Clone)]
struct AppState {
    service: Arc<SynthesisService>,
}

// ---------------------------------------------------------------------------
// TtsServer
// ---------------------------------------------------------------------------

/// HTTP server wrapping one worker's [`SynthesisService`].
pub struct TtsServer {
    /// The address the server is listening on.
    addr: SocketAddr,
    /// Handle to the background server task.
    handle: JoinHandle<()>,
}

impl TtsServer {
    /// Start the HTTP server.
    ///
    /// Binds to `{config.host}:{config.port}` (use port `0` for auto-assign)
    /// and begins serving in a background tokio task.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start(
        service: Arc<SynthesisService>,
        config: &ServerConfig,
    ) -> crate::error::Result<Self> {
        let state = AppState { service };

        let app = Router::new()
            .route("/health", get(handle_health))
            .route("/voices", get(handle_list_voices).post(handle_upload_voice))
            .route("/generate", post(handle_generate))
            .with_state(state);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServeError::Config(format!("server bind failed on {bind_addr}: {e}")))?;

        let addr = listener
            .local_addr()
            .map_err(|e| ServeError::Config(format!("failed to get local addr: {e}")))?;

        info!("TTS server listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("TTS server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for TtsServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Map a service error to an HTTP status and JSON body.
fn error_response(err: &ServeError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        ServeError::VoiceNotFound(_) => StatusCode::NOT_FOUND,
        ServeError::MalformedAudioEncoding(_) | ServeError::InvalidRequest(_) => {
            StatusCode::BAD_REQUEST
        }
        ServeError::Storage(_) | ServeError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServeError::Synthesis(_) | ServeError::Config(_) | ServeError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let body = ErrorResponse {
        error: ErrorBody {
            message: err.to_string(),
            kind: err.kind().to_owned(),
        },
    };
    (status, Json(body))
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `GET /health` — readiness signal for the hosting platform.
///
/// Reports 503 until the model is loaded, and 503 forever if the load
/// failed, so an unready worker fails fast instead of hanging callers.
async fn handle_health(State(state): State<AppState>) -> axum::response::Response {
    let status = state.service.model_status();
    let code = match status {
        ModelStatus::Ready => StatusCode::OK,
        ModelStatus::Cold | ModelStatus::Loading | ModelStatus::Failed => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    let body = HealthResponse {
        status: status.as_str().to_owned(),
    };
    (code, Json(body)).into_response()
}

/// `GET /voices` — list registered voice names.
async fn handle_list_voices(State(state): State<AppState>) -> axum::response::Response {
    match state.service.list_voices() {
        Ok(names) => (StatusCode::OK, Json(names)).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// `POST /voices` — upload a voice sample.
async fn handle_upload_voice(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> axum::response::Response {
    match state
        .service
        .upload_voice(&request.voice_name, &request.audio_b64)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// `POST /generate` — synthesize text against a registered voice.
async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> axum::response::Response {
    match state
        .service
        .generate(&request.text, &request.voice_name)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}
