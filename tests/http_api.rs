//! End-to-end tests for the HTTP surface.
//!
//! Each test boots a real server on a loopback port with a fake model and
//! talks to it over HTTP, the same way the hosting platform routes remote
//! calls to a worker.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use voxserve::config::ServerConfig;
use voxserve::{
    Device, ModelLoader, ModelManager, Result, ServeError, SynthesisModel, SynthesisService,
    TtsServer, VoiceStore, codec,
};

struct FakeModel;

#[async_trait]
impl SynthesisModel for FakeModel {
    fn sample_rate(&self) -> u32 {
        24_000
    }

    async fn synthesize(&self, text: &str, _reference_wav: &Path) -> Result<Vec<f32>> {
        Ok(vec![0.5; text.chars().count().max(1) * 100])
    }
}

struct FakeLoader;

impl ModelLoader for FakeLoader {
    fn load(&self, _device: Device) -> Result<Arc<dyn SynthesisModel>> {
        Ok(Arc::new(FakeModel))
    }
}

struct FailingLoader;

impl ModelLoader for FailingLoader {
    fn load(&self, _device: Device) -> Result<Arc<dyn SynthesisModel>> {
        Err(ServeError::ModelLoad("weights unavailable".into()))
    }
}

fn wav_b64() -> String {
    let samples = vec![0.1f32; 24_000 * 3];
    let bytes = codec::wav_from_samples(&samples, 24_000).expect("test wav");
    codec::encode_audio(&bytes)
}

async fn start_server(
    root: &Path,
    loader: Arc<dyn ModelLoader>,
    activate: bool,
) -> (TtsServer, String) {
    let store = VoiceStore::open(root).expect("open store");
    let manager = Arc::new(ModelManager::new(loader, Device::Cpu));
    if activate {
        manager.ensure_loaded().await.expect("activation");
    }
    let service = Arc::new(SynthesisService::new(store, manager));

    let config = ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
    };
    let server = TtsServer::start(service, &config).await.expect("start server");
    let base = format!("http://{}", server.addr());
    (server, base)
}

#[tokio::test]
async fn health_reports_ready_after_activation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_server, base) = start_server(dir.path(), Arc::new(FakeLoader), true).await;

    let resp = reqwest::get(format!("{base}/health")).await.expect("health");
    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn health_reports_unready_before_activation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_server, base) = start_server(dir.path(), Arc::new(FakeLoader), false).await;

    let resp = reqwest::get(format!("{base}/health")).await.expect("health");
    assert_eq!(resp.status().as_u16(), 503);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["status"], "cold");
}

#[tokio::test]
async fn upload_then_generate_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_server, base) = start_server(dir.path(), Arc::new(FakeLoader), true).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/voices"))
        .json(&serde_json::json!({"voice_name": "marco", "audio_b64": wav_b64()}))
        .send()
        .await
        .expect("upload");
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.expect("json");
    let location = body["location"].as_str().expect("location");
    assert!(!location.is_empty());

    let resp = client
        .get(format!("{base}/voices"))
        .send()
        .await
        .expect("list");
    let voices: Vec<String> = resp.json().await.expect("json array");
    assert_eq!(voices, vec!["marco"]);

    let resp = client
        .post(format!("{base}/generate"))
        .json(&serde_json::json!({"text": "Hello world.", "voice_name": "marco"}))
        .send()
        .await
        .expect("generate");
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["sample_rate"], 24_000);
    assert_eq!(body["text_length"], 12);

    let audio = codec::decode_audio(body["audio_b64"].as_str().expect("audio"))
        .expect("transport decode");
    assert!(audio.len() > 44, "WAV payload too small ({} bytes)", audio.len());
    assert_eq!(&audio[..4], b"RIFF", "response does not start with RIFF header");
}

#[tokio::test]
async fn generate_defaults_to_default_voice() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_server, base) = start_server(dir.path(), Arc::new(FakeLoader), true).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/voices"))
        .json(&serde_json::json!({"voice_name": "default", "audio_b64": wav_b64()}))
        .send()
        .await
        .expect("upload");

    // No voice_name in the request body.
    let resp = client
        .post(format!("{base}/generate"))
        .json(&serde_json::json!({"text": "hi"}))
        .send()
        .await
        .expect("generate");
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn missing_voice_is_404_with_kind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_server, base) = start_server(dir.path(), Arc::new(FakeLoader), true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/generate"))
        .json(&serde_json::json!({"text": "x", "voice_name": "ghost"}))
        .send()
        .await
        .expect("generate");
    assert_eq!(resp.status().as_u16(), 404);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["error"]["kind"], "voice_not_found");
}

#[tokio::test]
async fn malformed_upload_is_400_with_kind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_server, base) = start_server(dir.path(), Arc::new(FakeLoader), true).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/voices"))
        .json(&serde_json::json!({"voice_name": "m", "audio_b64": "not-base64-!!!"}))
        .send()
        .await
        .expect("upload");
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["error"]["kind"], "malformed_audio_encoding");
}

#[tokio::test]
async fn failed_load_makes_worker_permanently_unready() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_server, base) = start_server(dir.path(), Arc::new(FailingLoader), false).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/voices"))
        .json(&serde_json::json!({"voice_name": "marco", "audio_b64": wav_b64()}))
        .send()
        .await
        .expect("upload");

    // The lazy load attempt fails and sticks.
    let resp = client
        .post(format!("{base}/generate"))
        .json(&serde_json::json!({"text": "hello", "voice_name": "marco"}))
        .send()
        .await
        .expect("generate");
    assert_eq!(resp.status().as_u16(), 503);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["error"]["kind"], "model_load");

    let resp = client.get(format!("{base}/health")).send().await.expect("health");
    assert_eq!(resp.status().as_u16(), 503);
    let body: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(body["status"], "failed");
}
