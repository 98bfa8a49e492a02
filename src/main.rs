//! voxserve worker binary.
//!
//! Activation order matters: the model is loaded before the listener starts,
//! so the worker never advertises readiness with an unloaded model. A failed
//! load is fatal — the process exits and the hosting platform decides
//! whether to restart it.

use std::path::PathBuf;
use std::sync::Arc;
use voxserve::engine::ChatterboxLoader;
use voxserve::{ModelManager, ServeConfig, SynthesisService, TtsServer, VoiceStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ServeConfig::load(config_path.as_deref())?;

    let device = config.model.device.resolve();
    tracing::info!("voxserve starting (device={device})");

    let store = VoiceStore::open(&config.store.root)?;
    let loader = Arc::new(ChatterboxLoader::new(config.model.clone()));
    let manager = Arc::new(ModelManager::new(loader, device));

    // One-time activation: load the model before serving anything.
    manager.ensure_loaded().await.map_err(|e| {
        tracing::error!("activation failed: {e}");
        anyhow::anyhow!("worker activation failed: {e}")
    })?;

    let service = Arc::new(SynthesisService::new(store, manager));
    let server = TtsServer::start(service, &config.server).await?;
    tracing::info!("worker ready on {}", server.addr());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.shutdown();
    Ok(())
}
