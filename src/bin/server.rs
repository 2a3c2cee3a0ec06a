//! brainchain HTTP server binary.
//!
//! Starts an axum HTTP server in front of a [`Brain`].
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `BRAIN_CONFIG` — Path to a YAML config file (optional)
//! - `BRAIN_LLM_URL` — OpenAI-compatible base URL; without it the offline echo completion is used
//! - `BRAIN_LLM_API_KEY` — Bearer token for the completion endpoint
//! - `BRAIN_LLM_MODEL` — Model name (default: "gpt-4o-mini")
//! - `BRAIN_*` — Config overrides, see `BrainConfig::apply_env_overrides`
//! - `RUST_LOG` — Tracing filter (default: "info,brainchain=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! BRAIN_CONFIG=brain.yaml BRAIN_LLM_URL=https://api.openai.com/v1 cargo run --bin server
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use brainchain::config::BrainConfig;
use brainchain::llm::{EchoCompletion, OpenAiCompatibleCompletion, TextCompletion};
use brainchain::server::{app_router, AppState};
use brainchain::Brain;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,brainchain=debug".into()),
        )
        .init();

    let config = match std::env::var("BRAIN_CONFIG") {
        Ok(path) => BrainConfig::from_yaml_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => BrainConfig::default(),
    }
    .apply_env_overrides()
    .context("applying BRAIN_* overrides")?;

    let completion: Arc<dyn TextCompletion> = match std::env::var("BRAIN_LLM_URL") {
        Ok(url) => {
            let model =
                std::env::var("BRAIN_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            let mut client = OpenAiCompatibleCompletion::new(url.as_str(), model.as_str());
            if let Ok(key) = std::env::var("BRAIN_LLM_API_KEY") {
                client = client.with_api_key(key);
            }
            tracing::info!(%url, %model, "Using OpenAI-compatible completion");
            Arc::new(client)
        }
        Err(_) => {
            tracing::warn!("BRAIN_LLM_URL not set, answering with the offline echo completion");
            Arc::new(EchoCompletion)
        }
    };

    let idle_ttl = config.inferencer.idle_ttl_secs;
    let brain = Arc::new(
        Brain::builder()
            .config(config)
            .completion(completion)
            .build()
            .context("building brain")?,
    );

    if let Some(ttl) = idle_ttl {
        let brain = Arc::clone(&brain);
        let period = Duration::from_secs(ttl.clamp(1, 300));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tick.tick().await;
                let evicted = brain.evict_idle();
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted idle mental models");
                }
            }
        });
    }

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{}", port);
    let app = app_router(AppState::new(brain));

    tracing::info!("brainchain server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                         — liveness probe");
    tracing::info!("  POST /v1/process                     — run the brain chain");
    tracing::info!("  GET  /v1/users/:user_id/mental-model — per-user model");
    tracing::info!("  GET  /metrics                        — counters");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    tracing::info!("brainchain server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
