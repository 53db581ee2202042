//! Hush application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialise tracing
//! 3. Build the generation backend and response orchestrator
//! 4. Serve the HTTP transport until Ctrl-C

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use hush_api::state::AppState;
use hush_assist::{OpenAiGenerator, ResponseOrchestrator};
use hush_core::HushConfig;

use crate::cli::CliArgs;

/// Extra time granted to the HTTP client beyond the orchestrator timeout.
const CLIENT_TIMEOUT_GRACE_SECS: u64 = 1;

/// Read the config file if it exists; a missing file means defaults.
fn read_config(path: &Path) -> hush_core::Result<Option<HushConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    HushConfig::load(path).map(Some)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let loaded = read_config(&config_file)?;
    let from_file = loaded.is_some();
    let mut config = loaded.unwrap_or_default();

    // Tracing.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Hush v{}", env!("CARGO_PKG_VERSION"));
    if from_file {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
    }

    // Overrides.
    config.server.port = args.resolve_port(config.server.port);
    config.server.host = args.resolve_host(&config.server.host);
    config.general.log_level = level;
    config.validate()?;

    if args.write_config {
        config.save(&config_file)?;
        return Ok(());
    }

    // The key is applied after --write-config so it never lands on disk.
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.trim().is_empty() {
            config.generation.api_key = Some(key);
        }
    }

    // Generation backend.
    let client_timeout =
        Duration::from_secs(config.response.response_timeout_secs + CLIENT_TIMEOUT_GRACE_SECS);
    let generator = match OpenAiGenerator::new(&config.generation, client_timeout) {
        Ok(generator) => generator,
        Err(e) => {
            tracing::error!(error = %e, "Set OPENAI_API_KEY or generation.api_key in the config file");
            return Err(e.into());
        }
    };
    tracing::info!(
        model = %config.generation.model,
        endpoint = %config.generation.endpoint,
        "Generation backend ready"
    );

    // Orchestrator. No speech-to-text engine ships with the binary, so audio
    // chunks are dropped and /voice reports 503.
    let orchestrator = ResponseOrchestrator::new(&config, Arc::new(generator));
    let state = AppState::new(config, orchestrator);

    // === API server ===
    hush_api::start_server(state, shutdown_signal()).await?;

    Ok(())
}
