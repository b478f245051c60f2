//! Entry point for the pterobot action runner.
//!
//! The command layer (the chat bot front end) parses slash commands into
//! action requests and sends them here over NATS. The runner checks the
//! initiator, executes the action against the panel, notifies the affected
//! user and answers with the resulting record.
//!
//! # Architecture
//!
//! ```text
//! NATS (request) --> PermissionGate --> PanelActionClient --> NotificationRouter --> NATS (reply)
//!                                                                             \--> journal
//! ```

mod error;
mod nats;

use std::path::PathBuf;
use std::sync::Arc;

use pterobot_core::{
    ActionOrchestrator, DiscordGateway, HttpPanelTransport, NotificationRouter,
    PanelActionClient, PermissionGate, PipelineConfig, RecordJournal, Secret,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::RunnerError;
use crate::nats::NatsService;

const DEFAULT_CONFIG_PATH: &str = "pterobot.yaml";

/// Application entry point.
///
/// Loads configuration and credentials, builds the pipeline, connects to
/// NATS and serves requests until Ctrl-C.
///
/// # Errors
///
/// Returns an error if configuration, credentials or the NATS connection
/// are unusable.
#[tokio::main]
async fn main() -> Result<(), RunnerError> {
    let config = load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("pterobot-runner starting");
    config.validate()?;
    info!(
        panel = config.panel.base_url,
        admins = config.admins.len(),
        audit_channel = %config.notifications.audit_channel_id,
        max_concurrent_calls = config.panel.max_concurrent_calls,
        nats_url = config.nats.url,
        "configuration loaded"
    );

    let panel_key = Secret::from_env("PTERO_APP_API")?;
    let bot_token = Secret::from_env("DISCORD_TOKEN")?;

    let client = PanelActionClient::from_config(
        HttpPanelTransport::new(&config.panel.base_url, panel_key),
        &config.panel,
    );
    let router = NotificationRouter::from_config(
        DiscordGateway::new(&config.notifications.api_base_url, bot_token),
        &config.notifications,
    );
    let mut orchestrator =
        ActionOrchestrator::new(PermissionGate::new(config.admins.clone()), client, router);
    if let Some(path) = &config.journal.path {
        info!(path = %path.display(), "recording actions to journal");
        orchestrator = orchestrator.with_journal(RecordJournal::new(path));
    }

    let service = NatsService::connect(&config.nats.url, &config.nats.request_subject).await?;
    service.serve(Arc::new(orchestrator)).await?;

    info!("pterobot-runner stopped");
    Ok(())
}

/// Read `PTEROBOT_CONFIG` (or `pterobot.yaml`), falling back to defaults
/// plus environment overrides when the file does not exist.
fn load_config() -> Result<PipelineConfig, RunnerError> {
    let path = std::env::var("PTEROBOT_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        return Ok(PipelineConfig::from_file(&path)?);
    }
    let mut config = PipelineConfig::default();
    config.apply_env_overrides();
    Ok(config)
}
