//! kkp-preflight
//!
//! Checks the provider configuration from `KKP_*` environment variables
//! against a live KKP installation: reachability, server version and access
//! to the configured project.

use anyhow::Context;
use terraform_provider_kkp::{KkpProvider, ProviderConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting KKP preflight");

    let config = ProviderConfig::from_env().context("load provider configuration")?;
    info!(endpoint = %config.endpoint, project_id = %config.project_id, "Configuration loaded");

    let provider = KkpProvider::from_config(&config).context("build KKP client")?;

    let warnings = provider.preflight().await;
    for warning in &warnings {
        warn!(summary = %warning.summary, detail = %warning.detail, "Preflight warning");
    }

    let clusters = provider
        .data()
        .clusters()
        .await
        .context("list clusters in project")?;
    info!(
        cluster_count = clusters.clusters.len(),
        warning_count = warnings.len(),
        "Preflight finished"
    );

    Ok(())
}
