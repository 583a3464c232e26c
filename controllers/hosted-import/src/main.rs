//! Hosted Import Controller
//!
//! Imports and detaches ManagedClusters whose klusterlet runs in hosted mode on
//! a separate hosting cluster. For each hosted cluster it maintains two
//! ManifestWorks in the hosting cluster namespace (the klusterlet payload and
//! the external managed kubeconfig), reports progress through status
//! conditions, and tears the works down in a safe order when the cluster is
//! deleted.

mod backoff;
mod config;
mod constants;
mod controller;
mod error;
mod helpers;
mod manifest;
mod probes;
mod reconciler;
mod status;
mod watcher;

#[cfg(test)]
mod helpers_test;
#[cfg(test)]
mod manifest_test;
#[cfg(test)]
mod test_utils;

use anyhow::Result;
use config::ControllerConfig;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        info!("rustls crypto provider already installed");
    }

    let config = ControllerConfig::from_env()?;
    info!("Starting hosted import controller");
    info!("Configuration:");
    info!("  Controller name: {}", config.controller_name);
    info!("  Max concurrent reconciles: {}", config.concurrency);
    info!("  Backoff: {}s..{}s", config.backoff_min_seconds, config.backoff_max_seconds);
    match config.unknown_availability_timeout {
        Some(timeout) => info!("  Unknown availability force delete after: {:?}", timeout),
        None => info!("  Unknown availability force delete: disabled"),
    }
    info!("  Probe address: {}", config.probe_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
