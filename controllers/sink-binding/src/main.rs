//! SinkBinding Controller
//!
//! Resolves the sink of every `SinkBinding` to an absolute URI and publishes
//! it in the binding status.
//!
//! The sink may reference another object (a `Service` or any kind publishing
//! `status.address.url`). Each resolution leases that reference in the
//! tracker, and changes to referenced objects re-enqueue the bindings holding
//! a live lease, so published URIs follow address changes.

mod backoff;
mod config;
mod controller;
mod error;
mod reconciler;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting SinkBinding Controller");

    // Load configuration from environment variables
    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Resync period: {:?}", config.resync_period);
    info!("  Lease duration: {:?}", config.lease_duration);
    info!("  Cluster domain: {}", config.cluster_domain);
    info!("  Addressable kinds: {}", config.addressable_kinds.len());

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
