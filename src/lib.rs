pub mod aggregate;
pub mod api;
pub mod breaker;
pub mod cache;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod error_log;
pub mod events;
pub mod jsonrpc;
pub mod keychain;
pub mod migrations;
pub mod render;
pub mod scheduler;
pub mod store;
pub mod sync_queue;
pub mod types;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::ApiClient;
use crate::config::{AppConfig, OutputMode};
use crate::credentials::{CredentialResolver, CredentialSource};
use crate::dashboard::Dashboard;
use crate::render::{DashboardSink, JsonLinesSink, TracingSink};
use crate::scheduler::Scheduler;
use crate::store::LocalStore;

/// Initialize structured logging with tracing.
/// Respects RUST_LOG env var; defaults to `info` level for trendsync crate.
/// Logs go to stderr; stdout carries dashboard notifications.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trendsync=info,trendsync_lib=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

pub fn run() {
    init_tracing();
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    if let Err(e) = serve(config) {
        error!(error = %e, "trendsync failed to start");
        std::process::exit(1);
    }
}

fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    for name in config.deployment.placeholders() {
        warn!(variable = name, "Deployment setting still holds its placeholder");
    }
    info!(
        storage_account = %config.deployment.storage_account,
        container = %config.deployment.container_name,
        function_app = %config.deployment.function_app_url,
        key_vault = %config.deployment.key_vault_url,
        "Deployment targets"
    );

    let pool = db::open(&config.db_path())?;
    let store = LocalStore::new(pool);

    let resolver = CredentialResolver::new(store.clone());
    let (credentials, source) = resolver.resolve();
    if credentials.is_demo() {
        warn!("No Trendyol credentials configured, requests will be rejected until they are set");
    }
    info!(?source, supplier_id = %credentials.supplier_id, "Using API credentials");
    if source == CredentialSource::Environment {
        match resolver.remember(&credentials) {
            Ok(saved) => info!(destination = ?saved, "Saved environment credentials"),
            Err(e) => warn!(error = %e, "Could not save environment credentials"),
        }
    }

    let client = ApiClient::new(&config.api, credentials)?;
    let sink: Arc<dyn DashboardSink> = match config.output {
        OutputMode::JsonLines => Arc::new(JsonLinesSink::stdout()),
        OutputMode::Log => Arc::new(TracingSink),
    };
    let dashboard = Arc::new(Dashboard::new(client, store, &config, sink).with_credentials(resolver));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let scheduler = Scheduler::start(dashboard, config.schedule.clone());
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Could not listen for shutdown signal, stopping"),
        }
        scheduler.stop().await;
    });
    Ok(())
}
