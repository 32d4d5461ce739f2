use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use filter_sync::config;
use filter_sync::filters::engine::LoggingEngine;
use filter_sync::filters::fetch::build_client;
use filter_sync::filters::registry::FilterRegistry;
use filter_sync::filters::scheduler::RefreshScheduler;
use filter_sync::filters::store::ContentStore;
use filter_sync::filters::updater::FilterUpdater;
use filter_sync::metrics::RefreshMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("filter_sync=info".parse()?)
        )
        .init();

    info!("Starting filter-sync v{}", env!("CARGO_PKG_VERSION"));

    let cfg = config::load()?;
    info!("Configuration loaded");

    let registry = Arc::new(FilterRegistry::new(ContentStore::new(&cfg.data_dir)));
    registry
        .bootstrap(cfg.all_filters(), cfg.user_rules.clone())
        .await
        .with_context(|| format!("initializing filters in {}", cfg.data_dir.display()))?;

    let client = build_client(cfg.http.timeout(), &cfg.http.user_agent)
        .context("building HTTP client")?;
    let metrics = Arc::new(RefreshMetrics::default());

    let updater = Arc::new(FilterUpdater::new(
        registry,
        Arc::new(LoggingEngine),
        client,
        metrics.clone(),
    ));
    updater.set_update_interval_hours(cfg.update_interval_hours);
    updater.set_filtering_enabled(cfg.filtering_enabled);
    updater.enable_filters(false).await;

    let scheduler = Arc::new(RefreshScheduler::new(updater)).spawn();

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    scheduler.abort();

    info!("Shutting down\n{}", metrics.to_prometheus_text());
    Ok(())
}
