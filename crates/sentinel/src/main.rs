//! VM Sentinel - VM resource anomaly sentinel
//!
//! Samples VM utilization on a schedule, reconciles threshold crossings into
//! notifications and serves them to operators over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use sentinel_lib::{
    anomaly::ThresholdEvaluator,
    health::{components, HealthRegistry},
    observability::{SentinelMetrics, StructuredLogger},
    reconcile::{ReconcileConfig, Reconciler},
    sampler::{JsonFileSampler, Sampler},
    scheduler::{JobRegistry, ReconcileJob, Scheduler},
    store::InMemoryStore,
};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vm_sentinel::{api, config::SentinelConfig};

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting vm-sentinel");

    let config = SentinelConfig::load()?;
    info!(
        instance = %config.instance,
        store_path = %config.store_path.display(),
        spool_dir = %config.spool_dir.display(),
        "Sentinel configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCHEDULER).await;
    health_registry.register(components::STORE).await;
    health_registry.register(components::SAMPLER).await;

    // Register metrics before the first scrape
    let _metrics = SentinelMetrics::new();
    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(SENTINEL_VERSION, config.threshold_pct);

    let store = InMemoryStore::with_persistence(&config.store_path).with_context(|| {
        format!("Failed to open notification store at {}", config.store_path.display())
    })?;

    let samplers: Vec<Arc<dyn Sampler>> = config
        .provider_list()?
        .into_iter()
        .map(|provider| {
            Arc::new(JsonFileSampler::new(provider, &config.spool_dir)) as Arc<dyn Sampler>
        })
        .collect();

    let reconciler = Reconciler::new(
        Arc::new(store),
        ReconcileConfig {
            store_timeout: config.store_timeout(),
        },
    )
    .with_logger(logger.clone());

    let job = Arc::new(
        ReconcileJob::new(
            samplers,
            ThresholdEvaluator::new(config.threshold_pct),
            reconciler,
            JobRegistry::new(),
            health_registry.clone(),
        )
        .with_refresh(config.refresh)
        .with_logger(logger.clone()),
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = Scheduler::new(job.clone(), config.scheduler());
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), job));

    // Store loaded and scheduler running
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Scheduler task panicked");
    }
    info!("Shutdown complete");

    Ok(())
}
