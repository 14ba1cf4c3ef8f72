use std::sync::Arc;

use axum::Router;
use config::Config;
use envconfig::Envconfig;
use eyre::Result;
use health::{HealthEvaluator, HeapMemoryProbe};
use loadgen_common::controller::{LoadController, LoadLimits};
use loadgen_common::host::HostCollector;
use loadgen_common::metrics::setup_metrics_recorder;
use loadgen_common::shutdown::{wait_for_signal, ShutdownCoordinator};
use loadgen_common::supervisor::{Supervisor, Workload};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use handlers::AppState;

mod config;
mod handlers;

common_alloc::used!();

async fn listen(app: Router, bind: String, shutdown: ShutdownCoordinator) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            _ = shutdown.run_until(wait_for_signal()).await;
        })
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let host = Arc::new(HostCollector::new());
    let cores = host.logical_cores();

    let supervisor = Supervisor::new(
        Workload::stress_ng(&config.stress_binary),
        config.kill_grace(),
    );
    let stress_available = supervisor.is_available().await;

    let controller = Arc::new(LoadController::new(
        supervisor,
        LoadLimits {
            default_cores: u32::try_from(cores).unwrap_or(u32::MAX),
            default_duration_secs: config.default_duration_secs,
            max_duration_secs: config.max_duration_secs,
        },
    ));

    let health = HealthEvaluator::new(
        Arc::new(HeapMemoryProbe::new(config.memory_limit_bytes())),
        config.memory_threshold_percent,
        &config.environment,
    );

    let state = AppState {
        controller: controller.clone(),
        health,
        host,
        environment: config.environment.clone(),
    };

    let recorder_handle = config.export_prometheus.then(setup_metrics_recorder);
    let app = handlers::app(state, recorder_handle);

    info!(
        bind = %config.bind(),
        stress_binary = %config.stress_binary,
        stress_available,
        cores,
        arch = std::env::consts::ARCH,
        platform = std::env::consts::OS,
        environment = %config.environment,
        "cpu load test application starting"
    );
    if !stress_available {
        warn!(
            "{} is not installed, cpu load generation will not work",
            config.stress_binary
        );
    }

    match listen(app, config.bind(), ShutdownCoordinator::new(controller)).await {
        Ok(_) => info!("loadgen http server stopped"),
        Err(e) => error!("failed to start loadgen http server, {}", e),
    }
}
