use std::any::Any;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::{routing, Router};
use health::HealthEvaluator;
use loadgen_common::controller::LoadController;
use loadgen_common::host::HostCollector;
use loadgen_common::metrics;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use super::error::{not_found, ApiError};
use super::{host, load, probes};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<LoadController>,
    pub health: HealthEvaluator,
    pub host: Arc<HostCollector>,
    pub environment: String,
}

pub async fn index() -> &'static str {
    "loadgen"
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/", routing::get(index))
        .route("/health", routing::get(probes::health))
        .route("/health/live", routing::get(probes::live))
        .route("/health/ready", routing::get(probes::ready))
        .route("/real-start-load", routing::post(load::start))
        .route("/real-stop-load", routing::post(load::stop))
        .route("/real-cpu-info", routing::get(host::cpu_info))
        .route("/cpu-usage", routing::get(host::cpu_usage))
        .route("/status", routing::get(load::status))
        .fallback(not_found)
}

/// Any panic in a handler becomes a 500, the process keeps serving.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message
    } else {
        "unknown panic payload"
    };
    error!("unhandled error: {}", detail);

    ApiError::Internal("Internal server error".to_owned()).into_response()
}

fn with_layers(router: Router<AppState>, state: AppState) -> Router {
    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(metrics::track_metrics))
        .with_state(state)
}

pub fn app(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let router = with_layers(routes(), state);

    // Installing a global recorder when the router is built in tests does not work well,
    // so the handle is only passed in by main.
    match metrics {
        Some(recorder_handle) => router.route(
            "/metrics",
            routing::get(move || std::future::ready(recorder_handle.render())),
        ),
        None => router,
    }
}
