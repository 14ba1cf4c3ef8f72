use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use loadgen_common::registry::StressSession;
use serde::Serialize;
use serde_derive::Deserialize;
use tracing::{debug, error};
use uuid::Uuid;

use super::error::ApiError;
use super::AppState;

/// The body of a request made to start load. Both fields fall back to configured defaults.
#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct StartLoadRequestBody {
    pub duration: Option<i64>,
    pub cores: Option<i64>,
}

impl StartLoadRequestBody {
    /// An empty body means defaults; anything else must be a JSON object.
    fn parse(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|err| ApiError::BadRequest(format!("invalid request body: {}", err)))
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartLoadResponse {
    pub status: &'static str,
    pub session_id: Uuid,
    pub pid: u32,
    pub cores: u32,
    pub duration: u64,
    pub message: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StopLoadResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub stopped_processes: usize,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub active_stress_processes: usize,
    pub environment: String,
    pub sessions: Vec<StressSession>,
}

pub async fn start(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StartLoadResponse>, ApiError> {
    let body = StartLoadRequestBody::parse(&body)?;
    debug!("received start request: {:?}", body);

    let started = state
        .controller
        .start_load(body.cores, body.duration)
        .await
        .map_err(|err| {
            error!("error starting cpu load: {}", err);
            ApiError::from(err)
        })?;

    Ok(Json(StartLoadResponse {
        status: "started",
        session_id: started.session_id,
        pid: started.pid,
        cores: started.cores,
        duration: started.duration_secs,
        message: format!(
            "Real CPU load generation started - 100% CPU utilization on {} cores for {} seconds",
            started.cores, started.duration_secs
        ),
    }))
}

pub async fn stop(State(state): State<AppState>) -> Json<StopLoadResponse> {
    let stopped = state.controller.stop_load().await;

    Json(StopLoadResponse {
        status: "stopped",
        message: "CPU load generation stopped",
        stopped_processes: stopped,
    })
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.controller.status();

    Json(StatusResponse {
        status: "running",
        name: "CPU Load Test Application",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: health::now_rfc3339(),
        active_stress_processes: status.active_count,
        environment: state.environment.clone(),
        sessions: status.sessions,
    })
}
