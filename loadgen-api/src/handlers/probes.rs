use axum::extract::State;
use health::{HealthSnapshot, LivenessReport, ReadinessReport};

use super::AppState;

pub async fn health(State(state): State<AppState>) -> HealthSnapshot {
    let active = state.controller.status().active_count;
    state.health.evaluate(active)
}

pub async fn live(State(state): State<AppState>) -> LivenessReport {
    state.health.liveness()
}

pub async fn ready(State(state): State<AppState>) -> ReadinessReport {
    state.health.readiness()
}
