use axum::extract::State;
use axum::Json;
use loadgen_common::host::{format_gigabytes, format_percentage, format_uptime};
use serde::Serialize;

use super::AppState;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfoResponse {
    pub cores: usize,
    pub arch: &'static str,
    pub platform: &'static str,
    /// 1, 5 and 15 minute load averages.
    pub load: [String; 3],
    pub uptime: String,
    pub total_memory: String,
    pub free_memory: String,
    pub hostname: String,
    #[serde(rename = "current_status")]
    pub current_status: &'static str,
    #[serde(rename = "stress_ng_available")]
    pub stress_ng_available: bool,
}

#[derive(Serialize, Debug)]
pub struct CpuUsage {
    pub usage: String,
    pub load: String,
}

#[derive(Serialize, Debug)]
pub struct MemoryUsage {
    pub used: String,
    pub total: String,
    pub percentage: String,
}

#[derive(Serialize, Debug)]
pub struct CpuUsageResponse {
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub timestamp: String,
}

pub async fn cpu_info(State(state): State<AppState>) -> Json<CpuInfoResponse> {
    let metrics = state.host.snapshot();
    let supervisor = state.controller.supervisor();

    let current_status = if supervisor.is_running_on_host().await {
        "High (stress-ng active)"
    } else {
        "Normal"
    };

    Json(CpuInfoResponse {
        cores: metrics.cores,
        arch: metrics.arch,
        platform: metrics.platform,
        load: [
            format!("{:.2}", metrics.load_average.one),
            format!("{:.2}", metrics.load_average.five),
            format!("{:.2}", metrics.load_average.fifteen),
        ],
        uptime: format_uptime(metrics.uptime_secs),
        total_memory: format_gigabytes(metrics.total_memory_bytes),
        free_memory: format_gigabytes(metrics.free_memory_bytes),
        hostname: metrics.hostname,
        current_status,
        stress_ng_available: supervisor.is_available().await,
    })
}

pub async fn cpu_usage(State(state): State<AppState>) -> Json<CpuUsageResponse> {
    let metrics = state.host.snapshot();

    Json(CpuUsageResponse {
        cpu: CpuUsage {
            usage: format!("{:.2}", metrics.cpu_usage_percent),
            load: format!("{:.2}", metrics.load_average.one),
        },
        memory: MemoryUsage {
            used: format_gigabytes(metrics.used_memory_bytes()),
            total: format_gigabytes(metrics.total_memory_bytes),
            percentage: format_percentage(metrics.memory_usage_percent()),
        },
        timestamp: health::now_rfc3339(),
    })
}
