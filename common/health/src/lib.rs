use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

/// Health reporting for the load generator process.
///
/// The service exposes three probes, and HealthEvaluator answers all of them:
///   - liveness only says the process is accepting requests, it never
///     depends on the workload or on host metrics
///   - health is `healthy` unless the process' own heap usage goes over
///     the configured threshold, host memory never enters the verdict
///   - readiness mirrors health, it is not an independent check
///
/// Host CPU load and the number of active sessions are reported alongside
/// the verdict for display, they never change it.

pub const DEFAULT_MEMORY_THRESHOLD_PERCENT: f64 = 90.0;

const MEGABYTE: f64 = 1024.0 * 1024.0;

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("failed to rfc3339 format timestamp")
}

/// A point-in-time reading of the memory the process uses, against the
/// budget it is allowed to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl MemorySample {
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemorySample;
}

/// Reads the process heap from jemalloc: bytes allocated against bytes the
/// allocator has mapped. Only meaningful when the binary installs jemalloc
/// with `common_alloc::used!()`.
///
/// An explicit limit replaces the mapped figure as the budget.
pub struct HeapMemoryProbe {
    limit_bytes: Option<u64>,
}

impl HeapMemoryProbe {
    pub fn new(limit_bytes: Option<u64>) -> Self {
        Self { limit_bytes }
    }
}

impl MemoryProbe for HeapMemoryProbe {
    fn sample(&self) -> MemorySample {
        let stats = match common_alloc::heap_stats() {
            Ok(stats) => stats,
            Err(err) => {
                warn!("failed to read jemalloc stats: {}", err);
                return MemorySample::default();
            }
        };

        MemorySample {
            used_bytes: stats.allocated,
            total_bytes: self.limit_bytes.unwrap_or(stats.mapped),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    NotReady,
}

impl From<HealthStatus> for Readiness {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Healthy => Readiness::Ready,
            HealthStatus::Unhealthy => Readiness::NotReady,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Alive,
}

/// Memory figures as displayed by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryReport {
    pub used: String,
    pub total: String,
    pub percentage: String,
}

impl From<MemorySample> for MemoryReport {
    fn from(sample: MemorySample) -> Self {
        Self {
            used: format!("{} MB", (sample.used_bytes as f64 / MEGABYTE).round()),
            total: format!("{} MB", (sample.total_bytes as f64 / MEGABYTE).round()),
            percentage: format!("{}%", sample.percentage().round()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub timestamp: String,
    /// Seconds since the evaluator was created.
    pub uptime: f64,
    pub memory: MemoryReport,
    pub active_sessions: usize,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IntoResponse for HealthSnapshot {
    fn into_response(self) -> Response {
        let code = match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };
        (code, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub status: Readiness,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IntoResponse for ReadinessReport {
    fn into_response(self) -> Response {
        let code = match self.status {
            Readiness::Ready => StatusCode::OK,
            Readiness::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        };
        (code, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessReport {
    pub status: Liveness,
    pub timestamp: String,
}

impl IntoResponse for LivenessReport {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Clone)]
pub struct HealthEvaluator {
    probe: Arc<dyn MemoryProbe>,
    threshold_percent: f64,
    environment: String,
    started_at: Instant,
}

impl HealthEvaluator {
    pub fn new(probe: Arc<dyn MemoryProbe>, threshold_percent: f64, environment: &str) -> Self {
        Self {
            probe,
            threshold_percent,
            environment: environment.to_owned(),
            started_at: Instant::now(),
        }
    }

    pub fn liveness(&self) -> LivenessReport {
        LivenessReport {
            status: Liveness::Alive,
            timestamp: now_rfc3339(),
        }
    }

    fn status_for(&self, sample: &MemorySample) -> HealthStatus {
        if sample.percentage() > self.threshold_percent {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        }
    }

    /// Computes a fresh snapshot, nothing is cached between calls.
    pub fn evaluate(&self, active_sessions: usize) -> HealthSnapshot {
        let sample = self.probe.sample();
        let status = self.status_for(&sample);

        match status {
            HealthStatus::Healthy => info!("health check ok"),
            HealthStatus::Unhealthy => warn!(
                "health check failed: memory usage {:.2}% over {}%",
                sample.percentage(),
                self.threshold_percent
            ),
        }

        HealthSnapshot {
            status,
            timestamp: now_rfc3339(),
            uptime: self.started_at.elapsed().as_secs_f64(),
            memory: sample.into(),
            active_sessions,
            environment: self.environment.clone(),
            message: match status {
                HealthStatus::Healthy => None,
                HealthStatus::Unhealthy => Some("High memory usage detected".to_owned()),
            },
        }
    }

    pub fn readiness(&self) -> ReadinessReport {
        let status = Readiness::from(self.status_for(&self.probe.sample()));
        ReadinessReport {
            status,
            timestamp: now_rfc3339(),
            message: match status {
                Readiness::Ready => None,
                Readiness::NotReady => Some("Application not ready to serve traffic".to_owned()),
            },
        }
    }
}
