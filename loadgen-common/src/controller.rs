//! # Controller
//!
//! Serializes start and stop requests against the Supervisor, so that at most one
//! load generation session runs on the host at a time.
use tokio::sync::Mutex;
use tracing::info;

use crate::error::LoadError;
use crate::registry::{SessionId, StressSession};
use crate::supervisor::Supervisor;

/// Defaults and bounds applied to start requests.
#[derive(Debug, Clone, Copy)]
pub struct LoadLimits {
    pub default_cores: u32,
    pub default_duration_secs: u64,
    pub max_duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedLoad {
    pub session_id: SessionId,
    pub pid: u32,
    pub cores: u32,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStatus {
    pub active_count: usize,
    pub sessions: Vec<StressSession>,
}

pub struct LoadController {
    supervisor: Supervisor,
    limits: LoadLimits,
    // Held for the whole stop -> spawn -> register sequence. The flag is set once
    // the controller is closed for shutdown.
    exclusive: Mutex<bool>,
}

impl LoadController {
    pub fn new(supervisor: Supervisor, limits: LoadLimits) -> Self {
        Self {
            supervisor,
            limits,
            exclusive: Mutex::new(false),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    fn validate_cores(&self, cores: Option<i64>) -> Result<u32, LoadError> {
        match cores {
            None => Ok(self.limits.default_cores),
            Some(cores) if cores <= 0 => Err(LoadError::InvalidArgument(format!(
                "cores must be a positive integer, got {}",
                cores
            ))),
            Some(cores) => u32::try_from(cores).map_err(|_| {
                LoadError::InvalidArgument(format!("cores is too large: {}", cores))
            }),
        }
    }

    fn validate_duration(&self, duration_secs: Option<i64>) -> Result<u64, LoadError> {
        let max = self.limits.max_duration_secs;
        match duration_secs {
            None => Ok(self.limits.default_duration_secs),
            Some(duration) if duration <= 0 => Err(LoadError::InvalidArgument(format!(
                "duration must be a positive number of seconds, got {}",
                duration
            ))),
            Some(duration) => match u64::try_from(duration) {
                Ok(duration) if duration <= max => Ok(duration),
                _ => Err(LoadError::InvalidArgument(format!(
                    "duration must not exceed {} seconds, got {}",
                    max, duration
                ))),
            },
        }
    }

    /// Stop whatever is running, then start a new session. A second call supersedes the first.
    pub async fn start_load(
        &self,
        cores: Option<i64>,
        duration_secs: Option<i64>,
    ) -> Result<StartedLoad, LoadError> {
        let cores = self.validate_cores(cores)?;
        let duration_secs = self.validate_duration(duration_secs)?;

        let closed = self.exclusive.lock().await;
        if *closed {
            return Err(LoadError::ShuttingDown);
        }

        let replaced = self.supervisor.kill_all().await;
        if replaced > 0 {
            info!(replaced, "superseding running load session");
        }

        info!(cores, duration_secs, "starting cpu load");
        let session = self.supervisor.spawn(cores, duration_secs).await?;

        Ok(StartedLoad {
            session_id: session.id,
            pid: session.pid,
            cores: session.cores,
            duration_secs: session.duration_secs,
        })
    }

    /// Always succeeds. Returns how many sessions were tracked when the call was made,
    /// zero meaning nothing was running.
    pub async fn stop_load(&self) -> usize {
        let _exclusive = self.exclusive.lock().await;
        let stopped = self.supervisor.kill_all().await;
        info!(stopped, "stopped cpu load");
        stopped
    }

    /// Stop everything and refuse any later start. Starts already queued behind
    /// the lock fail with `ShuttingDown` instead of spawning a new workload.
    pub async fn close(&self) -> usize {
        let mut closed = self.exclusive.lock().await;
        *closed = true;
        let stopped = self.supervisor.kill_all().await;
        info!(stopped, "load controller closed");
        stopped
    }

    pub fn status(&self) -> LoadStatus {
        let sessions = self.supervisor.registry().list();
        LoadStatus {
            active_count: sessions.len(),
            sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::Workload;
    use std::time::Duration;

    fn controller() -> LoadController {
        let supervisor = Supervisor::new(
            Workload::new("true", Vec::new(), "loadgen-controller-unit"),
            Duration::from_secs(1),
        );
        LoadController::new(
            supervisor,
            LoadLimits {
                default_cores: 8,
                default_duration_secs: 300,
                max_duration_secs: 3_600,
            },
        )
    }

    #[test]
    fn defaults_apply_when_absent() {
        let controller = controller();
        assert_eq!(controller.validate_cores(None).unwrap(), 8);
        assert_eq!(controller.validate_duration(None).unwrap(), 300);
    }

    #[test]
    fn rejects_non_positive_values() {
        let controller = controller();
        assert!(matches!(
            controller.validate_duration(Some(0)),
            Err(LoadError::InvalidArgument(_))
        ));
        assert!(matches!(
            controller.validate_duration(Some(-5)),
            Err(LoadError::InvalidArgument(_))
        ));
        assert!(matches!(
            controller.validate_cores(Some(0)),
            Err(LoadError::InvalidArgument(_))
        ));
    }

    #[test]
    fn rejects_durations_over_the_maximum() {
        let controller = controller();
        assert_eq!(controller.validate_duration(Some(3_600)).unwrap(), 3_600);
        assert!(matches!(
            controller.validate_duration(Some(3_601)),
            Err(LoadError::InvalidArgument(_))
        ));
        assert!(matches!(
            controller.validate_cores(Some(i64::MAX)),
            Err(LoadError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn stop_when_idle_reports_zero() {
        let controller = controller();
        assert_eq!(controller.stop_load().await, 0);
        assert_eq!(controller.status().active_count, 0);
    }

    #[tokio::test]
    async fn closed_controller_refuses_starts() {
        let controller = controller();
        assert_eq!(controller.close().await, 0);

        let result = controller.start_load(None, None).await;
        assert!(matches!(result, Err(LoadError::ShuttingDown)));
        assert_eq!(controller.status().active_count, 0);
        assert_eq!(controller.stop_load().await, 0);
    }

    #[tokio::test]
    async fn invalid_start_spawns_nothing() {
        let controller = controller();
        let result = controller.start_load(None, Some(0)).await;
        assert!(matches!(result, Err(LoadError::InvalidArgument(_))));
        assert_eq!(controller.status().active_count, 0);
    }
}
