//! # Registry
//!
//! In-memory record of the workload sessions currently supervised by this process.
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type SessionId = Uuid;

/// Lifecycle of a workload session. Only `Running` sessions live in the Registry,
/// the terminal states are reported once by the exit observer and then dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Running,
    Exited,
    Killed,
    SpawnFailed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Running => "running",
            SessionState::Exited => "exited",
            SessionState::Killed => "killed",
            SessionState::SpawnFailed => "spawn-failed",
        }
    }
}

/// One supervised invocation of the workload binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressSession {
    pub id: SessionId,
    pub pid: u32,
    pub cores: u32,
    #[serde(rename = "duration")]
    pub duration_secs: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub state: SessionState,
}

/// What the Supervisor needs to terminate a session: a trigger for the exit observer
/// task, and the task itself so the caller can wait for the child to be reaped.
pub struct SessionHandle {
    pub(crate) stop: oneshot::Sender<()>,
    pub(crate) observer: JoinHandle<SessionState>,
}

impl SessionHandle {
    pub fn new(stop: oneshot::Sender<()>, observer: JoinHandle<SessionState>) -> Self {
        Self { stop, observer }
    }
}

pub struct TrackedSession {
    pub session: StressSession,
    pub handle: SessionHandle,
}

/// The Registry is the only owner of session records. It never fails: every lock
/// is held for a single map operation and a poisoned lock is recovered.
#[derive(Default)]
pub struct Registry {
    sessions: Mutex<HashMap<SessionId, TrackedSession>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, TrackedSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, session: StressSession, handle: SessionHandle) {
        drop(
            self.sessions()
                .insert(session.id, TrackedSession { session, handle }),
        );
    }

    /// Removing an absent session is a no-op.
    pub fn remove(&self, id: &SessionId) -> Option<TrackedSession> {
        self.sessions().remove(id)
    }

    /// Sessions ordered by start time.
    pub fn list(&self) -> Vec<StressSession> {
        let mut sessions: Vec<StressSession> = self
            .sessions()
            .values()
            .map(|tracked| tracked.session.clone())
            .collect();
        sessions.sort_by_key(|session| session.started_at);
        sessions
    }

    pub fn count(&self) -> usize {
        self.sessions().len()
    }

    /// Empties the Registry, handing every tracked session to the caller.
    pub fn drain(&self) -> Vec<TrackedSession> {
        self.sessions().drain().map(|(_, tracked)| tracked).collect()
    }
}
