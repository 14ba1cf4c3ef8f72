//! # Supervisor
//!
//! Spawns the external workload binary, forwards its output to the logs, and
//! keeps the Registry in sync with the processes that are actually running.
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{SignalError, SpawnError};
use crate::metrics::{ACTIVE_SESSIONS, SESSIONS_FINISHED, SESSIONS_STARTED, SPAWN_FAILURES};
use crate::registry::{Registry, SessionHandle, SessionId, SessionState, StressSession};

/// How to invoke the workload, and how to find its processes on the host.
#[derive(Debug, Clone)]
pub struct Workload {
    program: String,
    prefix_args: Vec<String>,
    kill_pattern: String,
}

impl Workload {
    /// A stress-ng invocation. The pattern-kill matches the binary's file name, so
    /// an absolute path still catches workers started from `PATH`.
    pub fn stress_ng(binary: &str) -> Self {
        let kill_pattern = Path::new(binary)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(binary)
            .to_owned();

        Self {
            program: binary.to_owned(),
            prefix_args: Vec::new(),
            kill_pattern,
        }
    }

    /// A workload with arguments placed before the stress arguments, e.g. a shell wrapper.
    pub fn new(program: &str, prefix_args: Vec<String>, kill_pattern: &str) -> Self {
        Self {
            program: program.to_owned(),
            prefix_args,
            kill_pattern: kill_pattern.to_owned(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn kill_pattern(&self) -> &str {
        &self.kill_pattern
    }

    pub fn args(&self, cores: u32, duration_secs: u64) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "--cpu".to_owned(),
            cores.to_string(),
            "--timeout".to_owned(),
            duration_secs.to_string(),
            "--metrics-brief".to_owned(),
        ]);
        args
    }
}

pub struct Supervisor {
    workload: Workload,
    registry: Arc<Registry>,
    kill_grace: Duration,
}

impl Supervisor {
    pub fn new(workload: Workload, kill_grace: Duration) -> Self {
        Self {
            workload,
            registry: Arc::new(Registry::new()),
            kill_grace,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Start one workload process and track it until it exits.
    pub async fn spawn(&self, cores: u32, duration_secs: u64) -> Result<StressSession, SpawnError> {
        let program = self.workload.program();

        let mut child = Command::new(program)
            .args(self.workload.args(cores, duration_secs))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group: a Ctrl-C on our terminal must not reach the workload
            // before the shutdown coordinator does.
            .process_group(0)
            .spawn()
            .map_err(|source| {
                metrics::counter!(SPAWN_FAILURES).increment(1);
                error!(
                    state = SessionState::SpawnFailed.as_str(),
                    "failed to spawn {}: {}", program, source
                );
                SpawnError::Io {
                    program: program.to_owned(),
                    source,
                }
            })?;

        let Some(pid) = child.id() else {
            metrics::counter!(SPAWN_FAILURES).increment(1);
            return Err(SpawnError::MissingPid {
                program: program.to_owned(),
            });
        };

        let session = StressSession {
            id: Uuid::new_v4(),
            pid,
            cores,
            duration_secs,
            started_at: OffsetDateTime::now_utc(),
            state: SessionState::Running,
        };

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(session.id, pid, "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(session.id, pid, "stderr", stderr));
        }

        let (registered_tx, registered_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let observer = tokio::spawn(observe(
            child,
            session.id,
            pid,
            registered_rx,
            stop_rx,
            self.registry.clone(),
        ));

        self.registry
            .add(session.clone(), SessionHandle::new(stop_tx, observer));
        // The observer is parked until now, so its removal can never precede the insert.
        _ = registered_tx.send(());

        metrics::counter!(SESSIONS_STARTED).increment(1);
        metrics::gauge!(ACTIVE_SESSIONS).set(self.registry.count() as f64);
        info!(
            session_id = %session.id,
            pid,
            cores,
            duration_secs,
            "started {}", program
        );

        Ok(session)
    }

    /// Terminate every tracked session, then pattern-kill the workload on the host.
    /// The Registry is always left empty. Returns how many sessions were tracked.
    pub async fn kill_all(&self) -> usize {
        let tracked = self.registry.drain();
        let count = tracked.len();
        info!(count, "stopping all stress processes");

        let mut signaled = Vec::with_capacity(count);
        for tracked in tracked {
            let id = tracked.session.id;
            let SessionHandle { stop, observer } = tracked.handle;
            if stop.send(()).is_err() {
                debug!("{}", SignalError::AlreadyExited(id));
            }
            signaled.push((id, observer));
        }

        for (id, observer) in signaled {
            match tokio::time::timeout(self.kill_grace, observer).await {
                Ok(Ok(state)) => debug!(session_id = %id, state = state.as_str(), "session terminated"),
                Ok(Err(err)) => warn!(session_id = %id, "exit observer failed: {}", err),
                Err(_) => warn!("{}", SignalError::NotReaped(id)),
            }
        }

        self.pattern_kill().await;
        metrics::gauge!(ACTIVE_SESSIONS).set(self.registry.count() as f64);

        count
    }

    /// Kill workload processes by name, including ones this process does not track,
    /// e.g. left behind by a previous instance that crashed.
    async fn pattern_kill(&self) {
        let pattern = self.workload.kill_pattern();
        let status = Command::new("pkill")
            .arg("-f")
            .arg(pattern)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => info!("killed all {} processes on host", pattern),
            Ok(_) => debug!("no {} processes found on host", pattern),
            Err(source) => warn!(
                "{}",
                SignalError::Command {
                    command: "pkill",
                    source
                }
            ),
        }
    }

    /// Whether any process on the host matches the workload, tracked or not.
    pub async fn is_running_on_host(&self) -> bool {
        Command::new("pgrep")
            .arg("-f")
            .arg(self.workload.kill_pattern())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Whether the workload binary can be found, either at its path or on `PATH`.
    pub async fn is_available(&self) -> bool {
        let program = self.workload.program();
        if program.contains('/') {
            return tokio::fs::metadata(program)
                .await
                .map(|metadata| metadata.is_file())
                .unwrap_or(false);
        }

        Command::new("which")
            .arg(program)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

async fn forward_output<R>(session: SessionId, pid: u32, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(session_id = %session, pid, stream, "{}", line),
            Ok(None) => break,
            Err(err) => {
                debug!(session_id = %session, pid, stream, "stopped reading output: {}", err);
                break;
            }
        }
    }
}

/// Waits for the child to exit on its own or for a stop request, and removes the
/// session from the Registry either way. Returns the terminal state.
async fn observe(
    mut child: Child,
    session: SessionId,
    pid: u32,
    registered: oneshot::Receiver<()>,
    stop: oneshot::Receiver<()>,
    registry: Arc<Registry>,
) -> SessionState {
    _ = registered.await;

    let stop_requested = tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => info!(session_id = %session, pid, code = ?status.code(), "stress process exited"),
                Err(err) => warn!(session_id = %session, pid, "failed to wait for stress process: {}", err),
            }
            false
        }
        Ok(()) = stop => true,
    };

    let state = if stop_requested {
        if let Err(err) = child.start_kill() {
            debug!(session_id = %session, pid, "{}: {}", SignalError::AlreadyExited(session), err);
        }
        match child.wait().await {
            Ok(status) => info!(session_id = %session, pid, code = ?status.code(), "stress process killed"),
            Err(err) => warn!(session_id = %session, pid, "failed to reap stress process: {}", err),
        }
        SessionState::Killed
    } else {
        SessionState::Exited
    };

    drop(registry.remove(&session));
    metrics::counter!(SESSIONS_FINISHED, "outcome" => state.as_str()).increment(1);
    metrics::gauge!(ACTIVE_SESSIONS).set(registry.count() as f64);

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stress_ng_arguments() {
        let workload = Workload::stress_ng("stress-ng");
        assert_eq!(workload.program(), "stress-ng");
        assert_eq!(
            workload.args(4, 300),
            vec!["--cpu", "4", "--timeout", "300", "--metrics-brief"]
        );
    }

    #[test]
    fn kill_pattern_uses_file_name() {
        let workload = Workload::stress_ng("/usr/local/bin/stress-ng");
        assert_eq!(workload.program(), "/usr/local/bin/stress-ng");
        assert_eq!(workload.kill_pattern(), "stress-ng");
    }

    #[test]
    fn prefix_arguments_come_first() {
        let workload = Workload::new(
            "sh",
            vec!["-c".to_owned(), "exec sleep 5".to_owned(), "marker".to_owned()],
            "marker",
        );
        assert_eq!(
            workload.args(1, 5),
            vec![
                "-c",
                "exec sleep 5",
                "marker",
                "--cpu",
                "1",
                "--timeout",
                "5",
                "--metrics-brief"
            ]
        );
    }
}
