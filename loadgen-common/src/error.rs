use thiserror::Error;

use crate::registry::SessionId;

/// The workload process could not be created. Nothing is registered when this is returned.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("failed to spawn {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited before a pid could be read")]
    MissingPid { program: String },
}

/// Errors raised while terminating workload processes.
/// These are logged and never surfaced to callers: a process that is already gone is fine.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("session {0} already exited")]
    AlreadyExited(SessionId),
    #[error("session {0} was not reaped within the grace period")]
    NotReaped(SessionId),
    #[error("failed to run {command}: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Enumeration of errors returned by the LoadController.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("service is shutting down")]
    ShuttingDown,
}
