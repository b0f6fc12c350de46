use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while assembling an instance, before any process is started.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("inline settings and a config file are mutually exclusive")]
    ConflictingSettings,
    #[error("no executable resolved for {os:?}/{arch:?}")]
    ExecutableNotFound { os: crate::exec::Os, arch: crate::exec::Arch },
    #[error("could not mark {path} as executable: {err}", path = .0.display(), err = .1)]
    ExecutablePermissions(PathBuf, std::io::Error),
    #[error("ran out of ports")]
    OutOfPorts,
    #[error("could not provide an ephemeral port: {0}")]
    EphemeralPort(std::io::Error),
    #[error("could not write config file: {0}")]
    ConfigIo(#[from] std::io::Error),
}

/// Errors raised by a running (or starting) instance.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("this server instance is already running")]
    AlreadyRunning,
    #[error("server failed to start, check the captured output for details")]
    StartupFailed,
    #[error("could not spawn server process: {0}")]
    Spawn(std::io::Error),
    #[error("io error while supervising server process: {0}")]
    Io(#[from] std::io::Error),
    /// A state transition that the protocol guarantees did not apply.
    /// Indicates a race outside the designed lifecycle, not a runtime
    /// condition a caller can recover from.
    #[error("internal lifecycle error: {0}")]
    Internal(String),
}
