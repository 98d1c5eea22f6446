use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error in {path:?}: {reason}")]
    ConfigError { path: PathBuf, reason: String },
    #[error("Server '{name}' failed to start: {reason}")]
    StartupError { name: String, reason: String },
    #[error("Port {0} is already in use")]
    PortInUse(u16),
    #[error("Server start timeout error: '{name}' not ready after {timeout:?}")]
    ServerStartTimeoutError { name: String, timeout: Duration },
    #[error("Command execution error: '{cmd}' exited with status {status}")]
    ExecError { cmd: String, status: ExitStatus },
    #[error("Command execution error: '{cmd}' timed out after {timeout:?}")]
    ExecTimeout { cmd: String, timeout: Duration },
    #[error("Parse error: {0}")]
    WrkParseError(String),
    #[error("Results persistence error for {path:?}: {reason}")]
    PersistenceError { path: PathBuf, reason: String },
    #[error("Unknown framework: {0}")]
    UnknownFramework(String),
    #[error("Invalid test type: {0}")]
    InvalidTest(String),
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("System error: {0}")]
    System(String),
}

impl Error {
    pub fn config(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ConfigError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::PersistenceError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
