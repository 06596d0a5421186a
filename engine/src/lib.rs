pub mod artifact;
pub mod backup;
pub mod common;
pub mod control;
pub mod manager;
pub mod registry;
pub mod restore;
pub mod retention;
pub mod runner;
pub mod scheduler;
pub mod test_support;
pub mod wrapper;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("not connected to a database")]
    NotConnected,

    #[error("database connection error: {0}")]
    Connection(String),

    #[error("required tool not found: {0}")]
    ToolNotFound(String),

    #[error("backup error: {0}")]
    Backup(String),

    #[error("backup already in progress for database {database} in {}", directory.display())]
    BackupInProgress {
        database: String,
        directory: PathBuf,
    },

    #[error("restore error: {0}")]
    Restore(String),

    #[error("service control error: {0}")]
    ServiceControl(String),

    #[error("service control is not supported on this platform")]
    UnsupportedPlatform,

    #[error("external tool {tool} timed out")]
    Timeout { tool: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err)
    }
}

impl EngineError {
    /// Stable machine-readable identifier for the error kind, used by the
    /// wire interface so callers can distinguish failures without parsing
    /// the human-readable message.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotConnected => "not_connected",
            EngineError::Connection(_) => "connection_error",
            EngineError::ToolNotFound(_) => "tool_not_found",
            EngineError::Backup(_) => "backup_error",
            EngineError::BackupInProgress { .. } => "backup_in_progress",
            EngineError::Restore(_) => "restore_error",
            EngineError::ServiceControl(_) => "service_control_error",
            EngineError::UnsupportedPlatform => "unsupported_platform",
            EngineError::Timeout { .. } => "timeout",
            EngineError::Cancelled => "cancelled",
            EngineError::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

// Re-export key types for convenience
pub use artifact::BackupArtifact;
pub use common::{BackupFormat, ConnectionProfile, Engine, ScheduleConfig, SchedulePeriod};
pub use control::{ServiceAction, ServiceController};
pub use manager::BackupManager;
pub use registry::ConnectionRegistry;
pub use runner::{CommandOutput, CommandSpec, ProcessRunner, SystemRunner};
pub use scheduler::{SchedulerHandle, SchedulerState};
