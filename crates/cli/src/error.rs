//! Error types for CLI operations.

use thiserror::Error;

use scheduler::SchedulerError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Mode needs a post link but neither `--post` nor `[refresh]` provides one
    #[error("Mode '{mode}' needs a post link: pass --post or set [refresh].post")]
    MissingPost { mode: &'static str },

    /// A scheduler could not start or a cycle failed fatally
    #[error("Scheduler failed: {0}")]
    Scheduler(#[from] SchedulerError),

    /// A spawned mode task panicked or was cancelled
    #[error("Pipeline task failed: {message}")]
    Task { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}
