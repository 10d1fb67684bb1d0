//! Scheduler error types

use contracts::ContractError;
use dispatcher::DispatchError;
use thiserror::Error;

/// Scheduler-specific errors
///
/// Any of these aborts the current cycle only; loops log and carry on.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A store could not be enumerated
    #[error("failed to list {what}: {source}")]
    Enumerate {
        what: &'static str,
        #[source]
        source: ContractError,
    },

    /// Post link could not be parsed
    #[error("invalid post link '{0}', expected https://t.me/<channel>/<id>")]
    InvalidPostLink(String),

    /// Dispatch engine error
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl SchedulerError {
    /// Create an enumeration error
    pub fn enumerate(what: &'static str) -> impl FnOnce(ContractError) -> Self {
        move |source| Self::Enumerate { what, source }
    }
}
