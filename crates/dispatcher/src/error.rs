//! Dispatcher error types
//!
//! Send failures are outcomes, not errors; only the ledger failing is.

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// History record could not be written
    #[error("failed to record history for '{content}' -> '{destination}': {source}")]
    History {
        content: String,
        destination: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Other contract error
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatchError {
    /// Create a history write error
    pub fn history(
        content: impl ToString,
        destination: impl Into<String>,
        source: contracts::ContractError,
    ) -> Self {
        Self::History {
            content: content.to_string(),
            destination: destination.into(),
            source,
        }
    }
}
