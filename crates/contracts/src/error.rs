//! Layered error definitions
//!
//! Categorized by source: config / store / transport

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Store Errors =====
    /// A store could not be enumerated or written
    #[error("{store} store error: {message}")]
    Store {
        store: &'static str,
        message: String,
    },

    /// Unknown destination link
    #[error("destination not found: {link}")]
    DestinationNotFound { link: String },

    // ===== Transport Errors =====
    /// Feed could not be read
    #[error("fetch from feed '{feed}' failed: {message}")]
    Fetch { feed: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create store error
    pub fn store(store: &'static str, message: impl Into<String>) -> Self {
        Self::Store {
            store,
            message: message.into(),
        }
    }

    /// Create fetch error
    pub fn fetch(feed: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            feed: feed.into(),
            message: message.into(),
        }
    }
}
