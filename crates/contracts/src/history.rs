//! HistoryRecord - immutable delivery outcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContentRef, IdentityId};

/// Delivery outcome stored in history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failure,
}

/// Immutable history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub content: ContentRef,
    /// Sending identity; `None` when every identity was exhausted
    pub identity: Option<IdentityId>,
    pub destination: String,
    pub outcome: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn success(
        content: ContentRef,
        identity: IdentityId,
        destination: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            content,
            identity: Some(identity),
            destination: destination.into(),
            outcome: DeliveryStatus::Success,
            timestamp,
        }
    }

    pub fn exhausted(
        content: ContentRef,
        destination: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            content,
            identity: None,
            destination: destination.into(),
            outcome: DeliveryStatus::Failure,
            timestamp,
        }
    }
}

/// Scope of a "has this been delivered?" query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryScope {
    /// Delivered anywhere
    Any,
    /// Delivered to this destination link
    Destination(String),
}

impl DeliveryScope {
    pub fn covers(&self, record: &HistoryRecord) -> bool {
        match self {
            Self::Any => true,
            Self::Destination(link) => record.destination == *link,
        }
    }
}
