//! Destination - delivery target with its own cadence

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Message id assigned by the destination to a delivered item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How content reaches the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Forward with source attribution
    #[default]
    Forward,
    /// Re-post a copy without attribution
    Copy,
}

/// Delivery target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Unique key (normalized chat link)
    pub link: String,

    /// Minimum minutes between sends; 0 means always eligible
    #[serde(default)]
    pub interval_minutes: u32,

    /// Time of the last tick that delivered at least one item
    #[serde(default)]
    pub last_sent_at: Option<DateTime<Utc>>,

    /// Items sampled per tick in batch mode, >= 1
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default)]
    pub send_mode: SendMode,

    /// Last item delivered by the refresh scheduler, retracted before the next one
    #[serde(default)]
    pub last_delivered_ref: Option<MessageId>,
}

fn default_batch_size() -> u32 {
    1
}

impl Destination {
    /// Destination with default cadence (always eligible, batch of one, forward)
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            interval_minutes: 0,
            last_sent_at: None,
            batch_size: default_batch_size(),
            send_mode: SendMode::Forward,
            last_delivered_ref: None,
        }
    }

    /// `last_sent_at is None || now - last_sent_at >= interval`
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.last_sent_at {
            None => true,
            Some(last) => now - last >= Duration::minutes(i64::from(self.interval_minutes)),
        }
    }
}
