//! Identity - sender credential handle
//!
//! An identity is one account able to perform sends. Its status is owned by
//! the identity pool; everything else only reads it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Identity identifier (credential store row id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub u64);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity lifecycle status
///
/// `Disabled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    #[default]
    Active,
    RateLimited,
    Disabled,
}

impl IdentityStatus {
    /// Status label as persisted by the credential store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::RateLimited => "rate_limited",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity as listed by the credential store
#[derive(Clone)]
pub struct IdentityRecord {
    pub id: IdentityId,
    /// Routable label (phone number / account name)
    pub handle: String,
    /// Session credential; never logged
    pub credential: Arc<SecretString>,
}

impl IdentityRecord {
    pub fn new(id: IdentityId, handle: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            id,
            handle: handle.into(),
            credential: Arc::new(SecretString::from(credential.into())),
        }
    }
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("credential", &"[REDACTED]")
            .finish()
    }
}

/// Identity with its in-memory lifecycle state
#[derive(Clone)]
pub struct Identity {
    pub id: IdentityId,
    pub handle: String,
    pub credential: Arc<SecretString>,
    pub status: IdentityStatus,
    /// Only meaningful while `status == RateLimited`
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl Identity {
    /// Fresh active identity from a store record
    pub fn from_record(record: IdentityRecord) -> Self {
        Self {
            id: record.id,
            handle: record.handle,
            credential: record.credential,
            status: IdentityStatus::Active,
            cooldown_until: None,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("status", &self.status)
            .field("cooldown_until", &self.cooldown_until)
            .finish_non_exhaustive()
    }
}
