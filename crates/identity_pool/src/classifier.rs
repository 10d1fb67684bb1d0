//! Rate/Failure Classifier
//!
//! Maps a [`SendOutcome`] into a [`PolicyAction`] and applies it to the pool.
//! Rate limits and fatal identity errors are outcomes, never errors.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, warn};

use contracts::{CooldownPolicy, IdentityId, IdentityStatus, MessageId, RateLimitPolicy, SendOutcome};

use crate::IdentityPool;

/// What the dispatch loop does after one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyAction {
    /// Stop failover; identity stays Active
    Delivered(MessageId),
    /// Identity → RateLimited until `until`; move on without waiting
    Cooldown { until: DateTime<Utc> },
    /// Wait `wait` inline, identity stays Active; move on afterwards
    Backoff { wait: Duration },
    /// Identity → Disabled; move on
    Disable,
    /// Identity untouched; attempt counted as failed; move on
    Skip { reason: String },
}

impl PolicyAction {
    /// Status the identity ends up in, when the action changes it
    pub fn resulting_status(&self) -> Option<IdentityStatus> {
        match self {
            Self::Cooldown { .. } => Some(IdentityStatus::RateLimited),
            Self::Disable => Some(IdentityStatus::Disabled),
            _ => None,
        }
    }
}

/// Classifier configured for one operating mode
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    rate_limit: RateLimitPolicy,
    cooldown: CooldownPolicy,
    fixed_cooldown: Duration,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(
            RateLimitPolicy::Defer,
            CooldownPolicy::Signaled,
            Duration::from_secs(30 * 60),
        )
    }
}

impl Classifier {
    pub fn new(rate_limit: RateLimitPolicy, cooldown: CooldownPolicy, fixed_cooldown: Duration) -> Self {
        Self {
            rate_limit,
            cooldown,
            fixed_cooldown,
        }
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        self.rate_limit
    }

    /// Decide the action for `outcome` observed at `now`
    pub fn classify(&self, outcome: &SendOutcome, now: DateTime<Utc>) -> PolicyAction {
        match outcome {
            SendOutcome::Success(message) => PolicyAction::Delivered(*message),
            SendOutcome::RateLimited { wait_secs } => match self.rate_limit {
                RateLimitPolicy::SleepInline => PolicyAction::Backoff {
                    wait: Duration::from_secs(*wait_secs),
                },
                RateLimitPolicy::Defer => {
                    let cooldown = match self.cooldown {
                        CooldownPolicy::Signaled => Duration::from_secs(*wait_secs),
                        CooldownPolicy::Fixed => self.fixed_cooldown,
                    };
                    PolicyAction::Cooldown {
                        until: add_saturating(now, cooldown),
                    }
                }
            },
            SendOutcome::FatalIdentityError => PolicyAction::Disable,
            SendOutcome::UnknownError(reason) => PolicyAction::Skip {
                reason: reason.clone(),
            },
        }
    }

    /// Apply the status side of `action` to the pool
    ///
    /// Returns the new status when one was written, so the caller can persist it.
    pub fn apply(
        &self,
        pool: &IdentityPool,
        identity: IdentityId,
        action: &PolicyAction,
    ) -> Option<IdentityStatus> {
        let changed = match action {
            PolicyAction::Cooldown { until } => {
                warn!(identity = %identity, until = %until, "Identity rate limited, cooling down");
                pool.mark_rate_limited(identity, *until)
            }
            PolicyAction::Disable => {
                error!(identity = %identity, "Identity credential invalid, disabling");
                pool.mark_disabled(identity)
            }
            PolicyAction::Backoff { wait } => {
                warn!(identity = %identity, wait_secs = wait.as_secs(), "Identity rate limited, waiting inline");
                false
            }
            PolicyAction::Skip { reason } => {
                error!(identity = %identity, reason = %reason, "Send failed with unknown error");
                false
            }
            PolicyAction::Delivered(_) => false,
        };
        if changed {
            action.resulting_status()
        } else {
            None
        }
    }
}

fn add_saturating(now: DateTime<Utc>, wait: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(wait)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

const FATAL_MARKERS: [&str; 4] = [
    "USER_DEACTIVATED",
    "AUTH_KEY_UNREGISTERED",
    "SESSION_REVOKED",
    "AUTH_KEY_DUPLICATED",
];

/// Turn a free-form transport error text into a [`SendOutcome`]
///
/// Recognizes `FLOOD_WAIT_<n>` / `FLOOD_WAIT (n)` / `retry after <n>` as rate
/// limits and the usual deactivated-credential codes as fatal.
pub fn classify_raw(detail: &str) -> SendOutcome {
    let upper = detail.to_ascii_uppercase();

    if let Some(wait_secs) = flood_wait_secs(&upper) {
        return SendOutcome::RateLimited { wait_secs };
    }
    if FATAL_MARKERS.iter().any(|marker| upper.contains(marker)) {
        return SendOutcome::FatalIdentityError;
    }
    SendOutcome::UnknownError(detail.to_string())
}

fn flood_wait_secs(upper: &str) -> Option<u64> {
    for marker in ["FLOOD_WAIT", "RETRY AFTER"] {
        if let Some(pos) = upper.find(marker) {
            let rest = &upper[pos + marker.len()..];
            let digits: String = rest
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(secs) = digits.parse() {
                return Some(secs);
            }
        }
    }
    None
}
