//! Live-relay dedup guard
//!
//! One async critical section covers the recent-set check, the durable
//! history check and the recent-set insert, so two handlers racing on the
//! same `(feed, item)` key can never both be admitted.

use tokio::sync::Mutex;
use tracing::debug;

use contracts::{ContentRef, ContractError, DeliveryScope, HistoryStore};

use crate::RecentSet;

/// Verdict for one incoming event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting; the caller owns delivery
    Admitted,
    /// Seen recently in this process
    DuplicateRecent,
    /// Durable history already has a success for it
    AlreadyDelivered,
}

impl Admission {
    #[inline]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Debug)]
pub struct DedupGuard {
    recent: Mutex<RecentSet>,
}

impl DedupGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: Mutex::new(RecentSet::new(capacity)),
        }
    }

    /// Decide whether `key` may be delivered
    ///
    /// # Errors
    /// Propagates a history lookup failure; the key is not remembered then.
    pub async fn admit<H: HistoryStore>(
        &self,
        key: &ContentRef,
        history: &H,
    ) -> Result<Admission, ContractError> {
        let mut recent = self.recent.lock().await;

        if recent.contains(key) {
            debug!(content = %key, "Duplicate event suppressed (recent)");
            return Ok(Admission::DuplicateRecent);
        }

        if history.has_been_delivered(key, &DeliveryScope::Any).await? {
            recent.insert(key.clone());
            debug!(content = %key, "Duplicate event suppressed (history)");
            return Ok(Admission::AlreadyDelivered);
        }

        recent.insert(key.clone());
        Ok(Admission::Admitted)
    }

    pub async fn recent_len(&self) -> usize {
        self.recent.lock().await.len()
    }
}
