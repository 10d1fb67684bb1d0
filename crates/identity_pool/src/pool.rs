//! Identity Pool - ordered set of sender identities and their lifecycle
//!
//! Registration order is failover priority and never changes. All status
//! transitions go through here:
//!
//! ```text
//! Active ──rate limited──▶ RateLimited ──now >= cooldown_until──▶ Active
//!    │                          │
//!    └────────fatal─────────────┴──────────▶ Disabled (terminal)
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use contracts::{Identity, IdentityId, IdentityRecord, IdentityStatus};

/// Thread-safe identity pool, shared as `Arc<IdentityPool>`
///
/// Guards are never held across an await point; callers get cloned snapshots.
#[derive(Debug, Default)]
pub struct IdentityPool {
    identities: Mutex<Vec<Identity>>,
}

impl IdentityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool seeded from store records, in the given order
    pub fn from_records(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
        let pool = Self::new();
        pool.sync(records);
        pool
    }

    /// Merge the credential store's current list into the pool
    ///
    /// Unknown identities are appended in store order. Known identities keep
    /// their in-memory status, so a Disabled identity is never resurrected.
    /// Returns the number of identities added.
    pub fn sync(&self, records: impl IntoIterator<Item = IdentityRecord>) -> usize {
        let mut identities = self.identities.lock();
        let mut added = 0;
        for record in records {
            if identities.iter().any(|i| i.id == record.id) {
                continue;
            }
            debug!(identity = %record.id, handle = %record.handle, "Identity joined pool");
            identities.push(Identity::from_record(record));
            added += 1;
        }
        added
    }

    /// Snapshot of every identity in priority order
    pub fn list(&self) -> Vec<Identity> {
        self.identities.lock().clone()
    }

    pub fn get(&self, id: IdentityId) -> Option<Identity> {
        self.identities.lock().iter().find(|i| i.id == id).cloned()
    }

    pub fn status(&self, id: IdentityId) -> Option<IdentityStatus> {
        self.identities
            .lock()
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.status)
    }

    /// Current-status check used right before each send attempt
    pub fn is_active(&self, id: IdentityId) -> bool {
        self.status(id) == Some(IdentityStatus::Active)
    }

    pub fn len(&self) -> usize {
        self.identities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.lock().is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.identities
            .lock()
            .iter()
            .filter(|i| i.is_active())
            .count()
    }

    /// Active → RateLimited until `until`
    ///
    /// Returns false if the identity is unknown or Disabled.
    pub fn mark_rate_limited(&self, id: IdentityId, until: DateTime<Utc>) -> bool {
        self.transition(id, |identity| {
            identity.status = IdentityStatus::RateLimited;
            identity.cooldown_until = Some(until);
        })
    }

    /// Any → Disabled. Terminal.
    pub fn mark_disabled(&self, id: IdentityId) -> bool {
        self.transition(id, |identity| {
            identity.status = IdentityStatus::Disabled;
            identity.cooldown_until = None;
        })
    }

    /// RateLimited → Active, regardless of cooldown
    pub fn mark_active(&self, id: IdentityId) -> bool {
        self.transition(id, |identity| {
            identity.status = IdentityStatus::Active;
            identity.cooldown_until = None;
        })
    }

    /// Return every RateLimited identity whose cooldown has passed to Active
    ///
    /// Runs before each dispatch cycle. Returns the revived ids.
    pub fn revive_eligible(&self, now: DateTime<Utc>) -> Vec<IdentityId> {
        let mut identities = self.identities.lock();
        let mut revived = Vec::new();
        for identity in identities.iter_mut() {
            if identity.status != IdentityStatus::RateLimited {
                continue;
            }
            let ready = identity.cooldown_until.is_none_or(|until| now >= until);
            if ready {
                identity.status = IdentityStatus::Active;
                identity.cooldown_until = None;
                revived.push(identity.id);
            }
        }
        if !revived.is_empty() {
            info!(count = revived.len(), "Revived rate-limited identities");
        }
        revived
    }

    fn transition(&self, id: IdentityId, apply: impl FnOnce(&mut Identity)) -> bool {
        let mut identities = self.identities.lock();
        match identities.iter_mut().find(|i| i.id == id) {
            Some(identity) if identity.status != IdentityStatus::Disabled => {
                apply(identity);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: u64) -> IdentityRecord {
        IdentityRecord::new(IdentityId(id), format!("+{id}"), format!("session-{id}"))
    }

    fn pool_of(n: u64) -> IdentityPool {
        IdentityPool::from_records((1..=n).map(record))
    }

    #[test]
    fn test_order_follows_registration() {
        let pool = pool_of(3);
        let ids: Vec<_> = pool.list().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![IdentityId(1), IdentityId(2), IdentityId(3)]);
        assert_eq!(pool.active_count(), 3);
    }

    #[test]
    fn test_disabled_is_terminal() {
        let pool = pool_of(1);
        let id = IdentityId(1);
        let now = Utc::now();

        assert!(pool.mark_disabled(id));
        assert!(!pool.mark_active(id));
        assert!(!pool.mark_rate_limited(id, now));
        assert!(pool.revive_eligible(now + Duration::days(365)).is_empty());
        assert_eq!(pool.status(id), Some(IdentityStatus::Disabled));
    }

    #[test]
    fn test_revive_respects_cooldown_exactly() {
        let pool = pool_of(1);
        let id = IdentityId(1);
        let now = Utc::now();
        let until = now + Duration::minutes(30);

        assert!(pool.mark_rate_limited(id, until));
        assert!(!pool.is_active(id));

        assert!(pool.revive_eligible(until - Duration::milliseconds(1)).is_empty());
        assert_eq!(pool.status(id), Some(IdentityStatus::RateLimited));

        assert_eq!(pool.revive_eligible(until), vec![id]);
        assert!(pool.is_active(id));
        assert_eq!(pool.get(id).unwrap().cooldown_until, None);
    }

    #[test]
    fn test_sync_keeps_in_memory_status() {
        let pool = pool_of(2);
        pool.mark_disabled(IdentityId(1));

        let added = pool.sync(vec![record(1), record(2), record(3)]);
        assert_eq!(added, 1);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.status(IdentityId(1)), Some(IdentityStatus::Disabled));
        assert_eq!(pool.list()[2].id, IdentityId(3));
    }

    #[test]
    fn test_unknown_identity() {
        let pool = IdentityPool::new();
        assert!(pool.is_empty());
        assert!(!pool.mark_disabled(IdentityId(9)));
        assert!(!pool.is_active(IdentityId(9)));
    }
}
