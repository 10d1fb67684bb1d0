//! Destination eligibility, content sampling and per-cycle pool preparation

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, warn};

use contracts::{
    ContentItem, CredentialStore, Destination, IdentityStatus, RelayStore, Transport,
};
use dispatcher::DispatchEngine;

use crate::SchedulerError;

/// Destinations whose interval has elapsed at `now`
pub fn eligible_destinations(destinations: Vec<Destination>, now: DateTime<Utc>) -> Vec<Destination> {
    destinations
        .into_iter()
        .filter(|d| d.is_eligible(now))
        .collect()
}

/// `min(count, pool.len())` distinct items, sampled without replacement
pub fn sample_items<R: Rng + ?Sized>(
    pool: &[ContentItem],
    count: usize,
    rng: &mut R,
) -> Vec<ContentItem> {
    let amount = count.min(pool.len());
    rand::seq::index::sample(rng, pool.len(), amount)
        .into_iter()
        .map(|idx| pool[idx].clone())
        .collect()
}

/// Sync the pool with the credential store, then revive cooled-down identities
///
/// Revived identities are persisted as Active on a best-effort basis.
pub async fn prepare_pool<T, S>(
    engine: &DispatchEngine<T, S>,
    now: DateTime<Utc>,
) -> Result<(), SchedulerError>
where
    T: Transport + Send + Sync + 'static,
    S: RelayStore,
{
    let records = engine
        .store()
        .list_active_identities()
        .await
        .map_err(SchedulerError::enumerate("identities"))?;
    let added = engine.pool().sync(records);
    if added > 0 {
        debug!(added, "New identities added to pool");
    }

    revive(engine, now).await;
    Ok(())
}

/// Revive only; used on the live-relay path where re-listing every event is wasteful
pub async fn revive<T, S>(engine: &DispatchEngine<T, S>, now: DateTime<Utc>)
where
    T: Transport + Send + Sync + 'static,
    S: RelayStore,
{
    let pool = engine.pool();
    for id in pool.revive_eligible(now) {
        let Some(identity) = pool.get(id) else {
            continue;
        };
        observability::record_identity_transition(IdentityStatus::Active);
        if let Err(e) = engine
            .store()
            .set_status(&identity.handle, IdentityStatus::Active)
            .await
        {
            warn!(identity = %id, error = %e, "Failed to persist revived status");
        }
    }
    observability::record_active_identities(pool.active_count(), pool.len());
}
