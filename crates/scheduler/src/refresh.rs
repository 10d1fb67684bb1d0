//! Single-ad refresh and one-shot broadcast
//!
//! Refresh keeps exactly one copy of a fixed post at the bottom of every
//! destination: the previous copy is retracted, then the post is sent again.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use contracts::{
    ContentItem, ContentRef, Destination, DestinationStore, RefreshSettings, RelayStore, Transport,
};
use dispatcher::{DeliveryOutcome, DispatchEngine};

use crate::eligibility::prepare_pool;
use crate::{SchedulerError, ShutdownSignal};

const MODE: &str = "refresh";

/// Parse `https://t.me/<channel>/<id>` into the item to deliver
pub fn post_item(link: &str) -> Result<ContentItem, SchedulerError> {
    ContentRef::from_post_link(link)
        .map(ContentItem::new)
        .ok_or_else(|| SchedulerError::InvalidPostLink(link.to_string()))
}

/// Result of one refresh cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub destinations: usize,
    pub retracted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Totals of one `run`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub delivered: u64,
    /// Wall time of every cycle, in milliseconds
    pub cycle_ms: Vec<f64>,
}

pub struct RefreshScheduler<T, S> {
    engine: DispatchEngine<T, S>,
    item: ContentItem,
    period: Duration,
}

impl<T, S> RefreshScheduler<T, S>
where
    T: Transport + Send + Sync + 'static,
    S: RelayStore,
{
    /// # Errors
    /// `InvalidPostLink` when `settings.post` is not a post link.
    pub fn new(engine: DispatchEngine<T, S>, settings: &RefreshSettings) -> Result<Self, SchedulerError> {
        Ok(Self {
            engine,
            item: post_item(&settings.post)?,
            period: Duration::from_secs(settings.interval_minutes.saturating_mul(60)),
        })
    }

    pub fn item(&self) -> &ContentItem {
        &self.item
    }

    /// Retract the previous copy and re-send the post to every destination
    #[instrument(name = "refresh_cycle", skip(self), fields(post = %self.item.source_ref))]
    pub async fn cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, SchedulerError> {
        prepare_pool(&self.engine, now).await?;
        let destinations = self
            .engine
            .store()
            .list_destinations()
            .await
            .map_err(SchedulerError::enumerate("destinations"))?;

        let mut report = CycleReport {
            destinations: destinations.len(),
            ..CycleReport::default()
        };
        for destination in &destinations {
            self.refresh_one(destination, now, &mut report).await;
        }

        info!(
            destinations = report.destinations,
            retracted = report.retracted,
            delivered = report.delivered,
            "Refresh cycle finished"
        );
        Ok(report)
    }

    async fn refresh_one(&self, destination: &Destination, now: DateTime<Utc>, report: &mut CycleReport) {
        let mut retracted = false;
        if let Some(previous) = destination.last_delivered_ref {
            retracted = self.engine.retract(destination, previous).await;
            if retracted {
                report.retracted += 1;
            }
        }

        let stored = match self.engine.deliver(&self.item, destination, now).await {
            Ok(DeliveryOutcome::Delivered { message, .. }) => {
                report.delivered += 1;
                Some(Some(message))
            }
            Ok(DeliveryOutcome::Exhausted { .. }) => {
                report.failed += 1;
                // the old copy is gone, do not retract it again
                retracted.then_some(None)
            }
            Err(e) => {
                error!(destination = %destination.link, error = %e, "Delivery failed");
                report.failed += 1;
                retracted.then_some(None)
            }
        };

        if let Some(message) = stored {
            if let Err(e) = self
                .engine
                .store()
                .set_last_delivered_ref(&destination.link, message)
                .await
            {
                warn!(destination = %destination.link, error = %e, "Failed to persist delivered ref");
            }
        }
    }

    /// Cycle every `interval_minutes` until shutdown
    pub async fn run(&self, mut shutdown: ShutdownSignal) -> RefreshStats {
        info!(
            post = %self.item.source_ref,
            period_secs = self.period.as_secs(),
            "Refresh scheduler started"
        );
        let mut stats = RefreshStats::default();

        while !shutdown.is_triggered() {
            stats.cycles += 1;
            let started = Instant::now();
            let result = self.cycle(Utc::now()).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            stats.cycle_ms.push(elapsed_ms);
            match result {
                Ok(report) => {
                    stats.delivered += report.delivered as u64;
                    observability::record_tick(MODE, elapsed_ms, report.destinations);
                }
                Err(e) => {
                    stats.failed_cycles += 1;
                    observability::record_tick_failure(MODE);
                    error!(error = %e, "Refresh cycle failed");
                }
            }
            if shutdown.sleep(self.period).await {
                break;
            }
        }

        info!(cycles = stats.cycles, delivered = stats.delivered, "Refresh scheduler stopped");
        stats
    }
}

/// Result of [`broadcast_once`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Links of destinations no identity could reach
    pub failed: Vec<String>,
}

impl BroadcastReport {
    pub fn total(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Deliver one post to every destination, once
#[instrument(name = "broadcast_once", skip(engine))]
pub async fn broadcast_once<T, S>(
    engine: &DispatchEngine<T, S>,
    post_link: &str,
    now: DateTime<Utc>,
) -> Result<BroadcastReport, SchedulerError>
where
    T: Transport + Send + Sync + 'static,
    S: RelayStore,
{
    let item = post_item(post_link)?;
    prepare_pool(engine, now).await?;
    let destinations = engine
        .store()
        .list_destinations()
        .await
        .map_err(SchedulerError::enumerate("destinations"))?;

    let mut report = BroadcastReport::default();
    for destination in &destinations {
        match engine.deliver(&item, destination, now).await {
            Ok(DeliveryOutcome::Delivered { .. }) => report.delivered += 1,
            Ok(DeliveryOutcome::Exhausted { .. }) => report.failed.push(destination.link.clone()),
            Err(e) => {
                error!(destination = %destination.link, error = %e, "Delivery failed");
                report.failed.push(destination.link.clone());
            }
        }
    }

    info!(
        delivered = report.delivered,
        failed = report.failed.len(),
        "Broadcast finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use contracts::{MessageId, SendOutcome};
    use dispatcher::DispatchConfig;
    use identity_pool::IdentityPool;
    use memory_backend::{MemoryStore, MockTransport};

    const POST: &str = "https://t.me/promo/55";

    fn engine(identities: usize) -> (Arc<MockTransport>, Arc<MemoryStore>, DispatchEngine<MockTransport, MemoryStore>) {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        for i in 1..=identities {
            store.add_identity(&format!("+{i}"), "session");
        }
        let engine = DispatchEngine::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::new(IdentityPool::new()),
            DispatchConfig::default().with_pacing(Duration::ZERO),
        );
        (transport, store, engine)
    }

    fn settings(post: &str) -> RefreshSettings {
        RefreshSettings::for_post(post)
    }

    #[test]
    fn test_invalid_post_link() {
        assert!(matches!(
            post_item("https://t.me/promo"),
            Err(SchedulerError::InvalidPostLink(_))
        ));
        assert_eq!(post_item(POST).unwrap().source_ref, ContentRef::new("promo", 55));
    }

    #[tokio::test]
    async fn test_cycle_replaces_previous_copy() {
        let (transport, store, engine) = engine(1);
        transport.seed_message("chat", MessageId(7));
        store.add_destination(Destination {
            last_delivered_ref: Some(MessageId(7)),
            ..Destination::new("chat")
        });
        store.add_destination(Destination::new("fresh"));
        let refresh = RefreshScheduler::new(engine, &settings(POST)).unwrap();

        let report = refresh.cycle(Utc::now()).await.unwrap();
        assert_eq!(report.destinations, 2);
        assert_eq!(report.retracted, 1);
        assert_eq!(report.delivered, 2);
        assert!(!transport.is_live("chat", MessageId(7)));

        let current = store.destination("chat").unwrap().last_delivered_ref.unwrap();
        assert!(transport.is_live("chat", current));

        // next cycle removes what this cycle sent
        refresh.cycle(Utc::now()).await.unwrap();
        assert!(!transport.is_live("chat", current));
        assert_eq!(transport.delivered().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_send_after_retract_clears_ref() {
        let (transport, store, engine) = engine(1);
        transport.seed_message("chat", MessageId(7));
        store.add_destination(Destination {
            last_delivered_ref: Some(MessageId(7)),
            ..Destination::new("chat")
        });
        transport.script("+1", [SendOutcome::UnknownError("CHAT_WRITE_FORBIDDEN".into())]);
        let refresh = RefreshScheduler::new(engine, &settings(POST)).unwrap();

        let report = refresh.cycle(Utc::now()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(store.destination("chat").unwrap().last_delivered_ref, None);
    }

    #[tokio::test]
    async fn test_broadcast_once() {
        let (transport, store, engine) = engine(2);
        store.add_destination(Destination::new("a"));
        store.add_destination(Destination::new("b"));
        transport.script("+1", [SendOutcome::FatalIdentityError]);

        let report = broadcast_once(&engine, POST, Utc::now()).await.unwrap();
        assert_eq!(report.delivered, 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.total(), 2);
        assert_eq!(transport.attempts_by("+1"), 1);
        assert_eq!(transport.attempts_by("+2"), 2);
    }

    #[tokio::test]
    async fn test_broadcast_rejects_bad_link() {
        let (_, _, engine) = engine(1);
        let err = broadcast_once(&engine, "not a link", Utc::now()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidPostLink(_)));
    }
}
