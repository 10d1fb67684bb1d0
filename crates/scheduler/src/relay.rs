//! Continuous relay mode
//!
//! Every event observed on a registered source is delivered once to every
//! destination. Events run concurrently, bounded by a semaphore; the dedup
//! guard makes sure concurrent observers of the same post deliver it once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    ContentItem, DestinationStore, RelayStore, RelaySettings, SourceStore, Transport,
};
use dispatcher::{DeliveryOutcome, DispatchEngine};
use ledger::{Admission, DedupGuard};

use crate::eligibility::{prepare_pool, revive};
use crate::listener::{FeedListener, ListenerRegistry, SourceEvent};
use crate::{SchedulerError, ShutdownSignal};

/// What happened to one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReport {
    /// Listener not registered, or item from another feed
    Ignored,
    /// Dropped by the dedup guard
    Suppressed(Admission),
    Dispatched {
        delivered: usize,
        exhausted: usize,
        failed: usize,
    },
}

/// Totals of one relay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub events: u64,
    pub ignored: u64,
    pub suppressed: u64,
    pub delivered: u64,
    pub exhausted: u64,
    pub failed: u64,
    pub errors: u64,
}

impl RelayStats {
    fn absorb(&mut self, report: Result<EventReport, SchedulerError>) {
        self.events += 1;
        match report {
            Ok(EventReport::Ignored) => self.ignored += 1,
            Ok(EventReport::Suppressed(_)) => self.suppressed += 1,
            Ok(EventReport::Dispatched {
                delivered,
                exhausted,
                failed,
            }) => {
                self.delivered += delivered as u64;
                self.exhausted += exhausted as u64;
                self.failed += failed as u64;
            }
            Err(_) => self.errors += 1,
        }
    }
}

pub struct LiveRelay<T, S> {
    engine: DispatchEngine<T, S>,
    guard: DedupGuard,
    registry: ListenerRegistry,
    permits: Arc<Semaphore>,
}

impl<T, S> LiveRelay<T, S>
where
    T: Transport + Send + Sync + 'static,
    S: RelayStore,
{
    pub fn new(engine: DispatchEngine<T, S>, settings: &RelaySettings) -> Self {
        Self {
            engine,
            guard: DedupGuard::new(settings.recent_capacity),
            registry: ListenerRegistry::new(),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_events.max(1))),
        }
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &DispatchEngine<T, S> {
        &self.engine
    }

    /// Pair every source with every active identity
    ///
    /// Returns the listeners created, in (source, identity priority) order.
    #[instrument(name = "relay_register_sources", skip(self))]
    pub async fn register_sources(&self) -> Result<Vec<FeedListener>, SchedulerError> {
        prepare_pool(&self.engine, Utc::now()).await?;
        let sources = self
            .engine
            .store()
            .list_sources()
            .await
            .map_err(SchedulerError::enumerate("sources"))?;

        let identities: Vec<_> = self
            .engine
            .pool()
            .list()
            .into_iter()
            .filter(|i| i.is_active())
            .collect();

        let mut listeners = Vec::with_capacity(sources.len() * identities.len());
        for feed in sources {
            for identity in &identities {
                listeners.push(
                    self.registry
                        .register_source_listener(feed.clone(), identity),
                );
            }
        }

        info!(
            listeners = listeners.len(),
            feeds = self.registry.feed_count(),
            "Source listeners registered"
        );
        Ok(listeners)
    }

    /// Handle one observed item
    #[instrument(
        name = "relay_handle_event",
        skip_all,
        fields(feed = %event.listener.feed(), observer = %event.listener.identity(), content = %event.item.source_ref)
    )]
    pub async fn handle_event(
        &self,
        event: &SourceEvent,
        now: DateTime<Utc>,
    ) -> Result<EventReport, SchedulerError> {
        let SourceEvent { listener, item } = event;
        if item.source_ref.feed != *listener.feed() || !self.registry.is_registered(listener) {
            debug!("Event from unregistered listener ignored");
            return Ok(EventReport::Ignored);
        }
        observability::record_event_received(listener.feed());

        revive(&self.engine, now).await;

        let admission = self
            .guard
            .admit(&item.source_ref, self.engine.store().as_ref())
            .await
            .map_err(SchedulerError::enumerate("history"))?;
        match admission {
            Admission::Admitted => {}
            Admission::DuplicateRecent => {
                observability::record_dedup_suppressed("recent");
                return Ok(EventReport::Suppressed(admission));
            }
            Admission::AlreadyDelivered => {
                observability::record_dedup_suppressed("history");
                return Ok(EventReport::Suppressed(admission));
            }
        }

        info!(observer = %listener.handle(), "New post detected");
        let destinations = self
            .engine
            .store()
            .list_destinations()
            .await
            .map_err(SchedulerError::enumerate("destinations"))?;

        Ok(self.fan_out(item, &destinations, now).await)
    }

    async fn fan_out(
        &self,
        item: &ContentItem,
        destinations: &[contracts::Destination],
        now: DateTime<Utc>,
    ) -> EventReport {
        let (mut delivered, mut exhausted, mut failed) = (0, 0, 0);
        for destination in destinations {
            match self.engine.deliver(item, destination, now).await {
                Ok(DeliveryOutcome::Delivered { .. }) => delivered += 1,
                Ok(DeliveryOutcome::Exhausted { .. }) => exhausted += 1,
                Err(e) => {
                    error!(destination = %destination.link, error = %e, "Delivery failed");
                    failed += 1;
                }
            }
        }
        EventReport::Dispatched {
            delivered,
            exhausted,
            failed,
        }
    }

    /// Consume events until the channel closes or shutdown is signaled
    ///
    /// In-flight events are awaited before returning.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<SourceEvent>,
        mut shutdown: ShutdownSignal,
    ) -> RelayStats {
        info!(listeners = self.registry.len(), "Live relay started");
        let mut stats = RelayStats::default();
        let mut in_flight = JoinSet::new();

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = shutdown.wait() => None,
            };
            let Some(event) = event else {
                break;
            };

            // a full semaphore must not hide a shutdown
            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.wait() => {
                    stats.events += 1;
                    stats.ignored += 1;
                    debug!("Shutdown while waiting for a relay slot, event dropped");
                    break;
                }
            };
            let relay = Arc::clone(&self);
            in_flight.spawn(async move {
                let report = relay.handle_event(&event, Utc::now()).await;
                drop(permit);
                report
            });

            while let Some(done) = in_flight.try_join_next() {
                Self::collect(&mut stats, done);
            }
        }

        while let Some(done) = in_flight.join_next().await {
            Self::collect(&mut stats, done);
        }

        info!(?stats, "Live relay stopped");
        stats
    }

    fn collect(
        stats: &mut RelayStats,
        done: Result<Result<EventReport, SchedulerError>, tokio::task::JoinError>,
    ) {
        match done {
            Ok(report) => {
                if let Err(e) = &report {
                    error!(error = %e, "Event handling failed");
                }
                stats.absorb(report);
            }
            Err(e) => {
                warn!(error = %e, "Event task panicked");
                stats.errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use contracts::{ContentRef, Destination};
    use dispatcher::DispatchConfig;
    use identity_pool::IdentityPool;
    use memory_backend::{MemoryStore, MockTransport, MockTransportConfig};

    use crate::shutdown_channel;

    struct Harness {
        transport: Arc<MockTransport>,
        store: Arc<MemoryStore>,
        relay: Arc<LiveRelay<MockTransport, MemoryStore>>,
    }

    fn harness(identities: usize, destinations: &[&str]) -> Harness {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        for i in 1..=identities {
            store.add_identity(&format!("+{i}"), "session");
        }
        for link in destinations {
            store.add_destination(Destination::new(*link));
        }
        store.add_source("news");

        let engine = DispatchEngine::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::new(IdentityPool::new()),
            DispatchConfig::default().with_pacing(Duration::ZERO),
        );
        let relay = Arc::new(LiveRelay::new(engine, &RelaySettings::default()));
        Harness {
            transport,
            store,
            relay,
        }
    }

    fn item(id: i64) -> ContentItem {
        ContentItem::new(ContentRef::new("news", id))
    }

    #[tokio::test]
    async fn test_register_pairs_every_identity() {
        let h = harness(3, &["chat"]);
        let listeners = h.relay.register_sources().await.unwrap();
        assert_eq!(listeners.len(), 3);
        assert!(listeners.iter().all(|l| l.feed() == "news"));
        assert_eq!(h.relay.engine().pool().len(), 3);
    }

    #[tokio::test]
    async fn test_same_post_from_two_listeners_delivered_once() {
        let h = harness(2, &["chat_a", "chat_b"]);
        let listeners = h.relay.register_sources().await.unwrap();
        let now = Utc::now();

        let first = h
            .relay
            .handle_event(&listeners[0].event(item(7)), now)
            .await
            .unwrap();
        let second = h
            .relay
            .handle_event(&listeners[1].event(item(7)), now)
            .await
            .unwrap();

        assert_eq!(
            first,
            EventReport::Dispatched {
                delivered: 2,
                exhausted: 0,
                failed: 0
            }
        );
        assert_eq!(second, EventReport::Suppressed(Admission::DuplicateRecent));
        assert_eq!(h.transport.delivered().len(), 2);
        assert_eq!(h.store.successes().len(), 2);
    }

    #[tokio::test]
    async fn test_history_suppresses_after_restart() {
        let h = harness(1, &["chat"]);
        let listeners = h.relay.register_sources().await.unwrap();
        h.relay
            .handle_event(&listeners[0].event(item(1)), Utc::now())
            .await
            .unwrap();

        // fresh relay, same store: the recent set is empty but history is not
        let engine = h.relay.engine().clone();
        let restarted = LiveRelay::new(engine, &RelaySettings::default());
        let listeners = restarted.register_sources().await.unwrap();
        let report = restarted
            .handle_event(&listeners[0].event(item(1)), Utc::now())
            .await
            .unwrap();
        assert_eq!(report, EventReport::Suppressed(Admission::AlreadyDelivered));
        assert_eq!(h.transport.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_listener_ignored() {
        let h = harness(1, &["chat"]);
        h.relay.register_sources().await.unwrap();

        let stranger = ListenerRegistry::new();
        let pool = h.relay.engine().pool();
        let identity = pool.list().remove(0);
        let foreign = stranger.register_source_listener("other".into(), &identity);
        let report = h
            .relay
            .handle_event(&foreign.event(ContentItem::new(ContentRef::new("other", 1))), Utc::now())
            .await
            .unwrap();
        assert_eq!(report, EventReport::Ignored);

        // item from a different feed than the listener observes
        let listener = h.relay.registry().listeners_for("news").remove(0);
        let mismatched = listener.event(ContentItem::new(ContentRef::new("other", 2)));
        let report = h.relay.handle_event(&mismatched, Utc::now()).await.unwrap();
        assert_eq!(report, EventReport::Ignored);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_concurrent_duplicates() {
        let h = harness(2, &["chat"]);
        let listeners = h.relay.register_sources().await.unwrap();
        let (tx, rx) = mpsc::channel(16);
        let (_trigger, signal) = shutdown_channel();

        for listener in &listeners {
            for id in 1..=3 {
                tx.send(listener.event(item(id))).await.unwrap();
            }
        }
        drop(tx);

        let stats = Arc::clone(&h.relay).run(rx, signal).await;
        assert_eq!(stats.events, 6);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.suppressed, 3);
        assert_eq!(h.transport.delivered().len(), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness(1, &["chat"]);
        h.relay.register_sources().await.unwrap();
        let (_tx, rx) = mpsc::channel(4);
        let (trigger, signal) = shutdown_channel();

        let task = tokio::spawn(Arc::clone(&h.relay).run(rx, signal));
        trigger.trigger();
        let stats = task.await.unwrap();
        assert_eq!(stats, RelayStats::default());
    }

    #[tokio::test]
    async fn test_shutdown_seen_while_waiting_for_slot() {
        let transport = Arc::new(MockTransport::with_config(MockTransportConfig {
            send_latency: Some(Duration::from_millis(300)),
            ..Default::default()
        }));
        let store = Arc::new(MemoryStore::new());
        store.add_identity("+1", "session");
        store.add_destination(Destination::new("chat"));
        store.add_source("news");
        let engine = DispatchEngine::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::new(IdentityPool::new()),
            DispatchConfig::default().with_pacing(Duration::ZERO),
        );
        let settings = RelaySettings {
            max_concurrent_events: 1,
            ..RelaySettings::default()
        };
        let relay = Arc::new(LiveRelay::new(engine, &settings));
        let listener = relay.register_sources().await.unwrap().remove(0);

        let (tx, rx) = mpsc::channel(8);
        for id in 1..=3 {
            tx.send(listener.event(item(id))).await.unwrap();
        }
        let (trigger, signal) = shutdown_channel();
        let task = tokio::spawn(Arc::clone(&relay).run(rx, signal));
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
        let stats = task.await.unwrap();

        // only the event holding the slot finished; the waiting one was dropped
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.ignored, 1);
        assert_eq!(transport.sent().len(), 1);
        drop(tx);
    }
}
