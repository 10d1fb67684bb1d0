//! Dispatch Engine - deliver one item to one destination with identity failover

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    ContentItem, CredentialStore, Destination, DispatchSettings, HistoryRecord, HistoryStore,
    Identity, IdentityId, IdentityStatus, MessageId, RateLimitPolicy, Transport,
};
use identity_pool::{Classifier, IdentityPool, PolicyAction};

use crate::error::DispatchError;
use crate::metrics::DispatchMetrics;

/// Dispatch engine configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Fixed delay after every successful send
    pub pacing: Duration,
    /// Join the destination before sending (failure ignored)
    pub join_before_send: bool,
    /// Outcome → action policy for this operating mode
    pub classifier: Classifier,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from_settings(&DispatchSettings::default(), RateLimitPolicy::Defer)
    }
}

impl DispatchConfig {
    /// Build from the `[dispatch]` section plus the mode's rate-limit policy
    pub fn from_settings(settings: &DispatchSettings, rate_limit: RateLimitPolicy) -> Self {
        Self {
            pacing: Duration::from_millis(settings.pacing_ms),
            join_before_send: settings.join_before_send,
            classifier: Classifier::new(
                rate_limit,
                settings.cooldown,
                Duration::from_secs(settings.fixed_cooldown_secs),
            ),
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }
}

/// Final result of one `deliver` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        identity: IdentityId,
        message: MessageId,
        attempts: u32,
    },
    /// Every active identity was tried (or none was active)
    Exhausted { attempts: u32 },
}

impl DeliveryOutcome {
    #[inline]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts, .. } | Self::Exhausted { attempts } => *attempts,
        }
    }

    pub fn message(&self) -> Option<MessageId> {
        match self {
            Self::Delivered { message, .. } => Some(*message),
            Self::Exhausted { .. } => None,
        }
    }
}

/// Walks the identity pool in priority order until one identity delivers
///
/// Cloning is cheap; clones share transport, store, pool and counters.
pub struct DispatchEngine<T, S> {
    transport: Arc<T>,
    store: Arc<S>,
    pool: Arc<IdentityPool>,
    config: DispatchConfig,
    metrics: Arc<DispatchMetrics>,
}

impl<T, S> Clone for DispatchEngine<T, S> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            store: Arc::clone(&self.store),
            pool: Arc::clone(&self.pool),
            config: self.config.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<T, S> DispatchEngine<T, S>
where
    T: Transport + Send + Sync + 'static,
    S: CredentialStore + HistoryStore + Send + Sync + 'static,
{
    pub fn new(
        transport: Arc<T>,
        store: Arc<S>,
        pool: Arc<IdentityPool>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            transport,
            store,
            pool,
            config,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Same collaborators and counters, different mode policy
    pub fn with_config(&self, config: DispatchConfig) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    pub fn pool(&self) -> &Arc<IdentityPool> {
        &self.pool
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Deliver `content` to `destination`
    ///
    /// Stops at the first success. Rate limits, fatal identity errors and
    /// unknown errors move on to the next identity. When no identity succeeds
    /// a Failure record is written and `Exhausted` returned.
    ///
    /// `now` is a lower bound for the attempt clock. Cooldowns are computed
    /// from the moment each send returns, since pacing after earlier
    /// successes can leave `now` well behind the wall clock.
    ///
    /// # Errors
    /// Only when the history store rejects a record.
    #[instrument(
        name = "dispatch_deliver",
        skip_all,
        fields(content = %content.source_ref, destination = %destination.link)
    )]
    pub async fn deliver(
        &self,
        content: &ContentItem,
        destination: &Destination,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome, DispatchError> {
        let mut attempts: u32 = 0;

        for identity in self.pool.list() {
            // status may have changed since the snapshot
            if !self.pool.is_active(identity.id) {
                continue;
            }
            attempts += 1;
            self.metrics.inc_attempts();

            if self.config.join_before_send
                && !self.transport.join_destination(&identity, destination).await
            {
                debug!(identity = %identity.id, "Join failed, sending anyway");
            }

            let outcome = self
                .transport
                .send(&identity, destination, content, destination.send_mode)
                .await;
            observability::record_send_outcome(&outcome);

            let attempted_at = now.max(Utc::now());
            let action = self.config.classifier.classify(&outcome, attempted_at);
            if let PolicyAction::Delivered(message) = action {
                return self
                    .on_delivered(content, destination, &identity, message, attempts)
                    .await;
            }

            match &action {
                PolicyAction::Cooldown { .. } | PolicyAction::Backoff { .. } => {
                    self.metrics.inc_rate_limited()
                }
                PolicyAction::Disable => self.metrics.inc_disabled(),
                PolicyAction::Skip { .. } => self.metrics.inc_unknown_errors(),
                PolicyAction::Delivered(_) => {}
            }

            if let Some(status) = self.config.classifier.apply(&self.pool, identity.id, &action) {
                self.persist_status(&identity, status).await;
            }

            if let PolicyAction::Backoff { wait } = action {
                tokio::time::sleep(wait).await;
            }
        }

        self.on_exhausted(content, destination, attempts).await
    }

    /// Best-effort removal of a delivered message
    ///
    /// Tries active identities in order until one succeeds.
    #[instrument(
        name = "dispatch_retract",
        skip_all,
        fields(destination = %destination.link, message_id = %message)
    )]
    pub async fn retract(&self, destination: &Destination, message: MessageId) -> bool {
        for identity in self.pool.list().into_iter().filter(|i| i.is_active()) {
            if self.transport.retract(&identity, destination, message).await {
                debug!(identity = %identity.id, "Previous message retracted");
                return true;
            }
        }
        warn!("Could not retract previous message");
        false
    }

    async fn on_delivered(
        &self,
        content: &ContentItem,
        destination: &Destination,
        identity: &Identity,
        message: MessageId,
        attempts: u32,
    ) -> Result<DeliveryOutcome, DispatchError> {
        let record = HistoryRecord::success(
            content.source_ref.clone(),
            identity.id,
            destination.link.clone(),
            Utc::now(),
        );
        self.store
            .record(record)
            .await
            .map_err(|e| DispatchError::history(&content.source_ref, &destination.link, e))?;

        self.metrics.inc_delivered();
        observability::record_delivery(&destination.link, true, attempts);
        info!(
            identity = %identity.id,
            handle = %identity.handle,
            message_id = %message,
            attempts,
            "Delivered"
        );

        if !self.config.pacing.is_zero() {
            tokio::time::sleep(self.config.pacing).await;
        }

        Ok(DeliveryOutcome::Delivered {
            identity: identity.id,
            message,
            attempts,
        })
    }

    async fn on_exhausted(
        &self,
        content: &ContentItem,
        destination: &Destination,
        attempts: u32,
    ) -> Result<DeliveryOutcome, DispatchError> {
        self.metrics.inc_exhausted();
        observability::record_delivery(&destination.link, false, attempts);
        error!(
            attempts,
            active = self.pool.active_count(),
            "No identity could deliver"
        );

        let record =
            HistoryRecord::exhausted(content.source_ref.clone(), destination.link.clone(), Utc::now());
        self.store
            .record(record)
            .await
            .map_err(|e| DispatchError::history(&content.source_ref, &destination.link, e))?;

        Ok(DeliveryOutcome::Exhausted { attempts })
    }

    async fn persist_status(&self, identity: &Identity, status: IdentityStatus) {
        observability::record_identity_transition(status);
        if let Err(e) = self.store.set_status(&identity.handle, status).await {
            warn!(
                identity = %identity.id,
                status = %status,
                error = %e,
                "Failed to persist identity status"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use contracts::{ContentRef, DeliveryStatus, SendMode, SendOutcome};
    use memory_backend::{MemoryStore, MockTransport, MockTransportConfig, StoreFailures};

    struct Harness {
        transport: Arc<MockTransport>,
        store: Arc<MemoryStore>,
        pool: Arc<IdentityPool>,
        engine: DispatchEngine<MockTransport, MemoryStore>,
    }

    async fn harness(identities: usize, config: DispatchConfig) -> Harness {
        harness_with_transport(identities, config, MockTransport::new()).await
    }

    async fn harness_with_transport(
        identities: usize,
        config: DispatchConfig,
        transport: MockTransport,
    ) -> Harness {
        let transport = Arc::new(transport);
        let store = Arc::new(MemoryStore::new());
        for i in 1..=identities {
            store.add_identity(&format!("+{i}"), "session");
        }
        store.add_destination(Destination::new("chat"));
        let pool = Arc::new(IdentityPool::from_records(
            store.list_active_identities().await.unwrap(),
        ));
        let engine = DispatchEngine::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::clone(&pool),
            config,
        );
        Harness {
            transport,
            store,
            pool,
            engine,
        }
    }

    fn fast_config() -> DispatchConfig {
        DispatchConfig::default().with_pacing(Duration::ZERO)
    }

    fn item(id: i64) -> ContentItem {
        ContentItem::new(ContentRef::new("news", id))
    }

    #[tokio::test]
    async fn test_rate_limited_identity_fails_over() {
        let h = harness(3, fast_config()).await;
        h.transport
            .script("+1", [SendOutcome::RateLimited { wait_secs: 60 }]);
        let now = Utc::now();

        let outcome = h
            .engine
            .deliver(&item(1), &Destination::new("chat"), now)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            DeliveryOutcome::Delivered {
                identity: IdentityId(2),
                attempts: 2,
                ..
            }
        ));
        let first = h.pool.get(IdentityId(1)).unwrap();
        assert_eq!(first.status, IdentityStatus::RateLimited);
        let until = first.cooldown_until.unwrap();
        assert!(until >= now + TimeDelta::seconds(60));
        assert!(until <= Utc::now() + TimeDelta::seconds(60));
        assert_eq!(h.transport.attempts_by("+3"), 0);
        assert_eq!(h.store.identity_status("+1"), Some(IdentityStatus::RateLimited));

        let history = h.store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, DeliveryStatus::Success);
        assert_eq!(history[0].identity, Some(IdentityId(2)));
    }

    #[tokio::test]
    async fn test_cooldown_counts_from_attempt_not_from_stale_now() {
        let h = harness(1, DispatchConfig::default().with_pacing(Duration::from_millis(700))).await;
        h.transport.script(
            "+1",
            [
                SendOutcome::Success(MessageId(1)),
                SendOutcome::Success(MessageId(2)),
                SendOutcome::RateLimited { wait_secs: 1 },
            ],
        );
        // one timestamp reused for a whole fan-out, as the relay does
        let now = Utc::now();
        for id in 1..=3 {
            h.engine
                .deliver(&item(id), &Destination::new("chat"), now)
                .await
                .unwrap();
        }

        let until = h.pool.get(IdentityId(1)).unwrap().cooldown_until.unwrap();
        let after = Utc::now();
        assert!(until > after, "cooldown {until} already over at {after}");
        assert!(h.pool.revive_eligible(after).is_empty());
        assert_eq!(h.pool.status(IdentityId(1)), Some(IdentityStatus::RateLimited));
    }

    #[tokio::test]
    async fn test_all_fatal_disables_everyone() {
        let h = harness(3, fast_config()).await;
        for handle in ["+1", "+2", "+3"] {
            h.transport.script(handle, [SendOutcome::FatalIdentityError]);
        }

        let outcome = h
            .engine
            .deliver(&item(1), &Destination::new("chat"), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Exhausted { attempts: 3 });
        assert_eq!(h.pool.active_count(), 0);
        for handle in ["+1", "+2", "+3"] {
            assert_eq!(h.store.identity_status(handle), Some(IdentityStatus::Disabled));
        }
        let history = h.store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, DeliveryStatus::Failure);
        assert_eq!(history[0].identity, None);
        assert_eq!(h.engine.metrics().disabled(), 3);
        assert_eq!(h.engine.metrics().exhausted(), 1);
    }

    #[tokio::test]
    async fn test_first_success_stops_failover() {
        let h = harness(3, fast_config()).await;

        let outcome = h
            .engine
            .deliver(&item(1), &Destination::new("chat"), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.attempts(), 1);
        assert_eq!(h.transport.attempts_by("+1"), 1);
        assert_eq!(h.transport.attempts_by("+2"), 0);
        assert_eq!(h.transport.attempts_by("+3"), 0);
    }

    #[tokio::test]
    async fn test_unknown_error_keeps_identity_active() {
        let h = harness(2, fast_config()).await;
        h.transport
            .script("+1", [SendOutcome::UnknownError("CHAT_WRITE_FORBIDDEN".into())]);

        let outcome = h
            .engine
            .deliver(&item(1), &Destination::new("chat"), Utc::now())
            .await
            .unwrap();

        assert!(outcome.is_delivered());
        assert!(h.pool.is_active(IdentityId(1)));
        assert_eq!(h.engine.metrics().unknown_errors(), 1);
    }

    #[tokio::test]
    async fn test_inactive_identities_are_skipped() {
        let h = harness(2, fast_config()).await;
        h.pool.mark_disabled(IdentityId(1));

        let outcome = h
            .engine
            .deliver(&item(1), &Destination::new("chat"), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.attempts(), 1);
        assert_eq!(h.transport.attempts_by("+1"), 0);
    }

    #[tokio::test]
    async fn test_empty_pool_is_exhausted() {
        let h = harness(0, fast_config()).await;
        let outcome = h
            .engine
            .deliver(&item(1), &Destination::new("chat"), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Exhausted { attempts: 0 });
        assert_eq!(h.store.history().len(), 1);
    }

    #[tokio::test]
    async fn test_sleep_inline_keeps_identity_active() {
        let config = DispatchConfig::from_settings(
            &DispatchSettings::default(),
            RateLimitPolicy::SleepInline,
        )
        .with_pacing(Duration::ZERO);
        let h = harness(2, config).await;
        h.transport
            .script("+1", [SendOutcome::RateLimited { wait_secs: 0 }]);

        let outcome = h
            .engine
            .deliver(&item(1), &Destination::new("chat"), Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            DeliveryOutcome::Delivered {
                identity: IdentityId(2),
                ..
            }
        ));
        assert!(h.pool.is_active(IdentityId(1)));
        assert_eq!(h.engine.metrics().rate_limited(), 1);
    }

    #[tokio::test]
    async fn test_history_failure_is_an_error() {
        let h = harness(1, fast_config()).await;
        h.store.set_failures(StoreFailures {
            history_write: true,
            ..Default::default()
        });

        let result = h
            .engine
            .deliver(&item(1), &Destination::new("chat"), Utc::now())
            .await;
        assert!(matches!(result, Err(DispatchError::History { .. })));
    }

    #[tokio::test]
    async fn test_status_persist_failure_is_tolerated() {
        let h = harness(2, fast_config()).await;
        h.store.set_failures(StoreFailures {
            set_status: true,
            ..Default::default()
        });
        h.transport.script("+1", [SendOutcome::FatalIdentityError]);

        let outcome = h
            .engine
            .deliver(&item(1), &Destination::new("chat"), Utc::now())
            .await
            .unwrap();
        assert!(outcome.is_delivered());
        assert_eq!(h.pool.status(IdentityId(1)), Some(IdentityStatus::Disabled));
    }

    #[tokio::test]
    async fn test_join_failure_does_not_block_send() {
        let transport = MockTransport::with_config(MockTransportConfig {
            fail_join: vec!["+1".into()],
            ..Default::default()
        });
        let h = harness_with_transport(1, fast_config(), transport).await;
        let dest = Destination {
            send_mode: SendMode::Copy,
            ..Destination::new("chat")
        };

        let outcome = h.engine.deliver(&item(1), &dest, Utc::now()).await.unwrap();

        assert!(outcome.is_delivered());
        assert_eq!(h.transport.joins().len(), 1);
        assert_eq!(h.transport.sent()[0].mode, SendMode::Copy);
    }

    #[tokio::test]
    async fn test_retract_uses_first_working_identity() {
        let transport = MockTransport::with_config(MockTransportConfig {
            fail_retract: vec!["+1".into()],
            ..Default::default()
        });
        let h = harness_with_transport(2, fast_config(), transport).await;
        h.transport.seed_message("chat", MessageId(5));

        assert!(h.engine.retract(&Destination::new("chat"), MessageId(5)).await);
        let retractions = h.transport.retractions();
        assert_eq!(retractions.len(), 2);
        assert_eq!(retractions[1].handle, "+2");
        assert!(!h.engine.retract(&Destination::new("chat"), MessageId(5)).await);
    }
}
