//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到运行时的契约测试
//! - 内存后端上的端到端场景（故障转移、禁用、批量抽样、实时去重）
//! - 注册状态机与身份池的衔接

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{RateLimitPolicy, SendMode};

    const CONFIG: &str = r#"
[dispatch]
pacing_ms = 0

[refresh]
post = "https://t.me/promo/12"

[[identities]]
handle = "+10000000001"
credential = "session-a"

[[sources]]
feed = "https://t.me/news_channel"
items = [{ id = 1, marker = true }]

[[destinations]]
link = "@target_chat"
interval_minutes = 60
batch_size = 2
send_mode = "copy"
"#;

    #[test]
    fn test_config_seeds_memory_backend() {
        let blueprint = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        assert_eq!(
            blueprint.refresh.as_ref().unwrap().rate_limit,
            RateLimitPolicy::SleepInline
        );
        assert_eq!(blueprint.relay.rate_limit, RateLimitPolicy::Defer);

        let (store, _transport) = memory_backend::from_blueprint(&blueprint);
        let destination = store.destination("target_chat").unwrap();
        assert_eq!(destination.batch_size, 2);
        assert_eq!(destination.send_mode, SendMode::Copy);
        assert_eq!(store.identity_count(), 1);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeDelta, Utc};
    use contracts::{
        ContentItem, ContentRef, CredentialStore, DeliveryStatus, Destination, IdentityId,
        IdentityStatus, MessageId, SendOutcome,
    };
    use dispatcher::{DeliveryOutcome, DispatchConfig, DispatchEngine};
    use identity_pool::{EnrollmentState, EnrollmentTable, IdentityPool, Verification};
    use ledger::Admission;
    use memory_backend::{MemoryStore, MockTransport};
    use scheduler::{BatchScheduler, EventReport, LiveRelay};

    type Engine = DispatchEngine<MockTransport, MemoryStore>;

    struct World {
        transport: Arc<MockTransport>,
        store: Arc<MemoryStore>,
        pool: Arc<IdentityPool>,
        engine: Engine,
    }

    async fn world(identities: &[&str]) -> World {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        for handle in identities {
            store.add_identity(handle, "session");
        }
        let pool = Arc::new(IdentityPool::from_records(
            store.list_active_identities().await.unwrap(),
        ));
        let engine = DispatchEngine::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::clone(&pool),
            DispatchConfig::default().with_pacing(Duration::ZERO),
        );
        World {
            transport,
            store,
            pool,
            engine,
        }
    }

    fn item(feed: &str, id: i64) -> ContentItem {
        ContentItem::new(ContentRef::new(feed, id))
    }

    /// I1 rate limited for 30s, I2 delivers
    #[tokio::test]
    async fn test_scenario_rate_limited_failover() {
        let w = world(&["I1", "I2"]).await;
        w.transport
            .script("I1", [SendOutcome::RateLimited { wait_secs: 30 }]);
        let destination = Destination::new("chat");
        w.store.add_destination(destination.clone());
        let now = Utc::now();

        let outcome = w
            .engine
            .deliver(&item("news", 1), &destination, now)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            DeliveryOutcome::Delivered {
                identity: IdentityId(2),
                ..
            }
        ));
        let i1 = w.pool.get(IdentityId(1)).unwrap();
        assert_eq!(i1.status, IdentityStatus::RateLimited);
        let until = i1.cooldown_until.unwrap();
        assert!(until >= now + TimeDelta::seconds(30));

        let delivered = w.transport.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].handle, "I2");
        assert_eq!(delivered[0].destination, "chat");

        let successes = w.store.successes();
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].identity, Some(IdentityId(2)));

        // revived exactly at the end of the cooldown, not before
        assert!(w
            .pool
            .revive_eligible(until - TimeDelta::seconds(1))
            .is_empty());
        assert_eq!(w.pool.revive_eligible(until), vec![IdentityId(1)]);
    }

    /// Only identity is fatal: disabled, delivery fails, no success recorded
    #[tokio::test]
    async fn test_scenario_fatal_identity() {
        let w = world(&["I1"]).await;
        w.transport
            .script_errors("I1", ["[401 USER_DEACTIVATED] The user has been deleted"]);
        let destination = Destination::new("chat");

        let outcome = w
            .engine
            .deliver(&item("news", 1), &destination, Utc::now())
            .await
            .unwrap();

        assert!(!outcome.is_delivered());
        assert_eq!(w.pool.status(IdentityId(1)), Some(IdentityStatus::Disabled));
        assert_eq!(w.store.identity_status("I1"), Some(IdentityStatus::Disabled));
        assert!(w.store.successes().is_empty());
        assert_eq!(w.store.history()[0].outcome, DeliveryStatus::Failure);

        // disabled is terminal
        assert!(!w.pool.mark_active(IdentityId(1)));
        assert!(w
            .pool
            .revive_eligible(Utc::now() + TimeDelta::days(365))
            .is_empty());
    }

    /// Three due destinations, batch of two, pool of five
    #[tokio::test]
    async fn test_scenario_batch_tick() {
        let w = world(&["I1", "I2"]).await;
        w.store.add_source("promo");
        w.transport.add_items(
            "promo",
            (1..=5).map(|id| item("promo", id).with_marker(true)),
        );
        let now = Utc::now();
        for link in ["a", "b", "c"] {
            w.store.add_destination(Destination {
                interval_minutes: 60,
                last_sent_at: Some(now - TimeDelta::minutes(60)),
                batch_size: 2,
                ..Destination::new(link)
            });
        }
        // 59 minutes ago: not due yet
        w.store.add_destination(Destination {
            interval_minutes: 60,
            last_sent_at: Some(now - TimeDelta::minutes(59)),
            batch_size: 2,
            ..Destination::new("d")
        });

        let mut batch = BatchScheduler::new(w.engine.clone(), Default::default()).with_seed(11);
        let report = batch.tick(now).await.unwrap();
        assert_eq!(report.eligible, 3);
        assert_eq!(report.pool_size, 5);
        assert_eq!(report.delivered, 6);

        let delivered = w.transport.delivered();
        for link in ["a", "b", "c"] {
            let items: HashSet<_> = delivered
                .iter()
                .filter(|m| m.destination == link)
                .map(|m| m.content.clone())
                .collect();
            assert_eq!(items.len(), 2, "destination {link}");
            assert_eq!(w.store.destination(link).unwrap().last_sent_at, Some(now));
        }
        assert!(delivered.iter().all(|m| m.destination != "d"));
        assert_eq!(
            w.store.destination("d").unwrap().last_sent_at,
            Some(now - TimeDelta::minutes(59))
        );
    }

    /// Two identities observe the same post; one delivery, one history success
    #[tokio::test]
    async fn test_relay_idempotence() {
        let w = world(&["I1", "I2"]).await;
        w.store.add_source("news");
        w.store.add_destination(Destination::new("chat"));
        let relay = Arc::new(LiveRelay::new(w.engine.clone(), &Default::default()));
        let listeners = relay.register_sources().await.unwrap();
        assert_eq!(listeners.len(), 2);

        let post = item("news", 42);
        let first_seen = listeners[0].event(post.clone());
        let second_seen = listeners[1].event(post.clone());
        let (first, second) = tokio::join!(
            relay.handle_event(&first_seen, Utc::now()),
            relay.handle_event(&second_seen, Utc::now()),
        );
        let reports = [first.unwrap(), second.unwrap()];

        assert_eq!(
            reports
                .iter()
                .filter(|r| matches!(r, EventReport::Dispatched { delivered: 1, .. }))
                .count(),
            1
        );
        assert!(reports
            .iter()
            .any(|r| *r == EventReport::Suppressed(Admission::DuplicateRecent)));
        assert_eq!(w.transport.delivered().len(), 1);
        assert_eq!(w.store.successes().len(), 1);
    }

    /// Rate-limited identity is skipped until revived, then used again
    #[tokio::test]
    async fn test_relay_revives_cooled_down_identity() {
        let w = world(&["I1"]).await;
        w.store.add_source("news");
        w.store.add_destination(Destination::new("chat"));
        let relay = LiveRelay::new(w.engine.clone(), &Default::default());
        let listener = relay.register_sources().await.unwrap().remove(0);

        let now = Utc::now();
        w.pool
            .mark_rate_limited(IdentityId(1), now + TimeDelta::seconds(30));

        let report = relay
            .handle_event(&listener.event(item("news", 1)), now)
            .await
            .unwrap();
        assert!(matches!(
            report,
            EventReport::Dispatched { exhausted: 1, .. }
        ));

        let report = relay
            .handle_event(
                &listener.event(item("news", 2)),
                now + TimeDelta::seconds(31),
            )
            .await
            .unwrap();
        assert!(matches!(
            report,
            EventReport::Dispatched { delivered: 1, .. }
        ));
        assert_eq!(w.store.identity_status("I1"), Some(IdentityStatus::Active));
    }

    /// Paced fan-out: a late rate limit still cools the identity for the full wait
    #[tokio::test]
    async fn test_relay_paced_rate_limit_is_not_revived_early() {
        let w = world(&["I1"]).await;
        let engine = w
            .engine
            .with_config(DispatchConfig::default().with_pacing(Duration::from_millis(700)));
        w.store.add_source("news");
        for link in ["a", "b", "c"] {
            w.store.add_destination(Destination::new(link));
        }
        w.transport.script(
            "I1",
            [
                SendOutcome::Success(MessageId(1)),
                SendOutcome::Success(MessageId(2)),
                SendOutcome::RateLimited { wait_secs: 1 },
            ],
        );
        let relay = LiveRelay::new(engine, &Default::default());
        let listener = relay.register_sources().await.unwrap().remove(0);

        let report = relay
            .handle_event(&listener.event(item("news", 1)), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            report,
            EventReport::Dispatched {
                delivered: 2,
                exhausted: 1,
                failed: 0
            }
        );

        let after = Utc::now();
        assert!(w.pool.get(IdentityId(1)).unwrap().cooldown_until.unwrap() > after);
        assert!(w.pool.revive_eligible(after).is_empty());

        // the next event must not bring I1 back yet
        relay
            .handle_event(&listener.event(item("news", 2)), after)
            .await
            .unwrap();
        assert_eq!(w.pool.status(IdentityId(1)), Some(IdentityStatus::RateLimited));
    }

    /// Enrollment handshake feeds the credential store, the pool picks it up
    #[tokio::test]
    async fn test_enrollment_to_delivery() {
        let w = world(&[]).await;
        w.store.add_destination(Destination::new("chat"));
        let table = EnrollmentTable::new();

        table.begin(7).unwrap();
        table.submit_phone(7, "+15550001").unwrap();
        let state = table
            .submit_code(7, Verification::PasswordRequired)
            .unwrap();
        assert!(matches!(state, EnrollmentState::AwaitingPassword { .. }));
        table.submit_password(7, Verification::Accepted).unwrap();
        table
            .register(7, "new-session", w.store.as_ref())
            .await
            .unwrap();
        assert_eq!(table.in_progress(), 0);

        let report = scheduler::broadcast_once(&w.engine, "https://t.me/promo/3", Utc::now())
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(w.pool.len(), 1);
        assert_eq!(w.transport.delivered()[0].handle, "+15550001");
    }
}
