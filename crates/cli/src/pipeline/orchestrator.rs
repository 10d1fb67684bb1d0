//! Pipeline orchestrator - wires stores, transport, pool and engine, then
//! drives one scheduling mode until it finishes or shutdown is signaled.
//!
//! Collaborators come from the in-memory backend seeded by the blueprint, so
//! a run exercises the full engine without any external service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use contracts::{ContentItem, ContentRef, RateLimitPolicy, RelayBlueprint, RefreshSettings};
use dispatcher::{DispatchConfig, DispatchEngine};
use identity_pool::IdentityPool;
use memory_backend::{MemoryStore, MockTransport};
use scheduler::{
    broadcast_once, BatchScheduler, LiveRelay, RefreshScheduler, ShutdownSignal, SourceEvent,
};

use super::stats::aggregate;
use super::PipelineStats;
use crate::cli::RunMode;
use crate::error::CliError;

type Engine = DispatchEngine<MockTransport, MemoryStore>;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Relay configuration, CLI overrides already applied
    pub blueprint: RelayBlueprint,

    pub mode: RunMode,

    /// Post link for `once`; `refresh` reads `blueprint.refresh`
    pub post: Option<String>,

    /// Batch sampling seed
    pub seed: Option<u64>,

    /// Relay event channel size
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// What one mode reported back
#[derive(Debug, Default)]
struct ModeTotals {
    events: u64,
    suppressed: u64,
    ticks: u64,
    failed_ticks: u64,
    tick_ms: Vec<f64>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the selected mode to completion
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let (store, transport) = memory_backend::from_blueprint(blueprint);
        let store = Arc::new(store);
        let transport = Arc::new(transport);
        let pool = Arc::new(IdentityPool::new());
        let engine = DispatchEngine::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::clone(&pool),
            self.dispatch_config()?,
        );

        info!(
            mode = self.config.mode.as_str(),
            identities = blueprint.identities.len(),
            sources = blueprint.sources.len(),
            destinations = blueprint.destinations.len(),
            "Running against the in-memory backend"
        );

        let totals = match self.config.mode {
            RunMode::Relay => self.run_relay(engine.clone(), shutdown).await?,
            RunMode::Batch => self.run_batch(engine.clone(), shutdown).await,
            RunMode::Refresh => self.run_refresh(engine.clone(), shutdown).await?,
            RunMode::Once => self.run_once(&engine).await?,
        };

        let mut metrics = aggregate(&store.history(), &transport.sent());
        for _ in 0..totals.suppressed {
            metrics.record_suppressed();
        }
        for ms in &totals.tick_ms {
            metrics.record_tick(*ms);
        }

        let stats = PipelineStats {
            mode: self.config.mode,
            duration: start_time.elapsed(),
            events: totals.events,
            ticks: totals.ticks,
            failed_ticks: totals.failed_ticks,
            attempts: engine.metrics().snapshot().attempts,
            active_identities: pool.active_count(),
            total_identities: pool.len(),
            metrics,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            throughput = format!("{:.2}", stats.throughput()),
            "Pipeline shutdown complete"
        );
        Ok(stats)
    }

    /// Engine policy for the selected mode
    fn dispatch_config(&self) -> Result<DispatchConfig, CliError> {
        let blueprint = &self.config.blueprint;
        let config = match self.config.mode {
            RunMode::Relay => {
                DispatchConfig::from_settings(&blueprint.dispatch, blueprint.relay.rate_limit)
            }
            RunMode::Batch => {
                DispatchConfig::from_settings(&blueprint.dispatch, blueprint.batch.rate_limit)
            }
            RunMode::Refresh => {
                let refresh = self.refresh_settings()?;
                DispatchConfig::from_settings(&blueprint.dispatch, refresh.rate_limit)
                    .with_pacing(Duration::from_millis(refresh.pacing_ms))
            }
            RunMode::Once => {
                DispatchConfig::from_settings(&blueprint.dispatch, RateLimitPolicy::Defer)
            }
        };
        Ok(config)
    }

    fn refresh_settings(&self) -> Result<&RefreshSettings, CliError> {
        self.config
            .blueprint
            .refresh
            .as_ref()
            .ok_or(CliError::MissingPost { mode: "refresh" })
    }

    async fn run_relay(&self, engine: Engine, shutdown: ShutdownSignal) -> Result<ModeTotals> {
        let relay = Arc::new(LiveRelay::new(engine, &self.config.blueprint.relay));
        let listeners = relay.register_sources().await.map_err(CliError::from)?;

        let (tx, rx) = mpsc::channel::<SourceEvent>(self.config.buffer_size.max(1));
        let handle = tokio::spawn(Arc::clone(&relay).run(rx, shutdown));

        // every listener observes every seeded post of its feed
        'feed: for listener in &listeners {
            for item in self.seeded_items(listener.feed()) {
                if tx.send(listener.event(item)).await.is_err() {
                    warn!("Relay stopped accepting events");
                    break 'feed;
                }
            }
        }
        drop(tx);

        let stats = handle
            .await
            .map_err(|e| CliError::task(e.to_string()))?;
        info!(
            events = stats.events,
            delivered = stats.delivered,
            suppressed = stats.suppressed,
            "Relay drained"
        );
        Ok(ModeTotals {
            events: stats.events,
            suppressed: stats.suppressed,
            ..ModeTotals::default()
        })
    }

    async fn run_batch(&self, engine: Engine, shutdown: ShutdownSignal) -> ModeTotals {
        let mut batch = BatchScheduler::new(engine, self.config.blueprint.batch.clone());
        if let Some(seed) = self.config.seed {
            batch = batch.with_seed(seed);
        }
        let stats = batch.run(shutdown).await;
        ModeTotals {
            ticks: stats.ticks,
            failed_ticks: stats.failed_ticks,
            tick_ms: stats.tick_ms,
            ..ModeTotals::default()
        }
    }

    async fn run_refresh(&self, engine: Engine, shutdown: ShutdownSignal) -> Result<ModeTotals> {
        let refresh = RefreshScheduler::new(engine, self.refresh_settings()?)
            .map_err(CliError::from)?;
        let stats = refresh.run(shutdown).await;
        Ok(ModeTotals {
            ticks: stats.cycles,
            failed_ticks: stats.failed_cycles,
            tick_ms: stats.cycle_ms,
            ..ModeTotals::default()
        })
    }

    async fn run_once(&self, engine: &Engine) -> Result<ModeTotals> {
        let post = self
            .config
            .post
            .as_deref()
            .ok_or(CliError::MissingPost { mode: "once" })?;
        let report = broadcast_once(engine, post, Utc::now())
            .await
            .map_err(CliError::from)
            .with_context(|| format!("Broadcast of {post} failed"))?;

        if !report.failed.is_empty() {
            warn!(failed = ?report.failed, "Some destinations were not reached");
        }
        Ok(ModeTotals::default())
    }

    /// Seeded items of `feed`, oldest first
    fn seeded_items(&self, feed: &str) -> Vec<ContentItem> {
        self.config
            .blueprint
            .sources
            .iter()
            .filter(|source| source.feed == feed)
            .flat_map(|source| {
                source.items.iter().map(|item| {
                    ContentItem::new(ContentRef::new(source.feed.clone(), item.id))
                        .with_marker(item.marker)
                })
            })
            .collect()
    }
}
