//! Periodic batch mode
//!
//! Every tick: eligible destinations get a random sample of recent content
//! from all sources. A destination's `last_sent_at` only moves when at least
//! one of its items was delivered.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    BatchSettings, ContentFilter, ContentItem, Destination, DestinationStore, RelayStore,
    SourceStore, Transport,
};
use dispatcher::{DeliveryOutcome, DispatchEngine};

use crate::eligibility::{eligible_destinations, prepare_pool, sample_items};
use crate::{SchedulerError, ShutdownSignal};

const MODE: &str = "batch";

/// Batch loop phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchState {
    #[default]
    Idle,
    ComputeEligibility,
    SampleContent,
    Dispatch,
    PersistMarkers,
    Sleep,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub eligible: usize,
    pub pool_size: usize,
    pub delivered: usize,
    pub exhausted: usize,
    pub failed: usize,
    /// Destinations whose `last_sent_at` moved
    pub marked: usize,
    /// Tick ended early (nothing eligible or empty pool)
    pub skipped: bool,
}

/// Totals of one `run`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub delivered: u64,
    /// Wall time of every tick, in milliseconds
    pub tick_ms: Vec<f64>,
}

pub struct BatchScheduler<T, S> {
    engine: DispatchEngine<T, S>,
    settings: BatchSettings,
    rng: StdRng,
    state: BatchState,
}

impl<T, S> BatchScheduler<T, S>
where
    T: Transport + Send + Sync + 'static,
    S: RelayStore,
{
    pub fn new(engine: DispatchEngine<T, S>, settings: BatchSettings) -> Self {
        Self {
            engine,
            settings,
            rng: StdRng::from_rng(&mut rand::rng()),
            state: BatchState::Idle,
        }
    }

    /// Deterministic sampling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn engine(&self) -> &DispatchEngine<T, S> {
        &self.engine
    }

    fn filter(&self) -> ContentFilter {
        ContentFilter {
            require_marker: self.settings.require_marker,
        }
    }

    /// One pass over every destination
    ///
    /// # Errors
    /// Listing identities or destinations failed; nothing was sent.
    #[instrument(name = "batch_tick", skip(self), fields(tick = %now))]
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError> {
        let started = Instant::now();
        let result = self.tick_inner(now).await;
        let eligible = result.as_ref().map(|r| r.eligible).unwrap_or_default();
        observability::record_tick(MODE, started.elapsed().as_secs_f64() * 1000.0, eligible);
        self.state = BatchState::Idle;
        result
    }

    async fn tick_inner(&mut self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError> {
        let mut report = TickReport::default();

        self.state = BatchState::ComputeEligibility;
        prepare_pool(&self.engine, now).await?;
        let destinations = self
            .engine
            .store()
            .list_destinations()
            .await
            .map_err(SchedulerError::enumerate("destinations"))?;
        let eligible = eligible_destinations(destinations, now);
        report.eligible = eligible.len();
        if eligible.is_empty() {
            debug!("No destination is due");
            report.skipped = true;
            return Ok(report);
        }

        self.state = BatchState::SampleContent;
        let pool = self.content_pool().await?;
        report.pool_size = pool.len();
        if pool.is_empty() {
            warn!(eligible = report.eligible, "Content pool is empty, skipping tick");
            report.skipped = true;
            return Ok(report);
        }

        for destination in &eligible {
            self.state = BatchState::Dispatch;
            let picked = sample_items(&pool, destination.batch_size.max(1) as usize, &mut self.rng);
            let succeeded = self.dispatch(destination, &picked, now, &mut report).await;

            if succeeded > 0 {
                self.state = BatchState::PersistMarkers;
                match self
                    .engine
                    .store()
                    .set_last_sent_at(&destination.link, now)
                    .await
                {
                    Ok(()) => report.marked += 1,
                    Err(e) => {
                        error!(destination = %destination.link, error = %e, "Failed to persist last_sent_at")
                    }
                }
            }
        }

        info!(
            eligible = report.eligible,
            pool = report.pool_size,
            delivered = report.delivered,
            exhausted = report.exhausted,
            "Batch tick finished"
        );
        Ok(report)
    }

    /// Recent items of every source; a source that fails to fetch is skipped
    async fn content_pool(&self) -> Result<Vec<ContentItem>, SchedulerError> {
        let sources = self
            .engine
            .store()
            .list_sources()
            .await
            .map_err(SchedulerError::enumerate("sources"))?;

        let filter = self.filter();
        let mut pool = Vec::new();
        for feed in &sources {
            match self
                .engine
                .transport()
                .fetch_recent(feed, self.settings.fetch_limit, filter)
                .await
            {
                Ok(items) => pool.extend(items),
                Err(e) => warn!(feed = %feed, error = %e, "Failed to fetch source, skipping"),
            }
        }
        debug!(sources = sources.len(), items = pool.len(), "Content pool built");
        Ok(pool)
    }

    async fn dispatch(
        &self,
        destination: &Destination,
        items: &[ContentItem],
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> usize {
        let mut succeeded = 0;
        for item in items {
            match self.engine.deliver(item, destination, now).await {
                Ok(DeliveryOutcome::Delivered { .. }) => succeeded += 1,
                Ok(DeliveryOutcome::Exhausted { .. }) => report.exhausted += 1,
                Err(e) => {
                    error!(destination = %destination.link, error = %e, "Delivery failed");
                    report.failed += 1;
                }
            }
        }
        report.delivered += succeeded;
        succeeded
    }

    /// Tick until shutdown; a failed tick is logged and retried next period
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> BatchStats {
        let period = Duration::from_secs(self.settings.tick_secs);
        info!(tick_secs = self.settings.tick_secs, "Batch scheduler started");
        let mut stats = BatchStats::default();

        while !shutdown.is_triggered() {
            stats.ticks += 1;
            let started = Instant::now();
            match self.tick(Utc::now()).await {
                Ok(report) => stats.delivered += report.delivered as u64,
                Err(e) => {
                    stats.failed_ticks += 1;
                    observability::record_tick_failure(MODE);
                    error!(error = %e, "Batch tick failed");
                }
            }
            stats.tick_ms.push(started.elapsed().as_secs_f64() * 1000.0);

            self.state = BatchState::Sleep;
            let stop = shutdown.sleep(period).await;
            self.state = BatchState::Idle;
            if stop {
                break;
            }
        }

        info!(
            ticks = stats.ticks,
            failed_ticks = stats.failed_ticks,
            delivered = stats.delivered,
            "Batch scheduler stopped"
        );
        stats
    }
}
