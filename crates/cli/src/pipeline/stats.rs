//! Run statistics and end-of-run summary.

use std::collections::HashMap;
use std::time::Duration;

use contracts::{ContentRef, DeliveryStatus, HistoryRecord};
use memory_backend::SentMessage;
use observability::RelayMetricsAggregator;

use crate::cli::RunMode;

/// Statistics from one `run`
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub mode: RunMode,

    /// Total duration of the run
    pub duration: Duration,

    /// Relay events received (relay mode)
    pub events: u64,

    /// Scheduler ticks or refresh cycles
    pub ticks: u64,

    /// Ticks that ended in an error
    pub failed_ticks: u64,

    /// Send attempts across all identities
    pub attempts: u64,

    /// Identities still active at the end / pool size
    pub active_identities: usize,
    pub total_identities: usize,

    /// Delivery aggregator
    pub metrics: RelayMetricsAggregator,
}

impl PipelineStats {
    /// Deliveries per second
    pub fn throughput(&self) -> f64 {
        let delivered = self.metrics.summary().delivered;
        if self.duration.as_secs_f64() > 0.0 {
            delivered as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Relay Run ({}) ===", self.mode.as_str());
        println!("Duration: {:.2}s", self.duration.as_secs_f64());
        if self.events > 0 {
            println!("Events received: {}", self.events);
        }
        println!("Ticks: {} ({} failed)", self.ticks, self.failed_ticks);
        println!("Send attempts: {}", self.attempts);
        println!(
            "Identities: {} active / {} total",
            self.active_identities, self.total_identities
        );
        println!("Throughput: {:.2} deliveries/s\n", self.throughput());
        print!("{}", self.metrics.summary());
        println!();
    }
}

/// Replay history against the transport log to recover per-delivery attempts
///
/// For one (content, destination) key, sends and history records appear in
/// the same order, so each Success record owns the sends up to and including
/// the next successful one, and each Failure record owns the failed sends
/// before the next success.
pub fn aggregate(history: &[HistoryRecord], sent: &[SentMessage]) -> RelayMetricsAggregator {
    let mut by_key: HashMap<(&ContentRef, &str), Vec<bool>> = HashMap::new();
    for message in sent {
        by_key
            .entry((&message.content, message.destination.as_str()))
            .or_default()
            .push(message.outcome.is_success());
    }

    let mut cursors: HashMap<(&ContentRef, &str), usize> = HashMap::new();
    let mut aggregator = RelayMetricsAggregator::new();
    for record in history {
        let key = (&record.content, record.destination.as_str());
        let outcomes = by_key.get(&key).map(Vec::as_slice).unwrap_or_default();
        let cursor = cursors.entry(key).or_default();
        let start = *cursor;

        let delivered = record.outcome == DeliveryStatus::Success;
        while *cursor < outcomes.len() {
            let success = outcomes[*cursor];
            if success && !delivered {
                break;
            }
            *cursor += 1;
            if success {
                break;
            }
        }

        let attempts = u32::try_from(*cursor - start).unwrap_or(u32::MAX);
        aggregator.record_delivery(&record.destination, delivered, attempts);
    }
    aggregator
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{IdentityId, MessageId, SendMode, SendOutcome};

    fn sent(handle: &str, destination: &str, outcome: SendOutcome) -> SentMessage {
        SentMessage {
            handle: handle.to_string(),
            destination: destination.to_string(),
            content: ContentRef::new("news", 1),
            mode: SendMode::Forward,
            outcome,
        }
    }

    #[test]
    fn test_aggregate_attempts() {
        let content = ContentRef::new("news", 1);
        let log = vec![
            sent("+1", "a", SendOutcome::RateLimited { wait_secs: 30 }),
            sent("+2", "a", SendOutcome::Success(MessageId(1))),
            sent("+2", "b", SendOutcome::FatalIdentityError),
        ];
        let history = vec![
            HistoryRecord::success(content.clone(), IdentityId(2), "a", Utc::now()),
            HistoryRecord::exhausted(content, "b", Utc::now()),
        ];

        let summary = aggregate(&history, &log).summary();
        assert_eq!(summary.total_deliveries, 2);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.attempts.count, 2);
        assert!((summary.attempts.mean - 1.5).abs() < f64::EPSILON);
        assert_eq!(summary.per_destination.get("a"), Some(&1));
    }

    #[test]
    fn test_exhausted_with_no_identity() {
        let history = vec![HistoryRecord::exhausted(
            ContentRef::new("news", 9),
            "a",
            Utc::now(),
        )];
        let summary = aggregate(&history, &[]).summary();
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.attempts.max, 0.0);
    }
}
