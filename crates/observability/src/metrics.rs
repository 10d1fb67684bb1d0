//! 转发引擎指标收集模块
//!
//! Prometheus 指标 (`metrics` 宏) 以及内存中的运行摘要聚合器。

use std::collections::HashMap;

use contracts::{IdentityStatus, SendOutcome};
use metrics::{counter, gauge, histogram};

/// 记录单次发送尝试的结果
pub fn record_send_outcome(outcome: &SendOutcome) {
    counter!(
        "relay_send_attempts_total",
        "outcome" => outcome.label()
    )
    .increment(1);

    if let SendOutcome::RateLimited { wait_secs } = outcome {
        histogram!("relay_rate_limit_wait_secs").record(*wait_secs as f64);
    }
}

/// 记录一次投递 (一个内容到一个目标) 的最终结果
pub fn record_delivery(destination: &str, delivered: bool, attempts: u32) {
    let status = if delivered { "delivered" } else { "exhausted" };
    counter!(
        "relay_deliveries_total",
        "destination" => destination.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!("relay_delivery_attempts").record(f64::from(attempts));
}

/// 记录身份状态迁移
pub fn record_identity_transition(status: IdentityStatus) {
    counter!(
        "relay_identity_transitions_total",
        "status" => status.as_str()
    )
    .increment(1);
}

/// 记录当前可用身份数
pub fn record_active_identities(active: usize, total: usize) {
    gauge!("relay_identities_active").set(active as f64);
    gauge!("relay_identities_total").set(total as f64);
}

/// 记录被去重拦截的事件
pub fn record_dedup_suppressed(reason: &'static str) {
    counter!("relay_events_suppressed_total", "reason" => reason).increment(1);
}

/// 记录实时转发收到的事件
pub fn record_event_received(feed: &str) {
    counter!("relay_events_received_total", "feed" => feed.to_string()).increment(1);
}

/// 记录一个调度周期
pub fn record_tick(mode: &'static str, duration_ms: f64, eligible: usize) {
    counter!("relay_ticks_total", "mode" => mode).increment(1);
    histogram!("relay_tick_duration_ms", "mode" => mode).record(duration_ms);
    gauge!("relay_eligible_destinations", "mode" => mode).set(eligible as f64);
}

/// 记录失败的调度周期
pub fn record_tick_failure(mode: &'static str) {
    counter!("relay_tick_failures_total", "mode" => mode).increment(1);
}

/// 转发指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct RelayMetricsAggregator {
    /// 投递总数 (内容 × 目标)
    pub total_deliveries: u64,

    /// 成功投递数
    pub delivered: u64,

    /// 身份耗尽的投递数
    pub exhausted: u64,

    /// 被去重拦截的事件数
    pub suppressed: u64,

    /// 调度周期数
    pub ticks: u64,

    /// 每次投递的尝试次数
    pub attempt_stats: RunningStats,

    /// 周期耗时 (毫秒)
    pub tick_stats: RunningStats,

    /// 各目标成功次数
    pub per_destination: HashMap<String, u64>,
}

impl RelayMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivery(&mut self, destination: &str, delivered: bool, attempts: u32) {
        self.total_deliveries += 1;
        self.attempt_stats.push(f64::from(attempts));
        if delivered {
            self.delivered += 1;
            *self
                .per_destination
                .entry(destination.to_string())
                .or_insert(0) += 1;
        } else {
            self.exhausted += 1;
        }
    }

    pub fn record_suppressed(&mut self) {
        self.suppressed += 1;
    }

    pub fn record_tick(&mut self, duration_ms: f64) {
        self.ticks += 1;
        self.tick_stats.push(duration_ms);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_deliveries: self.total_deliveries,
            delivered: self.delivered,
            exhausted: self.exhausted,
            suppressed: self.suppressed,
            ticks: self.ticks,
            success_rate: if self.total_deliveries > 0 {
                self.delivered as f64 / self.total_deliveries as f64 * 100.0
            } else {
                0.0
            },
            attempts: StatsSummary::from(&self.attempt_stats),
            tick_duration_ms: StatsSummary::from(&self.tick_stats),
            per_destination: self.per_destination.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_deliveries: u64,
    pub delivered: u64,
    pub exhausted: u64,
    pub suppressed: u64,
    pub ticks: u64,
    pub success_rate: f64,
    pub attempts: StatsSummary,
    pub tick_duration_ms: StatsSummary,
    pub per_destination: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Relay Metrics Summary ===")?;
        writeln!(f, "Ticks: {}", self.ticks)?;
        writeln!(
            f,
            "Deliveries: {} delivered / {} total ({:.2}%)",
            self.delivered, self.total_deliveries, self.success_rate
        )?;
        writeln!(f, "Exhausted: {}", self.exhausted)?;
        writeln!(f, "Suppressed duplicates: {}", self.suppressed)?;
        writeln!(f, "Attempts per delivery: {}", self.attempts)?;
        writeln!(f, "Tick duration (ms): {}", self.tick_duration_ms)?;

        if !self.per_destination.is_empty() {
            writeln!(f, "Per destination:")?;
            let mut entries: Vec<_> = self.per_destination.iter().collect();
            entries.sort();
            for (destination, count) in entries {
                writeln!(f, "  {}: {}", destination, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
