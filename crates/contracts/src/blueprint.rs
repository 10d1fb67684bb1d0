//! RelayBlueprint - Config Loader 输出
//!
//! 描述完整的转发配置：派发节奏、限流策略、三种调度模式，以及内存后端的种子数据。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Destination, FeedId, SendMode};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的转发配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 派发引擎设置
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// 实时转发模式
    #[serde(default)]
    pub relay: RelaySettings,

    /// 周期批量模式
    #[serde(default)]
    pub batch: BatchSettings,

    /// 单帖刷新模式 (可选)
    #[serde(default)]
    pub refresh: Option<RefreshSettings>,

    /// 发送身份 (种子数据)
    #[serde(default)]
    pub identities: Vec<IdentitySeed>,

    /// 源频道 (种子数据)
    #[serde(default)]
    pub sources: Vec<SourceSeed>,

    /// 目标 (种子数据)
    #[serde(default)]
    pub destinations: Vec<DestinationSeed>,
}

/// 限流信号的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// 标记冷却，交给周期性复活处理，不阻塞
    #[default]
    Defer,
    /// 原地等待信号时长，然后换下一个身份
    SleepInline,
}

/// 冷却时长的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPolicy {
    /// 使用服务端给出的等待秒数
    #[default]
    Signaled,
    /// 使用固定冷却时长 (`fixed_cooldown_secs`)
    Fixed,
}

/// 派发引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// 每次成功发送后的全局间隔 (毫秒)
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// 发送前尝试加入目标
    #[serde(default = "default_true")]
    pub join_before_send: bool,

    /// 冷却策略
    #[serde(default)]
    pub cooldown: CooldownPolicy,

    /// 固定冷却时长 (秒)
    #[serde(default = "default_fixed_cooldown_secs")]
    pub fixed_cooldown_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            join_before_send: true,
            cooldown: CooldownPolicy::Signaled,
            fixed_cooldown_secs: default_fixed_cooldown_secs(),
        }
    }
}

fn default_pacing_ms() -> u64 {
    2000
}

fn default_fixed_cooldown_secs() -> u64 {
    30 * 60
}

fn default_true() -> bool {
    true
}

/// 实时转发模式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// 近期事件集合容量
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,

    /// 并发处理的事件数上限
    #[serde(default = "default_max_concurrent_events")]
    pub max_concurrent_events: usize,

    #[serde(default)]
    pub rate_limit: RateLimitPolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            recent_capacity: default_recent_capacity(),
            max_concurrent_events: default_max_concurrent_events(),
            rate_limit: RateLimitPolicy::Defer,
        }
    }
}

fn default_recent_capacity() -> usize {
    1000
}

fn default_max_concurrent_events() -> usize {
    8
}

/// 周期批量模式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// 调度周期 (秒)
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// 每个源拉取的最近条目数
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// 只选择带推广标记的条目
    #[serde(default = "default_true")]
    pub require_marker: bool,

    #[serde(default)]
    pub rate_limit: RateLimitPolicy,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            fetch_limit: default_fetch_limit(),
            require_marker: true,
            rate_limit: RateLimitPolicy::Defer,
        }
    }
}

fn default_tick_secs() -> u64 {
    60
}

fn default_fetch_limit() -> usize {
    50
}

/// 单帖刷新模式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// 帖子链接 `https://t.me/<channel>/<id>`
    pub post: String,

    /// 刷新周期 (分钟)
    #[serde(default = "default_refresh_interval")]
    pub interval_minutes: u64,

    /// 成功发送后的间隔 (毫秒)
    #[serde(default = "default_refresh_pacing_ms")]
    pub pacing_ms: u64,

    #[serde(default = "default_refresh_rate_limit")]
    pub rate_limit: RateLimitPolicy,
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_refresh_pacing_ms() -> u64 {
    5000
}

fn default_refresh_rate_limit() -> RateLimitPolicy {
    RateLimitPolicy::SleepInline
}

impl RefreshSettings {
    /// 指定帖子，其余取默认值
    pub fn for_post(post: impl Into<String>) -> Self {
        Self {
            post: post.into(),
            interval_minutes: default_refresh_interval(),
            pacing_ms: default_refresh_pacing_ms(),
            rate_limit: default_refresh_rate_limit(),
        }
    }
}

/// 身份种子
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySeed {
    pub handle: String,
    pub credential: String,
}

/// 源频道种子
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSeed {
    pub feed: FeedId,

    /// 内存后端预置的条目
    #[serde(default)]
    pub items: Vec<ItemSeed>,
}

/// 预置条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSeed {
    pub id: i64,
    #[serde(default)]
    pub marker: bool,
}

/// 目标种子
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationSeed {
    pub link: String,

    #[serde(default)]
    pub interval_minutes: u32,

    #[serde(default = "default_seed_batch_size")]
    pub batch_size: u32,

    #[serde(default)]
    pub send_mode: SendMode,

    #[serde(default)]
    pub last_sent_at: Option<DateTime<Utc>>,
}

fn default_seed_batch_size() -> u32 {
    1
}

impl DestinationSeed {
    /// 转换为运行时目标 (链接已规范化)
    pub fn to_destination(&self) -> Destination {
        Destination {
            link: crate::normalize_link(&self.link),
            interval_minutes: self.interval_minutes,
            last_sent_at: self.last_sent_at,
            batch_size: self.batch_size,
            send_mode: self.send_mode,
            last_delivered_ref: None,
        }
    }
}
