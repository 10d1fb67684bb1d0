//! # Scheduler
//!
//! 调度模块，驱动投递引擎的四种运行方式。
//!
//! - [`LiveRelay`]: 实时转发，源频道每条新帖送达所有目标，去重保证只投递一次
//! - [`BatchScheduler`]: 周期批量，按目标间隔抽样近期内容
//! - [`RefreshScheduler`]: 单帖刷新，撤回旧副本后重新发送
//! - [`broadcast_once`]: 一次性广播
//!
//! 所有循环在两个周期之间观察 [`ShutdownSignal`]，进行中的发送不会被打断。

pub mod batch;
pub mod eligibility;
pub mod error;
pub mod listener;
pub mod refresh;
pub mod relay;
pub mod shutdown;

pub use batch::{BatchScheduler, BatchState, BatchStats, TickReport};
pub use eligibility::{eligible_destinations, prepare_pool, revive, sample_items};
pub use error::SchedulerError;
pub use listener::{FeedListener, ListenerRegistry, SourceEvent};
pub use refresh::{
    broadcast_once, post_item, BroadcastReport, CycleReport, RefreshScheduler, RefreshStats,
};
pub use relay::{EventReport, LiveRelay, RelayStats};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
