//! # Dispatcher
//!
//! 投递引擎模块。
//!
//! 负责：
//! - 按优先级遍历身份池，直到某个身份投递成功
//! - 根据发送结果更新身份状态并写入历史
//! - 成功后的固定节奏间隔

pub mod dispatcher;
pub mod error;
pub mod metrics;

pub use dispatcher::{DeliveryOutcome, DispatchConfig, DispatchEngine};
pub use error::DispatchError;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
