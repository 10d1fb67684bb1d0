//! # Identity Pool
//!
//! 发送身份管理。
//!
//! 负责：
//! - 按注册顺序维护身份 (即故障转移优先级)
//! - 身份状态机：Active / RateLimited / Disabled
//! - 将发送结果分类为策略动作
//! - 身份注册握手的显式状态表

pub mod classifier;
pub mod enrollment;
pub mod pool;

pub use classifier::{classify_raw, Classifier, PolicyAction};
pub use enrollment::{EnrollmentError, EnrollmentState, EnrollmentTable, SessionId, Verification};
pub use pool::IdentityPool;
