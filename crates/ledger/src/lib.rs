//! # Ledger
//!
//! 投递历史辅助模块。
//!
//! 负责：
//! - 有界的近期事件集合 (最旧的先淘汰)
//! - 实时转发去重：近期集合与持久历史在同一临界区内检查

pub mod guard;
pub mod recent;

pub use guard::{Admission, DedupGuard};
pub use recent::RecentSet;
