//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Wall-clock `DateTime<Utc>` everywhere; callers pass `now` explicitly so
//!   eligibility and cooldown checks stay deterministic under test

mod blueprint;
mod content;
mod destination;
mod error;
mod feed_id;
mod history;
mod identity;
mod link;
mod store;
mod transport;

pub use blueprint::*;
pub use content::*;
pub use destination::*;
pub use error::*;
pub use feed_id::FeedId;
pub use history::*;
pub use identity::*;
pub use link::{normalize_link, split_post_link};
pub use store::*;
pub use transport::*;
