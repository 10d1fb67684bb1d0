//! ContentItem - unit of relayable content

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::link::split_post_link;
use crate::FeedId;

/// Origin of an item: source feed + item id within that feed
///
/// Also the live-relay dedup key `(chat scope, content id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub feed: FeedId,
    pub item_id: i64,
}

impl ContentRef {
    pub fn new(feed: impl Into<FeedId>, item_id: i64) -> Self {
        Self {
            feed: feed.into(),
            item_id,
        }
    }

    /// Parse `https://t.me/<feed>/<id>`
    pub fn from_post_link(link: &str) -> Option<Self> {
        split_post_link(link).map(|(feed, item_id)| Self::new(feed, item_id))
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.feed, self.item_id)
    }
}

/// Relayable item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub source_ref: ContentRef,
    /// Promotional marker; batch mode may require it
    #[serde(default)]
    pub has_required_marker: bool,
}

impl ContentItem {
    pub fn new(source_ref: ContentRef) -> Self {
        Self {
            source_ref,
            has_required_marker: false,
        }
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.has_required_marker = marker;
        self
    }
}

/// Filter applied by `Transport::fetch_recent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentFilter {
    /// Only items carrying the required marker
    pub require_marker: bool,
}

impl ContentFilter {
    pub fn matches(&self, item: &ContentItem) -> bool {
        !self.require_marker || item.has_required_marker
    }
}
