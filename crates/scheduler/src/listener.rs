//! Source listener registry
//!
//! Each (feed, identity) pairing is registered explicitly. The returned
//! [`FeedListener`] carries both values, fixed at registration time, and is
//! the only way to hand an event to the live relay.

use std::collections::HashMap;

use parking_lot::RwLock;

use contracts::{ContentItem, FeedId, Identity, IdentityId};

/// Registered (feed, observing identity) pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedListener {
    feed: FeedId,
    identity: IdentityId,
    handle: String,
}

impl FeedListener {
    pub fn feed(&self) -> &FeedId {
        &self.feed
    }

    /// Identity that observed the feed
    pub fn identity(&self) -> IdentityId {
        self.identity
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Wrap a newly observed item into an event for the relay
    pub fn event(&self, item: ContentItem) -> SourceEvent {
        SourceEvent {
            listener: self.clone(),
            item,
        }
    }
}

/// New content observed by a listener
#[derive(Debug, Clone)]
pub struct SourceEvent {
    pub listener: FeedListener,
    pub item: ContentItem,
}

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<FeedId, Vec<FeedListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity` as a listener on `feed`
    ///
    /// Registering the same pairing twice returns the existing listener.
    pub fn register_source_listener(&self, feed: FeedId, identity: &Identity) -> FeedListener {
        let mut listeners = self.listeners.write();
        let entry = listeners.entry(feed.clone()).or_default();
        if let Some(existing) = entry.iter().find(|l| l.identity == identity.id) {
            return existing.clone();
        }
        let listener = FeedListener {
            feed,
            identity: identity.id,
            handle: identity.handle.clone(),
        };
        entry.push(listener.clone());
        listener
    }

    pub fn is_registered(&self, listener: &FeedListener) -> bool {
        self.listeners
            .read()
            .get(listener.feed.as_str())
            .is_some_and(|l| l.contains(listener))
    }

    pub fn listeners_for(&self, feed: &str) -> Vec<FeedListener> {
        self.listeners.read().get(feed).cloned().unwrap_or_default()
    }

    /// Every registered listener, grouped by feed
    pub fn all(&self) -> Vec<FeedListener> {
        self.listeners.read().values().flatten().cloned().collect()
    }

    pub fn feed_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
