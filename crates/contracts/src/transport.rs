//! Transport trait - the external send/forward/retract service
//!
//! The engine never talks to the network itself. Everything it needs from
//! the messaging service goes through this trait.

use crate::{ContentFilter, ContentItem, ContractError, Destination, FeedId, Identity, MessageId, SendMode};

/// Result of one send attempt by one identity
///
/// Expected failure modes are variants, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered; the destination assigned this message id
    Success(MessageId),
    /// Service asked the identity to back off
    RateLimited { wait_secs: u64 },
    /// Credential permanently invalid (deactivated / unregistered)
    FatalIdentityError,
    /// Anything else; identity is not penalized
    UnknownError(String),
}

impl SendOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::RateLimited { .. } => "rate_limited",
            Self::FatalIdentityError => "fatal_identity",
            Self::UnknownError(_) => "unknown_error",
        }
    }
}

/// Messaging transport
///
/// Timeouts for individual calls belong to the implementation.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Send `content` to `destination` as `identity`, forwarding or copying per `mode`
    async fn send(
        &self,
        identity: &Identity,
        destination: &Destination,
        content: &ContentItem,
        mode: SendMode,
    ) -> SendOutcome;

    /// Delete a previously delivered message; true if it was removed
    async fn retract(&self, identity: &Identity, destination: &Destination, message: MessageId)
        -> bool;

    /// Most recent items of a feed, newest first, at most `limit`
    ///
    /// # Errors
    /// Returns a fetch error when the feed cannot be read
    async fn fetch_recent(
        &self,
        feed: &FeedId,
        limit: usize,
        filter: ContentFilter,
    ) -> Result<Vec<ContentItem>, ContractError>;

    /// Join the destination before sending; best-effort
    async fn join_destination(&self, identity: &Identity, destination: &Destination) -> bool;
}
