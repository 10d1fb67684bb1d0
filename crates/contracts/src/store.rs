//! Store traits - persistent state consumed by the engine
//!
//! Storage itself lives outside the engine; these are the narrow contracts the
//! dispatcher and scheduler depend on. All operations are assumed atomic and
//! durable from the caller's perspective.

use chrono::{DateTime, Utc};

use crate::{
    ContentRef, ContractError, DeliveryScope, Destination, FeedId, HistoryRecord, IdentityId,
    IdentityRecord, IdentityStatus, MessageId,
};

/// Result of registering a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created(IdentityId),
    /// Handle already known; nothing written
    AlreadyExists(IdentityId),
}

/// Credential / session store
#[trait_variant::make(CredentialStore: Send)]
pub trait LocalCredentialStore {
    /// Identities whose persisted status is active, in registration order
    async fn list_active_identities(&self) -> Result<Vec<IdentityRecord>, ContractError>;

    /// Persist a status change
    async fn set_status(&self, handle: &str, status: IdentityStatus) -> Result<(), ContractError>;

    /// Register a new credential, deduplicated by handle
    async fn register_identity(
        &self,
        handle: &str,
        credential: &str,
    ) -> Result<Registration, ContractError>;
}

/// Destination store; read fresh every cycle
#[trait_variant::make(DestinationStore: Send)]
pub trait LocalDestinationStore {
    async fn list_destinations(&self) -> Result<Vec<Destination>, ContractError>;

    async fn set_last_sent_at(&self, link: &str, at: DateTime<Utc>) -> Result<(), ContractError>;

    async fn set_last_delivered_ref(
        &self,
        link: &str,
        message: Option<MessageId>,
    ) -> Result<(), ContractError>;
}

/// Source feed store
#[trait_variant::make(SourceStore: Send)]
pub trait LocalSourceStore {
    async fn list_sources(&self) -> Result<Vec<FeedId>, ContractError>;
}

/// Durable delivery history
#[trait_variant::make(HistoryStore: Send)]
pub trait LocalHistoryStore {
    /// True if a Success record exists for `content` within `scope`
    async fn has_been_delivered(
        &self,
        content: &ContentRef,
        scope: &DeliveryScope,
    ) -> Result<bool, ContractError>;

    async fn record(&self, record: HistoryRecord) -> Result<(), ContractError>;
}

/// Every store the scheduler needs, behind one handle
pub trait RelayStore:
    CredentialStore + DestinationStore + SourceStore + HistoryStore + Send + Sync + 'static
{
}

impl<T> RelayStore for T where
    T: CredentialStore + DestinationStore + SourceStore + HistoryStore + Send + Sync + 'static
{
}
