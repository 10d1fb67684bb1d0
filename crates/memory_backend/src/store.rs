//! 内存存储
//!
//! 同时实现凭据、目标、源与历史四个存储契约，支持注入失败场景。

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, instrument};

use contracts::{
    normalize_link, ContentRef, ContractError, CredentialStore, DeliveryScope, DeliveryStatus,
    Destination, DestinationStore, FeedId, HistoryRecord, HistoryStore, IdentityId,
    IdentityRecord, IdentityStatus, MessageId, Registration, RelayBlueprint, SourceStore,
};

/// 注入的失败场景
#[derive(Debug, Default, Clone)]
pub struct StoreFailures {
    /// list_destinations 失败
    pub list_destinations: bool,
    /// list_active_identities 失败
    pub list_identities: bool,
    /// 历史写入失败
    pub history_write: bool,
    /// set_status 失败
    pub set_status: bool,
}

#[derive(Debug, Clone)]
struct StoredIdentity {
    id: IdentityId,
    handle: String,
    credential: String,
    status: IdentityStatus,
}

#[derive(Debug, Default)]
struct StoreState {
    identities: Vec<StoredIdentity>,
    destinations: Vec<Destination>,
    sources: Vec<FeedId>,
    history: Vec<HistoryRecord>,
    next_identity_id: u64,
    failures: StoreFailures,
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以配置中的种子数据初始化
    pub fn from_blueprint(blueprint: &RelayBlueprint) -> Self {
        let store = Self::new();
        for seed in &blueprint.identities {
            store.add_identity(&seed.handle, &seed.credential);
        }
        for seed in &blueprint.sources {
            store.add_source(seed.feed.clone());
        }
        for seed in &blueprint.destinations {
            store.add_destination(seed.to_destination());
        }
        store
    }

    /// 添加身份，返回其 id；handle 已存在时返回已有 id
    pub fn add_identity(&self, handle: &str, credential: &str) -> IdentityId {
        match self.insert_identity(handle, credential) {
            Registration::Created(id) | Registration::AlreadyExists(id) => id,
        }
    }

    /// 添加或替换目标 (按规范化链接)
    pub fn add_destination(&self, mut destination: Destination) {
        destination.link = normalize_link(&destination.link);
        let mut state = self.state.lock();
        match state
            .destinations
            .iter_mut()
            .find(|d| d.link == destination.link)
        {
            Some(existing) => *existing = destination,
            None => state.destinations.push(destination),
        }
    }

    pub fn add_source(&self, feed: impl Into<FeedId>) {
        let feed = feed.into();
        let mut state = self.state.lock();
        if !state.sources.contains(&feed) {
            state.sources.push(feed);
        }
    }

    pub fn set_failures(&self, failures: StoreFailures) {
        self.state.lock().failures = failures;
    }

    /// 全部历史记录 (写入顺序)
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.state.lock().history.clone()
    }

    pub fn successes(&self) -> Vec<HistoryRecord> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|r| r.outcome == DeliveryStatus::Success)
            .cloned()
            .collect()
    }

    pub fn destination(&self, link: &str) -> Option<Destination> {
        let link = normalize_link(link);
        self.state
            .lock()
            .destinations
            .iter()
            .find(|d| d.link == link)
            .cloned()
    }

    /// 持久化的身份状态
    pub fn identity_status(&self, handle: &str) -> Option<IdentityStatus> {
        self.state
            .lock()
            .identities
            .iter()
            .find(|i| i.handle == handle)
            .map(|i| i.status)
    }

    pub fn identity_count(&self) -> usize {
        self.state.lock().identities.len()
    }

    fn insert_identity(&self, handle: &str, credential: &str) -> Registration {
        let handle = handle.trim();
        let mut state = self.state.lock();
        if let Some(existing) = state.identities.iter().find(|i| i.handle == handle) {
            return Registration::AlreadyExists(existing.id);
        }
        state.next_identity_id += 1;
        let id = IdentityId(state.next_identity_id);
        state.identities.push(StoredIdentity {
            id,
            handle: handle.to_string(),
            credential: credential.to_string(),
            status: IdentityStatus::Active,
        });
        Registration::Created(id)
    }
}

impl CredentialStore for MemoryStore {
    async fn list_active_identities(&self) -> Result<Vec<IdentityRecord>, ContractError> {
        let state = self.state.lock();
        if state.failures.list_identities {
            return Err(ContractError::store("credential", "mock failure"));
        }
        Ok(state
            .identities
            .iter()
            .filter(|i| i.status == IdentityStatus::Active)
            .map(|i| IdentityRecord::new(i.id, i.handle.clone(), i.credential.clone()))
            .collect())
    }

    #[instrument(name = "memory_store_set_status", skip(self), fields(handle = %handle, status = %status))]
    async fn set_status(&self, handle: &str, status: IdentityStatus) -> Result<(), ContractError> {
        let mut state = self.state.lock();
        if state.failures.set_status {
            return Err(ContractError::store("credential", "mock failure"));
        }
        match state.identities.iter_mut().find(|i| i.handle == handle) {
            Some(identity) => {
                identity.status = status;
                Ok(())
            }
            None => Err(ContractError::store(
                "credential",
                format!("unknown identity '{handle}'"),
            )),
        }
    }

    async fn register_identity(
        &self,
        handle: &str,
        credential: &str,
    ) -> Result<Registration, ContractError> {
        Ok(self.insert_identity(handle, credential))
    }
}

impl DestinationStore for MemoryStore {
    async fn list_destinations(&self) -> Result<Vec<Destination>, ContractError> {
        let state = self.state.lock();
        if state.failures.list_destinations {
            return Err(ContractError::store("destination", "mock failure"));
        }
        Ok(state.destinations.clone())
    }

    async fn set_last_sent_at(&self, link: &str, at: DateTime<Utc>) -> Result<(), ContractError> {
        let mut state = self.state.lock();
        let destination = state
            .destinations
            .iter_mut()
            .find(|d| d.link == link)
            .ok_or_else(|| ContractError::DestinationNotFound { link: link.into() })?;
        destination.last_sent_at = Some(at);
        debug!(link = %link, at = %at, "last_sent_at updated");
        Ok(())
    }

    async fn set_last_delivered_ref(
        &self,
        link: &str,
        message: Option<MessageId>,
    ) -> Result<(), ContractError> {
        let mut state = self.state.lock();
        let destination = state
            .destinations
            .iter_mut()
            .find(|d| d.link == link)
            .ok_or_else(|| ContractError::DestinationNotFound { link: link.into() })?;
        destination.last_delivered_ref = message;
        Ok(())
    }
}

impl SourceStore for MemoryStore {
    async fn list_sources(&self) -> Result<Vec<FeedId>, ContractError> {
        Ok(self.state.lock().sources.clone())
    }
}

impl HistoryStore for MemoryStore {
    async fn has_been_delivered(
        &self,
        content: &ContentRef,
        scope: &DeliveryScope,
    ) -> Result<bool, ContractError> {
        Ok(self.state.lock().history.iter().any(|r| {
            r.outcome == DeliveryStatus::Success && r.content == *content && scope.covers(r)
        }))
    }

    async fn record(&self, record: HistoryRecord) -> Result<(), ContractError> {
        let mut state = self.state.lock();
        if state.failures.history_write {
            return Err(ContractError::store("history", "mock failure"));
        }
        state.history.push(record);
        Ok(())
    }
}
