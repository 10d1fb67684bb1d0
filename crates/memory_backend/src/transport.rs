//! Mock 传输层
//!
//! 按身份脚本化发送结果，记录所有发送、撤回与加入操作，供模拟运行和测试断言。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use identity_pool::classify_raw;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use contracts::{
    ContentFilter, ContentItem, ContentRef, ContractError, Destination, FeedId, Identity,
    MessageId, SendMode, SendOutcome, Transport,
};

/// 一次发送记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub handle: String,
    pub destination: String,
    pub content: ContentRef,
    pub mode: SendMode,
    pub outcome: SendOutcome,
}

/// 一次撤回记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retraction {
    pub handle: String,
    pub destination: String,
    pub message: MessageId,
    pub removed: bool,
}

/// Mock 传输配置
#[derive(Debug, Default, Clone)]
pub struct MockTransportConfig {
    /// 拉取会失败的源
    pub fail_fetch: Vec<FeedId>,
    /// 加入目标会失败的身份
    pub fail_join: Vec<String>,
    /// 撤回总是失败的身份
    pub fail_retract: Vec<String>,
    /// 每次发送的模拟耗时
    pub send_latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct TransportState {
    /// handle -> 依次返回的结果，用尽后返回成功
    scripts: HashMap<String, VecDeque<SendOutcome>>,
    feeds: HashMap<FeedId, Vec<ContentItem>>,
    sent: Vec<SentMessage>,
    retractions: Vec<Retraction>,
    joins: Vec<(String, String)>,
    /// 目标中仍存在的消息
    live_messages: HashSet<(String, MessageId)>,
}

/// Mock 传输层
pub struct MockTransport {
    config: MockTransportConfig,
    next_message_id: AtomicI64,
    state: Mutex<TransportState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_config(MockTransportConfig::default())
    }

    pub fn with_config(config: MockTransportConfig) -> Self {
        Self {
            config,
            // 从 1000 开始，便于识别
            next_message_id: AtomicI64::new(1000),
            state: Mutex::new(TransportState::default()),
        }
    }

    /// 为某个身份追加脚本化结果
    pub fn script(&self, handle: &str, outcomes: impl IntoIterator<Item = SendOutcome>) {
        self.state
            .lock()
            .scripts
            .entry(handle.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// 以原始错误文本追加脚本，按真实传输层的方式经 [`classify_raw`] 转换
    ///
    /// 例如 `"FLOOD_WAIT_30"` 成为 `RateLimited { wait_secs: 30 }`。
    pub fn script_errors<'a>(&self, handle: &str, details: impl IntoIterator<Item = &'a str>) {
        self.script(handle, details.into_iter().map(classify_raw));
    }

    /// 向源追加条目 (按时间顺序，最新的在最后)
    pub fn add_items(&self, feed: impl Into<FeedId>, items: impl IntoIterator<Item = ContentItem>) {
        self.state
            .lock()
            .feeds
            .entry(feed.into())
            .or_default()
            .extend(items);
    }

    /// 预置一条目标中已存在的消息
    pub fn seed_message(&self, destination: &str, message: MessageId) {
        self.state
            .lock()
            .live_messages
            .insert((destination.to_string(), message));
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    /// 成功的发送
    pub fn delivered(&self) -> Vec<SentMessage> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|m| m.outcome.is_success())
            .cloned()
            .collect()
    }

    /// 某个身份的发送尝试次数
    pub fn attempts_by(&self, handle: &str) -> usize {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|m| m.handle == handle)
            .count()
    }

    pub fn retractions(&self) -> Vec<Retraction> {
        self.state.lock().retractions.clone()
    }

    pub fn joins(&self) -> Vec<(String, String)> {
        self.state.lock().joins.clone()
    }

    pub fn is_live(&self, destination: &str, message: MessageId) -> bool {
        self.state
            .lock()
            .live_messages
            .contains(&(destination.to_string(), message))
    }

    fn next_outcome(&self, handle: &str) -> SendOutcome {
        let scripted = self
            .state
            .lock()
            .scripts
            .get_mut(handle)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| {
            SendOutcome::Success(MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst)))
        })
    }
}

impl Transport for MockTransport {
    #[instrument(
        name = "mock_transport_send",
        skip(self, identity, destination, content),
        fields(handle = %identity.handle, destination = %destination.link, content = %content.source_ref)
    )]
    async fn send(
        &self,
        identity: &Identity,
        destination: &Destination,
        content: &ContentItem,
        mode: SendMode,
    ) -> SendOutcome {
        if let Some(latency) = self.config.send_latency {
            tokio::time::sleep(latency).await;
        }

        let outcome = self.next_outcome(&identity.handle);
        let mut state = self.state.lock();
        if let SendOutcome::Success(message) = &outcome {
            state
                .live_messages
                .insert((destination.link.clone(), *message));
        }
        state.sent.push(SentMessage {
            handle: identity.handle.clone(),
            destination: destination.link.clone(),
            content: content.source_ref.clone(),
            mode,
            outcome: outcome.clone(),
        });
        debug!(outcome = outcome.label(), "mock send");
        outcome
    }

    async fn retract(
        &self,
        identity: &Identity,
        destination: &Destination,
        message: MessageId,
    ) -> bool {
        let mut state = self.state.lock();
        let removed = !self.config.fail_retract.contains(&identity.handle)
            && state
                .live_messages
                .remove(&(destination.link.clone(), message));
        state.retractions.push(Retraction {
            handle: identity.handle.clone(),
            destination: destination.link.clone(),
            message,
            removed,
        });
        removed
    }

    async fn fetch_recent(
        &self,
        feed: &FeedId,
        limit: usize,
        filter: ContentFilter,
    ) -> Result<Vec<ContentItem>, ContractError> {
        if self.config.fail_fetch.contains(feed) {
            return Err(ContractError::fetch(feed.as_str(), "mock failure"));
        }
        let state = self.state.lock();
        Ok(state
            .feeds
            .get(feed)
            .map(|items| {
                items
                    .iter()
                    .rev()
                    .take(limit)
                    .filter(|item| filter.matches(item))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn join_destination(&self, identity: &Identity, destination: &Destination) -> bool {
        let mut state = self.state.lock();
        state
            .joins
            .push((identity.handle.clone(), destination.link.clone()));
        !self.config.fail_join.contains(&identity.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{IdentityId, IdentityRecord};

    fn identity(handle: &str) -> Identity {
        Identity::from_record(IdentityRecord::new(IdentityId(1), handle, "s"))
    }

    #[tokio::test]
    async fn test_scripted_then_success() {
        let transport = MockTransport::new();
        transport.script("+1", [SendOutcome::RateLimited { wait_secs: 3 }]);

        let id = identity("+1");
        let dest = Destination::new("chat");
        let item = ContentItem::new(ContentRef::new("news", 1));

        let first = transport.send(&id, &dest, &item, SendMode::Forward).await;
        let second = transport.send(&id, &dest, &item, SendMode::Forward).await;

        assert_eq!(first, SendOutcome::RateLimited { wait_secs: 3 });
        assert_eq!(second, SendOutcome::Success(MessageId(1000)));
        assert_eq!(transport.attempts_by("+1"), 2);
        assert_eq!(transport.delivered().len(), 1);
        assert!(transport.is_live("chat", MessageId(1000)));
    }

    #[tokio::test]
    async fn test_scripted_error_text_is_classified() {
        let transport = MockTransport::new();
        transport.script_errors(
            "+1",
            [
                "A wait of 35 seconds is required (FLOOD_WAIT_35)",
                "[401 AUTH_KEY_UNREGISTERED]",
            ],
        );

        let id = identity("+1");
        let dest = Destination::new("chat");
        let item = ContentItem::new(ContentRef::new("news", 1));

        assert_eq!(
            transport.send(&id, &dest, &item, SendMode::Copy).await,
            SendOutcome::RateLimited { wait_secs: 35 }
        );
        assert_eq!(
            transport.send(&id, &dest, &item, SendMode::Copy).await,
            SendOutcome::FatalIdentityError
        );
    }

    #[tokio::test]
    async fn test_fetch_recent_newest_first() {
        let transport = MockTransport::new();
        transport.add_items(
            "news",
            (1..=5).map(|id| ContentItem::new(ContentRef::new("news", id)).with_marker(id % 2 == 1)),
        );

        let all = transport
            .fetch_recent(&"news".into(), 3, ContentFilter::default())
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|i| i.source_ref.item_id).collect();
        assert_eq!(ids, vec![5, 4, 3]);

        let marked = transport
            .fetch_recent(&"news".into(), 5, ContentFilter { require_marker: true })
            .await
            .unwrap();
        assert_eq!(marked.len(), 3);

        let empty = transport
            .fetch_recent(&"unknown".into(), 5, ContentFilter::default())
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_retract_removes_live_message() {
        let transport = MockTransport::with_config(MockTransportConfig {
            fail_retract: vec!["+2".into()],
            ..Default::default()
        });
        let dest = Destination::new("chat");
        transport.seed_message("chat", MessageId(7));

        assert!(!transport.retract(&identity("+2"), &dest, MessageId(7)).await);
        assert!(transport.retract(&identity("+1"), &dest, MessageId(7)).await);
        assert!(!transport.retract(&identity("+1"), &dest, MessageId(7)).await);
        assert_eq!(transport.retractions().len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_injected() {
        let transport = MockTransport::with_config(MockTransportConfig {
            fail_fetch: vec!["news".into()],
            ..Default::default()
        });
        let err = transport
            .fetch_recent(&"news".into(), 5, ContentFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::Fetch { .. }));
    }
}
