//! # Memory Backend
//!
//! 所有协作契约的进程内实现：
//! - [`MemoryStore`]: 凭据 / 目标 / 源 / 历史存储
//! - [`MockTransport`]: 脚本化的传输层，记录全部操作
//!
//! 用于模拟运行 (`relay run`) 与测试。

mod store;
mod transport;

pub use store::{MemoryStore, StoreFailures};
pub use transport::{MockTransport, MockTransportConfig, Retraction, SentMessage};

use contracts::{ContentItem, ContentRef, RelayBlueprint};

/// 以配置种子数据构建存储与传输层
pub fn from_blueprint(blueprint: &RelayBlueprint) -> (MemoryStore, MockTransport) {
    let store = MemoryStore::from_blueprint(blueprint);
    let transport = MockTransport::new();
    for source in &blueprint.sources {
        transport.add_items(
            source.feed.clone(),
            source.items.iter().map(|item| {
                ContentItem::new(ContentRef::new(source.feed.clone(), item.id))
                    .with_marker(item.marker)
            }),
        );
    }
    (store, transport)
}
