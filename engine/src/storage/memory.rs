use super::{
    Broadcast, RemoveItem, StorageAdapter, StorageEvent, StorageFactory, Watch, WatchCallback,
    WatchHandle,
};
use crate::common::StorageError;
use crate::fanout::Fanout;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Process-memory storage shared by every adapter built from it.
///
/// Memory has no native change notification, so cross-instance sync goes
/// through an explicit broadcast channel: a store that writes broadcasts the
/// record, and every store that called `sync()` on an adapter from the same
/// `MemoryStorage` observes it.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    items: Arc<RwLock<HashMap<String, Value>>>,
    channel: Fanout<StorageEvent>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory producing adapters over this storage.
    pub fn factory(&self) -> StorageFactory {
        let storage = self.clone();
        Arc::new(move |token| {
            Ok(Arc::new(MemoryAdapter {
                storage: storage.clone(),
                token,
            }) as Arc<dyn StorageAdapter>)
        })
    }

    /// Reads a record without going through an adapter.
    pub async fn peek(&self, key: &str) -> Option<Value> {
        self.items.read().await.get(key).cloned()
    }

    /// Writes a record without broadcasting, as another process would.
    pub async fn insert(&self, key: impl Into<String>, value: Value) {
        self.items.write().await.insert(key.into(), value);
    }

    /// Number of live watch registrations across all adapters.
    pub fn watcher_count(&self) -> usize {
        self.channel.listener_count()
    }

    #[cfg(test)]
    pub(crate) fn registration_count(&self) -> usize {
        self.channel.entry_count()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("channel", &self.channel)
            .finish()
    }
}

/// Adapter over a [`MemoryStorage`], owned by one store.
pub struct MemoryAdapter {
    storage: MemoryStorage,
    token: CancellationToken,
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.storage.peek(key).await)
    }

    async fn set_item(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.storage.insert(key, value.clone()).await;
        Ok(())
    }

    fn remover(&self) -> Option<&dyn RemoveItem> {
        Some(self)
    }

    fn broadcaster(&self) -> Option<&dyn Broadcast> {
        Some(self)
    }

    fn watcher(&self) -> Option<&dyn Watch> {
        Some(self)
    }
}

#[async_trait]
impl RemoveItem for MemoryAdapter {
    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.storage.items.write().await.remove(key);
        Ok(())
    }
}

impl Broadcast for MemoryAdapter {
    fn broadcast(&self, key: &str, value: Option<&Value>) {
        let delivered = self.storage.channel.emit(&StorageEvent {
            key: key.to_string(),
            value: value.cloned(),
        });
        log::debug!("Broadcast of '{key}' reached {delivered} watcher(s)");
    }
}

impl Watch for MemoryAdapter {
    fn watch(&self, callback: WatchCallback) -> Result<WatchHandle, StorageError> {
        let token = self.token.child_token();
        self.storage
            .channel
            .register(token.clone(), move |event| callback(event));
        Ok(WatchHandle::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_adapters_share_items() {
        let storage = MemoryStorage::new();
        let first = (storage.factory())(CancellationToken::new()).unwrap();
        let second = (storage.factory())(CancellationToken::new()).unwrap();

        first.set_item("k", &json!({"a": "b"})).await.unwrap();
        assert_eq!(second.get_item("k").await.unwrap(), Some(json!({"a": "b"})));

        second.remover().unwrap().remove_item("k").await.unwrap();
        assert_eq!(first.get_item("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_watchers_until_owner_cancelled() {
        let storage = MemoryStorage::new();
        let owner = CancellationToken::new();
        let watching = (storage.factory())(owner.clone()).unwrap();
        let writer = (storage.factory())(CancellationToken::new()).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        watching
            .watcher()
            .unwrap()
            .watch(Arc::new(move |event: &StorageEvent| {
                sink.lock().unwrap().push(event.clone())
            }))
            .unwrap();

        writer.broadcaster().unwrap().broadcast("k", Some(&json!({})));
        owner.cancel();
        writer.broadcaster().unwrap().broadcast("k", None);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "k");
        assert_eq!(storage.watcher_count(), 0);
    }
}
