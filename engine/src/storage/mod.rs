//! # Storage Adapters
//!
//! The store persists its selection through the [`StorageAdapter`] contract
//! and never depends on a concrete medium. Beyond `get_item`/`set_item`, an
//! adapter advertises optional capabilities through explicit accessors:
//!
//! - [`StorageAdapter::remover`] - delete a persisted record
//! - [`StorageAdapter::broadcaster`] - same-process fan-out after a write
//! - [`StorageAdapter::watcher`] - observe records changed by other
//!   instances or processes
//!
//! Adapters are built by a [`StorageFactory`] that receives the owning
//! store's [`CancellationToken`]. Every listener an adapter registers must be
//! tied to that token so that destroying the store tears them down.
//!
//! ## Provided adapters
//!
//! - [`FileStorage`] - durable JSON records in a directory, with a session
//!   scoped variant; watches the directory for changes from other processes
//! - [`MemoryStorage`] - process memory with an explicit broadcast channel

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::{MemoryAdapter, MemoryStorage};

use crate::common::StorageError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A change to a persisted record observed by a [`Watch`] registration.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the record was removed or could not be parsed.
    pub value: Option<Value>,
}

/// Callback receiving [`StorageEvent`]s.
pub type WatchCallback = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// Builds an adapter bound to the owning store's cancellation token.
pub type StorageFactory =
    Arc<dyn Fn(CancellationToken) -> Result<Arc<dyn StorageAdapter>, StorageError> + Send + Sync>;

/// Persistence contract used by [`ThemeStore`](crate::store::ThemeStore).
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Reads the record stored under `key`; `Ok(None)` when absent.
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Writes `value` under `key`.
    async fn set_item(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    fn remover(&self) -> Option<&dyn RemoveItem> {
        None
    }

    fn broadcaster(&self) -> Option<&dyn Broadcast> {
        None
    }

    fn watcher(&self) -> Option<&dyn Watch> {
        None
    }
}

/// Capability: delete a persisted record.
#[async_trait]
pub trait RemoveItem: Send + Sync {
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Capability: announce a change to same-process watchers.
pub trait Broadcast: Send + Sync {
    fn broadcast(&self, key: &str, value: Option<&Value>);
}

/// Capability: observe changes to persisted records.
pub trait Watch: Send + Sync {
    /// Registers `callback` for changes to any key. The registration lasts
    /// until the returned handle is cancelled or the adapter's owner is
    /// destroyed, whichever comes first.
    fn watch(&self, callback: WatchCallback) -> Result<WatchHandle, StorageError>;
}

/// Cancels a single watch registration.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    token: CancellationToken,
}

impl WatchHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Wraps a closure as a [`StorageFactory`].
pub fn factory<F, A>(build: F) -> StorageFactory
where
    F: Fn(CancellationToken) -> Result<A, StorageError> + Send + Sync + 'static,
    A: StorageAdapter + 'static,
{
    Arc::new(move |token| Ok(Arc::new(build(token)?) as Arc<dyn StorageAdapter>))
}
