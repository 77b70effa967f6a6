use super::{
    RemoveItem, StorageAdapter, StorageEvent, StorageFactory, Watch, WatchCallback, WatchHandle,
};
use crate::common::StorageError;
use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

const APP_DIR: &str = "palettez";
const RECORD_EXTENSION: &str = ".json";

/// Lifetime of the records kept by a [`FileStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Survives process restarts.
    Durable,
    /// Lives under a temporary directory and belongs to one session id.
    Session(String),
}

/// JSON records stored one file per key under a directory.
///
/// Keys are percent-encoded into file names, so any key maps to a single
/// file and file names map back to keys. Writes go through a temporary file
/// and a rename, so a concurrent reader never sees a partial record.
///
/// The directory itself is the cross-process channel: [`Watch`] observes it
/// with the platform's filesystem notifications and reports changes made by
/// other adapters, in this process or another one. An adapter never reports
/// a record it wrote itself.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    scope: Scope,
}

impl FileStorage {
    /// Durable storage rooted at `root`.
    pub fn durable(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scope: Scope::Durable,
        }
    }

    /// Durable storage in the platform data directory.
    pub fn default_durable() -> Result<Self, StorageError> {
        let data_dir = dirs::data_dir().ok_or(StorageError::NoDataDirectory)?;
        Ok(Self::durable(data_dir.join(APP_DIR)))
    }

    /// Session scoped storage shared by every process using `session_id`.
    pub fn session(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let root = std::env::temp_dir()
            .join(APP_DIR)
            .join("sessions")
            .join(urlencoding::encode(&session_id).as_ref());
        Self {
            root,
            scope: Scope::Session(session_id),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Removes every record of a session scoped storage.
    pub async fn clear_session(&self) -> Result<(), StorageError> {
        if self.scope == Scope::Durable {
            return Ok(());
        }
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&self.root, e)),
        }
    }

    /// Factory producing adapters over this directory.
    pub fn factory(&self) -> StorageFactory {
        let storage = self.clone();
        Arc::new(move |token| {
            Ok(Arc::new(FileAdapter {
                storage: storage.clone(),
                token,
                own_writes: Arc::default(),
            }) as Arc<dyn StorageAdapter>)
        })
    }

    /// Path of the record stored under `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}{RECORD_EXTENSION}", urlencoding::encode(key)))
    }

    /// Key stored in `path`, if `path` is a record of this storage.
    pub fn key_for(&self, path: &Path) -> Option<String> {
        if path.parent() != Some(self.root.as_path()) {
            return None;
        }
        key_from_file_name(path)
    }

    async fn read_record(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("Ignoring malformed record '{}': {e}", path.display());
                Ok(None)
            }
        }
    }

    async fn write_record(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;

        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&staging, content)
            .await
            .map_err(|e| StorageError::io(&staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }
}

/// Last record this adapter wrote per key; `None` after a removal.
///
/// Writes hold the lock until the rename completes and the watcher holds it
/// while reading, so a read never observes a write that is still in flight.
type OwnWrites = Arc<Mutex<HashMap<String, Option<Value>>>>;

/// Adapter over a [`FileStorage`], owned by one store.
pub struct FileAdapter {
    storage: FileStorage,
    token: CancellationToken,
    own_writes: OwnWrites,
}

#[async_trait]
impl StorageAdapter for FileAdapter {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.storage.read_record(key).await
    }

    async fn set_item(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let mut own_writes = self.own_writes.lock().await;
        self.storage.write_record(key, value).await?;
        own_writes.insert(key.to_string(), Some(value.clone()));
        Ok(())
    }

    fn remover(&self) -> Option<&dyn RemoveItem> {
        Some(self)
    }

    fn watcher(&self) -> Option<&dyn Watch> {
        Some(self)
    }
}

#[async_trait]
impl RemoveItem for FileAdapter {
    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut own_writes = self.own_writes.lock().await;
        let path = self.storage.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(path, e)),
        }
        own_writes.insert(key.to_string(), None);
        Ok(())
    }
}

impl Watch for FileAdapter {
    fn watch(&self, callback: WatchCallback) -> Result<WatchHandle, StorageError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StorageError::NoRuntime)?;

        std::fs::create_dir_all(&self.storage.root)
            .map_err(|e| StorageError::io(&self.storage.root, e))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            })?;
        watcher.watch(&self.storage.root, RecursiveMode::NonRecursive)?;

        let token = self.token.child_token();
        let cancelled = token.clone();
        let storage = self.storage.clone();
        let own_writes = self.own_writes.clone();
        runtime.spawn(async move {
            // Dropping the watcher at the end of this task unregisters it.
            let _watcher = watcher;
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    received = rx.recv() => match received {
                        Some(Ok(event)) => dispatch(&storage, &own_writes, &event, &callback).await,
                        Some(Err(e)) => log::warn!("Storage watcher error: {e}"),
                        None => break,
                    },
                }
            }
            log::debug!("Stopped watching '{}'", storage.root.display());
        });

        log::debug!("Watching '{}' for external changes", self.storage.root.display());
        Ok(WatchHandle::new(token))
    }
}

fn key_from_file_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let encoded = file_name.strip_suffix(RECORD_EXTENSION)?;
    urlencoding::decode(encoded).ok().map(|key| key.into_owned())
}

async fn dispatch(
    storage: &FileStorage,
    own_writes: &OwnWrites,
    event: &Event,
    callback: &WatchCallback,
) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }

    // Some platforms report canonicalized paths; the watch is non-recursive,
    // so the file name alone identifies the record.
    for path in &event.paths {
        let Some(key) = key_from_file_name(path) else {
            continue;
        };
        let value = {
            let mut own_writes = own_writes.lock().await;
            let value = match storage.read_record(&key).await {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("Failed to read changed record '{key}': {e}");
                    None
                }
            };
            if own_writes.get(&key) == Some(&value) {
                continue;
            }
            // The file now holds another writer's record.
            own_writes.remove(&key);
            value
        };
        callback(&StorageEvent { key, value });
    }
}
