use crate::config::ThemeConfig;
use crate::signal::{SignalSource, SystemSignals};
use crate::storage::{MemoryStorage, StorageFactory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key used when a store is created without one.
pub const DEFAULT_STORE_KEY: &str = "palettez";

/// Chosen option key per dimension.
///
/// Serializes as a flat JSON object, which is also the persisted record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(BTreeMap<String, String>);

/// Effective value per dimension after environmental resolution.
pub type ResolvedSelection = Selection;

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.0.get(dimension).map(String::as_str)
    }

    pub fn insert(&mut self, dimension: impl Into<String>, option: impl Into<String>) {
        self.0.insert(dimension.into(), option.into());
    }

    pub fn contains(&self, dimension: &str) -> bool {
        self.0.contains_key(dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlays `other` onto this selection.
    pub fn merge(&mut self, other: &Selection) {
        for (dimension, option) in other.iter() {
            self.insert(dimension, option);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Selection {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Selection {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for Selection {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pairs: Vec<String> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", pairs.join(" "))
    }
}

/// What happens when a store loses its last subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePolicy {
    /// The store is destroyed when its last subscriber unsubscribes.
    #[default]
    DestroyWhenUnobserved,
    /// The store lives until `destroy()` is called.
    Explicit,
}

/// Construction parameters for a [`ThemeStore`](super::ThemeStore).
#[derive(Clone)]
pub struct StoreOptions {
    pub key: String,
    pub config: ThemeConfig,
    pub initial_selection: Option<Selection>,
    pub storage: StorageFactory,
    pub signals: Arc<dyn SignalSource>,
    pub lifecycle: LifecyclePolicy,
}

impl StoreOptions {
    /// Options with the default key, a private in-memory storage and the OS
    /// color scheme as signal source.
    pub fn new(config: ThemeConfig) -> Self {
        Self {
            key: DEFAULT_STORE_KEY.to_string(),
            config,
            initial_selection: None,
            storage: MemoryStorage::new().factory(),
            signals: Arc::new(SystemSignals::new()),
            lifecycle: LifecyclePolicy::default(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_initial_selection(mut self, selection: impl Into<Selection>) -> Self {
        self.initial_selection = Some(selection.into());
        self
    }

    pub fn with_storage(mut self, storage: StorageFactory) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_signals(mut self, signals: Arc<dyn SignalSource>) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecyclePolicy) -> Self {
        self.lifecycle = lifecycle;
        self
    }
}

impl std::fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOptions")
            .field("key", &self.key)
            .field("initial_selection", &self.initial_selection)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}
