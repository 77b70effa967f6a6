//! # Theme Store
//!
//! [`ThemeStore`] owns the current [`Selection`] for one configuration and one
//! persistence key. It resolves selections into effective values, persists
//! them through its [`StorageAdapter`], follows external changes when
//! [`sync`](ThemeStore::sync) is active, and notifies subscribers on every
//! state transition.
//!
//! ## Resolution
//!
//! Options without an environmental rule resolve to their own key. An option
//! with a rule is resolved the first time it is resolved while selected: the
//! signal is queried once, the result is cached, and a single observer is
//! registered for that (dimension, option) pair. The observer keeps the
//! cache current and notifies subscribers only while the option is still the
//! selected one.
//!
//! ## Lifetime
//!
//! Every observer and watch registration hangs off the store's
//! [`CancellationToken`], so [`destroy`](ThemeStore::destroy) is the only call
//! needed to stop all callbacks.
//!
//! ```no_run
//! use engine::config::{EnvironmentalRule, ThemeConfig, ThemeDimension, ThemeOption};
//! use engine::store::{StoreOptions, ThemeStore};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ThemeConfig::new(vec![
//!     ThemeDimension::new("colorScheme")
//!         .with_option(ThemeOption::new("system").with_rule(EnvironmentalRule::new(
//!             "(prefers-color-scheme: dark)",
//!             "dark",
//!             "light",
//!         )))
//!         .with_option("light")
//!         .with_option("dark"),
//! ])?;
//!
//! let store = ThemeStore::new(StoreOptions::new(config))?;
//! let subscription = store.subscribe(|selection, resolved| {
//!     println!("{selection} -> {resolved}");
//! });
//! store.restore().await;
//! store.set_selection([("colorScheme", "dark")]).await?;
//! subscription.unsubscribe();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod types;

pub use cache::ResolutionCache;
pub use types::{
    DEFAULT_STORE_KEY, LifecyclePolicy, ResolvedSelection, Selection, StoreOptions,
};

use crate::common::{StorageError, StoreError, lock};
use crate::config::{EnvironmentalRule, ThemeConfig, ThemeOption};
use crate::registry::RegistryInner;
use crate::signal::{SignalCallback, SignalSource};
use crate::storage::{StorageAdapter, StorageEvent, WatchHandle};
use serde_json::Value;
use std::sync::{Arc, Mutex, Weak};
use tokio_util::sync::CancellationToken;

/// Callback receiving the selection and its resolution after every change.
pub type Listener = Arc<dyn Fn(&Selection, &ResolvedSelection) + Send + Sync>;

#[derive(Default)]
struct ListenerSet {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

pub struct ThemeStore {
    key: String,
    config: ThemeConfig,
    defaults: Selection,
    lifecycle: LifecyclePolicy,
    storage: Arc<dyn StorageAdapter>,
    signals: Arc<dyn SignalSource>,
    token: CancellationToken,
    current: Mutex<Selection>,
    cache: Mutex<ResolutionCache>,
    listeners: Mutex<ListenerSet>,
    registry: Mutex<Option<Weak<RegistryInner>>>,
    weak_self: Weak<ThemeStore>,
}

impl ThemeStore {
    /// Creates a store and its storage adapter.
    ///
    /// The initial selection is the sanitized `initial_selection` over the
    /// configuration defaults; call [`restore`](Self::restore) to load the
    /// persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] when the storage factory fails.
    pub fn new(options: StoreOptions) -> Result<Arc<Self>, StoreError> {
        let StoreOptions {
            key,
            config,
            initial_selection,
            storage,
            signals,
            lifecycle,
        } = options;

        let defaults = config.default_selection();
        let current = match initial_selection {
            Some(initial) => sanitize(&config, &initial, "initial selection"),
            None => defaults.clone(),
        };

        let token = CancellationToken::new();
        let storage = storage(token.clone())?;

        log::debug!("Created theme store '{key}' with selection: {current}");

        Ok(Arc::new_cyclic(|weak_self| Self {
            key,
            config,
            defaults,
            lifecycle,
            storage,
            signals,
            token,
            current: Mutex::new(current),
            cache: Mutex::new(ResolutionCache::new()),
            listeners: Mutex::new(ListenerSet::default()),
            registry: Mutex::new(None),
            weak_self: weak_self.clone(),
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &ThemeConfig {
        &self.config
    }

    pub fn default_selection(&self) -> &Selection {
        &self.defaults
    }

    pub fn lifecycle(&self) -> LifecyclePolicy {
        self.lifecycle
    }

    pub fn is_destroyed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.listeners).listeners.len()
    }

    /// Number of environmentally resolved (dimension, option) pairs cached.
    pub fn resolved_option_count(&self) -> usize {
        lock(&self.cache).len()
    }

    /// The current selection.
    pub fn selection(&self) -> Selection {
        lock(&self.current).clone()
    }

    /// The effective value of every selected option.
    ///
    /// Never fails: options that cannot be resolved in the current
    /// environment are returned as their own key and a warning is logged.
    pub fn resolved_selection(&self) -> ResolvedSelection {
        let current = self.selection();
        self.resolve(&current)
    }

    /// Merges `partial` into the selection, notifies subscribers, then
    /// persists the result.
    ///
    /// Subscribers are notified before the write is awaited. When the
    /// adapter can broadcast, the persisted record is broadcast after the
    /// write succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownDimension`] or
    /// [`StoreError::UnknownOption`] without changing anything when `partial`
    /// does not fit the configuration, and [`StoreError::Storage`] when the
    /// write fails.
    pub async fn set_selection(&self, partial: impl Into<Selection>) -> Result<(), StoreError> {
        let partial = partial.into();
        self.validate(&partial)?;

        let current = {
            let mut current = lock(&self.current);
            current.merge(&partial);
            current.clone()
        };
        self.publish(&current);
        self.persist(&current).await
    }

    /// Replaces the selection with the persisted record.
    ///
    /// A missing record, a malformed record, or a failed read all restore
    /// the default selection.
    pub async fn restore(&self) {
        let persisted = match self.storage.get_item(&self.key).await {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Failed to read persisted themes for '{}': {e}", self.key);
                None
            }
        };

        let next = persisted
            .as_ref()
            .and_then(|record| self.record_to_selection(record))
            .unwrap_or_else(|| self.defaults.clone());

        *lock(&self.current) = next.clone();
        self.publish(&next);
    }

    /// Resets the selection to the defaults and drops the persisted record.
    ///
    /// Adapters without the remove capability get the defaults written
    /// instead.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let defaults = self.defaults.clone();
        *lock(&self.current) = defaults.clone();
        self.publish(&defaults);

        match self.storage.remover() {
            Some(remover) => {
                remover.remove_item(&self.key).await?;
                if let Some(broadcaster) = self.storage.broadcaster() {
                    broadcaster.broadcast(&self.key, None);
                }
                Ok(())
            }
            None => self.persist(&defaults).await,
        }
    }

    /// Follows changes persisted by other instances under this store's key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WatchUnsupported`] immediately when the adapter
    /// cannot watch, and [`StoreError::Destroyed`] on a destroyed store.
    pub fn sync(&self) -> Result<WatchHandle, StoreError> {
        if self.is_destroyed() {
            return Err(StoreError::Destroyed {
                key: self.key.clone(),
            });
        }

        let watcher = self
            .storage
            .watcher()
            .ok_or_else(|| StoreError::WatchUnsupported {
                key: self.key.clone(),
            })?;

        let key = self.key.clone();
        let weak = self.weak_self.clone();
        let handle = watcher.watch(Arc::new(move |event: &StorageEvent| {
            if event.key != key {
                return;
            }
            if let Some(store) = weak.upgrade() {
                store.apply_external(event.value.as_ref());
            }
        }))?;

        log::debug!("Store '{}' is syncing with external changes", self.key);
        Ok(handle)
    }

    /// Registers `listener` for every future change.
    ///
    /// Under [`LifecyclePolicy::DestroyWhenUnobserved`], unsubscribing the
    /// last listener destroys the store.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Selection, &ResolvedSelection) + Send + Sync + 'static,
    {
        let mut set = lock(&self.listeners);
        let id = set.next_id;
        set.next_id += 1;
        set.listeners.push((id, Arc::new(listener)));

        Subscription {
            store: self.weak_self.clone(),
            id,
        }
    }

    /// Stops every signal observer and watch registration, drops all
    /// subscribers and leaves the registry. Calling it again does nothing.
    pub fn destroy(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        lock(&self.listeners).listeners.clear();

        let registry = lock(&self.registry).take();
        if let Some(registry) = registry.and_then(|registry| registry.upgrade()) {
            registry.release(&self.key, self);
        }

        log::info!("Destroyed theme store '{}'", self.key);
    }

    pub(crate) fn attach_registry(&self, registry: Weak<RegistryInner>) {
        *lock(&self.registry) = Some(registry);
    }

    fn unsubscribe(&self, id: u64) {
        let remaining = {
            let mut set = lock(&self.listeners);
            let before = set.listeners.len();
            set.listeners.retain(|(listener_id, _)| *listener_id != id);
            if set.listeners.len() == before {
                return;
            }
            set.listeners.len()
        };

        if remaining == 0 && self.lifecycle == LifecyclePolicy::DestroyWhenUnobserved {
            log::debug!("Last subscriber of '{}' left", self.key);
            self.destroy();
        }
    }

    fn validate(&self, partial: &Selection) -> Result<(), StoreError> {
        for (dimension, option) in partial.iter() {
            let declared =
                self.config
                    .dimension(dimension)
                    .ok_or_else(|| StoreError::UnknownDimension {
                        dimension: dimension.to_string(),
                    })?;
            if declared.option(option).is_none() {
                return Err(StoreError::UnknownOption {
                    dimension: dimension.to_string(),
                    option: option.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn persist(&self, selection: &Selection) -> Result<(), StoreError> {
        let record = serde_json::to_value(selection).map_err(StorageError::from)?;
        self.storage.set_item(&self.key, &record).await?;
        if let Some(broadcaster) = self.storage.broadcaster() {
            broadcaster.broadcast(&self.key, Some(&record));
        }
        Ok(())
    }

    fn apply_external(&self, record: Option<&Value>) {
        let next = record
            .and_then(|record| self.record_to_selection(record))
            .unwrap_or_else(|| self.defaults.clone());

        {
            let mut current = lock(&self.current);
            if *current == next {
                return;
            }
            *current = next.clone();
        }

        log::debug!("Store '{}' picked up external change: {next}", self.key);
        self.publish(&next);
    }

    fn record_to_selection(&self, record: &Value) -> Option<Selection> {
        let origin = format!("persisted record '{}'", self.key);
        let map = match record {
            Value::Null => return None,
            Value::Object(map) => map,
            other => {
                log::warn!("Ignoring {origin}: expected an object, found {other}");
                return None;
            }
        };

        let candidate: Selection = map
            .iter()
            .filter_map(|(dimension, option)| match option.as_str() {
                Some(option) => Some((dimension.clone(), option.to_string())),
                None => {
                    log::warn!("Ignoring non-string option for '{dimension}' in {origin}");
                    None
                }
            })
            .collect();

        Some(sanitize(&self.config, &candidate, &origin))
    }

    fn publish(&self, current: &Selection) {
        let resolved = self.resolve(current);
        self.notify(current, &resolved);
    }

    fn notify(&self, current: &Selection, resolved: &ResolvedSelection) {
        if self.is_destroyed() {
            return;
        }
        let listeners: Vec<Listener> = lock(&self.listeners)
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(current, resolved);
        }
    }

    fn resolve(&self, selection: &Selection) -> ResolvedSelection {
        selection
            .iter()
            .map(|(dimension, option)| (dimension, self.resolve_option(dimension, option)))
            .collect()
    }

    fn resolve_option(&self, dimension: &str, option: &str) -> String {
        let Some(rule) = self
            .config
            .option(dimension, option)
            .and_then(ThemeOption::rule)
        else {
            return option.to_string();
        };

        if let Some(cached) = lock(&self.cache).get(dimension, option) {
            return cached.to_string();
        }

        // The signal is queried without holding any store lock: sources may
        // notify observers, and observers lock the store.
        let active = match self.signals.query(&rule.signal) {
            Ok(active) => active,
            Err(e) => {
                log::warn!("Option '{option}' of '{dimension}' left unresolved: {e}");
                return option.to_string();
            }
        };

        let (value, created) =
            lock(&self.cache).insert_if_absent(dimension, option, rule.pick(active));
        if created {
            self.observe(dimension, option, rule);
        }
        value
    }

    fn observe(&self, dimension: &str, option: &str, rule: &EnvironmentalRule) {
        if self.is_destroyed() {
            return;
        }

        let weak = self.weak_self.clone();
        let observed_dimension = dimension.to_string();
        let observed_option = option.to_string();
        let observed_rule = rule.clone();
        let callback: SignalCallback = Arc::new(move |active| {
            if let Some(store) = weak.upgrade() {
                store.on_signal_change(
                    &observed_dimension,
                    &observed_option,
                    observed_rule.pick(active),
                );
            }
        });

        match self
            .signals
            .observe(&rule.signal, self.token.child_token(), callback)
        {
            Ok(()) => log::debug!(
                "Store '{}' observes '{}' for {dimension}={option}",
                self.key,
                rule.signal
            ),
            Err(e) => log::warn!(
                "Changes of '{}' will not update {dimension}={option}: {e}",
                rule.signal
            ),
        }
    }

    fn on_signal_change(&self, dimension: &str, option: &str, value: &str) {
        lock(&self.cache).update(dimension, option, value);

        let current = self.selection();
        if current.get(dimension) != Some(option) {
            return;
        }
        self.publish(&current);
    }
}

impl Drop for ThemeStore {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for ThemeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeStore")
            .field("key", &self.key)
            .field("selection", &*lock(&self.current))
            .field("lifecycle", &self.lifecycle)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`ThemeStore::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    store: Weak<ThemeStore>,
    id: u64,
}

impl Subscription {
    /// Removes the listener. May destroy the store, depending on its
    /// [`LifecyclePolicy`].
    pub fn unsubscribe(self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}

/// Every configured dimension, taking valid options from `candidate` and
/// defaults for the rest.
fn sanitize(config: &ThemeConfig, candidate: &Selection, origin: &str) -> Selection {
    for (dimension, _) in candidate.iter() {
        if config.dimension(dimension).is_none() {
            log::warn!("Ignoring unknown dimension '{dimension}' from {origin}");
        }
    }

    config
        .dimensions()
        .iter()
        .filter_map(|dimension| {
            let fallback = dimension.default_option()?.key();
            let chosen = match candidate.get(dimension.name()) {
                Some(option) if dimension.option(option).is_some() => option,
                Some(option) => {
                    log::warn!(
                        "Option '{option}' from {origin} is not valid for '{}', using '{fallback}'",
                        dimension.name()
                    );
                    fallback
                }
                None => fallback,
            };
            Some((dimension.name(), chosen))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeDimension;
    use crate::signal::ManualSignals;
    use crate::storage::MemoryStorage;

    const DARK: &str = "(prefers-color-scheme: dark)";

    #[test]
    fn test_recreated_stores_do_not_accumulate_registrations() {
        let config = ThemeConfig::new(vec![
            ThemeDimension::new("colorScheme")
                .with_option(
                    ThemeOption::new("system")
                        .with_rule(EnvironmentalRule::new(DARK, "dark", "light")),
                )
                .with_option("light"),
        ])
        .unwrap();
        let storage = MemoryStorage::new();
        let signals = ManualSignals::new();

        for _ in 0..200 {
            let store = ThemeStore::new(
                StoreOptions::new(config.clone())
                    .with_storage(storage.factory())
                    .with_signals(Arc::new(signals.clone())),
            )
            .unwrap();
            assert_eq!(store.resolved_selection().get("colorScheme"), Some("light"));
            let _handle = store.sync().unwrap();
            store.destroy();
        }

        assert!(storage.registration_count() <= 1);
        assert!(signals.registration_count(DARK) <= 1);
        assert_eq!(storage.watcher_count(), 0);
        assert_eq!(signals.observer_count(DARK), 0);
    }
}
