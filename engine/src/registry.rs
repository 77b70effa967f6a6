//! Keyed registry of theme stores.
//!
//! A [`StoreRegistry`] holds at most one live [`ThemeStore`] per key. Hosts
//! either pass a registry around or use the process-wide
//! [`StoreRegistry::global`] instance. Separate registries never share
//! stores.

use crate::common::{RegistryError, StoreError, lock};
use crate::store::{StoreOptions, ThemeStore};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

static GLOBAL_REGISTRY: Lazy<StoreRegistry> = Lazy::new(StoreRegistry::new);

#[derive(Default)]
pub(crate) struct RegistryInner {
    stores: Mutex<HashMap<String, Arc<ThemeStore>>>,
}

impl RegistryInner {
    /// Drops the entry for `key` if it still refers to `store`.
    pub(crate) fn release(&self, key: &str, store: &ThemeStore) {
        let mut stores = lock(&self.stores);
        if stores
            .get(key)
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), store))
        {
            stores.remove(key);
            log::debug!("Released theme store '{key}' from registry");
        }
    }
}

#[derive(Clone, Default)]
pub struct StoreRegistry {
    inner: Arc<RegistryInner>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static StoreRegistry {
        &GLOBAL_REGISTRY
    }

    /// Creates a store and registers it under `options.key`.
    ///
    /// An existing store under the same key is destroyed and replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] when the storage factory fails; the
    /// existing store, if any, is left in place.
    pub fn create_store(&self, options: StoreOptions) -> Result<Arc<ThemeStore>, StoreError> {
        let store = ThemeStore::new(options)?;
        store.attach_registry(Arc::downgrade(&self.inner));

        let replaced = lock(&self.inner.stores).insert(store.key().to_string(), store.clone());
        if let Some(previous) = replaced {
            log::info!("Replacing theme store '{}'", previous.key());
            previous.destroy();
        }

        Ok(store)
    }

    /// Returns the live store registered under `key`.
    pub fn get_store(&self, key: &str) -> Result<Arc<ThemeStore>, RegistryError> {
        lock(&self.inner.stores)
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.inner.stores).contains_key(key)
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.inner.stores).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.stores).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys and unregisters the store under `key`.
    pub fn remove(&self, key: &str) -> Result<(), RegistryError> {
        let store = lock(&self.inner.stores)
            .remove(key)
            .ok_or_else(|| RegistryError::NotFound {
                key: key.to_string(),
            })?;
        store.destroy();
        Ok(())
    }

    /// Destroys every registered store.
    pub fn destroy_all(&self) {
        let stores: Vec<Arc<ThemeStore>> = lock(&self.inner.stores)
            .drain()
            .map(|(_, store)| store)
            .collect();
        for store in stores {
            store.destroy();
        }
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
