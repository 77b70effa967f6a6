use super::{LoggingConfig, defaults::*, validation::ConfigValidationError};
use crate::themes::ThemesFormat;
use engine::StorageError;
use engine::storage::{FileStorage, MemoryStorage, StorageFactory};
use engine::store::{DEFAULT_STORE_KEY, LifecyclePolicy};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Where selections are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// One JSON file per key in the data directory; survives restarts
    #[default]
    Durable,
    /// Files under the temporary directory, scoped to `session_id`
    Session,
    /// Process memory; gone when the command exits
    Memory,
}

/// Main application configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppConfig {
    store_key: Option<String>,
    #[serde(default)]
    storage: StorageKind,
    storage_dir: Option<String>,
    session_id: Option<String>,
    themes_file: Option<String>,
    #[serde(default)]
    lifecycle: LifecyclePolicy,
    refresh_interval_ms: Option<u64>,
    #[serde(default)]
    logging: LoggingConfig,
}

impl AppConfig {
    /// Validate the configuration against defined limits
    pub fn validate(&self) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        if self.store_key.as_deref().is_some_and(str::is_empty) {
            errors.push(ConfigValidationError::EmptyStoreKey);
        }

        if self.storage == StorageKind::Session && self.session_id.is_none() {
            errors.push(ConfigValidationError::MissingSessionId);
        }

        if let Some(path) = self.themes_file() {
            if ThemesFormat::from_path(path).is_none() {
                errors.push(ConfigValidationError::ThemesFileFormat {
                    path: path.display().to_string(),
                });
            }
        }

        let interval = self.refresh_interval_ms();
        if !(MIN_REFRESH_INTERVAL_MS..=MAX_REFRESH_INTERVAL_MS).contains(&interval) {
            errors.push(ConfigValidationError::RefreshInterval {
                configured: interval,
                min_limit: MIN_REFRESH_INTERVAL_MS,
                max_limit: MAX_REFRESH_INTERVAL_MS,
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn store_key(&self) -> &str {
        self.store_key.as_deref().unwrap_or(DEFAULT_STORE_KEY)
    }

    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref().map(Path::new)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn themes_file(&self) -> Option<&Path> {
        self.themes_file.as_deref().map(Path::new)
    }

    pub fn lifecycle(&self) -> LifecyclePolicy {
        self.lifecycle
    }

    pub fn refresh_interval_ms(&self) -> u64 {
        self.refresh_interval_ms
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_MS)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms())
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    // Command line overrides

    pub fn set_store_key(&mut self, key: impl Into<String>) {
        self.store_key = Some(key.into());
    }

    pub fn set_storage(&mut self, storage: StorageKind) {
        self.storage = storage;
    }

    pub fn set_themes_file(&mut self, path: impl Into<String>) {
        self.themes_file = Some(path.into());
    }

    /// Storage adapter factory for the configured storage kind.
    pub fn storage_factory(&self) -> Result<StorageFactory, StorageError> {
        let factory = match self.storage {
            StorageKind::Durable => match self.storage_dir() {
                Some(dir) => FileStorage::durable(dir).factory(),
                None => FileStorage::default_durable()?.factory(),
            },
            StorageKind::Session => {
                FileStorage::session(self.session_id().unwrap_or_default()).factory()
            }
            StorageKind::Memory => MemoryStorage::new().factory(),
        };
        Ok(factory)
    }
}
