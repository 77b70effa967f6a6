use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while normalizing a theme configuration.
///
/// Configuration problems are fatal at construction time: a [`ThemeConfig`]
/// that fails normalization never reaches a store.
///
/// [`ThemeConfig`]: crate::config::ThemeConfig
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Theme configuration must declare at least one dimension")]
    Empty,

    #[error("Dimension '{dimension}' must declare at least one option")]
    EmptyDimension { dimension: String },

    #[error("Dimension '{dimension}' is declared more than once")]
    DuplicateDimension { dimension: String },

    #[error("Option '{option}' is declared more than once in dimension '{dimension}'")]
    DuplicateOption { dimension: String, option: String },

    #[error("Dimension '{dimension}' marks both '{first}' and '{second}' as default")]
    MultipleDefaults {
        dimension: String,
        first: String,
        second: String,
    },

    #[error("Identifiers must not be empty (dimension '{dimension}')")]
    EmptyIdentifier { dimension: String },
}

/// Errors reported by storage adapters.
///
/// The store recovers read failures locally by falling back to the default
/// selection; write failures are returned to the caller.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Persisted record could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Filesystem watcher failed: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Watching storage requires a running tokio runtime")]
    NoRuntime,

    #[error("No data directory is available on this platform")]
    NoDataDirectory,

    #[error("Storage backend failed: {reason}")]
    Backend { reason: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors reported by environmental signal sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("Signal '{signal}' cannot be resolved without an interactive environment")]
    NonInteractive { signal: String },

    #[error("Signal '{signal}' is not supported by this signal source")]
    Unsupported { signal: String },

    #[error("Signal detection failed: {reason}")]
    Detection { reason: String },
}

/// Errors returned by [`ThemeStore`] operations.
///
/// [`ThemeStore`]: crate::store::ThemeStore
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Storage for store '{key}' has no watch capability; sync is unavailable")]
    WatchUnsupported { key: String },

    #[error("Store '{key}' has been destroyed")]
    Destroyed { key: String },

    #[error("Unknown dimension '{dimension}'")]
    UnknownDimension { dimension: String },

    #[error("Unknown option '{option}' for dimension '{dimension}'")]
    UnknownOption { dimension: String, option: String },
}

/// Errors returned by [`StoreRegistry`] lookups.
///
/// [`StoreRegistry`]: crate::registry::StoreRegistry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Theme store with key '{key}' could not be found. Create it with key '{key}' first.")]
    NotFound { key: String },
}
