//! # Palettez Engine
//!
//! Theme preference resolution, persistence and synchronization.
//! An application declares its theme dimensions once; the engine keeps the
//! user's selection, resolves environment-dependent options into effective
//! values, persists the selection and keeps instances sharing a storage key
//! in sync.
//!
//! ## Modules
//!
//! - [`config`] - Declarative theme configuration and validation
//! - [`signal`] - Environmental signal sources (manual, OS color scheme, headless)
//! - [`storage`] - Storage adapter contract and the memory and file adapters
//! - [`store`] - Theme store: selection, resolution, persistence and sync
//! - [`registry`] - Keyed registry of theme stores
//! - [`fanout`] - Cancellable callback fan-out shared by signals and storage
//! - [`common`] - Error types and shared helpers

pub mod common;
pub mod config;
pub mod fanout;
pub mod registry;
pub mod signal;
pub mod storage;
pub mod store;

pub use common::{ConfigError, RegistryError, SignalError, StorageError, StoreError};
pub use config::{EnvironmentalRule, ThemeConfig, ThemeDimension, ThemeOption};
pub use registry::StoreRegistry;
pub use store::{LifecyclePolicy, ResolvedSelection, Selection, StoreOptions, ThemeStore};
