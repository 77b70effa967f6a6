use std::fmt::Display;

/// Application-wide error types for the `palettez` command line.
///
/// Engine errors are flattened into messages at this boundary; the command
/// line only needs to report them, never to recover.
///
/// # Error Categories
///
/// - [`Config`] - Application configuration or theme file problems
/// - [`Store`] - Theme store operations (validation, persistence, sync)
/// - [`Registry`] - Store lookups
/// - [`Io`] - Terminal and file system failures
/// - [`Logger`] - Logger installation failures
///
/// [`Config`]: AppError::Config
/// [`Store`]: AppError::Store
/// [`Registry`]: AppError::Registry
/// [`Io`]: AppError::Io
/// [`Logger`]: AppError::Logger
#[derive(Debug, Clone)]
pub enum AppError {
    Config(String),
    Store(String),
    Registry(String),
    Io(String),
    Logger(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration Error: {msg}"),
            AppError::Store(msg) => write!(f, "Theme Store Error: {msg}"),
            AppError::Registry(msg) => write!(f, "Registry Error: {msg}"),
            AppError::Io(msg) => write!(f, "IO Error: {msg}"),
            AppError::Logger(msg) => write!(f, "Logger Error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<engine::StoreError> for AppError {
    fn from(err: engine::StoreError) -> Self {
        AppError::Store(err.to_string())
    }
}

impl From<engine::StorageError> for AppError {
    fn from(err: engine::StorageError) -> Self {
        AppError::Store(err.to_string())
    }
}

impl From<engine::RegistryError> for AppError {
    fn from(err: engine::RegistryError) -> Self {
        AppError::Registry(err.to_string())
    }
}

impl From<engine::ConfigError> for AppError {
    fn from(err: engine::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<log::SetLoggerError> for AppError {
    fn from(err: log::SetLoggerError) -> Self {
        AppError::Logger(err.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
