use crate::error::{AppError, AppResult};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

pub mod app;
pub mod defaults;
pub mod validation;

pub use app::{AppConfig, StorageKind};
pub use validation::ConfigValidationError;

/// Loads `config.toml` (or `path`) and `PALETTEZ_*` environment overrides.
///
/// The default file is optional; an explicit `path` must exist. The result
/// is not validated: apply command-line overrides, then call
/// [`ensure_valid`].
pub fn load_config(path: Option<&Path>) -> AppResult<AppConfig> {
    dotenv::dotenv().ok();
    load_from_sources(path, environment())
}

fn environment() -> Environment {
    Environment::with_prefix(defaults::ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn load_from_sources(path: Option<&Path>, env_source: Environment) -> AppResult<AppConfig> {
    let file_source = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(defaults::DEFAULT_CONFIG_FILE).required(false),
    };

    let config = Config::builder()
        .add_source(file_source)
        .add_source(env_source) // environment entries override file values
        .build()
        .map_err(|e| {
            AppError::Config(format!(
                "Configuration loading failed: {e}. Please check your config.toml file and environment variables."
            ))
        })?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| AppError::Config(format!("Failed to deserialize config: {e}")))?;

    Ok(app_config)
}

/// Runs [`AppConfig::validate`] and reports every problem in one error.
pub fn ensure_valid(app_config: &AppConfig) -> AppResult<()> {
    app_config.validate().map_err(|validation_errors| {
        let error_messages: Vec<String> =
            validation_errors.iter().map(|e| e.user_message()).collect();
        AppError::Config(format!(
            "Configuration validation failed:\n{}",
            error_messages.join("\n\n")
        ))
    })
}

/// Additional logging configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct LoggingConfig {
    level: Option<String>,
    file: Option<String>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("warn")
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }
}
