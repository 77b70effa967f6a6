/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid refresh_interval_ms: {configured} (min: {min_limit}, max: {max_limit})")]
    RefreshInterval {
        configured: u64,
        min_limit: u64,
        max_limit: u64,
    },
    #[error("storage = \"session\" requires session_id")]
    MissingSessionId,
    #[error("Invalid store_key: must not be empty")]
    EmptyStoreKey,
    #[error("Invalid themes_file: '{path}' has unsupported extension (expected .toml or .json)")]
    ThemesFileFormat { path: String },
}

impl ConfigValidationError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigValidationError::RefreshInterval {
                configured,
                min_limit,
                max_limit,
            } => {
                format!(
                    "Signal refresh interval out of range!\n\n\
                    Your configured value: {configured} ms\n\
                    Valid range: {min_limit} - {max_limit} ms\n\n\
                    Please update refresh_interval_ms in config.toml."
                )
            }
            ConfigValidationError::MissingSessionId => {
                "Session storage needs a session id!\n\n\
                Please set session_id in config.toml or PALETTEZ_SESSION_ID."
                    .to_string()
            }
            ConfigValidationError::EmptyStoreKey => {
                "Store key is empty!\n\n\
                Please set store_key in config.toml to a non-empty value or remove it."
                    .to_string()
            }
            ConfigValidationError::ThemesFileFormat { path } => {
                format!(
                    "Unsupported themes file!\n\n\
                    Configured file: {path}\n\n\
                    Theme dimensions are read from .toml or .json files."
                )
            }
        }
    }
}
