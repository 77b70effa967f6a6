/// Default theme dimensions embedded in the binary
pub const DEFAULT_THEMES: &str = include_str!("../../themes.default.toml");

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Prefix of environment variable overrides, e.g. `PALETTEZ_LOGGING__LEVEL`
pub const ENV_PREFIX: &str = "PALETTEZ";

// Signal refresh interval bounds for `watch`
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 2_000;
pub const MIN_REFRESH_INTERVAL_MS: u64 = 100;
pub const MAX_REFRESH_INTERVAL_MS: u64 = 60_000;
