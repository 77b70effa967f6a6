use crate::config::defaults::DEFAULT_THEMES;
use crate::error::{AppError, AppResult};
use engine::ThemeConfig;
use std::path::Path;

/// Serialized form of a themes file, picked by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemesFormat {
    Toml,
    Json,
}

impl ThemesFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Loads theme dimensions from `path`, or the built-in dimensions.
///
/// Themes files are parsed directly rather than through the `config` crate
/// so that dimension and option order is kept as written.
pub fn load_theme_config(path: Option<&Path>) -> AppResult<ThemeConfig> {
    let Some(path) = path else {
        return parse(DEFAULT_THEMES, ThemesFormat::Toml)
            .map_err(|e| AppError::Config(format!("Built-in themes are invalid: {e}")));
    };

    let format = ThemesFormat::from_path(path).ok_or_else(|| {
        AppError::Config(format!(
            "Unsupported themes file '{}': expected .toml or .json",
            path.display()
        ))
    })?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read themes file '{}': {e}",
            path.display()
        ))
    })?;

    let config = parse(&content, format)
        .map_err(|e| AppError::Config(format!("Invalid themes file '{}': {e}", path.display())))?;
    log::debug!(
        "Loaded {} theme dimension(s) from '{}'",
        config.dimensions().len(),
        path.display()
    );
    Ok(config)
}

fn parse(content: &str, format: ThemesFormat) -> Result<ThemeConfig, String> {
    match format {
        ThemesFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        ThemesFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
    }
}
