//! Declarative theme configuration.
//!
//! A [`ThemeConfig`] is an ordered set of [`ThemeDimension`]s, each with an
//! ordered set of [`ThemeOption`]s. Configurations are validated once, when
//! built or deserialized, and are immutable afterwards.
//!
//! Two serialized forms are accepted. The keyed form:
//!
//! ```toml
//! [colorScheme]
//! label = "Color scheme"
//!
//! [colorScheme.options.system]
//! value = "System"
//! is_default = true
//! media = { query = "(prefers-color-scheme: dark)", if_match = "dark", if_not_match = "light" }
//!
//! [colorScheme.options.light]
//! [colorScheme.options.dark]
//! ```
//!
//! and the shorthand form, where a plain string is an option without a rule
//! and `media` may be a `[query, if_match, if_not_match]` triple:
//!
//! ```toml
//! colorScheme = [
//!     { value = "system", media = ["(prefers-color-scheme: dark)", "dark", "light"] },
//!     "light",
//!     "dark",
//! ]
//! contrast = ["standard", "high"]
//! ```

use crate::common::ConfigError;
use crate::store::Selection;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

/// Resolves an option through an environmental signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentalRule {
    pub signal: String,
    pub if_active: String,
    pub if_inactive: String,
}

impl EnvironmentalRule {
    pub fn new(
        signal: impl Into<String>,
        if_active: impl Into<String>,
        if_inactive: impl Into<String>,
    ) -> Self {
        Self {
            signal: signal.into(),
            if_active: if_active.into(),
            if_inactive: if_inactive.into(),
        }
    }

    /// The effective value for a given signal state.
    pub fn pick(&self, active: bool) -> &str {
        if active {
            &self.if_active
        } else {
            &self.if_inactive
        }
    }
}

/// One selectable option within a dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeOption {
    key: String,
    value: String,
    is_default: bool,
    rule: Option<EnvironmentalRule>,
}

impl ThemeOption {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            value: key.clone(),
            key,
            is_default: false,
            rule: None,
        }
    }

    /// Display value shown by selection controls; defaults to the key.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_rule(mut self, rule: EnvironmentalRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn rule(&self) -> Option<&EnvironmentalRule> {
        self.rule.as_ref()
    }
}

impl From<&str> for ThemeOption {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// A named axis of preference with its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeDimension {
    name: String,
    label: String,
    options: Vec<ThemeOption>,
    default_index: usize,
}

impl ThemeDimension {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            options: Vec::new(),
            default_index: 0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_option(mut self, option: impl Into<ThemeOption>) -> Self {
        self.options.push(option.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn options(&self) -> &[ThemeOption] {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&ThemeOption> {
        self.options.iter().find(|option| option.key == key)
    }

    /// The option marked default, or else the first declared option.
    ///
    /// `None` only for a dimension without options, which never passes
    /// [`ThemeConfig::new`].
    pub fn default_option(&self) -> Option<&ThemeOption> {
        self.options.get(self.default_index)
    }

    fn normalize(mut self) -> Result<Self, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyIdentifier {
                dimension: self.name,
            });
        }
        if self.options.is_empty() {
            return Err(ConfigError::EmptyDimension {
                dimension: self.name,
            });
        }

        let mut seen = HashSet::new();
        let mut default_index: Option<usize> = None;
        for (index, option) in self.options.iter().enumerate() {
            if option.key.is_empty() {
                return Err(ConfigError::EmptyIdentifier {
                    dimension: self.name.clone(),
                });
            }
            if !seen.insert(option.key.as_str()) {
                return Err(ConfigError::DuplicateOption {
                    dimension: self.name.clone(),
                    option: option.key.clone(),
                });
            }
            if option.is_default {
                if let Some(first) = default_index {
                    return Err(ConfigError::MultipleDefaults {
                        dimension: self.name.clone(),
                        first: self.options[first].key.clone(),
                        second: option.key.clone(),
                    });
                }
                default_index = Some(index);
            }
        }

        self.default_index = default_index.unwrap_or(0);
        Ok(self)
    }
}

/// Summary of one dimension for building selection controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionSummary {
    pub key: String,
    pub label: String,
    /// `(option key, display value)` in declaration order.
    pub options: Vec<(String, String)>,
}

/// Validated, immutable theme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawThemeConfig")]
pub struct ThemeConfig {
    dimensions: Vec<ThemeDimension>,
}

impl ThemeConfig {
    /// Validates `dimensions` and resolves each dimension's default.
    pub fn new(dimensions: Vec<ThemeDimension>) -> Result<Self, ConfigError> {
        if dimensions.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(dimensions.len());
        for dimension in dimensions {
            if !seen.insert(dimension.name.clone()) {
                return Err(ConfigError::DuplicateDimension {
                    dimension: dimension.name,
                });
            }
            normalized.push(dimension.normalize()?);
        }

        Ok(Self {
            dimensions: normalized,
        })
    }

    pub fn dimensions(&self) -> &[ThemeDimension] {
        &self.dimensions
    }

    pub fn dimension(&self, name: &str) -> Option<&ThemeDimension> {
        self.dimensions.iter().find(|dimension| dimension.name == name)
    }

    /// Looks up `option` within `dimension`.
    pub fn option(&self, dimension: &str, option: &str) -> Option<&ThemeOption> {
        self.dimension(dimension)?.option(option)
    }

    /// Per dimension, the option marked default or else the first option.
    pub fn default_selection(&self) -> Selection {
        self.dimensions
            .iter()
            .filter_map(|dimension| {
                dimension
                    .default_option()
                    .map(|option| (dimension.name.clone(), option.key.clone()))
            })
            .collect()
    }

    /// Dimensions and their options in declaration order.
    pub fn dimensions_and_options(&self) -> Vec<DimensionSummary> {
        self.dimensions
            .iter()
            .map(|dimension| DimensionSummary {
                key: dimension.name.clone(),
                label: dimension.label.clone(),
                options: dimension
                    .options
                    .iter()
                    .map(|option| (option.key.clone(), option.value.clone()))
                    .collect(),
            })
            .collect()
    }
}

// Serialized forms

#[derive(Deserialize)]
struct RawThemeConfig(#[serde(deserialize_with = "ordered_map")] Vec<(String, RawDimension)>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDimension {
    Shorthand(Vec<RawShorthandOption>),
    Keyed {
        label: Option<String>,
        #[serde(deserialize_with = "ordered_map")]
        options: Vec<(String, RawKeyedOption)>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawShorthandOption {
    Key(String),
    Detailed {
        value: String,
        #[serde(default, alias = "isDefault")]
        is_default: bool,
        media: Option<RawMedia>,
    },
}

#[derive(Deserialize)]
struct RawKeyedOption {
    value: Option<String>,
    #[serde(default, alias = "isDefault")]
    is_default: bool,
    media: Option<RawMedia>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMedia {
    Triple(String, String, String),
    Keyed {
        #[serde(alias = "signal")]
        query: String,
        #[serde(alias = "ifMatch", alias = "if_active")]
        if_match: String,
        #[serde(alias = "ifNotMatch", alias = "if_inactive")]
        if_not_match: String,
    },
}

impl From<RawMedia> for EnvironmentalRule {
    fn from(media: RawMedia) -> Self {
        match media {
            RawMedia::Triple(query, if_match, if_not_match)
            | RawMedia::Keyed {
                query,
                if_match,
                if_not_match,
            } => EnvironmentalRule::new(query, if_match, if_not_match),
        }
    }
}

fn build_option(
    key: String,
    value: Option<String>,
    is_default: bool,
    media: Option<RawMedia>,
) -> ThemeOption {
    let mut option = ThemeOption::new(key);
    if let Some(value) = value {
        option = option.with_value(value);
    }
    if is_default {
        option = option.as_default();
    }
    if let Some(media) = media {
        option = option.with_rule(media.into());
    }
    option
}

impl TryFrom<RawThemeConfig> for ThemeConfig {
    type Error = ConfigError;

    fn try_from(raw: RawThemeConfig) -> Result<Self, Self::Error> {
        let dimensions = raw
            .0
            .into_iter()
            .map(|(name, raw_dimension)| match raw_dimension {
                RawDimension::Shorthand(options) => options.into_iter().fold(
                    ThemeDimension::new(name),
                    |dimension, option| {
                        dimension.with_option(match option {
                            RawShorthandOption::Key(key) => ThemeOption::new(key),
                            RawShorthandOption::Detailed {
                                value,
                                is_default,
                                media,
                            } => build_option(value, None, is_default, media),
                        })
                    },
                ),
                RawDimension::Keyed { label, options } => {
                    let mut dimension = ThemeDimension::new(name);
                    if let Some(label) = label {
                        dimension = dimension.with_label(label);
                    }
                    options.into_iter().fold(dimension, |dimension, (key, option)| {
                        dimension.with_option(build_option(
                            key,
                            option.value,
                            option.is_default,
                            option.media,
                        ))
                    })
                }
            })
            .collect();

        ThemeConfig::new(dimensions)
    }
}

/// Deserializes a map into a `Vec` of entries, keeping document order.
fn ordered_map<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct OrderedMapVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dimension(name: &str, options: &[&str]) -> ThemeDimension {
        options
            .iter()
            .fold(ThemeDimension::new(name), |d, key| d.with_option(*key))
    }

    #[test]
    fn test_default_is_first_option_without_mark() {
        let config = ThemeConfig::new(vec![dimension("contrast", &["standard", "high"])]).unwrap();
        assert_eq!(
            config
                .dimension("contrast")
                .and_then(ThemeDimension::default_option)
                .map(ThemeOption::key),
            Some("standard")
        );
    }

    #[test]
    fn test_unnormalized_empty_dimension_has_no_default() {
        assert_eq!(ThemeDimension::new("contrast").default_option(), None);
    }

    #[test]
    fn test_marked_default_wins() {
        let config = ThemeConfig::new(vec![
            ThemeDimension::new("contrast")
                .with_option("standard")
                .with_option(ThemeOption::new("high").as_default()),
        ])
        .unwrap();
        assert_eq!(config.default_selection().get("contrast"), Some("high"));
    }

    #[test]
    fn test_two_defaults_are_rejected() {
        let err = ThemeConfig::new(vec![
            ThemeDimension::new("contrast")
                .with_option(ThemeOption::new("standard").as_default())
                .with_option(ThemeOption::new("high").as_default()),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MultipleDefaults {
                dimension: "contrast".to_string(),
                first: "standard".to_string(),
                second: "high".to_string(),
            }
        );
    }

    #[test]
    fn test_label_defaults_to_name() {
        let d = ThemeDimension::new("contrast");
        assert_eq!(d.label(), "contrast");
    }
}
