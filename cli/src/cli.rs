use crate::config::{AppConfig, StorageKind};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Inspect, change and follow theme preferences
#[derive(Parser, Debug)]
#[command(name = "palettez", version, about)]
pub struct Cli {
    /// Configuration file (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store key, overriding `store_key`
    #[arg(short, long, global = true)]
    pub key: Option<String>,

    /// Theme dimensions file (.toml or .json), overriding `themes_file`
    #[arg(short, long, global = true)]
    pub themes: Option<PathBuf>,

    /// Storage backend, overriding `storage`
    #[arg(short, long, global = true, value_enum)]
    pub storage: Option<StorageArg>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List dimensions and their options
    Options,
    /// Print the current selection and its resolved values
    Get {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Change one or more dimensions, e.g. `set colorScheme=dark contrast=high`
    Set {
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
    },
    /// Reset every dimension to its default
    Clear,
    /// Print every change made by other processes or the OS until interrupted
    Watch,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArg {
    Durable,
    Session,
    Memory,
}

impl From<StorageArg> for StorageKind {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Durable => StorageKind::Durable,
            StorageArg::Session => StorageKind::Session,
            StorageArg::Memory => StorageKind::Memory,
        }
    }
}

impl Cli {
    /// Applies command line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(key) = &self.key {
            config.set_store_key(key.clone());
        }
        if let Some(themes) = &self.themes {
            config.set_themes_file(themes.to_string_lossy());
        }
        if let Some(storage) = self.storage {
            config.set_storage(storage.into());
        }
    }
}

/// Parses a `dimension=option` pair.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (dimension, option) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected dimension=option, got '{raw}'"))?;
    let (dimension, option) = (dimension.trim(), option.trim());
    if dimension.is_empty() || option.is_empty() {
        return Err(format!("expected dimension=option, got '{raw}'"));
    }
    Ok((dimension.to_string(), option.to_string()))
}
