//! # Palettez Command Line
//!
//! Command-line front end for the theme preference engine: lists the
//! configured dimensions, prints and changes the persisted selection, and
//! follows changes made by other processes or the operating system.
//!
//! ## Modules
//!
//! - [`cli`] - Argument definitions
//! - [`commands`] - Command execution and output rendering
//! - [`config`] - Application configuration loading and validation
//! - [`error`] - Error types
//! - [`logger`] - Logging configuration
//! - [`themes`] - Theme dimension file loading
//!
//! This library interface enables integration testing by providing access to internal modules.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod themes;

pub use error::{AppError, AppResult};
