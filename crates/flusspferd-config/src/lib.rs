//! Flusspferd Configuration System
//!
//! Configuration for embedders and for the reference shell:
//! - Shell settings (prelude script, history file)
//! - Collector settings (allocation threshold, call depth limit)
//! - Capability grants (environment variables, readable paths)
//!
//! # Configuration Hierarchy
//!
//! Configuration is resolved in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Config file: explicit path, else `./flusspferd.toml`, else `~/.flusspferd/config.toml`
//! 3. Environment variables (`FLUSSPFERD_*`)
//! 4. CLI flags (handled by the caller)
//!
//! # Example
//!
//! ```no_run
//! use flusspferd_config::ConfigLoader;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load(None).unwrap();
//! println!("gc threshold: {}", config.runtime.gc_threshold);
//! ```

pub mod config;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use config::{expand_home, Config, PermissionsConfig, RuntimeConfig, ShellConfig};
pub use loader::ConfigLoader;
