//! Configuration file model (`flusspferd.toml` / `~/.flusspferd/config.toml`)

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of allocations between automatic collection cycles.
pub const DEFAULT_GC_THRESHOLD: usize = 8192;

/// Default limit on nested native calls.
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 512;

/// Default interactive history file.
pub const DEFAULT_HISTORY_FILE: &str = "~/.flusspferd-history";

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Shell settings
    pub shell: ShellConfig,

    /// Engine and collector settings
    pub runtime: RuntimeConfig,

    /// Capability grants
    pub permissions: PermissionsConfig,
}

/// Reference shell settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ShellConfig {
    /// Script executed after the configuration has been applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prelude: Option<PathBuf>,

    /// History file for interactive mode; `None` disables history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_file: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prelude: None,
            history_file: Some(DEFAULT_HISTORY_FILE.to_string()),
        }
    }
}

/// Engine and collector settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeConfig {
    /// Allocations between automatic collection cycles (0 disables them)
    pub gc_threshold: usize,

    /// Maximum nesting of native calls before a RangeError is raised
    pub max_call_depth: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc_threshold: DEFAULT_GC_THRESHOLD,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Capability grants
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct PermissionsConfig {
    /// Grant every capability
    pub allow_all: bool,

    /// Environment variables scripts may read (`"*"` for all)
    pub env: Vec<String>,

    /// Paths (recursive) scripts may read
    pub read: Vec<PathBuf>,
}

impl Config {
    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        // Relative prelude paths are relative to the config file
        if let (Some(prelude), Some(dir)) = (config.shell.prelude.as_mut(), path.parent()) {
            if prelude.is_relative() {
                *prelude = dir.join(&*prelude);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.runtime.max_call_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runtime.max_call_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        for var in &self.permissions.env {
            if var.is_empty() || var.contains('=') {
                return Err(ConfigError::InvalidValue {
                    field: "permissions.env".to_string(),
                    reason: format!("'{}' is not an environment variable name", var),
                });
            }
        }

        if let Some(history) = &self.shell.history_file {
            if history.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "shell.history_file".to_string(),
                    reason: "must not be empty (omit it to disable history)".to_string(),
                });
            }
        }

        Ok(())
    }

    /// History file with a leading `~` expanded against the home directory
    pub fn history_path(&self) -> ConfigResult<Option<PathBuf>> {
        let Some(file) = &self.shell.history_file else {
            return Ok(None);
        };
        expand_home(file).map(Some)
    }
}

/// Expand a leading `~/` in `path`
pub fn expand_home(path: &str) -> ConfigResult<PathBuf> {
    if path == "~" {
        return dirs::home_dir().ok_or(ConfigError::HomeNotFound);
    }
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
