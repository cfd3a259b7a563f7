//! Configuration Loader
//!
//! Locates the configuration file and applies environment overrides.

use crate::config::Config;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the per-directory configuration file
pub const LOCAL_CONFIG_FILE: &str = "flusspferd.toml";

/// Configuration loader
///
/// Sources, lowest priority first:
/// 1. Built-in defaults
/// 2. One config file: explicit path, else `./flusspferd.toml`, else `~/.flusspferd/config.toml`
/// 3. Environment variables (`FLUSSPFERD_*`)
pub struct ConfigLoader {
    /// Directory searched for `flusspferd.toml`
    working_dir: Option<PathBuf>,

    /// Cached user config path
    user_config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader that searches the current working directory
    pub fn new() -> Self {
        Self {
            working_dir: None,
            user_config_path: None,
        }
    }

    /// Search `dir` instead of the current working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Use `path` as the user-level config file instead of `~/.flusspferd/config.toml`
    pub fn with_user_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_config_path = Some(path.into());
        self
    }

    /// Load the effective configuration
    ///
    /// An explicit path must exist; the implicit locations are optional.
    pub fn load(&self, explicit: Option<&Path>) -> ConfigResult<Config> {
        let config = match self.locate(explicit)? {
            Some(path) => Config::load_from_file(&path)?,
            None => Config::default(),
        };

        let config = self.apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve which config file (if any) should be read
    pub fn locate(&self, explicit: Option<&Path>) -> ConfigResult<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let working_dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => env::current_dir()?,
        };
        let local = working_dir.join(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Ok(Some(local));
        }

        let user = match &self.user_config_path {
            Some(path) => path.clone(),
            // No home directory simply means no user config
            None => match Self::user_config_dir() {
                Ok(dir) => dir.join("config.toml"),
                Err(_) => return Ok(None),
            },
        };
        Ok(user.is_file().then_some(user))
    }

    /// Apply environment variable overrides
    ///
    /// - `FLUSSPFERD_GC_THRESHOLD=<n>`
    /// - `FLUSSPFERD_MAX_CALL_DEPTH=<n>`
    /// - `FLUSSPFERD_HISTORY_FILE=<path>` (empty disables history)
    /// - `FLUSSPFERD_PRELUDE=<path>`
    fn apply_env_overrides(&self, mut config: Config) -> ConfigResult<Config> {
        if let Ok(threshold) = env::var("FLUSSPFERD_GC_THRESHOLD") {
            config.runtime.gc_threshold = parse_number("FLUSSPFERD_GC_THRESHOLD", &threshold)?;
        }

        if let Ok(depth) = env::var("FLUSSPFERD_MAX_CALL_DEPTH") {
            config.runtime.max_call_depth = parse_number("FLUSSPFERD_MAX_CALL_DEPTH", &depth)?;
        }

        if let Ok(history) = env::var("FLUSSPFERD_HISTORY_FILE") {
            config.shell.history_file = if history.is_empty() {
                None
            } else {
                Some(history)
            };
        }

        if let Ok(prelude) = env::var("FLUSSPFERD_PRELUDE") {
            if !prelude.is_empty() {
                config.shell.prelude = Some(PathBuf::from(prelude));
            }
        }

        Ok(config)
    }

    /// Get the user configuration directory (~/.flusspferd)
    pub fn user_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".flusspferd"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, raw: &str) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: var.to_string(),
        reason: format!("'{}' is not a valid number", raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn isolated_loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_working_dir(dir)
            .with_user_config(dir.join("missing-user-config.toml"))
    }

    #[test]
    fn test_no_config_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = isolated_loader(temp_dir.path()).load(None).unwrap();
        assert_eq!(config.runtime, crate::RuntimeConfig::default());
    }

    #[test]
    fn test_local_file_found() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(LOCAL_CONFIG_FILE),
            "[runtime]\ngc_threshold = 7\n",
        )
        .unwrap();

        let loader = isolated_loader(temp_dir.path());
        assert_eq!(
            loader.locate(None).unwrap(),
            Some(temp_dir.path().join(LOCAL_CONFIG_FILE))
        );
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.toml");
        let result = isolated_loader(temp_dir.path()).load(Some(&missing));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    #[serial]
    fn test_env_disables_history() {
        let temp_dir = TempDir::new().unwrap();
        env::set_var("FLUSSPFERD_HISTORY_FILE", "");

        let config = isolated_loader(temp_dir.path()).load(None).unwrap();
        assert_eq!(config.shell.history_file, None);

        env::remove_var("FLUSSPFERD_HISTORY_FILE");
    }

    #[test]
    #[serial]
    fn test_env_bad_number() {
        let temp_dir = TempDir::new().unwrap();
        env::set_var("FLUSSPFERD_GC_THRESHOLD", "lots");

        let result = isolated_loader(temp_dir.path()).load(None);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        env::remove_var("FLUSSPFERD_GC_THRESHOLD");
    }
}
