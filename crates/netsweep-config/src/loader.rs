//! TOML loading with `${VAR}` substitution.

use std::io;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid"));

pub struct ConfigLoader;

impl ConfigLoader {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::Io(e),
        })?;
        Self::load_str(&content)
    }

    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        Ok(toml::from_str(&expanded)?)
    }

    /// Load `path` if given, otherwise fall back to defaults.
    ///
    /// An explicitly named file that does not exist is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Config::default()),
        }
    }

    /// Substitute every `${VAR}` in one pass. The first unset variable
    /// fails the whole load.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut missing = None;
        let expanded = ENV_VAR.replace_all(content, |cap: &Captures<'_>| {
            let name = &cap[1];
            std::env::var(name).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            })
        });
        match missing {
            Some(name) => Err(ConfigError::EnvVarNotSet(name)),
            None => Ok(expanded.into_owned()),
        }
    }
}
