//! Application configuration
//!
//! Settings are layered: `config.toml` (default location under the user's
//! config directory, or an explicit path), then environment variables.
//!
//! ```toml
//! database_path = "/var/lib/marginalia/marginalia.db"
//! authorized_identity = 123456789
//! uploads_dir = "/var/lib/marginalia/uploads"
//!
//! [generator]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//! api_key = "sk-..."
//! timeout_secs = 20
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::IdentityId;

pub const APP_DIR: &str = "marginalia";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

pub const ENV_DATABASE_PATH: &str = "MARGINALIA_DATABASE_PATH";
pub const ENV_USER_ID: &str = "MARGINALIA_USER_ID";
pub const ENV_UPLOADS_DIR: &str = "MARGINALIA_UPLOADS_DIR";
pub const ENV_GENERATOR_TIMEOUT: &str = "MARGINALIA_GENERATOR_TIMEOUT_SECS";
pub const ENV_GENERATOR_MODEL: &str = "MARGINALIA_GENERATOR_MODEL";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Question generator settings; the generator is disabled without an API key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The API key, if one is set and non-empty
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }
}

/// Settings as read from file and environment, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: Option<PathBuf>,
    pub authorized_identity: Option<IdentityId>,
    pub uploads_dir: Option<PathBuf>,
    pub generator: GeneratorConfig,
}

/// Validated settings the application starts from
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub database_path: PathBuf,
    pub authorized_identity: IdentityId,
    pub uploads_dir: PathBuf,
    pub generator: GeneratorConfig,
}

impl AppConfig {
    /// `<config dir>/marginalia/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// `<local data dir>/marginalia`
    pub fn default_data_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(APP_DIR))
    }

    /// Load from `path` (or the default location if it exists), apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<ResolvedConfig> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    log::debug!("No config file found, using environment only");
                    Self::default()
                }
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.resolve()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Override settings from environment variables looked up via `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = get(ENV_DATABASE_PATH) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = get(ENV_USER_ID) {
            let id = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_USER_ID,
                value: raw.clone(),
            })?;
            self.authorized_identity = Some(id);
        }
        if let Some(dir) = get(ENV_UPLOADS_DIR) {
            self.uploads_dir = Some(PathBuf::from(dir));
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.generator.api_key = Some(key);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.generator.base_url = Some(url);
        }
        if let Some(model) = get(ENV_GENERATOR_MODEL) {
            self.generator.model = model;
        }
        if let Some(raw) = get(ENV_GENERATOR_TIMEOUT) {
            self.generator.timeout_secs =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    name: ENV_GENERATOR_TIMEOUT,
                    value: raw.clone(),
                })?;
        }

        Ok(())
    }

    /// Fill defaults from the local data directory and check required fields
    pub fn resolve(self) -> Result<ResolvedConfig> {
        self.resolve_with_data_dir(Self::default_data_dir())
    }

    fn resolve_with_data_dir(self, data_dir: Option<PathBuf>) -> Result<ResolvedConfig> {
        let authorized_identity = self
            .authorized_identity
            .ok_or(ConfigError::Missing("authorized_identity"))?;

        let database_path = self
            .database_path
            .or_else(|| data_dir.as_ref().map(|dir| dir.join("marginalia.db")))
            .ok_or(ConfigError::Missing("database_path"))?;

        let uploads_dir = self
            .uploads_dir
            .or_else(|| data_dir.as_ref().map(|dir| dir.join("uploads")))
            .ok_or(ConfigError::Missing("uploads_dir"))?;

        if self.generator.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "generator.timeout_secs",
                value: "0".to_string(),
            });
        }

        Ok(ResolvedConfig {
            database_path,
            authorized_identity,
            uploads_dir,
            generator: self.generator,
        })
    }
}
