//! Read-only client tunables and their TOML representation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of entries requested per directory page.
pub const DEFAULT_LIST_COUNT: u16 = 200;
/// Default maximum response size for one listing page.
pub const DEFAULT_LIST_SIZE: u32 = 65_435;
/// Default size of pooled transport buffers.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 0x10000;
/// Default number of idle buffers kept by the pool.
pub const DEFAULT_BUFFER_CACHE_SIZE: usize = 16;

/// Client configuration consumed by the handle and enumeration layers.
///
/// All fields have defaults, so an empty TOML document is a valid
/// configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Maximum entries the server may return per directory page.
    pub list_count: u16,
    /// Maximum response bytes per directory page.
    pub list_size: u32,
    /// Size in bytes of every buffer handed out by the buffer pool.
    pub max_buffer_size: usize,
    /// Number of released buffers the pool keeps for reuse.
    pub buffer_cache_size: usize,
    /// Capture allocation backtraces on handles to report leaks.
    pub trace_resource_usage: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            list_count: DEFAULT_LIST_COUNT,
            list_size: DEFAULT_LIST_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            buffer_cache_size: DEFAULT_BUFFER_CACHE_SIZE,
            trace_resource_usage: false,
        }
    }
}

impl ClientConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig =
            toml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: None,
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from `explicit`, or from the default location.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file is
    /// an error.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let config = read_file(&path)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the enumeration engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.list_count == 0 {
            return Err(ConfigError::Invalid {
                field: "list_count",
                reason: "must be at least 1",
            });
        }
        if self.list_size == 0 {
            return Err(ConfigError::Invalid {
                field: "list_size",
                reason: "must be at least 1",
            });
        }
        if self.max_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_buffer_size",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Serializes the configuration as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }
}

/// Location consulted when no explicit config path is given.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("smbwalk").join("config.toml"))
}

fn read_file(path: &Path) -> Result<ClientConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })
}

/// Failures while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The document is not valid TOML for [`ClientConfig`].
    #[error("failed to parse config{}: {source}", display_path(.path))]
    Parse {
        /// File that failed, if the document came from disk.
        path: Option<PathBuf>,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// The configuration could not be rendered.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// Underlying error.
        source: toml::ser::Error,
    },
    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" {}", path.display()),
        None => String::new(),
    }
}
