//! Daemon configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::bus::BusKind;
use crate::context::{ConnectionContext, DEFAULT_HOST, DEFAULT_PORT};
use crate::encoder::ParsePolicy;
use crate::error::{ConfigError, ContextError};

pub const DEFAULT_SERVICE_NAME: &str = "org.postgresql.instance";
pub const DEFAULT_OBJECT_PATH: &str = "/org/postgresql/instance";

/// Daemon configuration, as read from `config.toml`.
///
/// ```toml
/// bus = "session"
/// host = "/var/run/postgresql"
/// port = 5432
/// numeric_parsing = "strict"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Bus to serve on
    pub bus: BusKind,

    /// Well-known name to request
    pub service_name: String,

    /// Object path of the served object
    pub object_path: String,

    /// Interface name of the served object
    pub interface: String,

    /// Initial database host (socket directory or TCP host)
    pub host: String,

    /// Initial database port
    pub port: u16,

    /// How numeric column text is parsed
    pub numeric_parsing: ParsePolicy,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::Session,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            object_path: DEFAULT_OBJECT_PATH.to_string(),
            interface: DEFAULT_SERVICE_NAME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            numeric_parsing: ParsePolicy::Lenient,
        }
    }
}

impl DaemonConfig {
    /// `$XDG_CONFIG_HOME/pgsql-dbus/config.toml`, or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pgsql-dbus").join("config.toml"))
    }

    /// Load from `path`, or from the default location if it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The validated initial connection context.
    pub fn context(&self) -> Result<ConnectionContext, ContextError> {
        ConnectionContext::new(self.host.clone(), self.port)
    }
}
