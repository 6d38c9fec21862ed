//! Error types for the bridge.

use thiserror::Error;

use crate::types::{Oid, WireSignature};

/// Failure to turn a textual column value into its wire form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// No encoder exists for this column type.
    #[error("Unsupported column type: oid {0}")]
    UnsupportedType(Oid),

    /// The value does not parse under the strict numeric policy.
    #[error("Invalid {signature} value: '{text}'")]
    InvalidNumber {
        signature: WireSignature,
        text: String,
    },

    /// A value was appended to a variant opened with a different signature.
    #[error("Signature mismatch: variant is '{expected}', value is '{found}'")]
    SignatureMismatch {
        expected: WireSignature,
        found: WireSignature,
    },
}

/// Rejected write to the connection context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Host must not be empty")]
    EmptyHost,

    #[error("Host is {0} bytes long, the limit is {max}", max = crate::context::MAX_HOST_LEN)]
    HostTooLong(usize),

    #[error("Host must not contain NUL bytes")]
    HostContainsNul,

    #[error("Port 0 is not a valid PostgreSQL port")]
    ZeroPort,
}

/// Database-side failure. Never surfaced to bus callers.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Could not open a connection with the current context.
    #[error("Connection to database failed: {0}")]
    Connect(String),

    /// The statement failed at the server.
    #[error("Query failed: {0}")]
    Query(String),
}

/// Transport-fatal bus failure. Ends the service loop.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus connection went away.
    #[error("Bus connection lost")]
    Disconnected,

    /// Could not acquire the well-known service name.
    #[error("Failed to acquire service name '{name}': {source}")]
    NameAcquisition {
        name: String,
        #[source]
        source: zbus::Error,
    },

    /// Any other transport error.
    #[error(transparent)]
    Transport(#[from] zbus::Error),
}

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// A D-Bus error reply: a machine-readable name plus a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodError {
    pub name: &'static str,
    pub message: String,
}

impl MethodError {
    pub const INVALID_ARGS: &'static str = "org.freedesktop.DBus.Error.InvalidArgs";
    pub const UNKNOWN_METHOD: &'static str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const UNKNOWN_OBJECT: &'static str = "org.freedesktop.DBus.Error.UnknownObject";
    pub const UNKNOWN_INTERFACE: &'static str = "org.freedesktop.DBus.Error.UnknownInterface";
    pub const UNKNOWN_PROPERTY: &'static str = "org.freedesktop.DBus.Error.UnknownProperty";
    pub const PROPERTY_READ_ONLY: &'static str = "org.freedesktop.DBus.Error.PropertyReadOnly";
    pub const FAILED: &'static str = "org.freedesktop.DBus.Error.Failed";

    pub fn new(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            message: message.into(),
        }
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_ARGS, message)
    }

    pub fn unknown_method(message: impl Into<String>) -> Self {
        Self::new(Self::UNKNOWN_METHOD, message)
    }

    pub fn unknown_object(message: impl Into<String>) -> Self {
        Self::new(Self::UNKNOWN_OBJECT, message)
    }

    pub fn unknown_interface(message: impl Into<String>) -> Self {
        Self::new(Self::UNKNOWN_INTERFACE, message)
    }

    pub fn unknown_property(message: impl Into<String>) -> Self {
        Self::new(Self::UNKNOWN_PROPERTY, message)
    }

    pub fn read_only(message: impl Into<String>) -> Self {
        Self::new(Self::PROPERTY_READ_ONLY, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(Self::FAILED, message)
    }
}

impl std::fmt::Display for MethodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for MethodError {}

impl From<ContextError> for MethodError {
    fn from(err: ContextError) -> Self {
        Self::invalid_args(err.to_string())
    }
}
