//! Where the database lives.

use std::fmt;

use crate::error::ContextError;

/// Default host: the Unix-socket directory of a local server.
pub const DEFAULT_HOST: &str = "/tmp";

/// Default port. Deliberately not 5432, so a stock server is left alone.
pub const DEFAULT_PORT: u16 = 15433;

/// Longest accepted host, in bytes.
pub const MAX_HOST_LEN: usize = 255;

/// Host and port every handler connects to.
///
/// Both fields are writable over the bus; writes are validated and an
/// invalid write leaves the context unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    host: String,
    port: u16,
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ConnectionContext {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ContextError> {
        let mut ctx = Self::default();
        ctx.set_host(host)?;
        ctx.set_port(port)?;
        Ok(ctx)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True when `host` names a Unix-socket directory rather than a TCP host.
    pub fn is_socket_dir(&self) -> bool {
        self.host.starts_with('/')
    }

    pub fn set_host(&mut self, host: impl Into<String>) -> Result<(), ContextError> {
        let host = host.into();
        validate_host(&host)?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ContextError> {
        if port == 0 {
            return Err(ContextError::ZeroPort);
        }
        self.port = port;
        Ok(())
    }
}

impl fmt::Display for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_socket_dir() {
            write!(f, "{}/.s.PGSQL.{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn validate_host(host: &str) -> Result<(), ContextError> {
    if host.is_empty() {
        return Err(ContextError::EmptyHost);
    }
    if host.len() > MAX_HOST_LEN {
        return Err(ContextError::HostTooLong(host.len()));
    }
    if host.contains('\0') {
        return Err(ContextError::HostContainsNul);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = ConnectionContext::default();
        assert_eq!(ctx.host(), "/tmp");
        assert_eq!(ctx.port(), 15433);
        assert!(ctx.is_socket_dir());
        assert_eq!(ctx.to_string(), "/tmp/.s.PGSQL.15433");
    }

    #[test]
    fn test_tcp_display() {
        let ctx = ConnectionContext::new("db.internal", 5432).unwrap();
        assert!(!ctx.is_socket_dir());
        assert_eq!(ctx.to_string(), "db.internal:5432");
    }

    #[test]
    fn test_invalid_writes_leave_context_unchanged() {
        let mut ctx = ConnectionContext::default();

        assert_eq!(ctx.set_host(""), Err(ContextError::EmptyHost));
        assert_eq!(ctx.set_host("a\0b"), Err(ContextError::HostContainsNul));
        assert_eq!(
            ctx.set_host("h".repeat(MAX_HOST_LEN + 1)),
            Err(ContextError::HostTooLong(MAX_HOST_LEN + 1))
        );
        assert_eq!(ctx.set_port(0), Err(ContextError::ZeroPort));

        assert_eq!(ctx, ConnectionContext::default());
    }

    #[test]
    fn test_valid_writes() {
        let mut ctx = ConnectionContext::default();
        ctx.set_host("h".repeat(MAX_HOST_LEN)).unwrap();
        ctx.set_port(u16::MAX).unwrap();
        assert_eq!(ctx.host().len(), MAX_HOST_LEN);
        assert_eq!(ctx.port(), 65535);
    }
}
