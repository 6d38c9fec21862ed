//! # pgsql-dbus: PostgreSQL over D-Bus
//!
//! A daemon that owns `org.postgresql.instance` on the session bus and
//! answers two methods:
//!
//! | Method  | In  | Out     | Does                                          |
//! |---------|-----|---------|-----------------------------------------------|
//! | `Ping`  |     | `q`     | Probe the server, return a reachability code  |
//! | `Query` | `s` | `a{sv}` | Run raw SQL, return the **first row** only    |
//!
//! Each column of the row becomes one dict entry, keyed by column name,
//! whose variant type follows the column's PostgreSQL type:
//!
//! | PostgreSQL                                  | D-Bus |
//! |---------------------------------------------|-------|
//! | `bool`                                      | `b`   |
//! | `int2`                                      | `n`   |
//! | `int4`, `oid`                               | `i`   |
//! | `int8`                                      | `x`   |
//! | `float4`, `float8`                          | `d`   |
//! | `text`, `varchar`, `bpchar`, `name`, `xml`, `json` | `s` |
//!
//! ## Example
//!
//! ```bash
//! busctl --user call org.postgresql.instance /org/postgresql/instance \
//!     org.postgresql.instance Query s "SELECT 10::int2 AS blah"
//! ```
//!
//! A failed connection or statement answers with an empty dict, not an
//! error; the reason is kept in the `LastError` property.

pub mod bus;
pub mod config;
pub mod context;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod reply;
pub mod service;
pub mod types;

pub mod prelude {
    pub use crate::bus::{BusKind, BusTransport, ZbusTransport};
    pub use crate::config::DaemonConfig;
    pub use crate::context::ConnectionContext;
    pub use crate::encoder::{ParsePolicy, encode};
    pub use crate::engine::{Database, PgDatabase, PingStatus};
    pub use crate::error::*;
    pub use crate::handlers::Bridge;
    pub use crate::reply::{RowReply, WireValue};
    pub use crate::service::{Service, ServiceLoop};
    pub use crate::types::{WireSignature, signature_for};
}

/// Map a PostgreSQL type OID to its D-Bus wire signature.
///
/// # Example
///
/// ```
/// use pgsql_dbus::{signature_for, types::oid};
///
/// assert_eq!(signature_for(oid::INT8).as_char(), 'x');
/// assert_eq!(signature_for(oid::NUMERIC).as_char(), 's');
/// ```
pub use types::signature_for;
