//! Database access for the bridge.
//!
//! Handlers talk to PostgreSQL through the [`Database`] capability: a
//! reachability probe plus request-scoped sessions. Nothing is pooled or
//! cached; every request connects with the context it is given and closes
//! the session before it returns. [`PgDatabase`] implements it with sqlx.

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, ConnectOptions, Connection, Either, Executor, Row};
use tracing::{debug, warn};

use crate::context::ConnectionContext;
use crate::error::DatabaseError;
use crate::types::Oid;

/// SQLSTATE 57P03: the server is up but not accepting connections yet.
const CANNOT_CONNECT_NOW: &str = "57P03";

/// Outcome of a reachability probe, sent over the bus as its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PingStatus {
    /// The server is accepting connections.
    Ok = 0,
    /// The server is running but refuses connections (e.g. starting up).
    Rejecting = 1,
    /// Nothing answered at the configured address.
    NoResponse = 2,
    /// The connection parameters were unusable, so no attempt was made.
    NoAttempt = 3,
    Unknown = 4,
}

impl PingStatus {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Ok => "accepting connections",
            Self::Rejecting => "rejecting connections",
            Self::NoResponse => "no response",
            Self::NoAttempt => "no attempt",
            Self::Unknown => "unknown",
        }
    }
}

/// One column of a fetched row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultField {
    pub name: String,
    pub type_oid: Oid,
    /// Text representation; `None` for SQL NULL.
    pub value: Option<String>,
}

impl ResultField {
    pub fn new(name: impl Into<String>, type_oid: Oid, value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            type_oid,
            value: value.map(str::to_string),
        }
    }
}

/// The first row of a result set, columns in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRow {
    pub fields: Vec<ResultField>,
}

/// The database capability handlers are written against.
#[async_trait]
pub trait Database: Send + Sync {
    /// Probe the server without running a query or keeping a connection.
    async fn ping(&self, ctx: &ConnectionContext) -> PingStatus;

    /// Open a connection for the duration of one request.
    async fn connect(&self, ctx: &ConnectionContext) -> Result<Box<dyn DbSession>, DatabaseError>;
}

/// A request-scoped connection.
#[async_trait]
pub trait DbSession: Send {
    /// Execute `sql` verbatim and return the first row of its last result.
    ///
    /// With several statements in `sql`, only the last one's result counts.
    /// `Ok(None)` covers a last statement that returns no rows at all.
    async fn first_row(&mut self, sql: &str) -> Result<Option<ResultRow>, DatabaseError>;

    /// Release the connection.
    async fn close(self: Box<Self>);
}

/// sqlx-backed PostgreSQL access.
#[derive(Debug, Clone, Default)]
pub struct PgDatabase;

impl PgDatabase {
    pub fn new() -> Self {
        Self
    }

    fn options(ctx: &ConnectionContext) -> PgConnectOptions {
        // A host starting with '/' is taken by sqlx as a socket directory.
        PgConnectOptions::new()
            .host(ctx.host())
            .port(ctx.port())
            .disable_statement_logging()
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn ping(&self, ctx: &ConnectionContext) -> PingStatus {
        match PgConnection::connect_with(&Self::options(ctx)).await {
            Ok(conn) => {
                if let Err(e) = conn.close().await {
                    debug!("Closing probe connection failed: {}", e);
                }
                PingStatus::Ok
            }
            Err(e) => classify_probe_error(&e),
        }
    }

    async fn connect(&self, ctx: &ConnectionContext) -> Result<Box<dyn DbSession>, DatabaseError> {
        let conn = PgConnection::connect_with(&Self::options(ctx))
            .await
            .map_err(|e| DatabaseError::Connect(e.to_string()))?;
        Ok(Box::new(PgSession { conn }))
    }
}

/// Map a failed connection attempt to what it says about the server.
///
/// Any error the server itself sends back means it is up, except
/// "cannot connect now".
pub fn classify_probe_error(err: &sqlx::Error) -> PingStatus {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(CANNOT_CONNECT_NOW) => {
            PingStatus::Rejecting
        }
        sqlx::Error::Database(_) => PingStatus::Ok,
        sqlx::Error::Io(_) => PingStatus::NoResponse,
        sqlx::Error::Configuration(_) => PingStatus::NoAttempt,
        _ => PingStatus::Unknown,
    }
}

struct PgSession {
    conn: PgConnection,
}

#[async_trait]
impl DbSession for PgSession {
    async fn first_row(&mut self, sql: &str) -> Result<Option<ResultRow>, DatabaseError> {
        // A bare &str carries no arguments, so it goes over the simple query
        // protocol: nothing is prepared and every value comes back as text.
        let mut results = LastResultSet::new();
        let mut stream = Executor::fetch_many(&mut self.conn, sql);
        while let Some(item) = stream
            .try_next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            match item {
                Either::Left(done) => {
                    debug!("Statement done, {} row(s) affected", done.rows_affected());
                    results.end_statement();
                }
                Either::Right(row) => results.push_row(row),
            }
        }
        drop(stream);

        results.finish().as_ref().map(row_to_result).transpose()
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            warn!("Closing database connection failed: {}", e);
        }
    }
}

/// Keeps the first row of the most recent statement in a multi-statement
/// result stream, and nothing else.
#[derive(Debug)]
struct LastResultSet<R> {
    current: Option<R>,
    last: Option<R>,
}

impl<R> LastResultSet<R> {
    fn new() -> Self {
        Self {
            current: None,
            last: None,
        }
    }

    fn push_row(&mut self, row: R) {
        if self.current.is_none() {
            self.current = Some(row);
        }
    }

    fn end_statement(&mut self) {
        self.last = self.current.take();
    }

    fn finish(self) -> Option<R> {
        self.current.or(self.last)
    }
}

fn row_to_result(row: &PgRow) -> Result<ResultRow, DatabaseError> {
    let fields = row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value: Option<String> = row
                .try_get_unchecked(i)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            Ok(ResultField {
                name: column.name().to_string(),
                type_oid: column.type_info().oid().map_or(0, |oid| oid.0),
                value,
            })
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    Ok(ResultRow { fields })
}
