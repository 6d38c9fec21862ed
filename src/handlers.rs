//! Method and property handlers of the `org.postgresql.instance` object.

use tracing::{info, warn};
use zbus::zvariant::Value;

use crate::context::ConnectionContext;
use crate::encoder::{ParsePolicy, append_value};
use crate::engine::{Database, PingStatus, ResultRow};
use crate::error::{DatabaseError, MethodError};
use crate::reply::{RowBuilder, RowReply};
use crate::types::signature_for;

/// Bus-visible properties of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Host,
    Port,
    /// Last swallowed connection or query failure; empty after a successful query.
    LastError,
}

impl Property {
    pub const ALL: [Property; 3] = [Property::Host, Property::Port, Property::LastError];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Host => "Host",
            Self::Port => "Port",
            Self::LastError => "LastError",
        }
    }

    /// D-Bus type code of the property.
    pub fn signature(self) -> &'static str {
        match self {
            Self::Host | Self::LastError => "s",
            Self::Port => "q",
        }
    }

    pub fn writable(self) -> bool {
        !matches!(self, Self::LastError)
    }
}

/// Request handlers plus the state they share.
///
/// The service loop runs one handler at a time, so property writes and
/// handler reads of the connection context never overlap.
pub struct Bridge<D> {
    db: D,
    context: ConnectionContext,
    policy: ParsePolicy,
    last_error: String,
    changed: Vec<Property>,
}

impl<D: Database> Bridge<D> {
    pub fn new(db: D, context: ConnectionContext, policy: ParsePolicy) -> Self {
        Self {
            db,
            context,
            policy,
            last_error: String::new(),
            changed: Vec::new(),
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Probe the configured server. Unreachability is a status, not an error.
    pub async fn ping(&self) -> PingStatus {
        let status = self.db.ping(&self.context).await;
        info!("{}: {}", self.context, status.describe());
        status
    }

    /// Run `sql` and return its first row.
    ///
    /// Only row 0 is ever returned; further rows are discarded. A failed
    /// connection, a failed statement, and a statement without rows all
    /// produce an empty reply; the failure is logged and exposed through
    /// [`Property::LastError`]. A column with no encoder fails the whole
    /// call and nothing of the row is sent.
    pub async fn query(&mut self, sql: Option<&str>) -> Result<RowReply, MethodError> {
        let sql = sql.ok_or_else(|| MethodError::invalid_args("Expected query string argument"))?;

        info!("Connecting to {}", self.context);
        let mut session = match self.db.connect(&self.context).await {
            Ok(session) => session,
            Err(e) => return Ok(self.swallow(e)),
        };

        let fetched = session.first_row(sql).await;
        session.close().await;

        let row = match fetched {
            Ok(Some(row)) => row,
            Ok(None) => {
                info!("Query returned no rows");
                self.set_last_error(String::new());
                return Ok(RowReply::empty());
            }
            Err(e) => return Ok(self.swallow(e)),
        };

        let reply = encode_row(&row, self.policy)?;
        info!("Query succeeded, {} field(s)", reply.len());
        self.set_last_error(String::new());
        Ok(reply)
    }

    pub fn get_property(&self, property: Property) -> Value<'static> {
        match property {
            Property::Host => Value::from(self.context.host().to_string()),
            Property::Port => Value::U16(self.context.port()),
            Property::LastError => Value::from(self.last_error.clone()),
        }
    }

    /// Validate and store a property write.
    pub fn set_property(&mut self, property: Property, value: &Value<'_>) -> Result<(), MethodError> {
        match (property, value) {
            (Property::Host, Value::Str(host)) => self.context.set_host(host.as_str())?,
            (Property::Port, Value::U16(port)) => self.context.set_port(*port)?,
            (Property::LastError, _) => {
                return Err(MethodError::read_only(format!(
                    "Property '{}' is read-only",
                    property.name()
                )));
            }
            (_, other) => {
                return Err(MethodError::invalid_args(format!(
                    "Property '{}' expects type '{}', got '{}'",
                    property.name(),
                    property.signature(),
                    other.value_signature().as_str()
                )));
            }
        }
        info!("{} set, now connecting to {}", property.name(), self.context);
        self.changed.push(property);
        Ok(())
    }

    /// Properties changed since the last call, in change order.
    pub fn take_changes(&mut self) -> Vec<Property> {
        std::mem::take(&mut self.changed)
    }

    fn swallow(&mut self, err: DatabaseError) -> RowReply {
        warn!("{}", err);
        self.set_last_error(err.to_string());
        RowReply::empty()
    }

    fn set_last_error(&mut self, message: String) {
        if self.last_error != message {
            self.last_error = message;
            self.changed.push(Property::LastError);
        }
    }
}

/// Encode every column of `row` into an `a{sv}` reply.
pub fn encode_row(row: &ResultRow, policy: ParsePolicy) -> Result<RowReply, MethodError> {
    let mut builder = RowBuilder::with_capacity(row.fields.len());
    for field in &row.fields {
        let slot = builder
            .open_entry(field.name.as_str())
            .open_variant(signature_for(field.type_oid));
        append_value(slot, field.type_oid, field.value.as_deref(), policy)
            .map_err(|e| MethodError::failed(format!("Field '{}': {}", field.name, e)))?;
    }
    Ok(builder.finish())
}
