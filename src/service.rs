//! Request routing and the service loop.
//!
//! The loop owns the bus transport and runs strictly one request at a
//! time:
//!
//! ```text
//!            processed one
//!           ┌────────────┐
//!           ▼            │
//!       Draining ────────┘
//!        │    ▲
//!  nothing│    │message arrived
//!  pending▼    │
//!       Waiting
//!
//!  any transport error ──▶ Terminating
//! ```
//!
//! A handler, database round-trip included, finishes before the next
//! message is looked at.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};
use zbus::Message;
use zbus::message::{Flags, Type as MessageType};
use zbus::zvariant::{OwnedValue, Value};

use crate::bus::BusTransport;
use crate::engine::Database;
use crate::error::{BusError, MethodError};
use crate::handlers::{Bridge, Property};
use crate::reply::RowReply;

pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
pub const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";
pub const PEER_INTERFACE: &str = "org.freedesktop.DBus.Peer";

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// A successful method result, before it is turned into a message.
#[derive(Debug, PartialEq)]
pub enum Reply {
    Empty,
    Status(u16),
    Row(RowReply),
    Variant(Value<'static>),
    Properties(HashMap<String, Value<'static>>),
    Text(String),
}

/// Routes calls on one object to its handlers.
pub struct Service<D> {
    bridge: Bridge<D>,
    object_path: String,
    interface: String,
}

impl<D: Database> Service<D> {
    pub fn new(bridge: Bridge<D>, object_path: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            bridge,
            object_path: object_path.into(),
            interface: interface.into(),
        }
    }

    pub fn bridge(&self) -> &Bridge<D> {
        &self.bridge
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Handle one incoming message and build everything to send back.
    ///
    /// Method calls get exactly one reply, followed by a
    /// `PropertiesChanged` signal when the call changed a property. Calls
    /// flagged as expecting no reply are still handled, but only the
    /// signal is sent. Anything that is not a method call is consumed
    /// silently.
    pub async fn dispatch(&mut self, msg: &Message) -> zbus::Result<Vec<Message>> {
        if msg.message_type() != MessageType::MethodCall {
            debug!("Ignoring {:?} message", msg.message_type());
            return Ok(Vec::new());
        }

        let header = msg.header();
        let path = header.path().map(|p| p.to_string()).unwrap_or_default();
        let interface = header.interface().map(|i| i.to_string());
        let member = header.member().map(|m| m.to_string()).unwrap_or_default();
        debug!("Call {} {:?}.{}", path, interface, member);

        let outcome = if path != self.object_path {
            Err(MethodError::unknown_object(format!("Unknown object '{path}'")))
        } else {
            self.route(interface.as_deref(), &member, msg).await
        };

        let mut outgoing = Vec::with_capacity(2);
        match outcome {
            _ if !expects_reply(msg) => debug!("Caller expects no reply"),
            Ok(reply) => outgoing.push(build_reply(msg, &reply)?),
            Err(err) => {
                debug!("Replying with error {}", err);
                outgoing.push(build_error(msg, &err)?);
            }
        }

        let changes = self.bridge.take_changes();
        if !changes.is_empty() {
            outgoing.push(self.properties_changed(&changes)?);
        }
        Ok(outgoing)
    }

    async fn route(
        &mut self,
        interface: Option<&str>,
        member: &str,
        msg: &Message,
    ) -> Result<Reply, MethodError> {
        match interface {
            Some(PROPERTIES_INTERFACE) => self.properties_call(member, msg),
            Some(INTROSPECTABLE_INTERFACE) => match member {
                "Introspect" => Ok(Reply::Text(self.introspect())),
                _ => Err(unknown_member(INTROSPECTABLE_INTERFACE, member)),
            },
            Some(PEER_INTERFACE) => peer_call(member),
            Some(other) if other != self.interface => Err(MethodError::unknown_interface(
                format!("Unknown interface '{other}'"),
            )),
            _ => self.instance_call(member, msg).await,
        }
    }

    async fn instance_call(&mut self, member: &str, msg: &Message) -> Result<Reply, MethodError> {
        match member {
            "Ping" => Ok(Reply::Status(self.bridge.ping().await.code())),
            "Query" => {
                let sql: Option<String> = msg.body().deserialize().ok();
                self.bridge.query(sql.as_deref()).await.map(Reply::Row)
            }
            _ => Err(unknown_member(&self.interface, member)),
        }
    }

    fn properties_call(&mut self, member: &str, msg: &Message) -> Result<Reply, MethodError> {
        let body = msg.body();
        match member {
            "Get" => {
                let (interface, name): (String, String) = body
                    .deserialize()
                    .map_err(|_| MethodError::invalid_args("Expected (interface, property)"))?;
                let property = self.lookup(&interface, &name)?;
                Ok(Reply::Variant(self.bridge.get_property(property)))
            }
            "Set" => {
                let (interface, name, value): (String, String, OwnedValue) = body
                    .deserialize()
                    .map_err(|_| MethodError::invalid_args("Expected (interface, property, value)"))?;
                let property = self.lookup(&interface, &name)?;
                self.bridge.set_property(property, &value)?;
                Ok(Reply::Empty)
            }
            "GetAll" => {
                let interface: String = body
                    .deserialize()
                    .map_err(|_| MethodError::invalid_args("Expected interface name"))?;
                self.check_interface(&interface)?;
                let all = Property::ALL
                    .into_iter()
                    .map(|p| (p.name().to_string(), self.bridge.get_property(p)))
                    .collect();
                Ok(Reply::Properties(all))
            }
            _ => Err(unknown_member(PROPERTIES_INTERFACE, member)),
        }
    }

    fn check_interface(&self, interface: &str) -> Result<(), MethodError> {
        // An empty interface name means "whichever interface has it".
        if interface.is_empty() || interface == self.interface {
            Ok(())
        } else {
            Err(MethodError::unknown_interface(format!(
                "Unknown interface '{interface}'"
            )))
        }
    }

    fn lookup(&self, interface: &str, name: &str) -> Result<Property, MethodError> {
        self.check_interface(interface)?;
        Property::from_name(name)
            .ok_or_else(|| MethodError::unknown_property(format!("Unknown property '{name}'")))
    }

    fn properties_changed(&self, changes: &[Property]) -> zbus::Result<Message> {
        let changed: HashMap<&str, Value<'static>> = changes
            .iter()
            .map(|p| (p.name(), self.bridge.get_property(*p)))
            .collect();
        Message::signal(
            self.object_path.as_str(),
            PROPERTIES_INTERFACE,
            "PropertiesChanged",
        )?
        .build(&(self.interface.as_str(), changed, Vec::<&str>::new()))
    }

    /// Introspection XML for the served object.
    pub fn introspect(&self) -> String {
        let mut properties = String::new();
        for property in Property::ALL {
            let access = if property.writable() { "readwrite" } else { "read" };
            properties.push_str(&format!(
                "    <property name=\"{}\" type=\"{}\" access=\"{}\">\n      \
                 <annotation name=\"org.freedesktop.DBus.Property.EmitsChangedSignal\" value=\"true\"/>\n    \
                 </property>\n",
                property.name(),
                property.signature(),
                access
            ));
        }

        format!(
            r#"<!DOCTYPE node PUBLIC "-//freedesktop//DTD D-BUS Object Introspection 1.0//EN"
 "http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd">
<node name="{path}">
  <interface name="{iface}">
    <method name="Ping">
      <arg name="status" type="q" direction="out"/>
    </method>
    <method name="Query">
      <arg name="sql" type="s" direction="in"/>
      <arg name="row" type="a{{sv}}" direction="out"/>
    </method>
{properties}  </interface>
  <interface name="{PROPERTIES_INTERFACE}">
    <method name="Get">
      <arg name="interface_name" type="s" direction="in"/>
      <arg name="property_name" type="s" direction="in"/>
      <arg name="value" type="v" direction="out"/>
    </method>
    <method name="GetAll">
      <arg name="interface_name" type="s" direction="in"/>
      <arg name="props" type="a{{sv}}" direction="out"/>
    </method>
    <method name="Set">
      <arg name="interface_name" type="s" direction="in"/>
      <arg name="property_name" type="s" direction="in"/>
      <arg name="value" type="v" direction="in"/>
    </method>
    <signal name="PropertiesChanged">
      <arg name="interface_name" type="s"/>
      <arg name="changed_properties" type="a{{sv}}"/>
      <arg name="invalidated_properties" type="as"/>
    </signal>
  </interface>
  <interface name="{INTROSPECTABLE_INTERFACE}">
    <method name="Introspect">
      <arg name="xml_data" type="s" direction="out"/>
    </method>
  </interface>
  <interface name="{PEER_INTERFACE}">
    <method name="Ping"/>
    <method name="GetMachineId">
      <arg name="machine_uuid" type="s" direction="out"/>
    </method>
  </interface>
</node>
"#,
            path = self.object_path,
            iface = self.interface,
        )
    }
}

fn peer_call(member: &str) -> Result<Reply, MethodError> {
    match member {
        "Ping" => Ok(Reply::Empty),
        "GetMachineId" => MACHINE_ID_PATHS
            .iter()
            .find_map(|path| std::fs::read_to_string(path).ok())
            .map(|id| Reply::Text(id.trim().to_string()))
            .ok_or_else(|| MethodError::failed("Machine ID is not available")),
        _ => Err(unknown_member(PEER_INTERFACE, member)),
    }
}

fn expects_reply(msg: &Message) -> bool {
    !msg.primary_header().flags().contains(Flags::NoReplyExpected)
}

fn unknown_member(interface: &str, member: &str) -> MethodError {
    MethodError::unknown_method(format!("Unknown method '{member}' on interface '{interface}'"))
}

/// Turn a handler result into the method-return message for `call`.
pub fn build_reply(call: &Message, reply: &Reply) -> zbus::Result<Message> {
    let builder = Message::method_reply(call)?;
    match reply {
        Reply::Empty => builder.build(&()),
        Reply::Status(code) => builder.build(code),
        Reply::Row(row) => builder.build(row),
        Reply::Variant(value) => builder.build(value),
        Reply::Properties(all) => builder.build(all),
        Reply::Text(text) => builder.build(text),
    }
}

/// Turn a handler error into the error message for `call`.
pub fn build_error(call: &Message, err: &MethodError) -> zbus::Result<Message> {
    Message::method_error(call, err.name)?.build(&err.message)
}

/// Where the loop is in its drain/wait cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Processing messages that are already queued.
    Draining,
    /// Blocked until the bus has something for us.
    Waiting,
    /// A transport error occurred; the loop is about to return.
    Terminating,
}

/// Single-threaded service loop over a bus transport.
pub struct ServiceLoop<T, D> {
    transport: T,
    service: Service<D>,
    state: LoopState,
    handled: u64,
}

impl<T: BusTransport, D: Database> ServiceLoop<T, D> {
    pub fn new(transport: T, service: Service<D>) -> Self {
        Self {
            transport,
            service,
            state: LoopState::Draining,
            handled: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Number of messages processed so far.
    pub fn handled(&self) -> u64 {
        self.handled
    }

    pub fn service(&self) -> &Service<D> {
        &self.service
    }

    pub fn into_parts(self) -> (T, Service<D>) {
        (self.transport, self.service)
    }

    /// Process one pending message, if any. Returns whether one was processed.
    pub async fn process_one(&mut self) -> Result<bool, BusError> {
        let Some(msg) = self.transport.poll_pending()? else {
            return Ok(false);
        };
        self.handled += 1;

        let outgoing = match self.service.dispatch(&msg).await {
            Ok(outgoing) => outgoing,
            Err(e) => {
                warn!("Failed to build reply: {}", e);
                self.fallback_error(&msg, &e).into_iter().collect()
            }
        };
        for reply in &outgoing {
            self.transport.send(reply).await?;
        }
        Ok(true)
    }

    /// A `Failed` error reply for a call whose real reply could not be built.
    fn fallback_error(&self, msg: &Message, cause: &zbus::Error) -> Option<Message> {
        if msg.message_type() != MessageType::MethodCall || !expects_reply(msg) {
            return None;
        }
        let err = MethodError::failed(format!("Failed to build reply: {cause}"));
        match build_error(msg, &err) {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!("Failed to build error reply: {}", e);
                None
            }
        }
    }

    /// Serve until the transport fails; returns the error that ended it.
    pub async fn run(&mut self) -> BusError {
        info!(
            "Serving {} on {}",
            self.service.interface(),
            self.service.object_path()
        );
        let mut fatal = None;
        loop {
            self.state = match self.state {
                LoopState::Draining => match self.process_one().await {
                    Ok(true) => LoopState::Draining,
                    Ok(false) => LoopState::Waiting,
                    Err(e) => {
                        fatal = Some(e);
                        LoopState::Terminating
                    }
                },
                LoopState::Waiting => match self.transport.wait().await {
                    Ok(()) => LoopState::Draining,
                    Err(e) => {
                        fatal = Some(e);
                        LoopState::Terminating
                    }
                },
                LoopState::Terminating => {
                    let err = fatal.take().unwrap_or(BusError::Disconnected);
                    error!("Failed to process bus: {}", err);
                    return err;
                }
            };
        }
    }
}
