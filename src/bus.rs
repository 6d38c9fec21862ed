//! The message-bus side of the bridge.
//!
//! [`BusTransport`] is everything the service loop needs from the bus:
//! a non-blocking look at the next queued message, a blocking wait for
//! one, and a way to send. [`ZbusTransport`] implements it on top of a
//! zbus connection's raw message stream, so dispatch stays in our hands.

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde::Deserialize;
use tracing::info;
use zbus::{Connection, Message, MessageStream};

use crate::error::BusError;

/// Which bus to connect to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// The per-user session bus.
    #[default]
    Session,
    System,
}

/// The bus capability the service loop runs on.
#[async_trait]
pub trait BusTransport: Send {
    /// Take the next message that has already arrived, without blocking.
    fn poll_pending(&mut self) -> Result<Option<Message>, BusError>;

    /// Block until at least one message is pending.
    async fn wait(&mut self) -> Result<(), BusError>;

    async fn send(&mut self, msg: &Message) -> Result<(), BusError>;
}

/// A bus connection owning a well-known name.
pub struct ZbusTransport {
    connection: Connection,
    stream: MessageStream,
    // Filled by `wait`, handed out by the next `poll_pending`.
    ready: Option<Message>,
}

impl ZbusTransport {
    /// Connect and take `service_name` so clients can find us.
    pub async fn connect(kind: BusKind, service_name: &str) -> Result<Self, BusError> {
        let connection = match kind {
            BusKind::Session => Connection::session().await?,
            BusKind::System => Connection::system().await?,
        };

        // Subscribe before the name is public so no call is missed.
        let stream = MessageStream::from(&connection);

        connection
            .request_name(service_name)
            .await
            .map_err(|source| BusError::NameAcquisition {
                name: service_name.to_string(),
                source,
            })?;

        info!(
            "Connected to the {:?} bus as {} ({:?})",
            kind,
            service_name,
            connection.unique_name().map(|n| n.as_str())
        );

        Ok(Self {
            connection,
            stream,
            ready: None,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

#[async_trait]
impl BusTransport for ZbusTransport {
    fn poll_pending(&mut self) -> Result<Option<Message>, BusError> {
        if let Some(msg) = self.ready.take() {
            return Ok(Some(msg));
        }
        match self.stream.next().now_or_never() {
            None => Ok(None),
            Some(Some(Ok(msg))) => Ok(Some(msg)),
            Some(Some(Err(e))) => Err(BusError::Transport(e)),
            Some(None) => Err(BusError::Disconnected),
        }
    }

    async fn wait(&mut self) -> Result<(), BusError> {
        if self.ready.is_some() {
            return Ok(());
        }
        match self.stream.next().await {
            Some(Ok(msg)) => {
                self.ready = Some(msg);
                Ok(())
            }
            Some(Err(e)) => Err(BusError::Transport(e)),
            None => Err(BusError::Disconnected),
        }
    }

    async fn send(&mut self, msg: &Message) -> Result<(), BusError> {
        self.connection.send(msg).await?;
        Ok(())
    }
}
