//! Transport layer for broker communication
//!
//! This module provides the transport abstraction the connection manager
//! drives, plus the MQTT implementation. A transport reports asynchronous
//! broker events through a channel rather than callbacks so the manager can
//! consume them from a single place, serialized with its commands.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

pub mod mqtt;

/// Asynchronous events delivered by a transport implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The broker acknowledged the connection. `reconnected` is true when
    /// this is not the first acknowledgment of the current session.
    ConnectComplete { reconnected: bool },
    /// The connection failed or was lost, with a human-readable cause.
    /// While a connect is in flight this doubles as the failure report for
    /// that attempt.
    ConnectionLost { cause: String },
    /// A message arrived on a subscribed topic.
    MessageArrived { topic: String, payload: Bytes },
}

/// Transport abstraction over the broker client.
///
/// The connection manager exclusively owns its transport instance; no other
/// component calls these operations. `connect` only initiates the session:
/// its outcome arrives later as a [`TransportEvent`]. A synchronous `Err`
/// from any operation is treated by the manager exactly like the equivalent
/// asynchronous failure.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin a new broker session, replacing any previous one.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Subscribe to a topic filter on the active session.
    async fn subscribe(&mut self, topic: &str, qos: u8) -> Result<(), TransportError>;

    /// Gracefully disconnect the active session.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Release all session resources. Never fails; used as the forced
    /// fallback when a graceful disconnect does not go through.
    async fn close(&mut self);

    /// Attach the channel asynchronous events are delivered on. Must be
    /// called before `connect`.
    fn set_event_sender(&mut self, sender: mpsc::UnboundedSender<TransportEvent>);
}

/// Type alias for the production MQTT transport
pub type MqttTransport = mqtt::MqttTransport;
