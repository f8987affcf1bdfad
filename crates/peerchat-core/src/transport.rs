//! Signaling/transport collaborator abstraction
//!
//! PeerChat never implements signaling, ICE negotiation or data-channel framing
//! itself. These traits describe the event-driven interface it consumes, so the
//! same connection-management code runs against a real peer-connection library
//! or against the in-memory hub used by tests.
//!
//! Events are delivered through unbounded channels. Each event receiver can be
//! taken exactly once; whoever takes it owns the event stream for that object.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::TransportError;
use crate::media::MediaStream;
use crate::types::PeerId;

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Events emitted by an open peer session
pub enum SessionEvent {
    /// A remote peer opened a data connection to us
    Connection(Arc<dyn DataConnection>),
    /// A remote peer is calling us
    Call(Arc<dyn MediaCall>),
    /// The collaborator reported an error after the session was opened
    Error(TransportError),
    /// The session lost its signaling server
    Disconnected,
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Connection(conn) => f
                .debug_tuple("Connection")
                .field(&conn.peer().as_str())
                .finish(),
            SessionEvent::Call(call) => f.debug_tuple("Call").field(&call.peer().as_str()).finish(),
            SessionEvent::Error(err) => f.debug_tuple("Error").field(err).finish(),
            SessionEvent::Disconnected => f.write_str("Disconnected"),
        }
    }
}

/// Events emitted by a data connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One encoded payload, in channel order
    Data(Vec<u8>),
    /// The channel closed (remote- or local-initiated)
    Closed,
    Error(TransportError),
}

/// Events emitted by a media call
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// The remote stream became available
    Stream(MediaStream),
    Closed,
    Error(TransportError),
}

// ----------------------------------------------------------------------------
// Collaborator Traits
// ----------------------------------------------------------------------------

/// Options for opening a data connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Request a reliable, ordered channel
    pub reliable: bool,
    /// Optional channel label
    pub label: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            reliable: true,
            label: None,
        }
    }
}

/// A freshly opened session together with its event stream
pub struct OpenedSession {
    pub session: Arc<dyn PeerSession>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

/// Entry point of the signaling collaborator
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Request a new local identity from the signaling server
    async fn open(&self) -> Result<OpenedSession, TransportError>;
}

/// One local identity registered with the signaling server
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Identifier assigned by the signaling server
    fn id(&self) -> &PeerId;

    /// Open a data connection; resolves once the channel is open
    async fn connect(
        &self,
        remote: &PeerId,
        options: ConnectOptions,
    ) -> Result<Arc<dyn DataConnection>, TransportError>;

    /// Call a remote peer with an already acquired local stream
    async fn call(
        &self,
        remote: &PeerId,
        local: MediaStream,
    ) -> Result<Arc<dyn MediaCall>, TransportError>;

    /// Tear down the identity and every connection opened through it
    async fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}

/// An open bidirectional data channel
#[async_trait]
pub trait DataConnection: Send + Sync {
    /// The remote end of the channel
    fn peer(&self) -> &PeerId;

    /// Take the event stream (can only be called once)
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>>;

    async fn send(&self, data: Vec<u8>) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    async fn close(&self);
}

/// A media call between two peers, independent of any data connection
#[async_trait]
pub trait MediaCall: Send + Sync {
    /// The remote end of the call
    fn peer(&self) -> &PeerId;

    /// Take the event stream (can only be called once)
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<CallEvent>>;

    /// Answer an incoming call with our local stream
    async fn answer(&self, local: MediaStream) -> Result<(), TransportError>;

    async fn close(&self);
}

// Blanket implementation so an Arc-wrapped transport can be handed around directly

#[async_trait]
impl<T: SignalingTransport + ?Sized> SignalingTransport for Arc<T> {
    async fn open(&self) -> Result<OpenedSession, TransportError> {
        (**self).open().await
    }
}
