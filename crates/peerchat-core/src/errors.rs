//! Error types for PeerChat
//!
//! This module contains the errors raised by the connection-management layer,
//! the errors surfaced by the external collaborators (signaling transport and
//! media devices), and the `PeerChatError` type that unifies them.

use crate::call_state::CallStateError;

// ----------------------------------------------------------------------------
// Collaborator Error Types
// ----------------------------------------------------------------------------

/// Errors reported by the signaling/transport collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Peer {peer_id} is not reachable through the signaling server")]
    PeerUnavailable { peer_id: String },
    #[error("Negotiation with peer {peer_id} failed: {reason}")]
    NegotiationFailed { peer_id: String, reason: String },
    #[error("Signaling server error: {reason}")]
    Signaling { reason: String },
    #[error("Transport timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
    #[error("Channel is closed")]
    ChannelClosed,
    #[error("Peer session was destroyed")]
    SessionDestroyed,
}

/// Errors reported by the media capture collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("Permission to capture media was denied")]
    PermissionDenied,
    #[error("Media device unavailable: {reason}")]
    DeviceUnavailable { reason: String },
    #[error("Unsupported media constraints: {reason}")]
    Unsupported { reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for PeerChat operations
#[derive(Debug, thiserror::Error)]
pub enum PeerChatError {
    /// Operation attempted before a session exists
    #[error("Peer session has not been started")]
    NotStarted,

    /// `start()` called while a session is already open
    #[error("Peer session already started as {id}")]
    AlreadyStarted { id: String },

    /// Duplicate connect to the same remote
    #[error("Connection to {peer_id} already exists")]
    AlreadyConnected { peer_id: String },

    /// Send/close/subscribe on an absent remote
    #[error("No connection to {peer_id}")]
    NoSuchConnection { peer_id: String },

    /// A single-consumer event stream was already claimed
    #[error("{what} for {peer_id} is already subscribed")]
    AlreadySubscribed { peer_id: String, what: String },

    /// The collaborator failed to open the local session
    #[error("Failed to open peer session: {0}")]
    Session(TransportError),

    /// Negotiation failure propagated from the signaling/media collaborator
    #[error("Negotiation failure: {0}")]
    Negotiation(#[from] TransportError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Call state error: {0}")]
    Call(#[from] CallStateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

pub type PeerChatResult<T> = core::result::Result<T, PeerChatError>;

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl PeerChatError {
    pub fn already_connected(peer_id: impl Into<String>) -> Self {
        PeerChatError::AlreadyConnected {
            peer_id: peer_id.into(),
        }
    }

    pub fn no_such_connection(peer_id: impl Into<String>) -> Self {
        PeerChatError::NoSuchConnection {
            peer_id: peer_id.into(),
        }
    }

    pub fn already_subscribed(peer_id: impl Into<String>, what: impl Into<String>) -> Self {
        PeerChatError::AlreadySubscribed {
            peer_id: peer_id.into(),
            what: what.into(),
        }
    }

    pub fn config_error(reason: impl Into<String>) -> Self {
        PeerChatError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the error came from the external collaborator rather than from
    /// a local precondition check
    pub fn is_collaborator_error(&self) -> bool {
        matches!(
            self,
            PeerChatError::Session(_) | PeerChatError::Negotiation(_) | PeerChatError::Media(_)
        )
    }
}
