//! Call State Machine
//!
//! Tracks the single audio call an endpoint may have at a time. States are
//! consumed by `transition`, so an invalid move is a returned error rather than
//! a silently overwritten rendering target.
//!
//! ```text
//! Idle --Ring--> Ringing --Connect--> Active
//!   ^               |                    |
//!   +---HangUp/Fail-+--------------------+
//! ```

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::types::PeerId;

// ----------------------------------------------------------------------------
// States and Transitions
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// The remote peer called us
    Incoming,
    /// We called the remote peer
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallState {
    #[default]
    Idle,
    /// Call requested, streams not attached yet
    Ringing { peer: PeerId, direction: CallDirection },
    /// Both streams attached
    Active { peer: PeerId, direction: CallDirection },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTransition {
    /// A call was requested (by us or by the remote)
    Ring { peer: PeerId, direction: CallDirection },
    /// Media negotiation finished and the remote stream arrived
    Connect { peer: PeerId },
    /// Either side hung up
    HangUp,
    /// Capture or negotiation failed
    Fail { reason: String },
}

impl CallState {
    pub fn state_name(&self) -> &'static str {
        match self {
            CallState::Idle => "Idle",
            CallState::Ringing { .. } => "Ringing",
            CallState::Active { .. } => "Active",
        }
    }

    /// Peer of the ringing or active call
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            CallState::Idle => None,
            CallState::Ringing { peer, .. } | CallState::Active { peer, .. } => Some(peer),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, CallState::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Active { .. })
    }

    /// Apply a transition (consumes self)
    pub fn transition(self, event: CallTransition) -> Result<CallState, CallStateError> {
        match (self, event) {
            (CallState::Idle, CallTransition::Ring { peer, direction }) => {
                Ok(CallState::Ringing { peer, direction })
            }
            (
                CallState::Ringing { peer, .. } | CallState::Active { peer, .. },
                CallTransition::Ring { .. },
            ) => Err(CallStateError::Busy {
                peer: peer.to_string(),
            }),
            (CallState::Ringing { peer, direction }, CallTransition::Connect { peer: other }) => {
                if peer == other {
                    Ok(CallState::Active { peer, direction })
                } else {
                    Err(CallStateError::PeerMismatch {
                        expected: peer.to_string(),
                        actual: other.to_string(),
                    })
                }
            }
            (_, CallTransition::HangUp) => Ok(CallState::Idle),
            (
                CallState::Ringing { .. } | CallState::Active { .. },
                CallTransition::Fail { .. },
            ) => Ok(CallState::Idle),
            (state, event) => Err(CallStateError::InvalidTransition {
                from: state.state_name().to_string(),
                event: format!("{:?}", event),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStateError {
    /// A call with `peer` is already ringing or active
    Busy { peer: String },
    PeerMismatch { expected: String, actual: String },
    InvalidTransition { from: String, event: String },
}

impl fmt::Display for CallStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStateError::Busy { peer } => write!(f, "Already in a call with {}", peer),
            CallStateError::PeerMismatch { expected, actual } => {
                write!(f, "Call is with {}, not {}", expected, actual)
            }
            CallStateError::InvalidTransition { from, event } => {
                write!(f, "Invalid call transition from {} on {}", from, event)
            }
        }
    }
}

impl std::error::Error for CallStateError {}
