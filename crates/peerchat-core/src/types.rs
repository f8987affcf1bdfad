//! Core types for PeerChat
//!
//! This module defines the identifiers and records shared by every layer,
//! using newtype patterns so that peer identifiers cannot be mixed up with
//! arbitrary strings.

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::errors::PeerChatError;

// ----------------------------------------------------------------------------
// Peer Identifier
// ----------------------------------------------------------------------------

/// Opaque identifier assigned to an endpoint by the signaling collaborator
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a new PeerId from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form used in log lines
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = PeerChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PeerChatError::config_error("Peer ID must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Deref for PeerId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Chat Messages
// ----------------------------------------------------------------------------

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Sent from this endpoint
    You,
    /// Received from the remote peer
    Other,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::You => f.write_str("you"),
            Origin::Other => f.write_str("other"),
        }
    }
}

/// One entry of the append-only chat log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub origin: Origin,
    /// The remote peer this message was exchanged with
    pub peer: PeerId,
    pub text: String,
}

impl ChatMessage {
    /// Message typed locally and sent to `peer`
    pub fn outgoing(peer: PeerId, text: impl Into<String>) -> Self {
        Self {
            origin: Origin::You,
            peer,
            text: text.into(),
        }
    }

    /// Message received from `peer`
    pub fn incoming(peer: PeerId, text: impl Into<String>) -> Self {
        Self {
            origin: Origin::Other,
            peer,
            text: text.into(),
        }
    }

    pub fn is_own(&self) -> bool {
        self.origin == Origin::You
    }
}

// ----------------------------------------------------------------------------
// User-facing Notices
// ----------------------------------------------------------------------------

/// Severity of a transient notice shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient message surfaced to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.text)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
