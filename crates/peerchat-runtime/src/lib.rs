//! PeerChat Runtime
//!
//! Connection management on top of the collaborator traits from
//! `peerchat-core`:
//! - `SessionManager`: the single local peer session
//! - `ConnectionRegistry`: remote identifier to open data connection
//! - `EventRouter`: incoming connections, payloads and calls as callbacks
//! - `PeerEndpoint`: the owned value composing the three
//! - `ChatClient`: user actions that drive the endpoint and the state store

pub mod builder;
pub mod client;
pub mod endpoint;
pub mod managers;
pub mod router;
pub mod subscription;

pub use builder::ClientBuilder;
pub use client::{ChatClient, OutgoingFile};
pub use endpoint::PeerEndpoint;
pub use managers::*;
pub use router::EventRouter;
pub use subscription::Subscription;

// Re-export core types for convenience
pub use peerchat_core::{
    AppState, CallState, ChatMessage, Inbound, MediaStream, Notice, NoticeLevel, PeerChatConfig,
    PeerChatError, PeerChatResult, PeerId, Store, Transfer,
};
