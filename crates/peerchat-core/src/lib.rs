//! PeerChat Core
//!
//! This crate provides the foundational types for the PeerChat peer-to-peer
//! client: peer identifiers, transfer payloads, the media model, the traits that
//! describe the external signaling/media/download collaborators, the call state
//! machine and the reducer-based application state store.
//!
//! Nothing in here talks to a network. The runtime crate drives these types
//! against whatever collaborator implementation it is handed.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod call_state;
pub mod config;
pub mod errors;
pub mod media;
pub mod payload;
pub mod sink;
pub mod store;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use call_state::{CallDirection, CallState, CallStateError, CallTransition};
pub use config::{ConfigError, DownloadConfig, PeerChatConfig, SessionConfig};
pub use errors::{MediaError, PeerChatError, PeerChatResult, TransportError};
pub use media::{MediaConstraints, MediaDevices, MediaStream, MediaTrack, TrackKind};
pub use payload::{DataRecord, DataType, FileDownload, Inbound, Transfer, DEFAULT_FILE_NAME};
pub use sink::{DownloadDirSink, FileSink};
pub use store::{
    Action, AppState, ConnectionAction, ConnectionState, Reducer, SessionAction, SessionState,
    Store,
};
pub use transport::{
    CallEvent, ConnectOptions, ConnectionEvent, DataConnection, MediaCall, OpenedSession,
    PeerSession, SessionEvent, SignalingTransport,
};
pub use types::{ChatMessage, Notice, NoticeLevel, Origin, PeerId};
