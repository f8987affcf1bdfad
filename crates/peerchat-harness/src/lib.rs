//! PeerChat harness
//!
//! Substitutes for the external collaborators so the connection-management
//! layer can be driven deterministically without a signaling server, a
//! browser media stack or a download folder:
//! - `MemoryHub`: in-process signaling server and data/call transport
//! - `FakeMediaDevices`: capture collaborator that records every request
//! - `RecordingFileSink`: file sink that keeps saved files in memory

pub mod media;
pub mod mock_transport;
pub mod sink;

pub use media::FakeMediaDevices;
pub use mock_transport::{HubStats, MemoryHub, MockTransportConfig};
pub use sink::RecordingFileSink;
