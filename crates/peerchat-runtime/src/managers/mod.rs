//! Stateful managers for the PeerChat runtime
//!
//! Each manager owns one piece of endpoint state: the local session, the set
//! of open connections, and the current call.

pub mod call;
pub mod registry;
pub mod session;

pub use call::{ActiveCall, CallManager, CallTeardown};
pub use registry::{CloseCallback, ConnectionRegistry};
pub use session::SessionManager;
