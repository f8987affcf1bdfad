//! Application State Store
//!
//! Two independent slices (session and connection/chat) updated through
//! discrete, named actions. Reducers are pure: they take the previous state by
//! value and return the next one. The `Store` wraps the combined state in a
//! `tokio::sync::watch` channel so the presentation layer can re-render on
//! every change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::trace;

mod connection;
mod session;

pub use connection::{ConnectionAction, ConnectionState};
pub use session::{SessionAction, SessionState};

// ----------------------------------------------------------------------------
// Reducer Contract
// ----------------------------------------------------------------------------

/// A state slice that can be advanced by an action
pub trait Reducer: Sized {
    type Action;

    /// Produce the next state; must not perform side effects
    fn reduce(self, action: &Self::Action) -> Self;
}

// ----------------------------------------------------------------------------
// Combined State
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Session(SessionAction),
    Connection(ConnectionAction),
}

impl From<SessionAction> for Action {
    fn from(action: SessionAction) -> Self {
        Action::Session(action)
    }
}

impl From<ConnectionAction> for Action {
    fn from(action: ConnectionAction) -> Self {
        Action::Connection(action)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    pub session: SessionState,
    pub connection: ConnectionState,
}

impl Reducer for AppState {
    type Action = Action;

    fn reduce(self, action: &Action) -> Self {
        match action {
            Action::Session(action) => Self {
                session: self.session.reduce(action),
                ..self
            },
            Action::Connection(action) => Self {
                connection: self.connection.reduce(action),
                ..self
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------------

/// Shared handle to the application state
#[derive(Debug, Clone)]
pub struct Store {
    state: Arc<watch::Sender<AppState>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_state(AppState::default())
    }

    pub fn with_state(state: AppState) -> Self {
        let (sender, _) = watch::channel(state);
        Self {
            state: Arc::new(sender),
        }
    }

    /// Apply one action and notify subscribers
    pub fn dispatch(&self, action: impl Into<Action>) {
        let action = action.into();
        trace!("dispatch {:?}", action);
        self.state.send_modify(|state| {
            let previous = std::mem::take(state);
            *state = previous.reduce(&action);
        });
    }

    /// Snapshot of the current state
    pub fn state(&self) -> AppState {
        self.state.borrow().clone()
    }

    /// Read a value out of the state without cloning all of it
    pub fn select<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Receiver that is notified after every dispatch
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }
}
