//! Session slice of the application state

use serde::{Deserialize, Serialize};

use super::Reducer;
use crate::types::PeerId;

/// State of the local peer session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Identifier assigned by the signaling server
    pub id: Option<PeerId>,
    pub started: bool,
    /// A start request is in flight
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionAction {
    /// The session opened with the given identifier
    SessionStart { id: PeerId },
    /// The session was stopped; resets to the initial state
    SessionStop,
    Loading(bool),
}

impl Reducer for SessionState {
    type Action = SessionAction;

    fn reduce(self, action: &SessionAction) -> Self {
        match action {
            SessionAction::SessionStart { id } => Self {
                id: Some(id.clone()),
                started: true,
                ..self
            },
            SessionAction::SessionStop => Self::default(),
            SessionAction::Loading(loading) => Self {
                loading: *loading,
                ..self
            },
        }
    }
}

impl SessionState {
    /// idle / starting / started, for display
    pub fn phase(&self) -> &'static str {
        match (self.started, self.loading) {
            (true, _) => "started",
            (false, true) => "starting",
            (false, false) => "idle",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let state = SessionState::default();
        assert_eq!(state.phase(), "idle");

        let state = state.reduce(&SessionAction::Loading(true));
        assert_eq!(state.phase(), "starting");

        let state = state.reduce(&SessionAction::SessionStart {
            id: PeerId::new("me"),
        });
        let state = state.reduce(&SessionAction::Loading(false));
        assert_eq!(state.phase(), "started");
        assert_eq!(state.id, Some(PeerId::new("me")));

        let state = state.reduce(&SessionAction::SessionStop);
        assert_eq!(state, SessionState::default());
    }
}
