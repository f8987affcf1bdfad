//! Connection/chat slice of the application state

use serde::{Deserialize, Serialize};

use super::Reducer;
use crate::types::{ChatMessage, PeerId};

/// Connected peers, current selection and the chat log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Contents of the "peer ID" input field
    pub input: String,
    /// A connect request is in flight
    pub loading: bool,
    /// A file send is in flight
    pub send_loading: bool,
    /// Connected remote identifiers, in insertion order
    pub list: Vec<PeerId>,
    pub selected_id: Option<PeerId>,
    /// Append-only chat log
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionAction {
    InputChange(String),
    Loading(bool),
    SendLoading(bool),
    ListAdd(PeerId),
    ListRemove(PeerId),
    ItemSelect(PeerId),
    AddMessage(ChatMessage),
}

impl Reducer for ConnectionState {
    type Action = ConnectionAction;

    fn reduce(mut self, action: &ConnectionAction) -> Self {
        match action {
            ConnectionAction::InputChange(input) => self.input = input.clone(),
            ConnectionAction::Loading(loading) => self.loading = *loading,
            ConnectionAction::SendLoading(loading) => self.send_loading = *loading,
            ConnectionAction::ListAdd(id) => self.list.push(id.clone()),
            ConnectionAction::ListRemove(id) => {
                self.list.retain(|entry| entry != id);
                if self.selected_id.as_ref() == Some(id) {
                    self.selected_id = None;
                }
            }
            ConnectionAction::ItemSelect(id) => self.selected_id = Some(id.clone()),
            ConnectionAction::AddMessage(message) => self.messages.push(message.clone()),
        }
        self
    }
}

impl ConnectionState {
    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.list.contains(id)
    }
}
