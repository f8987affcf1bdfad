//! Terminal Interface
//!
//! Line-oriented front end: `parse_line` turns one input line into a
//! `UiCommand`, `render` draws the application state as plain text.

use std::fmt::Write as _;
use std::path::PathBuf;

use peerchat_core::{AppState, CallState, Notice, NoticeLevel, PeerId};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// One user action typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    Start,
    Stop,
    /// Connect to the given identifier, or to whatever is in the input field
    Connect(Option<String>),
    Select(PeerId),
    /// Disconnect from the given peer, or from the selected one
    Disconnect(Option<PeerId>),
    Send(String),
    /// Send the file at this path; `None` triggers the "select file" notice
    File(Option<PathBuf>),
    Call,
    HangUp,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Parse one input line. Matching on the command word is case-insensitive,
/// the argument is kept verbatim apart from surrounding whitespace.
pub fn parse_line(line: &str) -> UiCommand {
    let line = line.trim();
    if line.is_empty() {
        return UiCommand::Empty;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    match word.to_ascii_lowercase().as_str() {
        "start" => UiCommand::Start,
        "stop" => UiCommand::Stop,
        "connect" | "c" => UiCommand::Connect(arg),
        "select" | "s" => match arg {
            Some(id) => UiCommand::Select(PeerId::new(id)),
            None => UiCommand::Unknown(line.to_string()),
        },
        "disconnect" | "close" => UiCommand::Disconnect(arg.map(PeerId::new)),
        "send" | "say" => UiCommand::Send(rest.to_string()),
        "file" => UiCommand::File(arg.map(PathBuf::from)),
        "call" => UiCommand::Call,
        "hangup" | "hang" => UiCommand::HangUp,
        "status" | "st" => UiCommand::Status,
        "help" | "?" => UiCommand::Help,
        "quit" | "exit" | "q" => UiCommand::Quit,
        _ => UiCommand::Unknown(line.to_string()),
    }
}

pub fn help_text() -> &'static str {
    "Commands:
  start                 open the peer session
  stop                  close every connection and the session
  connect [id]          connect to a peer (defaults to the input field)
  select <id>           choose the peer messages and files go to
  disconnect [id]       close a connection (defaults to the selected peer)
  send <text>           send chat text to the selected peer
  file <path>           send a file to the selected peer
  call                  start an audio call with the selected peer
  hangup                end the current call
  status                show session, connections and recent messages
  help                  show this help
  quit                  leave"
}

// ----------------------------------------------------------------------------
// Rendering
// ----------------------------------------------------------------------------

/// Render the session slice, the connection list, the call state and the last
/// `recent` chat messages
pub fn render(state: &AppState, call: &CallState, recent: usize) -> String {
    let mut out = String::new();
    let session = &state.session;
    let connection = &state.connection;

    let id = session
        .id
        .as_ref()
        .map(PeerId::as_str)
        .unwrap_or("-");
    let _ = writeln!(out, "Session: {} (id: {})", session.phase(), id);

    if connection.list.is_empty() {
        let _ = writeln!(out, "Connections: none");
    } else {
        let _ = writeln!(out, "Connections:");
        for peer in &connection.list {
            let marker = if connection.selected_id.as_ref() == Some(peer) {
                '*'
            } else {
                ' '
            };
            let _ = writeln!(out, "  {} {}", marker, peer);
        }
    }
    if connection.loading {
        let _ = writeln!(out, "Connecting to {}...", connection.input.trim());
    }
    if connection.send_loading {
        let _ = writeln!(out, "Sending file...");
    }

    match call {
        CallState::Idle => {
            let _ = writeln!(out, "Call: idle");
        }
        CallState::Ringing { peer, direction } | CallState::Active { peer, direction } => {
            let _ = writeln!(
                out,
                "Call: {} with {} ({:?})",
                call.state_name().to_ascii_lowercase(),
                peer,
                direction
            );
        }
    }

    let skip = connection.messages.len().saturating_sub(recent);
    let messages = &connection.messages[skip..];
    if !messages.is_empty() {
        let _ = writeln!(out, "Messages:");
        for message in messages {
            if message.is_own() {
                let _ = writeln!(out, "  you -> {}: {}", message.peer.short(), message.text);
            } else {
                let _ = writeln!(out, "  {}: {}", message.peer.short(), message.text);
            }
        }
    }
    out
}

/// One-line form of a notice
pub fn format_notice(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warn",
        NoticeLevel::Error => "error",
    };
    format!("[{}] {}", tag, notice.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_core::{CallDirection, ChatMessage, ConnectionAction, SessionAction, Store};

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("  "), UiCommand::Empty);
        assert_eq!(parse_line("START"), UiCommand::Start);
        assert_eq!(
            parse_line("connect  abc-123 "),
            UiCommand::Connect(Some("abc-123".to_string()))
        );
        assert_eq!(parse_line("connect"), UiCommand::Connect(None));
        assert_eq!(
            parse_line("send hello   there"),
            UiCommand::Send("hello   there".to_string())
        );
        assert_eq!(parse_line("send"), UiCommand::Send(String::new()));
        assert_eq!(
            parse_line("file ./notes.txt"),
            UiCommand::File(Some(PathBuf::from("./notes.txt")))
        );
        assert_eq!(parse_line("file"), UiCommand::File(None));
        assert_eq!(parse_line("disconnect"), UiCommand::Disconnect(None));
        assert_eq!(parse_line("q"), UiCommand::Quit);
    }

    #[test]
    fn test_select_requires_an_id() {
        assert_eq!(parse_line("select"), UiCommand::Unknown("select".to_string()));
        assert_eq!(
            parse_line("select peer-9"),
            UiCommand::Select(PeerId::new("peer-9"))
        );
        assert!(matches!(parse_line("dance"), UiCommand::Unknown(_)));
    }

    #[test]
    fn test_render_idle_state() {
        let text = render(&AppState::default(), &CallState::Idle, 5);
        assert!(text.contains("Session: idle (id: -)"));
        assert!(text.contains("Connections: none"));
        assert!(text.contains("Call: idle"));
        assert!(!text.contains("Messages:"));
    }

    #[test]
    fn test_render_marks_selection_and_trims_log() {
        let store = Store::new();
        let alice = PeerId::new("alice");
        let bob = PeerId::new("bob");
        store.dispatch(SessionAction::SessionStart { id: PeerId::new("me") });
        store.dispatch(ConnectionAction::ListAdd(alice.clone()));
        store.dispatch(ConnectionAction::ListAdd(bob.clone()));
        store.dispatch(ConnectionAction::ItemSelect(bob.clone()));
        for i in 0..4 {
            store.dispatch(ConnectionAction::AddMessage(ChatMessage::incoming(
                alice.clone(),
                format!("msg {}", i),
            )));
        }
        store.dispatch(ConnectionAction::AddMessage(ChatMessage::outgoing(
            bob.clone(),
            "reply",
        )));

        let call = CallState::Active {
            peer: bob,
            direction: CallDirection::Outgoing,
        };
        let text = render(&store.state(), &call, 2);
        assert!(text.contains("Session: started (id: me)"));
        assert!(text.contains("  * bob"));
        assert!(text.contains("    alice"));
        assert!(text.contains("Call: active with bob (Outgoing)"));
        assert!(text.contains("alice: msg 3"));
        assert!(text.contains("you -> bob: reply"));
        assert!(!text.contains("msg 2"));
    }

    #[test]
    fn test_format_notice() {
        assert_eq!(format_notice(&Notice::warning("Type Message")), "[warn] Type Message");
        assert_eq!(format_notice(&Notice::error("boom")), "[error] boom");
    }
}
