//! Chat client
//!
//! User-level actions on top of a `PeerEndpoint`. Each action validates its
//! input against the current state, calls into the endpoint, dispatches the
//! resulting state changes and broadcasts transient notices. Failures are
//! logged, reported as an error notice and returned; loading flags set by an
//! action are always reset before it returns.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use peerchat_core::{
    AppState, CallState, ChatMessage, ConnectionAction, DataRecord, FileSink, Inbound,
    MediaConstraints, MediaDevices, Notice, PeerChatError, PeerChatResult, PeerId, SessionAction,
    Store, DEFAULT_FILE_NAME,
};

use crate::endpoint::PeerEndpoint;
use crate::managers::ActiveCall;
use crate::subscription::Subscription;

const NOTICE_CAPACITY: usize = 64;

/// A file picked for sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub name: String,
    pub file_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl OutgoingFile {
    pub fn new(name: impl Into<String>, file_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            file_type,
            bytes,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        let file_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension)
            .map(str::to_string);
        Ok(Self {
            name,
            file_type,
            bytes,
        })
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "txt" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}

// ----------------------------------------------------------------------------
// Connection Wiring
// ----------------------------------------------------------------------------

/// Where event callbacks deliver their results. Holds no endpoint handle, so
/// callbacks stored in the registry never keep the endpoint alive.
#[derive(Clone)]
struct Feedback {
    store: Store,
    sink: Arc<dyn FileSink>,
    notices: broadcast::Sender<Notice>,
}

impl Feedback {
    fn notify(&self, notice: Notice) {
        // No receivers is fine: nobody is rendering notices
        let _ = self.notices.send(notice);
    }
}

#[derive(Clone)]
struct Wiring {
    endpoint: Arc<PeerEndpoint>,
    feedback: Feedback,
}

impl Wiring {
    /// Add `peer` to the list and route its data and close events into the
    /// store. Undoes the list entry if the connection is already gone.
    fn adopt(&self, peer: &PeerId) {
        let store = &self.feedback.store;
        store.dispatch(ConnectionAction::ListAdd(peer.clone()));
        if let Err(e) = self.track(peer) {
            warn!("Connection to {} went away before it was wired: {}", peer, e);
            store.dispatch(ConnectionAction::ListRemove(peer.clone()));
        }
    }

    fn track(&self, peer: &PeerId) -> PeerChatResult<()> {
        let on_close = self.feedback.clone();
        self.endpoint.on_close(peer, move |peer| {
            on_close
                .store
                .dispatch(ConnectionAction::ListRemove(peer.clone()));
            on_close.notify(Notice::info(format!("Connection closed: {}", peer)));
        })?;

        let on_data = self.feedback.clone();
        let from = peer.clone();
        self.endpoint
            .on_data(peer, move |inbound| match inbound {
                Inbound::Text(text) => {
                    on_data
                        .store
                        .dispatch(ConnectionAction::AddMessage(ChatMessage::incoming(
                            from.clone(),
                            text,
                        )));
                }
                Inbound::File(file) => {
                    on_data.notify(Notice::info(format!(
                        "Receiving file {} from {}",
                        file.file_name, from
                    )));
                    on_data.sink.save(file);
                }
                Inbound::Ignored { file_name, .. } => {
                    // Announced like a file, but nothing is saved
                    on_data.notify(Notice::info(format!(
                        "Receiving file {} from {}",
                        file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME),
                        from
                    )));
                }
            })?
            // Ends by itself once the connection leaves the registry
            .detach();
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Chat Client
// ----------------------------------------------------------------------------

pub struct ChatClient {
    wiring: Wiring,
    media: Arc<dyn MediaDevices>,
    _subscriptions: Vec<Subscription>,
}

impl ChatClient {
    /// Subscribe to the endpoint's session-level events. Must run inside a
    /// tokio runtime.
    pub(crate) fn start(
        endpoint: Arc<PeerEndpoint>,
        store: Store,
        sink: Arc<dyn FileSink>,
        media: Arc<dyn MediaDevices>,
    ) -> PeerChatResult<Self> {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let wiring = Wiring {
            endpoint,
            feedback: Feedback {
                store,
                sink,
                notices,
            },
        };
        let mut subscriptions = Vec::new();

        let incoming = wiring.clone();
        subscriptions.push(wiring.endpoint.on_incoming(move |peer| {
            incoming.feedback.notify(Notice::info(format!("Incoming connection: {}", peer)));
            incoming.adopt(&peer);
        })?);

        let calls = wiring.feedback.clone();
        subscriptions.push(wiring.endpoint.on_incoming_call(move |call: ActiveCall| {
            calls.notify(Notice::info(format!("Call with {} connected", call.peer)));
        })?);

        if let Some(mut errors) = wiring.endpoint.take_session_errors() {
            let reporter = wiring.feedback.clone();
            subscriptions.push(Subscription::spawn("session errors", async move {
                while let Some(e) = errors.recv().await {
                    reporter.notify(Notice::error(format!("Peer session error: {}", e)));
                }
            }));
        }

        Ok(Self {
            wiring,
            media,
            _subscriptions: subscriptions,
        })
    }

    pub fn endpoint(&self) -> &Arc<PeerEndpoint> {
        &self.wiring.endpoint
    }

    pub fn store(&self) -> &Store {
        &self.wiring.feedback.store
    }

    pub fn state(&self) -> AppState {
        self.wiring.feedback.store.state()
    }

    pub fn call_state(&self) -> CallState {
        self.wiring.endpoint.call_state()
    }

    /// Receiver for transient user-facing notices
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.wiring.feedback.notices.subscribe()
    }

    fn dispatch(&self, action: impl Into<peerchat_core::Action>) {
        self.wiring.feedback.store.dispatch(action);
    }

    fn report(&self, context: &str, e: &PeerChatError) {
        error!("{}: {}", context, e);
        self.wiring.feedback.notify(Notice::error(e.to_string()));
    }

    // ------------------------------------------------------------------------
    // Session Actions
    // ------------------------------------------------------------------------

    pub async fn start_session(&self) -> PeerChatResult<PeerId> {
        self.dispatch(SessionAction::Loading(true));
        let result = self.wiring.endpoint.start().await;
        match &result {
            Ok(id) => self.dispatch(SessionAction::SessionStart { id: id.clone() }),
            Err(e) => self.report("Failed to start session", e),
        }
        self.dispatch(SessionAction::Loading(false));
        result
    }

    /// Close every connection and reset the session slice
    pub async fn stop_session(&self) {
        if self.wiring.endpoint.stop().await {
            info!("Session stopped");
        }
        self.dispatch(SessionAction::SessionStop);
    }

    // ------------------------------------------------------------------------
    // Connection Actions
    // ------------------------------------------------------------------------

    pub fn change_input(&self, input: impl Into<String>) {
        self.dispatch(ConnectionAction::InputChange(input.into()));
    }

    /// Connect to the peer whose identifier is in the input field
    pub async fn connect_peer(&self) -> PeerChatResult<()> {
        let input = self
            .wiring
            .feedback
            .store
            .select(|s| s.connection.input.trim().to_string());
        if input.is_empty() {
            self.wiring.feedback.notify(Notice::warning("Please enter ID"));
            return Ok(());
        }
        let remote = PeerId::new(input);

        self.dispatch(ConnectionAction::Loading(true));
        let result = self.wiring.endpoint.connect(&remote).await;
        match &result {
            Ok(()) => self.wiring.adopt(&remote),
            Err(e) => self.report("Failed to connect", e),
        }
        self.dispatch(ConnectionAction::Loading(false));
        result
    }

    pub fn select(&self, peer: PeerId) {
        self.dispatch(ConnectionAction::ItemSelect(peer));
    }

    /// Locally disconnect from `peer`
    pub async fn disconnect(&self, peer: &PeerId) -> PeerChatResult<()> {
        let result = self.wiring.endpoint.close(peer).await;
        if let Err(e) = &result {
            self.report("Failed to disconnect", e);
        }
        result
    }

    fn selected(&self) -> Option<PeerId> {
        let selected = self
            .wiring
            .feedback
            .store
            .select(|s| s.connection.selected_id.clone());
        if selected.is_none() {
            self.wiring.feedback.notify(Notice::warning("Please select a connection"));
        }
        selected
    }

    /// Send chat text to the selected peer
    pub async fn send_text(&self, text: &str) -> PeerChatResult<()> {
        let Some(selected) = self.selected() else {
            return Ok(());
        };
        if text.is_empty() {
            self.wiring.feedback.notify(Notice::warning("Type Message"));
            return Ok(());
        }

        let result = self.wiring.endpoint.send_text(&selected, text).await;
        match &result {
            Ok(()) => self.dispatch(ConnectionAction::AddMessage(ChatMessage::outgoing(
                selected, text,
            ))),
            Err(e) => self.report("Failed to send message", e),
        }
        result
    }

    /// Send a file to the selected peer
    pub async fn send_file(&self, file: Option<OutgoingFile>) -> PeerChatResult<()> {
        let Some(file) = file else {
            self.wiring.feedback.notify(Notice::warning("Please select file"));
            return Ok(());
        };
        let Some(selected) = self.selected() else {
            return Ok(());
        };

        self.dispatch(ConnectionAction::SendLoading(true));
        let record = DataRecord::file(file.bytes, file.name, file.file_type);
        let result = self.wiring.endpoint.send_file(&selected, record).await;
        match &result {
            Ok(()) => self.wiring.feedback.notify(Notice::info("Send file successfully")),
            Err(e) => {
                error!("Failed to send file to {}: {}", selected, e);
                self.wiring.feedback.notify(Notice::error("Error when sending file"));
            }
        }
        self.dispatch(ConnectionAction::SendLoading(false));
        result
    }

    // ------------------------------------------------------------------------
    // Call Actions
    // ------------------------------------------------------------------------

    /// Call the selected peer with an audio-only stream
    pub async fn call(&self) -> PeerChatResult<()> {
        let Some(selected) = self.selected() else {
            return Ok(());
        };

        let local = match self.media.get_user_media(MediaConstraints::AUDIO_ONLY).await {
            Ok(stream) => stream,
            Err(e) => {
                let e = PeerChatError::from(e);
                self.report("Failed to get local stream", &e);
                return Err(e);
            }
        };

        let notices = self.wiring.feedback.notices.clone();
        let result = self
            .wiring
            .endpoint
            .place_call(&selected, local, move |call| {
                let _ = notices.send(Notice::info(format!("Call with {} connected", call.peer)));
            })
            .await;
        if let Err(e) = &result {
            self.report("Call failed", e);
        }
        result
    }

    pub async fn hang_up(&self) -> bool {
        let hung_up = self.wiring.endpoint.hang_up().await;
        if hung_up {
            self.wiring.feedback.notify(Notice::info("Call ended"));
        }
        hung_up
    }
}
