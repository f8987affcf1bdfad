//! Event Router
//!
//! Turns the raw event queues of the session and the registry into
//! application callbacks:
//! - incoming connections, after the registry has inserted them
//! - decoded payloads per connection (text, files and unrecognised records)
//! - incoming calls, answered with an audio-only local stream
//!
//! It also places outgoing calls and hangs up, keeping the call state machine
//! and the attached media in step with the collaborator's call events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use peerchat_core::{
    CallDirection, CallEvent, CallState, Inbound, MediaCall, MediaConstraints, MediaDevices,
    MediaStream, PeerChatError, PeerChatResult, PeerId, SessionConfig, Transfer, TransportError,
};

use crate::managers::{ActiveCall, CallManager, CallTeardown, ConnectionRegistry, SessionManager};
use crate::subscription::Subscription;

type CallCallback = Arc<dyn Fn(ActiveCall) + Send + Sync + 'static>;

pub struct EventRouter {
    sessions: Arc<SessionManager>,
    registry: ConnectionRegistry,
    calls: CallContext,
}

impl EventRouter {
    pub fn new(
        sessions: Arc<SessionManager>,
        registry: ConnectionRegistry,
        calls: Arc<CallManager>,
        media: Arc<dyn MediaDevices>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            sessions,
            registry,
            calls: CallContext {
                calls,
                media,
                call_timeout: config.call_timeout(),
            },
        }
    }

    /// Invoke `callback` once per unsolicited inbound connection. The
    /// connection is already in the registry when the callback runs.
    pub fn on_incoming<F>(&self, mut callback: F) -> PeerChatResult<Subscription>
    where
        F: FnMut(PeerId) + Send + 'static,
    {
        let mut incoming = self
            .sessions
            .take_incoming()
            .ok_or_else(|| PeerChatError::already_subscribed("session", "incoming connections"))?;

        Ok(Subscription::spawn("incoming connections", async move {
            while let Some(peer) = incoming.recv().await {
                callback(peer);
            }
        }))
    }

    /// Invoke `callback` for every payload received from `remote`, in
    /// channel order
    pub fn on_data<F>(&self, remote: &PeerId, mut callback: F) -> PeerChatResult<Subscription>
    where
        F: FnMut(Inbound) + Send + 'static,
    {
        self.sessions.session()?;
        let mut data = self.registry.take_data(remote)?;
        let peer = remote.clone();

        Ok(Subscription::spawn(format!("data from {}", remote), async move {
            while let Some(bytes) = data.recv().await {
                let transfer = match Transfer::decode(&bytes) {
                    Ok(transfer) => transfer,
                    Err(e) => {
                        warn!("Undecodable payload from {}: {}", peer, e);
                        continue;
                    }
                };
                let inbound = Inbound::from(transfer);
                if let Inbound::Ignored {
                    data_type,
                    file_name,
                } = &inbound
                {
                    debug!(
                        "Unrecognised {:?} record from {} (file name {:?})",
                        data_type, peer, file_name
                    );
                }
                callback(inbound);
            }
            trace!("Data stream from {} ended", peer);
        }))
    }

    /// Answer every incoming call with an audio-only stream and invoke
    /// `callback` once the remote stream arrives. Calls arriving while another
    /// call is ringing or active are declined.
    pub fn on_incoming_call<F>(&self, callback: F) -> PeerChatResult<Subscription>
    where
        F: Fn(ActiveCall) + Send + Sync + 'static,
    {
        let mut incoming = self
            .sessions
            .take_calls()
            .ok_or_else(|| PeerChatError::already_subscribed("session", "incoming calls"))?;
        let ctx = self.calls.clone();
        let callback: CallCallback = Arc::new(callback);

        Ok(Subscription::spawn("incoming calls", async move {
            while let Some(call) = incoming.recv().await {
                tokio::spawn(answer_call(ctx.clone(), call, callback.clone()));
            }
        }))
    }

    /// Call `remote` with an already captured local stream and invoke
    /// `on_remote` once the remote stream arrives
    pub async fn place_call<F>(
        &self,
        remote: &PeerId,
        local: MediaStream,
        on_remote: F,
    ) -> PeerChatResult<()>
    where
        F: FnOnce(ActiveCall) + Send + 'static,
    {
        let session = match self.sessions.session() {
            Ok(session) => session,
            Err(e) => {
                local.stop_tracks();
                return Err(e);
            }
        };
        if !self.registry.contains(remote) {
            local.stop_tracks();
            return Err(PeerChatError::no_such_connection(remote.as_str()));
        }
        let ctx = &self.calls;
        let serial = match ctx.calls.begin(remote.clone(), CallDirection::Outgoing) {
            Ok(serial) => serial,
            Err(e) => {
                local.stop_tracks();
                return Err(e.into());
            }
        };
        ctx.calls.attach_local(serial, local.clone());

        debug!("Calling {}", remote);
        let call = match timeout(ctx.call_timeout, session.call(remote, local)).await {
            Ok(Ok(call)) => call,
            Ok(Err(e)) => {
                ctx.abort(serial, e.to_string()).await;
                return Err(e.into());
            }
            Err(_) => {
                let e = ctx.timeout_error();
                ctx.abort(serial, e.to_string()).await;
                return Err(e.into());
            }
        };
        if !ctx.calls.attach_call(serial, call.clone()) {
            // Hung up while dialing
            call.close().await;
            return Err(TransportError::ChannelClosed.into());
        }

        let Some(mut events) = call.take_events() else {
            ctx.abort(serial, "call events unavailable").await;
            return Err(PeerChatError::already_subscribed(remote.as_str(), "call events"));
        };
        let active = match ctx.await_remote(serial, &mut events).await {
            Ok(active) => active,
            Err(e) => {
                ctx.abort(serial, e.to_string()).await;
                return Err(e);
            }
        };

        info!("Call with {} connected", remote);
        on_remote(active);
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.watch(serial, events).await });
        Ok(())
    }

    /// Stop local and remote tracks, close the call and return to idle.
    /// Returns false when there was no call.
    pub async fn hang_up(&self) -> bool {
        match self.calls.calls.hang_up() {
            Some(teardown) => {
                info!("Hung up call with {}", teardown.peer);
                close_call(teardown).await;
                true
            }
            None => false,
        }
    }

    pub fn call_state(&self) -> CallState {
        self.calls.calls.state()
    }

    pub fn active_call(&self) -> Option<ActiveCall> {
        self.calls.calls.active()
    }
}

// ----------------------------------------------------------------------------
// Call Handling
// ----------------------------------------------------------------------------

#[derive(Clone)]
struct CallContext {
    calls: Arc<CallManager>,
    media: Arc<dyn MediaDevices>,
    call_timeout: Duration,
}

impl CallContext {
    fn timeout_error(&self) -> TransportError {
        TransportError::Timeout {
            duration_ms: self.call_timeout.as_millis() as u64,
        }
    }

    /// Fail call `serial`, stopping its media and closing it
    async fn abort(&self, serial: u64, reason: impl Into<String>) {
        if let Some(teardown) = self.calls.fail(serial, reason) {
            close_call(teardown).await;
        }
    }

    /// Wait for the remote stream of call `serial` and mark it active
    async fn await_remote(
        &self,
        serial: u64,
        events: &mut mpsc::UnboundedReceiver<CallEvent>,
    ) -> PeerChatResult<ActiveCall> {
        let remote = match timeout(self.call_timeout, next_stream(events)).await {
            Ok(Some(stream)) => stream,
            Ok(None) => return Err(TransportError::ChannelClosed.into()),
            Err(_) => return Err(self.timeout_error().into()),
        };
        Ok(self.calls.activate(serial, remote)?)
    }

    /// Follow call `serial` until either side closes it
    async fn watch(&self, serial: u64, mut events: mpsc::UnboundedReceiver<CallEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                CallEvent::Stream(stream) => {
                    trace!("Ignoring renegotiated stream {}", stream.id());
                }
                CallEvent::Error(e) => warn!("Call error: {}", e),
                CallEvent::Closed => break,
            }
        }
        if let Some(teardown) = self.calls.end(serial) {
            info!("Call with {} ended", teardown.peer);
            close_call(teardown).await;
        }
    }
}

async fn next_stream(events: &mut mpsc::UnboundedReceiver<CallEvent>) -> Option<MediaStream> {
    while let Some(event) = events.recv().await {
        match event {
            CallEvent::Stream(stream) => return Some(stream),
            CallEvent::Error(e) => {
                warn!("Call error during negotiation: {}", e);
                return None;
            }
            CallEvent::Closed => return None,
        }
    }
    None
}

async fn close_call(teardown: CallTeardown) {
    if let Some(call) = teardown.call {
        call.close().await;
    }
}

async fn answer_call(ctx: CallContext, call: Arc<dyn MediaCall>, callback: CallCallback) {
    let peer = call.peer().clone();
    let serial = match ctx.calls.begin(peer.clone(), CallDirection::Incoming) {
        Ok(serial) => serial,
        Err(e) => {
            info!("Declining call from {}: {}", peer, e);
            call.close().await;
            return;
        }
    };
    ctx.calls.attach_call(serial, call.clone());

    let Some(mut events) = call.take_events() else {
        warn!("Events of the call from {} were already claimed", peer);
        ctx.abort(serial, "call events unavailable").await;
        return;
    };

    let local = match ctx.media.get_user_media(MediaConstraints::AUDIO_ONLY).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to get local stream: {}", e);
            ctx.abort(serial, e.to_string()).await;
            return;
        }
    };
    if !ctx.calls.attach_local(serial, local.clone()) {
        debug!("Call from {} ended before it was answered", peer);
        return;
    }

    if let Err(e) = call.answer(local).await {
        warn!("Failed to answer call from {}: {}", peer, e);
        ctx.abort(serial, e.to_string()).await;
        return;
    }

    match ctx.await_remote(serial, &mut events).await {
        Ok(active) => {
            info!("Call with {} connected", peer);
            (*callback)(active);
        }
        Err(e) => {
            warn!("Call from {} never connected: {}", peer, e);
            ctx.abort(serial, e.to_string()).await;
            return;
        }
    }
    ctx.watch(serial, events).await;
}
