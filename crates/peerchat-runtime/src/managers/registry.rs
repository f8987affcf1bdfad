//! Connection Registry
//!
//! Maps remote peer identifiers to open data connections. At most one entry
//! exists per remote. Each entry owns a pump task that drains the
//! collaborator's connection events: payloads are queued for whoever takes the
//! data stream, and a close event removes the entry and runs its close
//! callbacks.
//!
//! The data queue lives inside the entry, so once an entry is gone nothing
//! more is delivered for that remote, even if the collaborator still has
//! frames in flight.
//!
//! `clear` starts a new epoch. A connect that began in an earlier epoch is
//! closed instead of registered, so a stopped session never leaves a
//! connection behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use peerchat_core::{
    ConnectOptions, ConnectionEvent, DataConnection, PeerChatError, PeerChatResult, PeerId,
    PeerSession, SessionConfig, Transfer, TransportError,
};

/// Runs once when a connection leaves the registry
pub type CloseCallback = Box<dyn FnOnce(&PeerId) + Send + Sync + 'static>;

struct Entry {
    serial: u64,
    conn: Arc<dyn DataConnection>,
    data: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    on_close: Vec<CloseCallback>,
    pump: AbortHandle,
}

struct RegistryInner {
    entries: DashMap<PeerId, Entry>,
    /// Remotes with a connect in flight
    pending: DashSet<PeerId>,
    next_serial: AtomicU64,
    /// Bumped by `clear`
    epoch: AtomicU64,
    connect_timeout: Duration,
    reliable: bool,
}

/// Shared handle to the set of open connections
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

/// Clears the in-flight marker even if the connect future is dropped
struct PendingGuard<'a> {
    pending: &'a DashSet<PeerId>,
    peer: &'a PeerId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.peer);
    }
}

impl ConnectionRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: DashMap::new(),
                pending: DashSet::new(),
                next_serial: AtomicU64::new(1),
                epoch: AtomicU64::new(0),
                connect_timeout: config.connect_timeout(),
                reliable: config.reliable,
            }),
        }
    }

    pub fn contains(&self, remote: &PeerId) -> bool {
        self.inner.entries.contains_key(remote)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Identifiers of every open connection, sorted
    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Open a reliable data connection to `remote` through `session`
    pub async fn connect(&self, session: &dyn PeerSession, remote: &PeerId) -> PeerChatResult<()> {
        if self.contains(remote) || !self.inner.pending.insert(remote.clone()) {
            return Err(PeerChatError::already_connected(remote.as_str()));
        }
        let _pending = PendingGuard {
            pending: &self.inner.pending,
            peer: remote,
        };
        let epoch = self.inner.epoch.load(Ordering::Acquire);

        let options = ConnectOptions {
            reliable: self.inner.reliable,
            label: None,
        };
        debug!("Connecting to {}", remote);
        let conn = timeout(self.inner.connect_timeout, session.connect(remote, options))
            .await
            .map_err(|_| TransportError::Timeout {
                duration_ms: self.inner.connect_timeout.as_millis() as u64,
            })??;

        if let Err(e) = self.insert(conn.clone()) {
            // The remote connected to us while we were negotiating
            conn.close().await;
            return Err(e);
        }
        // Checked after insertion: a concurrent `clear` either saw the entry
        // or bumped the epoch first
        if self.inner.epoch.load(Ordering::Acquire) != epoch {
            warn!("Session stopped while connecting to {}", remote);
            if self.close(remote).await.is_err() {
                conn.close().await;
            }
            return Err(PeerChatError::NotStarted);
        }
        info!("Connected to {}", remote);
        Ok(())
    }

    /// Register an open connection and start draining its events
    pub fn insert(&self, conn: Arc<dyn DataConnection>) -> PeerChatResult<()> {
        let peer = conn.peer().clone();
        match self.inner.entries.entry(peer.clone()) {
            MapEntry::Occupied(_) => Err(PeerChatError::already_connected(peer.as_str())),
            MapEntry::Vacant(slot) => {
                let events = conn
                    .take_events()
                    .ok_or_else(|| PeerChatError::already_subscribed(peer.as_str(), "connection events"))?;
                let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);
                let (data_tx, data_rx) = mpsc::unbounded_channel();
                let pump = tokio::spawn(pump_connection(
                    Arc::downgrade(&self.inner),
                    peer,
                    serial,
                    events,
                    data_tx,
                ))
                .abort_handle();

                slot.insert(Entry {
                    serial,
                    conn,
                    data: Some(data_rx),
                    on_close: Vec::new(),
                    pump,
                });
                Ok(())
            }
        }
    }

    /// Encode `payload` onto the connection to `remote`
    pub async fn send(&self, remote: &PeerId, payload: &Transfer) -> PeerChatResult<()> {
        let conn = self
            .inner
            .entries
            .get(remote)
            .map(|entry| entry.conn.clone())
            .ok_or_else(|| PeerChatError::no_such_connection(remote.as_str()))?;

        let bytes = payload.encode()?;
        trace!("Sending {} bytes to {}", bytes.len(), remote);
        conn.send(bytes).await?;
        Ok(())
    }

    /// Register a callback for when the connection to `remote` goes away
    pub fn on_close<F>(&self, remote: &PeerId, callback: F) -> PeerChatResult<()>
    where
        F: FnOnce(&PeerId) + Send + Sync + 'static,
    {
        let mut entry = self
            .inner
            .entries
            .get_mut(remote)
            .ok_or_else(|| PeerChatError::no_such_connection(remote.as_str()))?;
        entry.on_close.push(Box::new(callback));
        Ok(())
    }

    /// Take the payload stream of `remote`; only one consumer per connection
    pub fn take_data(&self, remote: &PeerId) -> PeerChatResult<mpsc::UnboundedReceiver<Vec<u8>>> {
        let mut entry = self
            .inner
            .entries
            .get_mut(remote)
            .ok_or_else(|| PeerChatError::no_such_connection(remote.as_str()))?;
        entry
            .data
            .take()
            .ok_or_else(|| PeerChatError::already_subscribed(remote.as_str(), "data"))
    }

    /// Delete the entry for `remote` and run its close callbacks.
    /// Returns false if there was no entry.
    pub fn remove(&self, remote: &PeerId) -> bool {
        match self.inner.entries.remove(remote) {
            Some((peer, entry)) => {
                entry.pump.abort();
                finish(&peer, entry);
                true
            }
            None => false,
        }
    }

    /// Locally disconnect from `remote`
    pub async fn close(&self, remote: &PeerId) -> PeerChatResult<()> {
        let (peer, entry) = self
            .inner
            .entries
            .remove(remote)
            .ok_or_else(|| PeerChatError::no_such_connection(remote.as_str()))?;
        entry.pump.abort();
        let conn = entry.conn.clone();
        finish(&peer, entry);
        conn.close().await;
        Ok(())
    }

    /// Close every connection and abandon connects still in flight
    pub async fn clear(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        for remote in self.ids() {
            if let Err(e) = self.close(&remote).await {
                trace!("Connection to {} already gone: {}", remote, e);
            }
        }
    }
}

/// Run the close callbacks of an entry that already left the map
fn finish(peer: &PeerId, entry: Entry) {
    info!("Connection closed: {}", peer);
    for callback in entry.on_close {
        callback(peer);
    }
}

async fn pump_connection(
    registry: Weak<RegistryInner>,
    peer: PeerId,
    serial: u64,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    data: mpsc::UnboundedSender<Vec<u8>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Data(bytes) => {
                if data.send(bytes).is_err() {
                    trace!("Dropping payload from {}: no data subscriber", peer);
                }
            }
            ConnectionEvent::Error(e) => warn!("Connection error from {}: {}", peer, e),
            ConnectionEvent::Closed => break,
        }
    }

    // Remote closed (or the collaborator dropped the channel)
    let Some(registry) = registry.upgrade() else {
        return;
    };
    if let Some((peer, entry)) = registry
        .entries
        .remove_if(&peer, |_, entry| entry.serial == serial)
    {
        finish(&peer, entry);
    }
}
