//! Call bookkeeping
//!
//! Holds the call state machine together with the media attached to the
//! current call. Every call gets a serial number when it starts ringing; late
//! events from an older call carry a stale serial and are ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use peerchat_core::{
    CallDirection, CallState, CallStateError, CallTransition, MediaCall, MediaStream, PeerId,
};

/// Both streams of a connected call
#[derive(Debug, Clone)]
pub struct ActiveCall {
    pub peer: PeerId,
    pub direction: CallDirection,
    pub local: MediaStream,
    pub remote: MediaStream,
}

/// What is left to do after a call ended: close the collaborator's call
pub struct CallTeardown {
    pub peer: PeerId,
    pub call: Option<Arc<dyn MediaCall>>,
}

#[derive(Default)]
struct CallSlot {
    state: CallState,
    serial: u64,
    call: Option<Arc<dyn MediaCall>>,
    local: Option<MediaStream>,
    remote: Option<MediaStream>,
}

impl CallSlot {
    fn apply(&mut self, transition: CallTransition) -> Result<(), CallStateError> {
        self.state = self.state.clone().transition(transition)?;
        Ok(())
    }

    fn is_current(&self, serial: u64) -> bool {
        self.serial == serial && !self.state.is_idle()
    }

    fn hang_up(&mut self) -> Option<CallTeardown> {
        let peer = self.state.peer().cloned()?;
        self.apply(CallTransition::HangUp).ok()?;
        Some(self.release(peer))
    }

    /// Stop every track and hand back the call for closing
    fn release(&mut self, peer: PeerId) -> CallTeardown {
        if let Some(local) = self.local.take() {
            local.stop_tracks();
        }
        if let Some(remote) = self.remote.take() {
            remote.stop_tracks();
        }
        CallTeardown {
            peer,
            call: self.call.take(),
        }
    }
}

#[derive(Default)]
pub struct CallManager {
    slot: Mutex<CallSlot>,
}

impl CallManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, CallSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CallState {
        self.slot().state.clone()
    }

    /// The connected call, if any
    pub fn active(&self) -> Option<ActiveCall> {
        let slot = self.slot();
        match &slot.state {
            CallState::Active { peer, direction } => Some(ActiveCall {
                peer: peer.clone(),
                direction: *direction,
                local: slot.local.clone()?,
                remote: slot.remote.clone()?,
            }),
            _ => None,
        }
    }

    /// Start ringing; `Busy` if a call is already ringing or active
    pub fn begin(&self, peer: PeerId, direction: CallDirection) -> Result<u64, CallStateError> {
        let mut slot = self.slot();
        slot.apply(CallTransition::Ring { peer, direction })?;
        slot.serial += 1;
        Ok(slot.serial)
    }

    /// Attach the captured local stream. A stale call gets its tracks stopped.
    pub fn attach_local(&self, serial: u64, local: MediaStream) -> bool {
        let mut slot = self.slot();
        if !slot.is_current(serial) {
            local.stop_tracks();
            return false;
        }
        slot.local = Some(local);
        true
    }

    pub fn attach_call(&self, serial: u64, call: Arc<dyn MediaCall>) -> bool {
        let mut slot = self.slot();
        if !slot.is_current(serial) {
            return false;
        }
        slot.call = Some(call);
        true
    }

    /// The remote stream arrived
    pub fn activate(&self, serial: u64, remote: MediaStream) -> Result<ActiveCall, CallStateError> {
        let mut slot = self.slot();
        let (peer, direction) = match &slot.state {
            CallState::Ringing { peer, direction } if slot.serial == serial => {
                (peer.clone(), *direction)
            }
            state => {
                remote.stop_tracks();
                return Err(CallStateError::InvalidTransition {
                    from: state.state_name().to_string(),
                    event: format!("Connect (call #{})", serial),
                });
            }
        };
        slot.apply(CallTransition::Connect { peer: peer.clone() })?;
        slot.remote = Some(remote.clone());
        let local = slot.local.clone().unwrap_or_else(|| MediaStream::new("none", Vec::new()));
        Ok(ActiveCall {
            peer,
            direction,
            local,
            remote,
        })
    }

    /// Negotiation or capture failed for call `serial`
    pub fn fail(&self, serial: u64, reason: impl Into<String>) -> Option<CallTeardown> {
        let mut slot = self.slot();
        if !slot.is_current(serial) {
            return None;
        }
        let peer = slot.state.peer().cloned()?;
        let reason = reason.into();
        debug!("Call with {} failed: {}", peer, reason);
        slot.apply(CallTransition::Fail { reason }).ok()?;
        Some(slot.release(peer))
    }

    /// The remote side ended call `serial`
    pub fn end(&self, serial: u64) -> Option<CallTeardown> {
        let mut slot = self.slot();
        if !slot.is_current(serial) {
            return None;
        }
        slot.hang_up()
    }

    /// Hang up whatever call is ringing or active
    pub fn hang_up(&self) -> Option<CallTeardown> {
        self.slot().hang_up()
    }
}
