//! Fake media capture collaborator

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use peerchat_core::{MediaConstraints, MediaDevices, MediaError, MediaStream, MediaTrack, TrackKind};

/// Hands out synthetic streams and records every capture request
#[derive(Debug, Default)]
pub struct FakeMediaDevices {
    denied: AtomicBool,
    next_stream: AtomicU64,
    requests: Mutex<Vec<MediaConstraints>>,
}

impl FakeMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices whose every request is refused by the user
    pub fn denying() -> Self {
        let devices = Self::default();
        devices.set_denied(true);
        devices
    }

    pub fn set_denied(&self, denied: bool) {
        self.denied.store(denied, Ordering::Release);
    }

    /// Every constraint set requested so far, oldest first
    pub fn requests(&self) -> Vec<MediaConstraints> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(constraints);

        if self.denied.load(Ordering::Acquire) {
            return Err(MediaError::PermissionDenied);
        }
        if !constraints.audio && !constraints.video {
            return Err(MediaError::Unsupported {
                reason: "at least one of audio or video must be requested".to_string(),
            });
        }

        let n = self.next_stream.fetch_add(1, Ordering::Relaxed);
        let id = format!("capture-{}", n);
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(format!("{}-audio", id), TrackKind::Audio));
        }
        if constraints.video {
            tracks.push(MediaTrack::new(format!("{}-video", id), TrackKind::Video));
        }
        debug!("Captured fake stream {} ({} tracks)", id, tracks.len());
        Ok(MediaStream::new(id, tracks))
    }
}
