//! Media model
//!
//! A `MediaStream` is a set of tracks handed out by the media capture
//! collaborator (or received from a remote peer). Clones share track state, so
//! stopping a track through any clone stops it everywhere, mirroring how a
//! browser stream behaves when it is attached to several elements.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::MediaError;

// ----------------------------------------------------------------------------
// Tracks and Streams
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single media track
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    live: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Stop the track; stopping twice is a no-op
    pub fn stop(&self) {
        self.live.store(false, Ordering::Release);
    }
}

/// A bundle of tracks from one capture request or one remote peer
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// A stream with a single live audio track
    pub fn audio(id: impl Into<String>) -> Self {
        let id = id.into();
        let track = MediaTrack::new(format!("{}-audio", id), TrackKind::Audio);
        Self::new(id, vec![track])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Video)
    }

    /// True while at least one track is live
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }

    /// Stop every track in the stream
    pub fn stop_tracks(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

// ----------------------------------------------------------------------------
// Capture Collaborator
// ----------------------------------------------------------------------------

/// What to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// The only constraints calls are ever placed or answered with
    pub const AUDIO_ONLY: Self = Self {
        audio: true,
        video: false,
    };
}

/// Media capture collaborator (the browser's `getUserMedia`)
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(&self, constraints: MediaConstraints)
        -> Result<MediaStream, MediaError>;
}

#[async_trait]
impl<T: MediaDevices + ?Sized> MediaDevices for Arc<T> {
    async fn get_user_media(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        (**self).get_user_media(constraints).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopping_clone_stops_original() {
        let stream = MediaStream::audio("local");
        let attached = stream.clone();
        assert!(stream.is_live());

        attached.stop_tracks();
        assert!(!stream.is_live());
        assert!(stream.tracks().iter().all(|t| !t.is_live()));
    }

    #[test]
    fn test_audio_stream_has_no_video() {
        let stream = MediaStream::audio("mic");
        assert!(!stream.has_video());
        assert_eq!(stream.tracks().len(), 1);
        assert_eq!(stream.tracks()[0].kind(), TrackKind::Audio);
        assert!(!MediaConstraints::AUDIO_ONLY.video);
    }
}
