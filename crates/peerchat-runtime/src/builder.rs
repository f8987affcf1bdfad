//! Client Builder API
//!
//! Builder-style construction for consumers (CLI, tests): hand in the
//! collaborators, optionally override configuration, store and file sink, and
//! get a started `ChatClient` back.

use std::sync::Arc;

use tracing::info;

use peerchat_core::{
    DownloadDirSink, FileSink, MediaDevices, PeerChatConfig, PeerChatError, PeerChatResult,
    SignalingTransport, Store,
};

use crate::client::ChatClient;
use crate::endpoint::PeerEndpoint;

/// Directory used when the configuration names none
const FALLBACK_DOWNLOAD_DIR: &str = "peerchat-downloads";

pub struct ClientBuilder {
    transport: Arc<dyn SignalingTransport>,
    media: Arc<dyn MediaDevices>,
    config: PeerChatConfig,
    sink: Option<Arc<dyn FileSink>>,
    store: Option<Store>,
}

impl ClientBuilder {
    pub fn new(transport: Arc<dyn SignalingTransport>, media: Arc<dyn MediaDevices>) -> Self {
        Self {
            transport,
            media,
            config: PeerChatConfig::default(),
            sink: None,
            store: None,
        }
    }

    /// Set the PeerChat configuration
    pub fn with_config(mut self, config: PeerChatConfig) -> Self {
        self.config = config;
        self
    }

    /// Where received files go; defaults to a `DownloadDirSink`
    pub fn with_file_sink(mut self, sink: Arc<dyn FileSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share an existing store instead of creating a fresh one
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the configuration and start the client. Must be called from
    /// within a tokio runtime.
    pub fn build(self) -> PeerChatResult<ChatClient> {
        self.config
            .validate()
            .map_err(|e| PeerChatError::config_error(e.to_string()))?;

        let sink = match self.sink {
            Some(sink) => sink,
            None => {
                let downloads = &self.config.downloads;
                let dir = downloads
                    .dir
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join(FALLBACK_DOWNLOAD_DIR));
                info!("Saving received files to {}", dir.display());
                Arc::new(DownloadDirSink::new(dir, downloads.overwrite))
            }
        };

        let endpoint = Arc::new(PeerEndpoint::new(
            self.transport,
            self.media.clone(),
            self.config.session,
        ));
        ChatClient::start(endpoint, self.store.unwrap_or_default(), sink, self.media)
    }
}
