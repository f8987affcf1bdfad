//! File sink that keeps every saved file in memory

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use peerchat_core::{FileDownload, FileSink};

#[derive(Debug, Default)]
pub struct RecordingFileSink {
    saved: Mutex<Vec<FileDownload>>,
    notify: Notify,
}

impl RecordingFileSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, Vec<FileDownload>> {
        self.saved.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Files saved so far, in arrival order
    pub fn saved(&self) -> Vec<FileDownload> {
        self.files().clone()
    }

    pub fn count(&self) -> usize {
        self.files().len()
    }

    /// Wait until at least `count` files were saved; false on timeout
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.count() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl FileSink for RecordingFileSink {
    fn save(&self, file: FileDownload) {
        self.files().push(file);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_saved_file() {
        let sink = std::sync::Arc::new(RecordingFileSink::new());
        let writer = sink.clone();
        tokio::spawn(async move {
            writer.save(FileDownload {
                file_name: "a.txt".into(),
                file_type: None,
                bytes: vec![1, 2, 3],
            });
        });

        assert!(sink.wait_for(1, Duration::from_secs(1)).await);
        assert_eq!(sink.saved()[0].file_name, "a.txt");
    }
}
