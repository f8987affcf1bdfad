//! File persistence collaborator
//!
//! Received files are handed to a `FileSink` and forgotten: the sink owns the
//! bytes from then on and reports nothing back to the caller.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::payload::{FileDownload, DEFAULT_FILE_NAME};

/// Device-level "save as download" operation
pub trait FileSink: Send + Sync {
    /// Persist a received file; fire-and-forget
    fn save(&self, file: FileDownload);
}

impl<T: FileSink + ?Sized> FileSink for std::sync::Arc<T> {
    fn save(&self, file: FileDownload) {
        (**self).save(file)
    }
}

// ----------------------------------------------------------------------------
// Download Directory Sink
// ----------------------------------------------------------------------------

/// Writes received files into a directory
#[derive(Debug, Clone)]
pub struct DownloadDirSink {
    dir: PathBuf,
    overwrite: bool,
}

impl DownloadDirSink {
    pub fn new(dir: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            dir: dir.into(),
            overwrite,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the file and return where it landed
    pub async fn write(&self, file: &FileDownload) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = sanitize_file_name(&file.file_name);

        let mut attempt = 0u32;
        loop {
            let path = self.dir.join(candidate_name(&name, attempt));
            let mut options = tokio::fs::OpenOptions::new();
            options.write(true);
            if self.overwrite {
                options.create(true).truncate(true);
            } else {
                options.create_new(true);
            }

            match options.open(&path).await {
                Ok(mut handle) => {
                    handle.write_all(&file.bytes).await?;
                    handle.flush().await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 1000 => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl FileSink for DownloadDirSink {
    fn save(&self, file: FileDownload) {
        let sink = self.clone();
        tokio::spawn(async move {
            match sink.write(&file).await {
                Ok(path) => info!("Saved {} ({} bytes) to {}", file.file_name, file.bytes.len(), path.display()),
                Err(e) => error!("Failed to save {}: {}", file.file_name, e),
            }
        });
    }
}

/// Keep only the final path component of a name chosen by a remote peer
fn sanitize_file_name(name: &str) -> String {
    let cleaned = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != "." && *n != "..");

    match cleaned {
        Some(n) => n.to_string(),
        None => {
            debug!("Replacing unusable file name {:?}", name);
            DEFAULT_FILE_NAME.to_string()
        }
    }
}

/// `report.pdf`, `report (1).pdf`, `report (2).pdf`, ...
fn candidate_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, attempt, ext),
        _ => format!("{} ({})", name, attempt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download(name: &str, bytes: &[u8]) -> FileDownload {
        FileDownload {
            file_name: name.to_string(),
            file_type: None,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("notes.txt"), "notes.txt");
        assert_eq!(sanitize_file_name(".."), DEFAULT_FILE_NAME);
        assert_eq!(sanitize_file_name(""), DEFAULT_FILE_NAME);
    }

    #[test]
    fn test_candidate_names() {
        assert_eq!(candidate_name("a.txt", 0), "a.txt");
        assert_eq!(candidate_name("a.txt", 2), "a (2).txt");
        assert_eq!(candidate_name("README", 1), "README (1)");
        assert_eq!(candidate_name(".env", 1), ".env (1)");
    }

    #[tokio::test]
    async fn test_write_never_clobbers_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DownloadDirSink::new(dir.path(), false);

        let first = sink.write(&download("a.txt", b"one")).await.unwrap();
        let second = sink.write(&download("a.txt", b"two")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_write_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DownloadDirSink::new(dir.path().join("nested"), true);

        let first = sink.write(&download("a.txt", b"one")).await.unwrap();
        let second = sink.write(&download("a.txt", b"two")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }
}
