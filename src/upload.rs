//! Screenshot upload dispatch.
//!
//! Once a screenshot observation is flushed, its image files are handed to
//! an [`UploadDispatcher`] running on its own task. A file is deleted locally
//! only after its uploader reports success; the aggregator never waits on
//! an upload.

use crate::transparency::SharedTransparencyLog;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Upload errors.
#[derive(Debug)]
pub enum UploadError {
    Config(String),
    Io(String),
    Network(String),
    Server { status: u16, message: String },
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Config(msg) => write!(f, "Upload config error: {msg}"),
            UploadError::Io(msg) => write!(f, "Upload IO error: {msg}"),
            UploadError::Network(msg) => write!(f, "Upload network error: {msg}"),
            UploadError::Server { status, message } => {
                write!(f, "Upload server error ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for UploadError {}

/// Something that can take ownership of a local screenshot file.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<(), UploadError>;
}

/// Sending side handed to the aggregator. Submitting never blocks.
#[derive(Debug, Clone)]
pub struct UploadQueue {
    tx: mpsc::UnboundedSender<PathBuf>,
}

impl UploadQueue {
    /// Queue a file for upload. Returns false if the dispatcher is gone.
    pub fn submit(&self, path: PathBuf) -> bool {
        self.tx.send(path).is_ok()
    }
}

/// Totals reported when the dispatcher finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: u64,
    pub failed: u64,
}

pub struct UploadDispatcher {
    queue: UploadQueue,
    handle: JoinHandle<UploadReport>,
}

impl UploadDispatcher {
    pub fn spawn(
        uploader: Arc<dyn Uploader>,
        transparency: Option<SharedTransparencyLog>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatch(uploader, transparency, rx));
        Self {
            queue: UploadQueue { tx },
            handle,
        }
    }

    pub fn queue(&self) -> UploadQueue {
        self.queue.clone()
    }

    /// Stop accepting files and wait for queued uploads.
    ///
    /// Every other [`UploadQueue`] clone must be dropped first.
    pub async fn finish(self) -> UploadReport {
        drop(self.queue);
        self.handle.await.unwrap_or_else(|e| {
            warn!(error = %e, "upload task ended abnormally");
            UploadReport::default()
        })
    }
}

async fn dispatch(
    uploader: Arc<dyn Uploader>,
    transparency: Option<SharedTransparencyLog>,
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
) -> UploadReport {
    let mut report = UploadReport::default();

    while let Some(path) = rx.recv().await {
        match uploader.upload(&path).await {
            Ok(()) => {
                report.uploaded += 1;
                if let Some(log) = &transparency {
                    log.record_upload();
                }
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "uploaded file could not be removed");
                } else {
                    debug!(path = %path.display(), "screenshot uploaded");
                }
            }
            Err(e) => {
                report.failed += 1;
                warn!(path = %path.display(), error = %e, "screenshot upload failed, keeping local file");
            }
        }
    }

    report
}

/// Uploads screenshots to an HTTP endpoint with a bearer token.
#[cfg(feature = "upload")]
pub struct HttpUploader {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

#[cfg(feature = "upload")]
impl HttpUploader {
    pub fn new(config: &crate::config::UploadConfig) -> Result<Self, UploadError> {
        if config.endpoint.is_empty() {
            return Err(UploadError::Config("upload endpoint is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| UploadError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            client,
        })
    }
}

#[cfg(feature = "upload")]
#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, path: &Path) -> Result<(), UploadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "image/png")
            .header("X-File-Name", file_name)
            .body(bytes)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UploadError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparency::create_shared_log;

    /// Accepts files whose name contains "ok".
    struct PickyUploader;

    #[async_trait]
    impl Uploader for PickyUploader {
        async fn upload(&self, path: &Path) -> Result<(), UploadError> {
            let name = path.file_name().unwrap().to_string_lossy();
            if name.contains("ok") {
                Ok(())
            } else {
                Err(UploadError::Network("refused".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_deletes_only_uploaded_files() {
        let dir = tempfile::tempdir().unwrap();
        let ok = dir.path().join("ok.png");
        let bad = dir.path().join("bad.png");
        std::fs::write(&ok, b"png").unwrap();
        std::fs::write(&bad, b"png").unwrap();

        let log = create_shared_log();
        let dispatcher = UploadDispatcher::spawn(Arc::new(PickyUploader), Some(log.clone()));
        let queue = dispatcher.queue();
        assert!(queue.submit(ok.clone()));
        assert!(queue.submit(bad.clone()));
        drop(queue);

        let report = dispatcher.finish().await;
        assert_eq!(report, UploadReport { uploaded: 1, failed: 1 });
        assert!(!ok.exists());
        assert!(bad.exists());
        assert_eq!(log.stats().images_uploaded, 1);
    }

    #[test]
    fn test_error_display() {
        let err = UploadError::Server {
            status: 503,
            message: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "Upload server error (503): busy");
    }
}
