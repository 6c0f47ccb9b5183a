//! Completion signals from the external analysis pipeline.
//!
//! The pipeline owns the guarantee that an artifact is complete before it is
//! signaled (marker written last, or artifact renamed into place). A signal
//! is only polled here; the trial runner owns the timeout.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use bec_types::TrialError;
use parking_lot::Mutex;
use tracing::debug;

#[async_trait]
pub trait CompletionSignal: Send + Sync {
    /// Clear leftovers of an earlier trial. Called before dispatch.
    async fn reset(&self) -> Result<(), TrialError> {
        Ok(())
    }

    /// Non-blocking check: has a result for the dispatched trial been
    /// published since the last reset?
    async fn is_complete(&self) -> Result<bool, TrialError>;

    /// Called once the artifact has been read.
    async fn acknowledge(&self) -> Result<(), TrialError> {
        Ok(())
    }

    fn name(&self) -> &str;
}

fn unreadable(path: &Path, e: std::io::Error) -> TrialError {
    TrialError::ArtifactUnreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

async fn remove_if_present(path: &Path) -> Result<(), TrialError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(unreadable(path, e)),
    }
}

/// Complete once a marker file exists. The marker is consumed on
/// acknowledge, and a stale one is removed before dispatch.
#[derive(Debug, Clone)]
pub struct MarkerFileSignal {
    marker: PathBuf,
}

impl MarkerFileSignal {
    pub fn new(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl CompletionSignal for MarkerFileSignal {
    async fn reset(&self) -> Result<(), TrialError> {
        remove_if_present(&self.marker).await
    }

    async fn is_complete(&self) -> Result<bool, TrialError> {
        match tokio::fs::metadata(&self.marker).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(unreadable(&self.marker, e)),
        }
    }

    async fn acknowledge(&self) -> Result<(), TrialError> {
        debug!(marker = %self.marker.display(), "consuming completion marker");
        remove_if_present(&self.marker).await
    }

    fn name(&self) -> &str {
        "marker_file"
    }
}

/// Complete once the artifact's modification time moves away from the one
/// seen at reset. File systems stamp mtimes with a coarse clock, so the
/// check never compares against the wall clock.
#[derive(Debug)]
pub struct FreshArtifactSignal {
    artifact: PathBuf,
    baseline: Mutex<Option<SystemTime>>,
}

impl FreshArtifactSignal {
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            baseline: Mutex::new(None),
        }
    }

    async fn modified(&self) -> Result<Option<SystemTime>, TrialError> {
        let metadata = match tokio::fs::metadata(&self.artifact).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unreadable(&self.artifact, e)),
        };
        metadata
            .modified()
            .map(Some)
            .map_err(|e| unreadable(&self.artifact, e))
    }

}

#[async_trait]
impl CompletionSignal for FreshArtifactSignal {
    async fn reset(&self) -> Result<(), TrialError> {
        let modified = self.modified().await?;
        *self.baseline.lock() = modified;
        Ok(())
    }

    async fn is_complete(&self) -> Result<bool, TrialError> {
        let modified = self.modified().await?;
        Ok(modified.is_some() && modified != *self.baseline.lock())
    }

    fn name(&self) -> &str {
        "fresh_artifact"
    }
}

/// Always complete. For pipelines that finish before dispatch returns.
#[derive(Debug, Clone, Default)]
pub struct ImmediateSignal;

#[async_trait]
impl CompletionSignal for ImmediateSignal {
    async fn is_complete(&self) -> Result<bool, TrialError> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "immediate"
    }
}
