//! Upload module
//!
//! Drives one upload end to end:
//!
//! ```text
//! Receiving --ok--> Forwarding --ok--> Done
//!     |                  |
//!     +------err---------+-----> Failed
//! ```
//!
//! The transient artifact created while `Receiving` is deleted before the
//! outcome is returned, whichever state the operation ends in.

use crate::config::Config;
use crate::metrics;
use crate::storage::cloudinary::CloudinaryClient;
use crate::storage::{ForwardError, StorageForwarder, StoredObject};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncRead;

pub mod relay;
pub mod temp_file;

use relay::{RelayError, StreamRelay};

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("IO failure: {0}")]
    IoFailure(#[from] RelayError),

    #[error("Upload failure: {0}")]
    UploadFailure(#[from] ForwardError),
}

impl UploadError {
    /// Stable error code exposed to GraphQL clients
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::IoFailure(_) => "IO_FAILURE",
            UploadError::UploadFailure(_) => "UPLOAD_FAILURE",
        }
    }
}

/// Stage of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Receiving,
    Forwarding,
    Done,
    Failed,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Receiving => "receiving",
            UploadStage::Forwarding => "forwarding",
            UploadStage::Done => "done",
            UploadStage::Failed => "failed",
        }
    }
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relay followed by forwarder, with cleanup in between
#[derive(Clone)]
pub struct UploadService {
    relay: StreamRelay,
    forwarder: StorageForwarder,
}

impl UploadService {
    /// Compose a relay and a forwarder
    pub fn new(relay: StreamRelay, forwarder: StorageForwarder) -> Self {
        Self { relay, forwarder }
    }

    /// Build the production service from configuration
    pub fn from_config(config: &Config) -> Result<Self, ForwardError> {
        let client = CloudinaryClient::new(config.storage.cloudinary.clone())?;
        let forwarder = StorageForwarder::new(Arc::new(client), config.storage.folder.clone());
        Ok(Self::new(StreamRelay::from_config(&config.relay), forwarder))
    }

    /// Drain `reader`, forward it, delete the artifact, return the stored object
    pub async fn upload<R>(&self, reader: R) -> Result<StoredObject, UploadError>
    where
        R: AsyncRead + Unpin,
    {
        let mut stage = UploadStage::Receiving;
        let started = Instant::now();

        let artifact = match self.relay.receive(reader).await {
            Ok(artifact) => artifact,
            Err(e) => {
                metrics::record_stage_duration(stage, started.elapsed().as_secs_f64());
                let err = UploadError::IoFailure(e);
                self.fail(stage, &err);
                return Err(err);
            }
        };
        metrics::record_stage_duration(stage, started.elapsed().as_secs_f64());

        stage = UploadStage::Forwarding;
        tracing::debug!(artifact = %artifact.name(), stage = %stage, "Upload received");

        let forward_started = Instant::now();
        let outcome = self.forwarder.forward(&artifact).await;
        metrics::record_stage_duration(stage, forward_started.elapsed().as_secs_f64());

        let name = artifact.name().to_string();
        let size = artifact.size();
        if let Err(e) = artifact.remove().await {
            metrics::record_cleanup_failure();
            tracing::warn!(artifact = %name, error = %e, "Failed to remove transient artifact");
        }

        match outcome {
            Ok(stored) => {
                metrics::record_upload_success(size);
                tracing::debug!(artifact = %name, stage = %UploadStage::Done, url = %stored.url, "Upload complete");
                Ok(stored)
            }
            Err(e) => {
                let err = UploadError::UploadFailure(e);
                self.fail(stage, &err);
                Err(err)
            }
        }
    }

    fn fail(&self, stage: UploadStage, err: &UploadError) {
        metrics::record_upload_failure(err.code());
        tracing::error!(
            stage = %stage,
            next = %UploadStage::Failed,
            error = %err,
            "Upload failed"
        );
    }
}
