//! Storage forwarding
//!
//! Persists transient artifacts to an external blob store and hands back the
//! public URL of the stored object.
//!
//! The provider sits behind the [`BlobStore`] capability so the forwarder can
//! run against a fake in tests. [`cloudinary::CloudinaryClient`] is the
//! production implementation.
//!
//! # Example
//!
//! ```no_run
//! use gql_uploadr::config::CloudinaryConfig;
//! use gql_uploadr::storage::cloudinary::CloudinaryClient;
//! use gql_uploadr::storage::StorageForwarder;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CloudinaryConfig {
//!     cloud_name: "demo".into(),
//!     api_key: "123456789012345".into(),
//!     api_secret: "secret".into(),
//!     ..Default::default()
//! };
//! let client = CloudinaryClient::new(config)?;
//! let forwarder = StorageForwarder::new(Arc::new(client), "graphql");
//! assert_eq!(forwarder.folder(), "graphql");
//! # Ok(())
//! # }
//! ```

pub mod cloudinary;

use crate::upload::temp_file::TransientArtifact;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Forwarding errors
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to open artifact: {0}")]
    Artifact(#[source] std::io::Error),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Provider rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Reference to a persisted object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Public (https) URL of the object
    pub url: String,
    /// Object id as reported by the provider, folder included
    pub public_id: String,
    /// Stored size, when the provider reports it
    pub bytes: Option<u64>,
}

/// External blob store capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload the file at `local_path` as `public_id` under `folder`
    async fn upload(
        &self,
        local_path: &Path,
        public_id: &str,
        folder: &str,
    ) -> Result<StoredObject, ForwardError>;
}

/// Pushes transient artifacts to a [`BlobStore`]
#[derive(Clone)]
pub struct StorageForwarder {
    store: Arc<dyn BlobStore>,
    folder: String,
}

impl StorageForwarder {
    /// Create a forwarder storing every object under `folder`
    pub fn new(store: Arc<dyn BlobStore>, folder: impl Into<String>) -> Self {
        Self {
            store,
            folder: folder.into(),
        }
    }

    /// Target folder
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Forward the artifact, using its name as the object id.
    ///
    /// Single attempt; errors are returned as-is.
    #[tracing::instrument(
        name = "upload.forward",
        skip(self, artifact),
        fields(
            artifact = %artifact.name(),
            folder = %self.folder,
            upload.bytes = artifact.size()
        ),
        err
    )]
    pub async fn forward(&self, artifact: &TransientArtifact) -> Result<StoredObject, ForwardError> {
        let stored = self
            .store
            .upload(artifact.path(), artifact.name(), &self.folder)
            .await?;

        tracing::info!(url = %stored.url, public_id = %stored.public_id, "Artifact forwarded");
        Ok(stored)
    }
}
