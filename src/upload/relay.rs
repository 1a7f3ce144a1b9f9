//! Stream relay
//!
//! Drains an upload stream into a [`TransientArtifact`] in the configured
//! temp directory.
//!
//! # Flow
//!
//! 1. Create a uniquely named file (create-new, nothing is overwritten)
//! 2. Copy the stream into it
//! 3. Flush and sync so the forwarder reads a complete file
//!
//! Any failure after step 1 drops the artifact, which deletes the partial
//! file before the error reaches the caller.

use super::temp_file::{artifact_name, TransientArtifact};
use crate::config::RelayConfig;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Local materialization errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to create transient artifact {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read upload stream: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write transient artifact: {0}")]
    Write(#[source] io::Error),
}

/// Write side of an artifact
#[async_trait]
trait ArtifactSink: AsyncWrite + Unpin + Send {
    /// Make everything written so far durable
    async fn sync(&mut self) -> io::Result<()>;
}

#[async_trait]
impl ArtifactSink for File {
    async fn sync(&mut self) -> io::Result<()> {
        self.sync_all().await
    }
}

/// Drains upload streams to local storage
#[derive(Debug, Clone)]
pub struct StreamRelay {
    temp_dir: PathBuf,
    name_prefix: String,
    buffer_size: usize,
}

impl StreamRelay {
    /// Create a relay writing into `temp_dir`
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        let defaults = RelayConfig::default();
        Self {
            temp_dir: temp_dir.into(),
            name_prefix: defaults.name_prefix,
            buffer_size: defaults.buffer_size,
        }
    }

    /// Create a relay from configuration
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            temp_dir: config.temp_dir(),
            name_prefix: config.name_prefix.clone(),
            buffer_size: config.buffer_size.max(1),
        }
    }

    /// Directory artifacts are written to
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Drain `reader` into a new transient artifact.
    ///
    /// Returns once the whole stream is on disk and synced.
    #[tracing::instrument(
        name = "upload.receive",
        skip(self, reader),
        fields(
            artifact = tracing::field::Empty,
            upload.bytes = tracing::field::Empty
        ),
        err
    )]
    pub async fn receive<R>(&self, reader: R) -> Result<TransientArtifact, RelayError>
    where
        R: AsyncRead + Unpin,
    {
        let name = artifact_name(&self.name_prefix);
        let path = self.temp_dir.join(&name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| RelayError::Create {
                path: path.clone(),
                source,
            })?;

        let span = tracing::Span::current();
        span.record("artifact", name.as_str());

        let artifact = self
            .fill(TransientArtifact::adopt(path, name), reader, file)
            .await?;

        span.record("upload.bytes", artifact.size());
        tracing::debug!(
            path = %artifact.path().display(),
            bytes = artifact.size(),
            "Upload stream materialized"
        );

        Ok(artifact)
    }

    /// Copy `reader` into `sink` on behalf of `artifact`.
    ///
    /// On error the artifact is dropped here, after the sink is closed.
    async fn fill<R, W>(
        &self,
        mut artifact: TransientArtifact,
        reader: R,
        sink: W,
    ) -> Result<TransientArtifact, RelayError>
    where
        R: AsyncRead + Unpin,
        W: ArtifactSink,
    {
        let size = drain(reader, sink, self.buffer_size).await?;
        artifact.seal(size);
        Ok(artifact)
    }
}

/// Copy the stream into `sink` and sync it, returning the byte count
async fn drain<R, W>(mut reader: R, mut sink: W, buffer_size: usize) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin,
    W: ArtifactSink,
{
    let mut buffer = vec![0u8; buffer_size];
    let mut size = 0u64;

    loop {
        let n = reader.read(&mut buffer).await.map_err(RelayError::Read)?;
        if n == 0 {
            break;
        }
        sink.write_all(&buffer[..n])
            .await
            .map_err(RelayError::Write)?;
        size += n as u64;
    }

    sink.flush().await.map_err(RelayError::Write)?;
    sink.sync().await.map_err(RelayError::Write)?;

    Ok(size)
}
