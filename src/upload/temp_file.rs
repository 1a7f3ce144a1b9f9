//! Transient artifacts
//!
//! A [`TransientArtifact`] is the local file an upload stream is drained
//! into before it is forwarded to the media API. The artifact owns its path:
//! [`TransientArtifact::remove`] deletes it once, and dropping an artifact that
//! was never removed deletes it as well (RAII pattern), so no exit path can
//! leave the file behind.
//!
//! # Example
//!
//! ```no_run
//! use gql_uploadr::upload::temp_file::artifact_name;
//!
//! let name = artifact_name("avatar ");
//! assert!(name.starts_with("avatar_"));
//! assert!(!name.contains(char::is_whitespace));
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Generate a unique artifact name.
///
/// The name is the current Unix time in milliseconds followed by a random
/// token, behind an optional prefix. Whitespace is normalized to `_` so the
/// name is safe both as a file name and as a provider object id.
pub fn artifact_name(prefix: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    let raw = format!(
        "{}{}_{}",
        prefix,
        chrono::Utc::now().timestamp_millis(),
        &token[..12]
    );
    normalize_whitespace(&raw)
}

/// Replace every whitespace character with `_`
pub fn normalize_whitespace(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Local file materialized from an upload stream
#[derive(Debug)]
pub struct TransientArtifact {
    path: PathBuf,
    name: String,
    size: u64,
    removed: bool,
}

impl TransientArtifact {
    /// Take ownership of a freshly created file.
    ///
    /// From here on the file is deleted when the artifact is removed or
    /// dropped.
    pub(crate) fn adopt(path: PathBuf, name: String) -> Self {
        Self {
            path,
            name,
            size: 0,
            removed: false,
        }
    }

    /// Record how much was written once the stream is drained
    pub(crate) fn seal(&mut self, size: u64) {
        self.size = size;
    }

    /// Get the path to the artifact
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Artifact name, also used as the stored object id
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size of the file in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Delete the artifact.
    ///
    /// Deletion is attempted exactly once; the drop fallback is disarmed even
    /// when the removal fails so the file is never deleted twice.
    pub async fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for TransientArtifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        // Blocking unlink; only reached on error paths and cancelled requests
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed transient artifact on drop");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                crate::metrics::record_cleanup_failure();
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to clean up transient artifact"
                );
            }
        }
    }
}
