//! Scoped temporary storage for one pipeline invocation.
//!
//! Every on-disk artifact the pipeline creates (downloaded audio, chunk
//! files, staged uploads) lives under a guard from this module, so it is
//! removed on every exit path of the owning scope. Concurrent invocations
//! never collide: names embed the process id and a nanosecond timestamp.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// A per-invocation temporary directory, removed with its contents on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh unique directory under the system temp dir.
    pub fn create() -> Result<Self> {
        let path = std::env::temp_dir().join(format!(
            "speechpipe-{}-{}",
            std::process::id(),
            unix_nanos()
        ));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside this directory.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to clean up temp dir");
            }
        }
    }
}

/// A single temporary file, removed on drop.
///
/// For callers that stage one inbound file outside a [`ScratchDir`], e.g. an
/// upload streamed to disk before transcription.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Take ownership of an existing temporary file's lifetime.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reserve a unique staging path for an inbound upload in the system
    /// temp dir. The file itself is not created; the caller writes it.
    pub fn for_upload(original_name: &str) -> Self {
        Self {
            path: staged_upload_path(&std::env::temp_dir(), original_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to clean up temp file");
            }
        }
    }
}

/// Build a collision-free staging path for an uploaded file inside `dir`.
///
/// The original filename is reduced to its final path component, so a
/// hostile "../../name" cannot escape the directory.
pub fn staged_upload_path(dir: &Path, original_name: &str) -> PathBuf {
    let base = Path::new(original_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    dir.join(format!("upload_{}_{}", unix_nanos(), base))
}
