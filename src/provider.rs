//! Capability trait standing in for the per-resource hooks a response
//! operation needs, decoupled from "it's always a plain file on disk" so
//! alternate backings can be substituted in tests or future embedders.

use crate::http::status::HttpStatus;
use async_std::fs::File;
use async_std::io::Result as IoResult;
use std::path::{Path, PathBuf};

/// A source of bytes for a path resolved under the document root.
///
/// The default implementation, [`FilesystemProvider`], resolves everything
/// straight off disk; the trait exists so the response operation never has
/// to know that.
#[async_trait::async_trait]
pub trait ResourceProvider: Send + Sync {
    /// The status this resource should be served with, or an error status
    /// (404/403) if it cannot be served at all.
    async fn status_for_path(&self, path: &Path) -> HttpStatus;

    /// Size in bytes, or `None` if unavailable.
    async fn size_for_path(&self, path: &Path) -> Option<u64>;

    /// An opaque validator for conditional requests, or `None` if this
    /// provider does not support etags.
    async fn etag_for_path(&self, path: &Path) -> Option<String>;

    /// Last-modified time, or `None` if unavailable.
    async fn last_modified_for_path(&self, path: &Path) -> Option<std::time::SystemTime>;

    /// Opens the item for whole-body streaming. Preferred over
    /// [`open_random_access`](Self::open_random_access) when the entire
    /// resource is being sent.
    async fn open_stream(&self, path: &Path) -> IoResult<File>;

    /// Opens the item for random-access reads, used to satisfy ranged
    /// requests.
    async fn open_random_access(&self, path: &Path) -> IoResult<File>;
}

/// Serves plain files straight from the local filesystem.
pub struct FilesystemProvider;

#[async_trait::async_trait]
impl ResourceProvider for FilesystemProvider {
    async fn status_for_path(&self, path: &Path) -> HttpStatus {
        match async_std::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => HttpStatus::Ok,
            Ok(_) => HttpStatus::NotFound,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => HttpStatus::Forbidden,
            Err(_) => HttpStatus::NotFound,
        }
    }

    async fn size_for_path(&self, path: &Path) -> Option<u64> {
        async_std::fs::metadata(path).await.ok().map(|m| m.len())
    }

    async fn etag_for_path(&self, path: &Path) -> Option<String> {
        let meta = async_std::fs::metadata(path).await.ok()?;
        let modified = meta.modified().ok()?;
        let since_epoch = modified
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        Some(format!("\"{:x}-{:x}\"", since_epoch, meta.len()))
    }

    async fn last_modified_for_path(&self, path: &Path) -> Option<std::time::SystemTime> {
        async_std::fs::metadata(path).await.ok()?.modified().ok()
    }

    async fn open_stream(&self, path: &Path) -> IoResult<File> {
        File::open(path).await
    }

    async fn open_random_access(&self, path: &Path) -> IoResult<File> {
        File::open(path).await
    }
}

/// Joins a resolved, already-sandboxed path with its containing document
/// root for display purposes (logging, etc.), without re-resolving it.
pub fn display_path(root: &Path, resolved: &Path) -> PathBuf {
    resolved
        .strip_prefix(root)
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| resolved.to_path_buf())
}
