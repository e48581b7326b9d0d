//! Resolving a request path to a filesystem item under the document root.
//!
//! The request-target is percent-decoded, joined onto the configured
//! document root, and canonicalized; the canonical path is then checked to
//! still live under the document root's own canonical path. This catches
//! both plain `..` traversal and symlinks that point outside the root —
//! either way the resolved path would canonicalize to somewhere else.

use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
pub enum ResolutionError {
    NotFound,
    Forbidden,
}

/// Percent-decodes `root_relative_path` and joins it onto `root`, rejecting
/// anything that would resolve outside of `root` once canonicalized.
pub fn resolve(root: &Path, root_relative_path: &str) -> Result<PathBuf, ResolutionError> {
    let decoded = percent_decode_str(root_relative_path)
        .decode_utf8()
        .map_err(|_| ResolutionError::Forbidden)?;

    let relative = decoded.trim_start_matches('/');
    if relative.is_empty() {
        return Err(ResolutionError::NotFound);
    }

    let joined = root.join(relative);

    let canonical_root = root.canonicalize().map_err(|_| ResolutionError::NotFound)?;
    let canonical_item = joined
        .canonicalize()
        .map_err(|_| ResolutionError::NotFound)?;

    if !canonical_item.starts_with(&canonical_root) {
        return Err(ResolutionError::Forbidden);
    }

    if canonical_item.is_dir() {
        return Err(ResolutionError::NotFound);
    }

    Ok(canonical_item)
}
