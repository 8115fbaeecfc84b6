//! Blob path utilities.
//!
//! Blob paths are relative, `/`-separated and may not escape the root of
//! their store.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use crate::error::{BlobError, BlobResult};

/// Normalize a path by resolving . and .. components
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Utf8Component::CurDir => {
                // Skip current directory
            },
            Utf8Component::ParentDir => {
                // Pop last component if possible, but keep it if it would escape
                if components.is_empty() {
                    components.push(component);
                } else {
                    components.pop();
                }
            },
            other => {
                components.push(other);
            },
        }
    }

    components.iter().map(|c| c.as_str()).collect()
}

/// Check if a path is safe (relative, no directory traversal)
pub fn is_safe_path(path: &Utf8Path) -> bool {
    if path.is_absolute() {
        return false;
    }

    let mut depth = 0i32;

    for component in path.components() {
        match component {
            Utf8Component::CurDir => {},
            Utf8Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            },
            Utf8Component::Normal(_) => {
                depth += 1;
            },
            _ => {
                // Prefixes and root directories are not allowed in blob paths
                return false;
            },
        }
    }

    true
}

/// Validate and normalize a blob path.
///
/// Fails with `InvalidArgument` for empty, absolute or escaping paths.
pub fn validate_blob_path(path: &Utf8Path) -> BlobResult<Utf8PathBuf> {
    if !is_safe_path(path) {
        return Err(BlobError::invalid_argument(format!(
            "Blob path '{}' must be relative and stay inside the store",
            path
        )));
    }

    let normalized = normalize_path(path);
    if normalized.as_str().is_empty() {
        return Err(BlobError::invalid_argument(format!("Blob path '{}' is empty", path)));
    }

    Ok(normalized)
}

/// Render a normalized blob path as a `/`-separated object name
pub fn object_name(path: &Utf8Path) -> String {
    path.components()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("/")
}
