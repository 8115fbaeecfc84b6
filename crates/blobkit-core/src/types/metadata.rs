//! Blob metadata snapshots and backend identity.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ContentType;

/// Identity of a backend instance, embedded in every metadata value it produces.
///
/// Identities are derived from the backend's configuration (for example the
/// canonical base directory or the bucket and endpoint), so they stay
/// comparable after metadata has been persisted or sent elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    /// Create a store identity from its string form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable snapshot of a blob's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// Backend instance that produced this snapshot
    pub store_id: StoreId,
    /// Path of the blob within its store
    pub path: Utf8PathBuf,
    /// Size of the blob data in bytes
    pub size: u64,
    /// Content type of the blob data
    pub content_type: ContentType,
    /// Content identity token (for example a digest)
    pub etag: Option<String>,
    /// When the blob was last written
    pub last_modified: Option<DateTime<Utc>>,
    /// Backend-specific locator for the data, such as a download link
    pub location: Option<String>,
}

impl BlobMetadata {
    /// Create metadata without etag, timestamp or locator
    pub fn new(
        store_id: StoreId,
        path: impl Into<Utf8PathBuf>,
        size: u64,
        content_type: ContentType,
    ) -> Self {
        Self {
            store_id,
            path: path.into(),
            size,
            content_type,
            etag: None,
            last_modified: None,
            location: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Check whether this snapshot was produced by the given store
    pub fn belongs_to(&self, store_id: &StoreId) -> bool {
        &self.store_id == store_id
    }
}
