//! The blob store contract.
//!
//! Backends implement the four primitives of [`BlobStore`]; conditional
//! retrieval and `delete_if_exists` are layered on top of them as provided
//! methods, which a backend may override when its API can do better.

use async_trait::async_trait;
use camino::Utf8Path;
use chrono::{DateTime, Utc};

use crate::error::{BlobError, BlobResult};
use crate::types::{Blob, BlobInput, BlobMetadata, StoreId};

/// Preconditions for a conditional retrieval
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    /// Skip the retrieval if the blob's etag is one of these
    pub if_none_match: Vec<String>,
    /// Skip the retrieval if the blob was last modified before this instant
    pub if_modified_since: Option<DateTime<Utc>>,
}

impl Preconditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn if_none_match<I, S>(mut self, etags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.if_none_match.extend(etags.into_iter().map(Into::into));
        self
    }

    pub fn if_modified_since(mut self, instant: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(instant);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.if_none_match.is_empty() && self.if_modified_since.is_none()
    }
}

/// Check whether a blob with the given metadata satisfies the preconditions
/// for skipping its retrieval
pub fn should_skip(metadata: &BlobMetadata, preconditions: &Preconditions) -> bool {
    if let Some(etag) = &metadata.etag {
        if preconditions.if_none_match.iter().any(|candidate| candidate == etag) {
            return true;
        }
    }

    matches!(
        (metadata.last_modified, preconditions.if_modified_since),
        (Some(last_modified), Some(since)) if last_modified < since
    )
}

/// Fail with `InvalidArgument` unless `metadata` was produced by the store `id`
pub fn ensure_owned(id: &StoreId, metadata: &BlobMetadata) -> BlobResult<()> {
    if metadata.belongs_to(id) {
        Ok(())
    } else {
        Err(BlobError::invalid_argument(format!(
            "Metadata for {} was produced by store {}, not by {}",
            metadata.path, metadata.store_id, id
        )))
    }
}

/// A store of blobs addressed by relative path
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Identity embedded in every metadata value this store produces
    fn id(&self) -> &StoreId;

    /// Look up a blob's metadata without fetching its data.
    ///
    /// Fails with `NotFound` if there is no blob at `path`.
    async fn get_metadata(&self, path: &Utf8Path) -> BlobResult<BlobMetadata>;

    /// Retrieve a blob whose metadata was obtained from this same store.
    ///
    /// Metadata from another store is rejected with `InvalidArgument`. May fail
    /// with `NotFound` if the blob was deleted since the metadata lookup.
    async fn retrieve(&self, metadata: BlobMetadata) -> BlobResult<Blob>;

    /// Store a blob, replacing any existing one unless `fail_if_exists` is set.
    ///
    /// All or nothing: if this fails, no partial blob is visible at `path`.
    async fn store(&self, path: &Utf8Path, input: BlobInput, fail_if_exists: bool) -> BlobResult<()>;

    /// Delete a blob, failing with `NotFound` if it does not exist
    async fn delete(&self, path: &Utf8Path) -> BlobResult<()>;

    /// Retrieve a blob unless the preconditions say the caller's copy is current.
    ///
    /// Returns `Ok(None)` when the retrieval was skipped. A missing blob is still
    /// an error.
    async fn retrieve_direct(
        &self,
        path: &Utf8Path,
        preconditions: &Preconditions,
    ) -> BlobResult<Option<Blob>> {
        let metadata = self.get_metadata(path).await?;
        if should_skip(&metadata, preconditions) {
            return Ok(None);
        }
        self.retrieve(metadata).await.map(Some)
    }

    /// Delete a blob, returning `false` instead of failing when it does not exist
    async fn delete_if_exists(&self, path: &Utf8Path) -> BlobResult<bool> {
        match self.delete(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
