//! Blobs and write inputs.
//!
//! A [`Blob`] pairs a metadata snapshot with a byte stream that can be
//! consumed at most once. Dropping the blob (or calling [`Blob::discard`])
//! releases whatever the stream holds: an open file, a pooled HTTP
//! connection, buffered chunks.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::fmt;

use super::{BlobMetadata, ContentType};
use crate::error::BlobResult;

/// Stream of blob data chunks
pub type ByteStream = BoxStream<'static, BlobResult<Bytes>>;

/// A blob: metadata plus its lazily produced data
pub struct Blob {
    metadata: BlobMetadata,
    data: ByteStream,
}

impl Blob {
    pub fn new(metadata: BlobMetadata, data: ByteStream) -> Self {
        Self { metadata, data }
    }

    pub fn metadata(&self) -> &BlobMetadata {
        &self.metadata
    }

    /// Consume the blob, returning its data stream
    pub fn into_stream(self) -> ByteStream {
        self.data
    }

    /// Split into metadata and data stream
    pub fn into_parts(self) -> (BlobMetadata, ByteStream) {
        (self.metadata, self.data)
    }

    /// Consume the data stream and collect it into a single buffer
    pub async fn bytes(self) -> BlobResult<Bytes> {
        let buffer = self
            .data
            .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await?;
        Ok(buffer.freeze())
    }

    /// Release the data stream without reading it
    pub fn discard(self) {
        drop(self.data);
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Data of a blob being written
pub enum BlobBody {
    /// Fully buffered data; can be sent more than once
    Bytes(Bytes),
    /// Streamed data; can be consumed only once
    Stream(ByteStream),
}

impl BlobBody {
    /// Whether the body can be replayed if a write has to be retried
    pub fn is_replayable(&self) -> bool {
        matches!(self, BlobBody::Bytes(_))
    }

    /// Convert into a chunk stream
    pub fn into_stream(self) -> ByteStream {
        match self {
            BlobBody::Bytes(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            BlobBody::Stream(stream) => stream,
        }
    }
}

impl fmt::Debug for BlobBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            BlobBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Input for storing a blob
#[derive(Debug)]
pub struct BlobInput {
    size: Option<u64>,
    content_type: ContentType,
    body: BlobBody,
}

impl BlobInput {
    /// Create an input from a byte stream whose size may be unknown
    pub fn from_stream(data: ByteStream, size: Option<u64>, content_type: ContentType) -> Self {
        Self {
            size,
            content_type,
            body: BlobBody::Stream(data),
        }
    }

    /// Create an input from an in-memory buffer
    pub fn from_bytes(data: impl Into<Bytes>, content_type: ContentType) -> Self {
        let data = data.into();
        Self {
            size: Some(data.len() as u64),
            content_type,
            body: BlobBody::Bytes(data),
        }
    }

    /// Size of the data in bytes, if known in advance
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn is_replayable(&self) -> bool {
        self.body.is_replayable()
    }

    pub fn into_body(self) -> BlobBody {
        self.body
    }

    /// Consume the input, returning its data as a stream
    pub fn into_stream(self) -> ByteStream {
        self.body.into_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoreId;

    fn metadata() -> BlobMetadata {
        BlobMetadata::new(StoreId::new("test"), "foo/bar", 11, ContentType::octet_stream())
    }

    #[tokio::test]
    async fn test_blob_bytes_joins_chunks() {
        let chunks = vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))];
        let blob = Blob::new(metadata(), stream::iter(chunks).boxed());
        assert_eq!(blob.metadata().size, 11);
        assert_eq!(blob.bytes().await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_blob_bytes_surfaces_stream_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"hello")),
            Err(crate::BlobError::message("connection reset")),
        ];
        let blob = Blob::new(metadata(), stream::iter(chunks).boxed());
        assert!(blob.bytes().await.is_err());
    }

    #[test]
    fn test_input_from_bytes_knows_size() {
        let input = BlobInput::from_bytes(&b"abc"[..], ContentType::octet_stream());
        assert_eq!(input.size(), Some(3));
        assert!(input.is_replayable());
    }

    #[tokio::test]
    async fn test_input_from_stream() {
        let data = stream::iter(vec![Ok(Bytes::from_static(b"abc"))]).boxed();
        let input = BlobInput::from_stream(data, None, ContentType::octet_stream());
        assert_eq!(input.size(), None);
        assert!(!input.is_replayable());

        let chunks: Vec<_> = input.into_stream().try_collect().await.unwrap();
        assert_eq!(chunks, vec![Bytes::from_static(b"abc")]);
    }
}
