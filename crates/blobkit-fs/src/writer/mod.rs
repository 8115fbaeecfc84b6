//! Digest-computing streaming writer
//!
//! Wraps an async sink and feeds every chunk written through it into a
//! [`Digester`]. Large chunks are hashed on the blocking pool so digesting
//! never stalls the I/O scheduler.

use blobkit_core::error::{BlobError, BlobResult};
use blobkit_core::types::ByteStream;
use bytes::Bytes;
use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::digest::{DigestAlgorithm, Digester};

/// Chunks at least this large are digested off the async worker
pub const OFFLOAD_THRESHOLD: usize = 64 * 1024;

/// Result of a completed digest write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestOutput {
    /// Number of bytes written
    pub size: u64,
    /// Base64 encoded digest of the written bytes
    pub etag: String,
}

/// Writer that digests everything passing through it
#[derive(Debug)]
pub struct DigestWriter<W> {
    inner: W,
    digester: Digester,
    written: u64,
}

impl<W> DigestWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W, algorithm: DigestAlgorithm) -> Self {
        Self {
            inner,
            digester: Digester::new(algorithm),
            written: 0,
        }
    }

    /// Number of bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Write one chunk and fold it into the digest
    pub async fn write(&mut self, chunk: Bytes) -> BlobResult<()> {
        self.inner
            .write_all(&chunk)
            .await
            .map_err(|e| BlobError::general("Failed to write blob data", e))?;
        self.written += chunk.len() as u64;
        self.update_digest(chunk).await
    }

    /// Drain a chunk stream into the writer
    pub async fn write_stream(&mut self, mut data: ByteStream) -> BlobResult<()> {
        while let Some(chunk) = data.try_next().await? {
            self.write(chunk).await?;
        }
        Ok(())
    }

    /// Flush the sink and return it along with the size and etag
    pub async fn finish(mut self) -> BlobResult<(W, DigestOutput)> {
        self.inner
            .flush()
            .await
            .map_err(|e| BlobError::general("Failed to flush blob data", e))?;
        let output = DigestOutput {
            size: self.written,
            etag: self.digester.finalize_etag(),
        };
        Ok((self.inner, output))
    }

    async fn update_digest(&mut self, chunk: Bytes) -> BlobResult<()> {
        if chunk.len() < OFFLOAD_THRESHOLD {
            self.digester.update(&chunk);
            return Ok(());
        }

        let algorithm = self.digester.algorithm();
        let mut digester = std::mem::replace(&mut self.digester, Digester::new(algorithm));
        self.digester = tokio::task::spawn_blocking(move || {
            digester.update(&chunk);
            digester
        })
        .await
        .map_err(|e| BlobError::general("Digest task failed", e))?;
        Ok(())
    }
}
