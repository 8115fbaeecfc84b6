//! `blobkit get`: download a blob, optionally only when it changed.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use blobkit_core::error::{BlobError, BlobResult};
use blobkit_core::store::Preconditions;
use blobkit_core::types::ByteStream;

use super::CommandContext;

pub async fn execute(
    path: &Utf8Path,
    output: Option<&Utf8Path>,
    preconditions: &Preconditions,
    ctx: &CommandContext,
) -> BlobResult<()> {
    let store = ctx.open_store().await?;

    let Some(blob) = store.retrieve_direct(path, preconditions).await? else {
        ctx.output.info(&format!("{} not modified, skipped download", path));
        return Ok(());
    };
    let size = blob.metadata().size;

    match output {
        Some(file) => {
            let file = ctx.local_path(file);
            let mut writer = tokio::fs::File::create(&file)
                .await
                .map_err(|e| BlobError::general(format!("Failed to create {}", file), e))?;
            let written = copy_stream(blob.into_stream(), &mut writer).await?;
            ctx.output.success(&format!("Wrote {} ({} bytes) to {}", path, written, file));
        },
        None => {
            let written = copy_stream(blob.into_stream(), &mut tokio::io::stdout()).await?;
            debug!(path = %path, written, expected = size, "Wrote blob to stdout");
        },
    }
    Ok(())
}

/// Build preconditions from `--if-none-match` and `--if-modified-since`
pub fn preconditions(if_none_match: Vec<String>, if_modified_since: Option<&str>) -> BlobResult<Preconditions> {
    let mut preconditions = Preconditions::new().if_none_match(if_none_match);
    if let Some(value) = if_modified_since {
        preconditions = preconditions.if_modified_since(parse_timestamp(value)?);
    }
    Ok(preconditions)
}

/// Parse an RFC 3339 timestamp or an HTTP-date
pub fn parse_timestamp(value: &str) -> BlobResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| BlobError::invalid_argument(format!("'{}' is neither an RFC 3339 timestamp nor an HTTP-date", value)))
}

/// Write every chunk of `stream` to `writer`, returning the byte count
pub async fn copy_stream<W>(mut stream: ByteStream, writer: &mut W) -> BlobResult<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| BlobError::general("Failed to write blob data", e))?;
        written += chunk.len() as u64;
    }
    writer
        .flush()
        .await
        .map_err(|e| BlobError::general("Failed to write blob data", e))?;
    Ok(written)
}
