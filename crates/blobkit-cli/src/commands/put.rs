//! `blobkit put`: store a file or stdin as a blob.

use camino::Utf8Path;
use futures::{StreamExt, TryStreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use blobkit_core::error::{BlobError, BlobResult};
use blobkit_core::types::{BlobInput, ByteStream, ContentType};

use super::CommandContext;

const CHUNK_SIZE: usize = 64 * 1024;

pub async fn execute(
    path: &Utf8Path,
    file: Option<&Utf8Path>,
    content_type: &str,
    fail_if_exists: bool,
    ctx: &CommandContext,
) -> BlobResult<()> {
    let content_type = ContentType::parse(content_type)?;
    let store = ctx.open_store().await?;

    let input = match file {
        Some(file) => {
            let file = ctx.local_path(file);
            let reader = tokio::fs::File::open(&file)
                .await
                .map_err(|e| BlobError::general(format!("Failed to open {}", file), e))?;
            let size = reader
                .metadata()
                .await
                .map_err(|e| BlobError::general(format!("Failed to stat {}", file), e))?
                .len();
            BlobInput::from_stream(reader_stream(reader), Some(size), content_type)
        },
        None => BlobInput::from_stream(reader_stream(tokio::io::stdin()), None, content_type),
    };

    store.store(path, input, fail_if_exists).await?;
    ctx.output.success(&format!("Stored {} in {}", path, store.id()));
    Ok(())
}

/// Read `reader` in chunks of up to 64 KiB
pub fn reader_stream<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + 'static,
{
    ReaderStream::with_capacity(reader, CHUNK_SIZE)
        .map_err(|e| BlobError::general("Failed to read input", e))
        .boxed()
}
