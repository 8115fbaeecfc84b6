//! `blobkit stat`: print a blob's metadata.

use camino::Utf8Path;

use blobkit_core::error::BlobResult;
use blobkit_core::types::BlobMetadata;

use super::CommandContext;
use crate::output::OutputHandler;

pub async fn execute(path: &Utf8Path, ctx: &CommandContext) -> BlobResult<()> {
    let store = ctx.open_store().await?;
    let metadata = store.get_metadata(path).await?;
    print_metadata(&ctx.output, &metadata);
    Ok(())
}

pub fn print_metadata(output: &OutputHandler, metadata: &BlobMetadata) {
    output.field("store", metadata.store_id.as_str());
    output.field("path", metadata.path.as_str());
    output.field("size", &metadata.size.to_string());
    output.field("content-type", &metadata.content_type.to_string());
    if let Some(etag) = &metadata.etag {
        output.field("etag", etag);
    }
    if let Some(last_modified) = &metadata.last_modified {
        output.field("last-modified", &last_modified.to_rfc3339());
    }
    if let Some(location) = &metadata.location {
        output.field("location", location);
    }
}
