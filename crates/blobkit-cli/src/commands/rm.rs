//! `blobkit rm`: delete a blob.

use camino::Utf8Path;

use blobkit_core::error::BlobResult;

use super::CommandContext;

pub async fn execute(path: &Utf8Path, force: bool, ctx: &CommandContext) -> BlobResult<()> {
    let store = ctx.open_store().await?;

    if !force {
        store.delete(path).await?;
        ctx.output.success(&format!("Deleted {}", path));
    } else if store.delete_if_exists(path).await? {
        ctx.output.success(&format!("Deleted {}", path));
    } else {
        ctx.output.warn(&format!("{} does not exist", path));
    }
    Ok(())
}
