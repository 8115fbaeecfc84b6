//! `blobkit stores`: list the configured stores.

use blobkit_config::{BlobkitConfig, StoreConfig};
use blobkit_core::error::BlobResult;

use super::CommandContext;

pub async fn execute(ctx: &CommandContext) -> BlobResult<()> {
    let (config, source) = ctx.load_config().await?;
    ctx.output.info(&format!("Configuration: {}", source.path()));

    for line in describe_stores(&config) {
        println!("{}", line);
    }
    Ok(())
}

/// One line per store: marker for the default, name, kind and location
pub fn describe_stores(config: &BlobkitConfig) -> Vec<String> {
    config
        .stores
        .iter()
        .map(|(name, store)| {
            let marker = if config.default_store.as_deref() == Some(name.as_str()) { "*" } else { " " };
            let location = match store {
                StoreConfig::Filesystem(fs) => fs.base_path.as_ref().map(|p| p.to_string()),
                StoreConfig::Gcs(gcs) => gcs.bucket_name.clone(),
            };
            format!(
                "{} {:<16} {:<10} {}",
                marker,
                name,
                store.kind(),
                location.unwrap_or_default()
            )
            .trim_end()
            .to_string()
        })
        .collect()
}
