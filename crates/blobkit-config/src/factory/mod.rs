//! Builds blob stores from validated store definitions

use std::sync::Arc;

use tracing::info;

use blobkit_core::error::BlobResult;
use blobkit_core::store::BlobStore;
use blobkit_fs::{FileSystemBlobStore, FileSystemOptions};
use blobkit_gcs::{Credentials, GcsBlobStore};

use crate::toml::{BlobkitConfig, CredentialsSource, StoreConfig, StoreSpec};

/// Open the store described by `config`
pub fn open_store(name: &str, config: &StoreConfig) -> BlobResult<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.validate(name)? {
        StoreSpec::Filesystem {
            base_path,
            digest,
            buffer_size,
        } => {
            let options = FileSystemOptions::default()
                .with_digest(digest)
                .with_buffer_size(buffer_size);
            Arc::new(FileSystemBlobStore::with_options(&base_path, options)?)
        },
        StoreSpec::Gcs {
            bucket_name,
            base_url,
            max_attempts,
            credentials,
        } => {
            let mut builder = GcsBlobStore::builder()
                .bucket_name(bucket_name)
                .base_url(base_url)
                .max_attempts(max_attempts);
            if let Some(source) = credentials {
                builder = builder.credentials(load_credentials(&source)?);
            }
            Arc::new(builder.build()?)
        },
    };

    info!(store = name, id = %store.id(), "Opened blob store");
    Ok(store)
}

/// Open a store by name, or the default store
pub fn open_named_store(config: &BlobkitConfig, name: Option<&str>) -> BlobResult<Arc<dyn BlobStore>> {
    let (name, store) = config.store(name)?;
    open_store(name, store)
}

fn load_credentials(source: &CredentialsSource) -> BlobResult<Credentials> {
    match source {
        CredentialsSource::Inline(json) => Credentials::from_json(json),
        CredentialsSource::File(path) => Credentials::from_file(path),
    }
}
