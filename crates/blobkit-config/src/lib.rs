//! Store configuration for blobkit
//!
//! Parses and validates blobkit.toml, finds it on disk, layers project
//! configuration over the per-user file, and opens the configured stores.

pub mod factory;
pub mod loader;
pub mod toml;

pub use factory::{open_named_store, open_store};
pub use loader::{ConfigLoader, ConfigSource, CONFIG_ENV_VAR, CONFIG_FILE_NAME};
pub use crate::toml::{
    parse_config, BlobkitConfig, CredentialsConfig, FileSystemStoreConfig, GcsStoreConfig, StoreConfig, StoreSpec,
};

use blobkit_core::error::BlobError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, BlobError>;
