//! Command implementations and dispatch logic.
//!
//! Each command is an async function taking the parsed arguments and a
//! [`CommandContext`], which knows how to load the configuration and open the
//! selected store.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use blobkit_config::{BlobkitConfig, ConfigLoader, ConfigSource};
use blobkit_core::error::{BlobError, BlobResult};
use blobkit_core::store::BlobStore;

pub mod get;
pub mod put;
pub mod rm;
pub mod stat;
pub mod stores;


use crate::{output::OutputHandler, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub config_path: Option<Utf8PathBuf>,
    pub store_name: Option<String>,
    pub output: OutputHandler,
}

impl CommandContext {
    pub fn new(config_path: Option<Utf8PathBuf>, store_name: Option<String>) -> BlobResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| BlobError::general("Failed to get current directory", e))?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|e| BlobError::general("Current directory is not valid UTF-8", e))?;

        Ok(Self {
            cwd,
            config_path,
            store_name,
            output: OutputHandler::new(),
        })
    }

    pub async fn load_config(&self) -> BlobResult<(BlobkitConfig, ConfigSource)> {
        ConfigLoader::new(self.cwd.clone())
            .load(self.config_path.as_deref())
            .await
    }

    /// Open the store selected with `--store`, or the default store
    pub async fn open_store(&self) -> BlobResult<Arc<dyn BlobStore>> {
        let (config, source) = self.load_config().await?;
        info!(config = %source.path(), "Loaded configuration");
        blobkit_config::open_named_store(&config, self.store_name.as_deref())
    }

    /// Resolve a local file argument against the working directory
    pub fn local_path(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_relative() {
            self.cwd.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> BlobResult<()> {
    match command {
        Commands::Stat { path } => stat::execute(&path, ctx).await,
        Commands::Get {
            path,
            output,
            if_none_match,
            if_modified_since,
        } => {
            let preconditions = get::preconditions(if_none_match, if_modified_since.as_deref())?;
            get::execute(&path, output.as_deref(), &preconditions, ctx).await
        },
        Commands::Put {
            path,
            file,
            content_type,
            fail_if_exists,
        } => put::execute(&path, file.as_deref(), &content_type, fail_if_exists, ctx).await,
        Commands::Rm { path, force } => rm::execute(&path, force, ctx).await,
        Commands::Stores => stores::execute(ctx).await,
    }
}
