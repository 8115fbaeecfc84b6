//! Config file discovery and layering

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use blobkit_core::error::BlobError;

use crate::toml::BlobkitConfig;
use crate::ConfigResult;

/// Project configuration file name, searched from the working directory upwards
pub const CONFIG_FILE_NAME: &str = "blobkit.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "BLOBKIT_CONFIG";

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Passed explicitly, e.g. `--config`
    Explicit(Utf8PathBuf),
    /// Named by `BLOBKIT_CONFIG`
    Environment(Utf8PathBuf),
    /// blobkit.toml in the working directory or a parent
    Project(Utf8PathBuf),
    /// Per-user configuration file
    Global(Utf8PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Utf8Path {
        match self {
            ConfigSource::Explicit(path)
            | ConfigSource::Environment(path)
            | ConfigSource::Project(path)
            | ConfigSource::Global(path) => path,
        }
    }
}

/// Main configuration loading interface
pub struct ConfigLoader {
    cwd: Utf8PathBuf,
    env_override: Option<Utf8PathBuf>,
    global_dir: Option<Utf8PathBuf>,
}

impl ConfigLoader {
    /// Loader rooted at `cwd`, with the environment override and the user config directory
    pub fn new(cwd: Utf8PathBuf) -> Self {
        let env_override = std::env::var(CONFIG_ENV_VAR)
            .ok()
            .filter(|value| !value.is_empty())
            .map(Utf8PathBuf::from);
        let global_dir = dirs::config_dir()
            .and_then(|dir| Utf8PathBuf::try_from(dir).ok())
            .map(|dir| dir.join("blobkit"));

        Self {
            cwd,
            env_override,
            global_dir,
        }
    }

    pub fn with_env_override(mut self, path: Option<Utf8PathBuf>) -> Self {
        self.env_override = path;
        self
    }

    pub fn with_global_dir(mut self, dir: Option<Utf8PathBuf>) -> Self {
        self.global_dir = dir;
        self
    }

    /// Find blobkit.toml in the working directory or its parents
    pub fn resolve_config_path(&self) -> Option<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());

        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            current = dir.parent();
        }
        None
    }

    pub fn global_config_path(&self) -> Option<Utf8PathBuf> {
        self.global_dir.as_ref().map(|dir| dir.join("config.toml"))
    }

    /// Load the configuration in effect
    ///
    /// An explicit path or `BLOBKIT_CONFIG` is used on its own. Otherwise the
    /// project file is layered over the global one, and at least one of them
    /// must exist.
    pub async fn load(&self, explicit: Option<&Utf8Path>) -> ConfigResult<(BlobkitConfig, ConfigSource)> {
        if let Some(path) = explicit {
            let path = self.absolute(path);
            let config = load_file(&path).await?;
            return Ok((config, ConfigSource::Explicit(path)));
        }

        if let Some(path) = &self.env_override {
            let path = self.absolute(path);
            let config = load_file(&path).await?;
            return Ok((config, ConfigSource::Environment(path)));
        }

        let global = match self.global_config_path() {
            Some(path) if path.is_file() => Some((load_file(&path).await?, path)),
            _ => None,
        };

        match (self.resolve_config_path(), global) {
            (Some(project_path), global) => {
                let project = load_file(&project_path).await?;
                let merged = merge_configs(global.map(|(config, _)| config), project)?;
                Ok((merged, ConfigSource::Project(project_path)))
            },
            (None, Some((global, path))) => Ok((global, ConfigSource::Global(path))),
            (None, None) => Err(BlobError::ConfigValidation {
                field: "config".to_string(),
                reason: format!(
                    "No {} found in {} or its parents, and no global configuration",
                    CONFIG_FILE_NAME, self.cwd
                ),
            }),
        }
    }

    fn absolute(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_relative() {
            self.cwd.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

/// Read one configuration file, resolving its relative paths
pub async fn load_file(path: &Utf8Path) -> ConfigResult<BlobkitConfig> {
    debug!(path = %path, "loading configuration");
    crate::toml::load_from_file(path).await
}

/// Layer a project configuration over a global one
///
/// Project stores replace global stores of the same name. The project's
/// `default-store` wins when set.
pub fn merge_configs(global: Option<BlobkitConfig>, project: BlobkitConfig) -> ConfigResult<BlobkitConfig> {
    let mut merged = project;

    if let Some(global) = global {
        for (name, store) in global.stores {
            merged.stores.entry(name).or_insert(store);
        }
        if merged.default_store.is_none() {
            merged.default_store = global.default_store;
        }
    }

    crate::toml::validate_config(&merged)?;
    Ok(merged)
}
