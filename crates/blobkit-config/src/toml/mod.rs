//! blobkit.toml parsing, validation and serialization

use std::collections::BTreeMap;

use blobkit_core::error::{BlobError, BlobResult};
use blobkit_fs::digest::{parse_algorithm, DigestAlgorithm};
use blobkit_gcs::client::DEFAULT_BASE_URL;
use blobkit_core::retry::DEFAULT_MAX_ATTEMPTS;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Digest algorithm of filesystem stores that do not name one
pub const DEFAULT_DIGEST_ALGORITHM: DigestAlgorithm = DigestAlgorithm::Sha256;

/// Read buffer size of filesystem stores that do not name one
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Complete blobkit.toml configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlobkitConfig {
    /// Store used when a command does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_store: Option<String>,

    /// Named store definitions
    #[serde(default)]
    pub stores: BTreeMap<String, StoreConfig>,
}

/// One `[stores.<name>]` table, selected by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StoreConfig {
    Filesystem(FileSystemStoreConfig),
    Gcs(GcsStoreConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileSystemStoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<Utf8PathBuf>,

    /// `SHA-1` or `SHA-256`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest_algorithm: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GcsStoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Anonymous access when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsConfig>,
}

/// Credentials JSON, inline or in a file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CredentialsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_file: Option<Utf8PathBuf>,
}

/// A validated store definition with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub enum StoreSpec {
    Filesystem {
        base_path: Utf8PathBuf,
        digest: DigestAlgorithm,
        buffer_size: usize,
    },
    Gcs {
        bucket_name: String,
        base_url: String,
        max_attempts: u32,
        credentials: Option<CredentialsSource>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CredentialsSource {
    Inline(String),
    File(Utf8PathBuf),
}

impl StoreConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreConfig::Filesystem(_) => "filesystem",
            StoreConfig::Gcs(_) => "gcs",
        }
    }

    /// Check every field, reporting all missing ones together
    pub fn validate(&self, name: &str) -> BlobResult<StoreSpec> {
        let mut problems = Problems::new(name);

        let spec = match self {
            StoreConfig::Filesystem(config) => {
                let base_path = problems.require("base-path", config.base_path.clone());
                let digest = match &config.digest_algorithm {
                    Some(value) => problems.check(parse_algorithm(&problems.field("digest-algorithm"), value)),
                    None => Some(DEFAULT_DIGEST_ALGORITHM),
                };
                let buffer_size = config.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
                if buffer_size == 0 {
                    problems.invalid("buffer-size", "must be at least 1");
                }

                match (base_path, digest) {
                    (Some(base_path), Some(digest)) => Some(StoreSpec::Filesystem {
                        base_path,
                        digest,
                        buffer_size,
                    }),
                    _ => None,
                }
            },
            StoreConfig::Gcs(config) => {
                let bucket_name = problems.require("bucket-name", config.bucket_name.clone());
                if matches!(&bucket_name, Some(bucket) if bucket.trim().is_empty()) {
                    problems.invalid("bucket-name", "must not be empty");
                }
                let credentials = match &config.credentials {
                    None => None,
                    Some(credentials) => match (&credentials.json, &credentials.json_file) {
                        (Some(json), None) => Some(CredentialsSource::Inline(json.clone())),
                        (None, Some(file)) => Some(CredentialsSource::File(file.clone())),
                        _ => {
                            problems.invalid("credentials", "set exactly one of `json` or `json-file`");
                            None
                        },
                    },
                };

                bucket_name.map(|bucket_name| StoreSpec::Gcs {
                    bucket_name,
                    base_url: config
                        .base_url
                        .clone()
                        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                    max_attempts: config.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                    credentials,
                })
            },
        };

        problems.finish()?;
        spec.ok_or_else(|| BlobError::ConfigValidation {
            field: format!("stores.{}", name),
            reason: "incomplete store definition".to_string(),
        })
    }

    /// Resolve relative paths against the directory of the config file
    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        match self {
            StoreConfig::Filesystem(config) => {
                if let Some(path) = &mut config.base_path {
                    resolve_path(path, base_dir);
                }
            },
            StoreConfig::Gcs(config) => {
                if let Some(path) = config.credentials.as_mut().and_then(|c| c.json_file.as_mut()) {
                    resolve_path(path, base_dir);
                }
            },
        }
    }
}

fn resolve_path(path: &mut Utf8PathBuf, base_dir: &Utf8Path) {
    if path.is_relative() {
        *path = base_dir.join(&*path);
    }
}

/// Collects missing and invalid fields of one store
struct Problems<'a> {
    store: &'a str,
    missing: Vec<String>,
    invalid: Vec<(String, String)>,
}

impl<'a> Problems<'a> {
    fn new(store: &'a str) -> Self {
        Self {
            store,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    fn field(&self, name: &str) -> String {
        format!("stores.{}.{}", self.store, name)
    }

    fn require<T>(&mut self, name: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.missing.push(self.field(name));
        }
        value
    }

    fn invalid(&mut self, name: &str, reason: &str) {
        self.invalid.push((self.field(name), reason.to_string()));
    }

    fn check<T>(&mut self, result: BlobResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(BlobError::ConfigValidation { field, reason }) => {
                self.invalid.push((field, reason));
                None
            },
            Err(other) => {
                self.invalid.push((format!("stores.{}", self.store), other.to_string()));
                None
            },
        }
    }

    fn finish(self) -> BlobResult<()> {
        if !self.missing.is_empty() {
            return Err(BlobError::MissingFields {
                subject: format!("store '{}'", self.store),
                fields: self.missing,
            });
        }
        if !self.invalid.is_empty() {
            let (fields, reasons): (Vec<_>, Vec<_>) = self.invalid.into_iter().unzip();
            return Err(BlobError::ConfigValidation {
                field: fields.join(", "),
                reason: reasons.join("; "),
            });
        }
        Ok(())
    }
}

impl BlobkitConfig {
    /// Look up a store by name, or the default store when `name` is `None`
    pub fn store(&self, name: Option<&str>) -> BlobResult<(&str, &StoreConfig)> {
        let name = match name.or(self.default_store.as_deref()) {
            Some(name) => name,
            None if self.stores.len() == 1 => self.stores.keys().next().map(String::as_str).unwrap_or_default(),
            None => {
                return Err(BlobError::ConfigValidation {
                    field: "default-store".to_string(),
                    reason: "no store named and no default-store configured".to_string(),
                })
            },
        };

        self.stores
            .get_key_value(name)
            .map(|(name, config)| (name.as_str(), config))
            .ok_or_else(|| BlobError::ConfigValidation {
                field: "stores".to_string(),
                reason: format!("no store named '{}'", name),
            })
    }

    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        for config in self.stores.values_mut() {
            config.resolve_paths(base_dir);
        }
    }
}

/// Parse TOML string to a validated configuration
pub fn parse_config(content: &str) -> BlobResult<BlobkitConfig> {
    let config: BlobkitConfig =
        ::toml::from_str(content).map_err(|e| BlobError::TomlParse(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Serialize a configuration to TOML
pub fn serialize_config(config: &BlobkitConfig) -> BlobResult<String> {
    ::toml::to_string_pretty(config).map_err(|e| BlobError::TomlParse(format!("serialization failed: {}", e)))
}

/// Validate every store and the default store reference
pub fn validate_config(config: &BlobkitConfig) -> BlobResult<()> {
    for (name, store) in &config.stores {
        store.validate(name)?;
    }

    if let Some(default) = &config.default_store {
        if !config.stores.contains_key(default) {
            return Err(BlobError::ConfigValidation {
                field: "default-store".to_string(),
                reason: format!("no store named '{}'", default),
            });
        }
    }
    Ok(())
}

/// Load and parse blobkit.toml from a file path
pub async fn load_from_file(path: &Utf8Path) -> BlobResult<BlobkitConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BlobError::general(format!("Failed to read {}", path), e))?;

    let mut config = parse_config(&content).map_err(|e| match e {
        BlobError::TomlParse(msg) => BlobError::TomlParse(format!("In file {}: {}", path, msg)),
        other => other,
    })?;
    if let Some(dir) = path.parent() {
        config.resolve_paths(dir);
    }
    Ok(config)
}
