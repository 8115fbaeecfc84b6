//! Filesystem blob store
//!
//! Layout under the base directory:
//! - `<path>`: blob data
//! - `<path>.metadata`: sidecar with content type, etag and timestamp
//! - `.tmp/`: write-in-progress files, on the same filesystem as the blobs
//!
//! A blob is visible only while both its data file and its sidecar exist.
//! Writes land in `.tmp` first and are committed with renames, so readers
//! never observe a truncated data file. The sidecar records the size and
//! identity of the data file it was committed with; metadata reads that
//! catch an overwrite between the two renames see a mismatch and re-read.

use async_trait::async_trait;
use blobkit_core::error::{BlobError, BlobResult};
use blobkit_core::store::{ensure_owned, BlobStore};
use blobkit_core::types::{Blob, BlobInput, BlobMetadata, ByteStream, StoreId};
use blobkit_core::utils::{validate_blob_path, Clock, SystemClock};
use camino::{Utf8Path, Utf8PathBuf};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::digest::DigestAlgorithm;
use crate::sidecar::{Sidecar, SIDECAR_SUFFIX};
use crate::writer::DigestWriter;

/// Name of the reserved temp directory under the base path
pub const TEMP_DIR: &str = ".tmp";

/// Default read and write buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Metadata reads before giving up on a data file and sidecar that disagree
const METADATA_READ_ATTEMPTS: u32 = 8;

/// Tuning and collaborators of a filesystem store
#[derive(Clone)]
pub struct FileSystemOptions {
    /// Size of the chunks produced when reading blob data
    pub buffer_size: usize,
    /// Algorithm used to compute etags
    pub digest: DigestAlgorithm,
    /// Source of `last-modified` timestamps
    pub clock: Arc<dyn Clock>,
}

impl Default for FileSystemOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            digest: DigestAlgorithm::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl FileSystemOptions {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn with_digest(mut self, digest: DigestAlgorithm) -> Self {
        self.digest = digest;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for FileSystemOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemOptions")
            .field("buffer_size", &self.buffer_size)
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

/// Blob store backed by a local directory
#[derive(Debug)]
pub struct FileSystemBlobStore {
    id: StoreId,
    base_path: Utf8PathBuf,
    temp_dir: Utf8PathBuf,
    options: FileSystemOptions,
}

impl FileSystemBlobStore {
    /// Open a store with default options, creating the directory layout
    pub fn new<P: AsRef<Utf8Path>>(base_path: P) -> BlobResult<Self> {
        Self::with_options(base_path, FileSystemOptions::default())
    }

    /// Open a store, creating the base and temp directories if needed
    pub fn with_options<P: AsRef<Utf8Path>>(base_path: P, options: FileSystemOptions) -> BlobResult<Self> {
        let base_path = base_path.as_ref();
        let temp_dir = base_path.join(TEMP_DIR);
        std::fs::create_dir_all(&temp_dir).map_err(|e| {
            BlobError::general(format!("Failed to create store directory {}", temp_dir), e)
        })?;

        let base_path = base_path.canonicalize_utf8().map_err(|e| {
            BlobError::general(format!("Failed to resolve store directory {}", base_path), e)
        })?;
        let temp_dir = base_path.join(TEMP_DIR);
        let id = StoreId::new(format!("file://{}", base_path));

        debug!(base_path = %base_path, digest = %options.digest, "Opened filesystem blob store");
        Ok(Self {
            id,
            base_path,
            temp_dir,
            options,
        })
    }

    /// Canonical base directory of the store
    pub fn base_path(&self) -> &Utf8Path {
        &self.base_path
    }

    /// Validate a blob path and resolve it to its data file
    fn resolve(&self, path: &Utf8Path) -> BlobResult<(Utf8PathBuf, Utf8PathBuf)> {
        let relative = validate_blob_path(path)?;

        if relative.components().next().map(|c| c.as_str()) == Some(TEMP_DIR) {
            return Err(BlobError::invalid_argument(format!(
                "Blob path '{}' is inside the reserved {} directory",
                path, TEMP_DIR
            )));
        }
        if relative.as_str().ends_with(SIDECAR_SUFFIX) {
            return Err(BlobError::invalid_argument(format!(
                "Blob path '{}' must not end with {}",
                path, SIDECAR_SUFFIX
            )));
        }

        let data_path = self.base_path.join(&relative);
        Ok((relative, data_path))
    }

    async fn write_data(&self, input: BlobInput, path: &Utf8Path) -> BlobResult<WrittenData> {
        let declared_size = input.size();
        let (file, temp_path) = self.temp_file("blob").await?;

        let mut writer = DigestWriter::new(
            BufWriter::with_capacity(self.options.buffer_size, File::from_std(file)),
            self.options.digest,
        );
        writer.write_stream(input.into_stream()).await?;
        let (sink, output) = writer.finish().await?;
        let file = sink.into_inner();
        let synced = async {
            file.sync_all().await?;
            file.metadata().await
        };
        let attributes = synced
            .await
            .map_err(|e| BlobError::io(path.as_str(), "Failed to sync blob data", e))?;

        if let Some(expected) = declared_size {
            if expected != output.size {
                return Err(BlobError::message(format!(
                    "Blob input for {} declared {} bytes but produced {}",
                    path, expected, output.size
                )));
            }
        }

        Ok(WrittenData {
            temp_path,
            etag: output.etag,
            size: attributes.len(),
            data_id: data_identity(&attributes),
        })
    }

    async fn write_sidecar(&self, sidecar: &Sidecar, path: &Utf8Path) -> BlobResult<TempPath> {
        let (file, temp_path) = self.temp_file("meta").await?;
        let mut file = File::from_std(file);
        let sync = async {
            file.write_all(sidecar.encode().as_bytes()).await?;
            file.sync_all().await
        };
        sync.await
            .map_err(|e| BlobError::io(path.as_str(), "Failed to write blob metadata", e))?;
        Ok(temp_path)
    }

    /// Allocate a uniquely named file in the temp directory
    async fn temp_file(&self, prefix: &'static str) -> BlobResult<(std::fs::File, TempPath)> {
        let temp_dir = self.temp_dir.clone();
        let created = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(prefix).tempfile_in(&temp_dir)
        })
        .await
        .map_err(|e| BlobError::general("Temp file task failed", e))?;

        let named = created.map_err(|e| BlobError::general("Failed to create temp file", e))?;
        Ok(named.into_parts())
    }
}

/// A data file written to the temp directory, not yet committed
struct WrittenData {
    temp_path: TempPath,
    etag: String,
    size: u64,
    data_id: String,
}

/// Identity of a data file that survives rename and hard link but changes
/// when the file is replaced
fn data_identity(attributes: &std::fs::Metadata) -> String {
    let modified = attributes
        .modified()
        .ok()
        .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |since| since.as_nanos());

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        format!("{}:{}:{}", attributes.dev(), attributes.ino(), modified)
    }
    #[cfg(not(unix))]
    {
        format!("{}:{}", attributes.len(), modified)
    }
}

/// Sidecar path of a data file
fn sidecar_path(data_path: &Utf8Path) -> Utf8PathBuf {
    let mut name = data_path.as_str().to_string();
    name.push_str(SIDECAR_SUFFIX);
    Utf8PathBuf::from(name)
}

/// Place a committed blob at its final location.
///
/// With `fail_if_exists`, the data path is claimed with a hard link, which
/// fails if anything is already there. Otherwise the previous sidecar is
/// backed up so it can be restored if the data rename fails.
fn commit(
    data_temp: &Utf8Path,
    sidecar_temp: &Utf8Path,
    data_path: &Utf8Path,
    fail_if_exists: bool,
) -> io::Result<()> {
    let sidecar_path = sidecar_path(data_path);

    if fail_if_exists {
        std::fs::hard_link(data_temp, data_path)?;
        if let Err(e) = std::fs::rename(sidecar_temp, &sidecar_path) {
            if let Err(rollback) = std::fs::remove_file(data_path) {
                warn!(path = %data_path, error = %rollback, "Failed to roll back blob data");
            }
            return Err(e);
        }
        return Ok(());
    }

    let backup = sidecar_path_backup(sidecar_temp);
    let has_backup = match std::fs::hard_link(&sidecar_path, &backup) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };

    let result = std::fs::rename(sidecar_temp, &sidecar_path).and_then(|()| {
        std::fs::rename(data_temp, data_path).map_err(|e| {
            let restored = if has_backup {
                std::fs::rename(&backup, &sidecar_path)
            } else {
                std::fs::remove_file(&sidecar_path)
            };
            if let Err(restore_error) = restored {
                warn!(path = %sidecar_path, error = %restore_error, "Failed to restore blob metadata");
            }
            e
        })
    });

    if has_backup {
        let _ = std::fs::remove_file(&backup);
    }
    result
}

fn sidecar_path_backup(sidecar_temp: &Utf8Path) -> Utf8PathBuf {
    let mut name = sidecar_temp.as_str().to_string();
    name.push_str(".bak");
    Utf8PathBuf::from(name)
}

/// Lazily opened chunked reader over a data file
fn read_file(data_path: Utf8PathBuf, blob_path: String, buffer_size: usize) -> ByteStream {
    let open_path = blob_path.clone();
    stream::once(async move {
        File::open(&data_path)
            .await
            .map_err(|e| BlobError::io(open_path.as_str(), "Failed to open blob data", e))
    })
    .map_ok(move |file| {
        let blob_path = blob_path.clone();
        ReaderStream::with_capacity(file, buffer_size)
            .map_err(move |e| BlobError::io(blob_path.as_str(), "Failed to read blob data", e))
    })
    .try_flatten()
    .boxed()
}

#[async_trait]
impl BlobStore for FileSystemBlobStore {
    fn id(&self) -> &StoreId {
        &self.id
    }

    async fn get_metadata(&self, path: &Utf8Path) -> BlobResult<BlobMetadata> {
        let (relative, data_path) = self.resolve(path)?;
        let sidecar_path = sidecar_path(&data_path);

        let mut attempt = 1;
        loop {
            let attributes = fs::metadata(&data_path)
                .await
                .map_err(|e| BlobError::io(relative.as_str(), "Failed to read blob attributes", e))?;
            if !attributes.is_file() {
                return Err(BlobError::not_found(relative.as_str()));
            }

            let text = fs::read_to_string(&sidecar_path)
                .await
                .map_err(|e| BlobError::io(relative.as_str(), "Failed to read blob metadata", e))?;
            let mut sidecar = Sidecar::decode(&text)?;

            if !sidecar.describes(attributes.len(), &data_identity(&attributes)) {
                if attempt < METADATA_READ_ATTEMPTS {
                    debug!(path = %relative, attempt, "Blob metadata does not match its data, reading again");
                    tokio::time::sleep(Duration::from_millis(u64::from(attempt))).await;
                    attempt += 1;
                    continue;
                }
                warn!(path = %relative, "Blob metadata does not match its data, omitting etag");
                sidecar.etag = None;
            }

            let mut metadata =
                BlobMetadata::new(self.id.clone(), relative, attributes.len(), sidecar.content_type);
            metadata.etag = sidecar.etag;
            metadata.last_modified = sidecar.last_modified;
            return Ok(metadata);
        }
    }

    async fn retrieve(&self, metadata: BlobMetadata) -> BlobResult<Blob> {
        ensure_owned(&self.id, &metadata)?;
        let (relative, data_path) = self.resolve(metadata.path())?;
        let data = read_file(data_path, relative.into_string(), self.options.buffer_size);
        Ok(Blob::new(metadata, data))
    }

    async fn store(&self, path: &Utf8Path, input: BlobInput, fail_if_exists: bool) -> BlobResult<()> {
        input.content_type().ensure_concrete()?;
        let (relative, data_path) = self.resolve(path)?;

        if fail_if_exists {
            let exists = fs::try_exists(&data_path)
                .await
                .map_err(|e| BlobError::io(relative.as_str(), "Failed to check blob existence", e))?;
            if exists {
                return Err(BlobError::already_exists(relative.as_str()));
            }
        }

        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::general(format!("Failed to create directory {}", parent), e))?;
        }

        let content_type = input.content_type().clone();
        let written = self.write_data(input, &relative).await?;
        let data_temp = written.temp_path;
        let sidecar = Sidecar {
            content_type,
            etag: Some(written.etag),
            last_modified: Some(self.options.clock.now()),
            size: Some(written.size),
            data_id: Some(written.data_id),
        };
        let sidecar_temp = self.write_sidecar(&sidecar, &relative).await?;

        let target = data_path.clone();
        let committed = tokio::task::spawn_blocking(move || {
            let data_temp_path = Utf8Path::from_path(&data_temp).map(Utf8Path::to_path_buf);
            let sidecar_temp_path = Utf8Path::from_path(&sidecar_temp).map(Utf8Path::to_path_buf);
            let result = match (data_temp_path, sidecar_temp_path) {
                (Some(data), Some(meta)) => commit(&data, &meta, &target, fail_if_exists),
                _ => Err(io::Error::new(io::ErrorKind::InvalidData, "temp path is not UTF-8")),
            };
            // Both guards drop here, removing whatever was not renamed away
            drop(data_temp);
            drop(sidecar_temp);
            result
        })
        .await
        .map_err(|e| BlobError::general("Commit task failed", e))?;

        committed.map_err(|e| {
            if fail_if_exists && e.kind() == io::ErrorKind::AlreadyExists {
                BlobError::already_exists(relative.as_str())
            } else {
                BlobError::general(format!("Failed to commit blob {}", relative), e)
            }
        })?;

        info!(path = %relative, etag = sidecar.etag.as_deref().unwrap_or_default(), "Stored blob");
        Ok(())
    }

    async fn delete(&self, path: &Utf8Path) -> BlobResult<()> {
        let (relative, data_path) = self.resolve(path)?;

        fs::remove_file(&data_path)
            .await
            .map_err(|e| BlobError::io(relative.as_str(), "Failed to delete blob data", e))?;

        match fs::remove_file(sidecar_path(&data_path)).await {
            Ok(()) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => return Err(BlobError::general(format!("Failed to delete metadata of {}", relative), e)),
        }

        info!(path = %relative, "Deleted blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
