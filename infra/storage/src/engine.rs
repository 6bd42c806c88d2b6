//! Sandboxed blob engine: every key is resolved below a canonical root, written through a
//! temp file + `fsync` + rename, and optionally LZ4-compressed.

use crate::builder::StorageBuilder;
use crate::error::{StorageError, StorageErrorExt};
use crate::maintenance;
use crate::namespace::{NamespaceName, NamespacedStorage};
use crate::sandbox;
use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Marker embedded in temp file names; swept by [`Storage::purge_tmp`].
pub(crate) const TMP_MARKER: &str = ".plmtmp.";

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum Compression {
    #[default]
    None,
    Lz4,
}

impl Compression {
    fn compress(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::None => data.to_vec(),
            Self::Lz4 => lz4_flex::compress_prepend_size(data),
        }
    }

    fn decompress(self, data: Vec<u8>) -> Result<Vec<u8>, StorageError> {
        match self {
            Self::None => Ok(data),
            Self::Lz4 => lz4_flex::decompress_size_prepended(&data).context("LZ4 block is corrupted"),
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = StorageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "lz4" => Ok(Self::Lz4),
            other => Err(StorageError::InvalidConfiguration {
                message: other.to_owned().into(),
                context: Some("Unknown compression, expected 'none' or 'lz4'".into()),
            }),
        }
    }
}

#[derive(Debug)]
pub struct StorageInner {
    pub(crate) root: PathBuf,
    pub(crate) compression: Compression,
    pub(crate) tmp_counter: AtomicU64,
}

/// Cloneable handle to the blob store.
///
/// Workspace attachments go through [`Storage::namespace`]; the root itself only holds
/// server-wide files such as the database snapshot.
///
/// ```rust
/// use plm_storage::{Compression, Storage, StorageError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), StorageError> {
/// # let tmp = tempfile::tempdir().unwrap();
/// let storage = Storage::builder().root(tmp.path().join("vault")).compression(Compression::Lz4).connect().await?;
///
/// let acme = storage.namespace("acme")?;
/// acme.write("documents/SPEC/A/1/drawing.pdf", b"%PDF").await?;
/// assert_eq!(acme.read("documents/SPEC/A/1/drawing.pdf").await?, b"%PDF");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Storage {
    pub(crate) inner: Arc<StorageInner>,
}

impl Deref for Storage {
    type Target = StorageInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Storage {
    #[must_use = "the storage engine is not initialized until you call .connect()"]
    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    /// Canonical root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn compression(&self) -> Compression {
        self.inner.compression
    }

    /// Scoped view below `<root>/<name>`.
    ///
    /// # Errors
    /// [`StorageError::PathRejected`] for an empty name or characters outside `[a-z0-9_-]`.
    pub fn namespace<N>(&self, name: N) -> Result<NamespacedStorage, StorageError>
    where
        N: TryInto<NamespaceName, Error = StorageError>,
    {
        let ns = name.try_into()?;
        Ok(NamespacedStorage::new(self.clone(), ns))
    }

    /// Physical location of `key` at the root level.
    ///
    /// # Errors
    /// [`StorageError::PathRejected`] when the key escapes the sandbox.
    pub fn resolve(&self, key: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
        self.locate(None, key.as_ref())
    }

    pub(crate) fn locate(&self, namespace: Option<&str>, key: &Path) -> Result<PathBuf, StorageError> {
        sandbox::locate(&self.root, namespace, key)
    }

    /// # Errors
    /// [`StorageError::NotFound`] for a missing blob, [`StorageError::Decompress`] for a
    /// corrupted LZ4 block.
    pub async fn read(&self, key: impl AsRef<Path>) -> Result<Vec<u8>, StorageError> {
        self.read_at(None, key.as_ref()).await
    }

    /// # Errors
    /// [`StorageError::PathRejected`] or [`StorageError::Io`].
    pub async fn write(&self, key: impl AsRef<Path>, data: &[u8]) -> Result<(), StorageError> {
        self.write_at(None, key.as_ref(), data).await
    }

    /// # Errors
    /// [`StorageError::NotFound`] when nothing is stored under `key`.
    pub async fn delete(&self, key: impl AsRef<Path>) -> Result<(), StorageError> {
        self.delete_at(None, key.as_ref()).await
    }

    /// # Errors
    /// [`StorageError::PathRejected`] when the key escapes the sandbox.
    pub fn exists(&self, key: impl AsRef<Path>) -> Result<bool, StorageError> {
        Ok(self.locate(None, key.as_ref())?.is_file())
    }

    pub(crate) async fn read_at(&self, namespace: Option<&str>, key: &Path) -> Result<Vec<u8>, StorageError> {
        let resolved = self.locate(namespace, key)?;
        let raw = match fs::read(&resolved).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(not_found(key)),
            Err(source) => {
                return Err(StorageError::Io {
                    source,
                    context: Some(format!("Read failed: {}", resolved.display()).into()),
                });
            },
        };
        self.inner.compression.decompress(raw)
    }

    pub(crate) async fn write_at(&self, namespace: Option<&str>, key: &Path, data: &[u8]) -> Result<(), StorageError> {
        let resolved = self.locate(namespace, key)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directories for {}", resolved.display()))?;
        }

        let temp = tmp_path(&resolved, &self.tmp_counter);
        let payload = self.inner.compression.compress(data);
        {
            let mut file = fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&temp)
                .await
                .context(format!("Temp creation failed: {}", temp.display()))?;
            file.write_all(&payload).await.context("Write failed")?;
            file.sync_all().await.context("Sync failed")?;
        }

        if let Err(err) = fs::rename(&temp, &resolved).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::Io {
                source: err,
                context: Some(format!("Rename failed: {} -> {}", temp.display(), resolved.display()).into()),
            });
        }
        if let Some(parent) = resolved.parent() {
            sync_dir(parent).await;
        }

        debug!(path = %resolved.display(), bytes = data.len(), "Blob written");
        Ok(())
    }

    pub(crate) async fn delete_at(&self, namespace: Option<&str>, key: &Path) -> Result<(), StorageError> {
        let resolved = self.locate(namespace, key)?;
        match fs::remove_file(&resolved).await {
            Ok(()) => {
                debug!(path = %resolved.display(), "Blob deleted");
                Ok(())
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found(key)),
            Err(source) => Err(StorageError::Io {
                source,
                context: Some(format!("Delete failed: {}", resolved.display()).into()),
            }),
        }
    }

    pub(crate) async fn size_at(&self, namespace: Option<&str>, key: &Path) -> Result<u64, StorageError> {
        let resolved = self.locate(namespace, key)?;
        match fs::metadata(&resolved).await {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found(key)),
            Err(source) => Err(StorageError::Io {
                source,
                context: Some(format!("Metadata failed: {}", resolved.display()).into()),
            }),
        }
    }

    /// Removes temp files older than five minutes left by interrupted writes.
    pub async fn purge_tmp(&self) -> usize {
        maintenance::purge_tmp(&self.root).await
    }
}

fn not_found(key: &Path) -> StorageError {
    StorageError::NotFound { message: key.display().to_string().into(), context: None }
}

fn tmp_path(target: &Path, counter: &AtomicU64) -> PathBuf {
    let n = counter.fetch_add(1, Ordering::Relaxed);
    let name = target.file_name().and_then(|s| s.to_str()).unwrap_or("blob");
    target.with_file_name(format!("{name}{TMP_MARKER}{n}"))
}

async fn sync_dir(path: &Path) {
    match fs::File::open(path).await {
        Ok(dir) => {
            if let Err(err) = dir.sync_all().await {
                warn!(path = %path.display(), error = %err, "Directory sync failed");
            }
        },
        Err(err) => warn!(path = %path.display(), error = %err, "Directory open failed"),
    }
}
