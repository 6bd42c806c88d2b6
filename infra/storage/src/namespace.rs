use crate::engine::Storage;
use crate::error::StorageError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Validated directory name for a namespace, lowercase `[a-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceName(Arc<str>);

impl TryFrom<&str> for NamespaceName {
    type Error = StorageError;

    fn try_from(value: &str) -> Result<Self, StorageError> {
        let name = value.trim().to_lowercase();
        if name.is_empty() {
            return Err(StorageError::PathRejected {
                message: "empty namespace".into(),
                context: None,
            });
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(StorageError::PathRejected {
                message: name.into(),
                context: Some("Namespace contains illegal characters".into()),
            });
        }
        Ok(Self(name.into()))
    }
}

impl TryFrom<String> for NamespaceName {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, StorageError> {
        Self::try_from(value.as_str())
    }
}

impl TryFrom<&String> for NamespaceName {
    type Error = StorageError;

    fn try_from(value: &String) -> Result<Self, StorageError> {
        Self::try_from(value.as_str())
    }
}

impl AsRef<str> for NamespaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blob store scoped to one workspace directory.
///
/// Keys keep their directories (`documents/SPEC/A/2/x.pdf`); only the file level is sharded.
#[derive(Debug, Clone)]
pub struct NamespacedStorage {
    storage: Storage,
    namespace: NamespaceName,
}

impl NamespacedStorage {
    pub(crate) const fn new(storage: Storage, namespace: NamespaceName) -> Self {
        Self { storage, namespace }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.namespace.as_ref()
    }

    /// # Errors
    /// [`StorageError::PathRejected`] when the key escapes the sandbox.
    pub fn resolve(&self, key: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
        self.storage.locate(Some(self.name()), key.as_ref())
    }

    /// # Errors
    /// [`StorageError::NotFound`] for a missing blob.
    pub async fn read(&self, key: impl AsRef<Path>) -> Result<Vec<u8>, StorageError> {
        self.storage.read_at(Some(self.name()), key.as_ref()).await
    }

    /// Atomically creates or replaces the blob at `key`.
    ///
    /// # Errors
    /// [`StorageError::PathRejected`] or [`StorageError::Io`].
    pub async fn write(&self, key: impl AsRef<Path>, data: &[u8]) -> Result<(), StorageError> {
        self.storage.write_at(Some(self.name()), key.as_ref(), data).await
    }

    /// # Errors
    /// [`StorageError::NotFound`] when nothing is stored under `key`.
    pub async fn delete(&self, key: impl AsRef<Path>) -> Result<(), StorageError> {
        self.storage.delete_at(Some(self.name()), key.as_ref()).await
    }

    /// Deletes every key, logging failures instead of returning them. Returns how many
    /// blobs were removed.
    pub async fn delete_all<I, P>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut removed = 0;
        for key in keys {
            match self.delete(key.as_ref()).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(namespace = %self.namespace, key = %key.as_ref().display(), error = %err, "Blob cleanup failed"),
            }
        }
        removed
    }

    /// Copies `from` to `to` within the namespace.
    ///
    /// # Errors
    /// [`StorageError::NotFound`] when `from` does not exist.
    pub async fn copy(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<u64, StorageError> {
        let data = self.read(from).await?;
        self.write(to, &data).await?;
        Ok(data.len() as u64)
    }

    /// # Errors
    /// [`StorageError::PathRejected`] when the key escapes the sandbox.
    pub fn exists(&self, key: impl AsRef<Path>) -> Result<bool, StorageError> {
        Ok(self.resolve(key)?.is_file())
    }

    /// Bytes occupied on disk, after compression.
    ///
    /// # Errors
    /// [`StorageError::NotFound`] when nothing is stored under `key`.
    pub async fn stored_len(&self, key: impl AsRef<Path>) -> Result<u64, StorageError> {
        self.storage.size_at(Some(self.name()), key.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lowercased() {
        let name = NamespaceName::try_from("ACME-Corp_2").unwrap();
        assert_eq!(name.as_ref(), "acme-corp_2");
    }

    #[test]
    fn illegal_names_are_rejected() {
        for bad in ["", "  ", "a/b", "..", "ws.1", "a b"] {
            let err = NamespaceName::try_from(bad).unwrap_err();
            assert_eq!(err.kind(), "PathRejected", "{bad:?}");
        }
    }
}
