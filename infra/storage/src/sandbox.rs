use crate::error::StorageError;
use std::path::{Component, Path, PathBuf};

fn rejected(path: &Path, reason: &'static str) -> StorageError {
    StorageError::PathRejected { message: path.display().to_string().into(), context: Some(reason.into()) }
}

/// Keeps only normal segments; `..`, roots and drive prefixes are refused outright.
pub(crate) fn normalize(path: &Path) -> Result<PathBuf, StorageError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::Normal(segment) => clean.push(segment),
            Component::ParentDir => return Err(rejected(path, "parent segments are not allowed")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(rejected(path, "absolute paths are not allowed"));
            },
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(rejected(path, "empty path"));
    }
    Ok(clean)
}

/// Maps a logical blob key to its on-disk location below `root`.
///
/// Directories in the key are kept; the file itself is spread over two shard levels
/// built from the first four characters of its name (`report.pdf` -> `re/po/report.pdf`).
pub(crate) fn locate(root: &Path, namespace: Option<&str>, key: &Path) -> Result<PathBuf, StorageError> {
    let key = normalize(key)?;
    let file_name = key
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| rejected(&key, "blob key must end with a UTF-8 file name"))?;

    let mut located = root.to_path_buf();
    if let Some(ns) = namespace {
        located.push(ns);
    }
    if let Some(parent) = key.parent() {
        located.push(parent);
    }

    let mut chars = file_name.chars();
    let first: String = chars.by_ref().take(2).collect();
    let second: String = chars.take(2).collect();
    if second.chars().count() == 2 {
        located.push(first);
        located.push(second);
    }
    located.push(file_name);

    confine(root, &located)?;
    Ok(located)
}

/// Verifies that the deepest existing ancestor of `path` resolves inside `root`.
///
/// This catches symlinked directories pointing out of the sandbox.
pub(crate) fn confine(root: &Path, path: &Path) -> Result<(), StorageError> {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if candidate == root {
            return Ok(());
        }
        if candidate.exists() {
            let canonical = candidate.canonicalize().map_err(|source| StorageError::Io {
                source,
                context: Some(format!("Failed to resolve {}", candidate.display()).into()),
            })?;
            return if canonical.starts_with(root) {
                Ok(())
            } else {
                Err(rejected(&canonical, "resolves outside the storage root"))
            };
        }
        current = candidate.parent();
    }
    Err(rejected(path, "no ancestor inside the storage root"))
}
