//! # Storage
//!
//! Attachment store for the PLM server. Blobs live below one canonical root, grouped by
//! workspace namespace, and are written atomically (temp file, `fsync`, rename). Keys are
//! relative paths; anything that would leave the root is rejected. Optional LZ4 block
//! compression is transparent to callers.
//!
//! ```rust
//! use plm_storage::{Storage, StorageError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StorageError> {
//! # let tmp = tempfile::tempdir().unwrap();
//! let storage = Storage::builder().root(tmp.path()).connect().await?;
//! let ws = storage.namespace("acme")?;
//!
//! ws.write("parts/BOLT-M8/A/1/datasheet.txt", b"M8x40").await?;
//! ws.copy("parts/BOLT-M8/A/1/datasheet.txt", "parts/BOLT-M8/B/1/datasheet.txt").await?;
//! assert!(ws.exists("parts/BOLT-M8/B/1/datasheet.txt")?);
//! # Ok(())
//! # }
//! ```

mod builder;
mod engine;
mod error;
mod maintenance;
mod namespace;
mod sandbox;

pub use builder::{NoRoot, StorageBuilder, WithRoot};
pub use engine::{Compression, Storage};
pub use error::{StorageError, StorageErrorExt};
pub use namespace::{NamespaceName, NamespacedStorage};
