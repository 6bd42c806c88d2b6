//! # Database
//!
//! Embedded store for the PLM server. Records live in typed in-memory [`Table`]s with one
//! lock per row; id [sequences](Database::next_id) and a reverse [`References`] index sit
//! next to them. With a snapshot store configured, the whole state is restored from and
//! saved to `snapshot.json` through `plm-storage`.
//!
//! ```rust
//! use plm_database::{Database, DatabaseError};
//!
//! let db = Database::in_memory();
//! let notes = db.table::<u64, String>("notes")?;
//!
//! let id = db.next_id("notes");
//! notes.insert(id, "first".to_owned())?;
//! notes.update::<_, DatabaseError>(&id, |note| {
//!     note.push_str(" (edited)");
//!     Ok(())
//! })?;
//! assert_eq!(notes.get(&id).as_deref(), Some("first (edited)"));
//! # Ok::<(), DatabaseError>(())
//! ```

mod error;
mod references;
mod table;

pub use error::{DatabaseError, DatabaseErrorExt};
pub use references::{ReferenceIndex, References};
pub use table::{Record, RecordKey, Table};

use crate::table::{SnapshotTable, TableInner};
use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock};
use plm_storage::Storage;
use serde::{Deserialize, Serialize};
use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// File name of the snapshot in the storage root.
pub const SNAPSHOT_FILE: &str = "snapshot.json";
const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    format: u32,
    sequences: BTreeMap<String, u64>,
    tables: BTreeMap<String, serde_json::Value>,
}

struct Registered {
    handle: Arc<dyn Any + Send + Sync>,
    snapshot: Arc<dyn SnapshotTable>,
}

struct DatabaseInner {
    tables: RwLock<FxHashMap<&'static str, Registered>>,
    sequences: Mutex<FxHashMap<String, u64>>,
    references: References,
    snapshot_store: Option<Storage>,
    /// Restored table contents waiting for their table to be registered.
    pending: Mutex<BTreeMap<String, serde_json::Value>>,
}

/// Cloneable handle to the embedded database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("tables", &self.inner.tables.read().keys().collect::<Vec<_>>())
            .field("snapshots", &self.inner.snapshot_store.is_some())
            .finish_non_exhaustive()
    }
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Volatile database without snapshots.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_state(None, Snapshot::default())
    }

    fn with_state(snapshot_store: Option<Storage>, snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                tables: RwLock::new(FxHashMap::default()),
                sequences: Mutex::new(snapshot.sequences.into_iter().collect()),
                references: References::default(),
                snapshot_store,
                pending: Mutex::new(snapshot.tables),
            }),
        }
    }

    /// Opens (or creates) the table `name` for records of type `V` keyed by `K`.
    ///
    /// Rows restored from a snapshot are loaded the first time a table is opened.
    ///
    /// # Errors
    /// [`DatabaseError::TypeMismatch`] when `name` was opened with other types;
    /// [`DatabaseError::Serialization`] when restored rows do not decode.
    pub fn table<K: RecordKey, V: Record>(&self, name: &'static str) -> Result<Table<K, V>, DatabaseError> {
        if let Some(registered) = self.inner.tables.read().get(name) {
            return downcast(name, registered);
        }

        let mut tables = self.inner.tables.write();
        if let Some(registered) = tables.get(name) {
            return downcast(name, registered);
        }

        let table = Table::<K, V>::new(name);
        let shared = table.shared();
        if let Some(rows) = self.inner.pending.lock().remove(name) {
            let restored = shared.restore(rows)?;
            info!(table = name, rows = restored, "Table restored from snapshot");
        }
        tables.insert(name, Registered { handle: shared.clone(), snapshot: shared });
        debug!(table = name, key = type_name::<K>(), value = type_name::<V>(), "Table registered");
        Ok(table)
    }

    /// Next value of the sequence `name`, starting at 1.
    pub fn next_id(&self, name: &str) -> u64 {
        let mut sequences = self.inner.sequences.lock();
        let slot = sequences.entry(name.to_owned()).or_insert(0);
        *slot += 1;
        *slot
    }

    #[must_use]
    pub fn references(&self) -> &References {
        &self.inner.references
    }

    #[must_use]
    pub fn snapshots_enabled(&self) -> bool {
        self.inner.snapshot_store.is_some()
    }

    /// Writes every table and sequence to [`SNAPSHOT_FILE`]. Returns the number of tables
    /// written, or 0 when snapshots are disabled.
    ///
    /// # Errors
    /// [`DatabaseError::Serialization`] or [`DatabaseError::Storage`].
    #[instrument(skip(self))]
    pub async fn save_snapshot(&self) -> Result<usize, DatabaseError> {
        let Some(store) = &self.inner.snapshot_store else {
            return Ok(0);
        };

        let mut tables = self.inner.pending.lock().clone();
        let registered: Vec<(&'static str, Arc<dyn SnapshotTable>)> =
            self.inner.tables.read().iter().map(|(name, r)| (*name, Arc::clone(&r.snapshot))).collect();
        for (name, table) in registered {
            tables.insert(name.to_owned(), table.dump()?);
        }
        // Sequences are read after the rows so no dumped id is above its saved sequence.
        let snapshot = Snapshot {
            format: SNAPSHOT_FORMAT,
            sequences: self.inner.sequences.lock().iter().map(|(k, v)| (k.clone(), *v)).collect(),
            tables,
        };

        let bytes = serde_json::to_vec(&snapshot).context("Encoding snapshot")?;
        store.write(SNAPSHOT_FILE, &bytes).await.context("Writing snapshot")?;

        info!(tables = snapshot.tables.len(), bytes = bytes.len(), "Snapshot saved");
        Ok(snapshot.tables.len())
    }
}

fn downcast<K: RecordKey, V: Record>(name: &'static str, registered: &Registered) -> Result<Table<K, V>, DatabaseError> {
    Arc::clone(&registered.handle).downcast::<TableInner<K, V>>().map(Table::from_inner).map_err(|_| {
        DatabaseError::TypeMismatch {
            message: name.into(),
            context: Some(format!("requested <{}, {}>", type_name::<K>(), type_name::<V>()).into()),
        }
    })
}

/// Builder for [`Database`].
#[must_use = "builders do nothing unless you call .init()"]
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    snapshot_store: Option<Storage>,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persists snapshots in the root of `storage`.
    pub fn snapshot(mut self, storage: Storage) -> Self {
        self.snapshot_store = Some(storage);
        self
    }

    /// Loads the snapshot when one is configured and present.
    ///
    /// # Errors
    /// [`DatabaseError::Storage`] when the file cannot be read, [`DatabaseError::Serialization`]
    /// when it is not a snapshot.
    #[instrument(skip(self), fields(snapshots = self.snapshot_store.is_some()))]
    pub async fn init(self) -> Result<Database, DatabaseError> {
        let Some(store) = self.snapshot_store else {
            return Ok(Database::in_memory());
        };

        let snapshot = if store.exists(SNAPSHOT_FILE).context("Locating snapshot")? {
            let bytes = store.read(SNAPSHOT_FILE).await.context("Reading snapshot")?;
            let snapshot: Snapshot = serde_json::from_slice(&bytes).context("Decoding snapshot")?;
            if snapshot.format != SNAPSHOT_FORMAT {
                warn!(format = snapshot.format, expected = SNAPSHOT_FORMAT, "Snapshot format differs, loading anyway");
            }
            info!(tables = snapshot.tables.len(), "Snapshot loaded");
            snapshot
        } else {
            info!("No snapshot found, starting empty");
            Snapshot::default()
        };

        Ok(Database::with_state(Some(store), snapshot))
    }
}
