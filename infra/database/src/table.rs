use crate::error::{DatabaseError, DatabaseErrorExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Anything that can be stored in a table and written to a snapshot.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}
impl<T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static> Record for T {}

/// Table keys are ordered so listings are stable.
pub trait RecordKey: Record + Ord + fmt::Display {}
impl<T: Record + Ord + fmt::Display> RecordKey for T {}

/// `None` marks a row removed while someone still held its handle.
type Row<V> = Arc<Mutex<Option<V>>>;

pub(crate) struct TableInner<K, V> {
    name: &'static str,
    rows: RwLock<BTreeMap<K, Row<V>>>,
}

/// Typed handle to one table. Cloning shares the rows.
///
/// Lock order is always row, then map: [`Table::update`] never holds the map lock while it
/// waits for a row, so a closure running under a row lock may insert into any table.
pub struct Table<K, V> {
    inner: Arc<TableInner<K, V>>,
}

impl<K, V> Clone for Table<K, V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, V> fmt::Debug for Table<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("name", &self.inner.name).field("rows", &self.inner.rows.read().len()).finish()
    }
}

impl<K: RecordKey, V: Record> Table<K, V> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self { inner: Arc::new(TableInner { name, rows: RwLock::new(BTreeMap::new()) }) }
    }

    pub(crate) const fn from_inner(inner: Arc<TableInner<K, V>>) -> Self {
        Self { inner }
    }

    pub(crate) fn shared(&self) -> Arc<TableInner<K, V>> {
        Arc::clone(&self.inner)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.rows.read().len()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.inner.rows.read().contains_key(key)
    }

    /// # Errors
    /// [`DatabaseError::Duplicate`] when the key is taken.
    pub fn insert(&self, key: K, value: V) -> Result<(), DatabaseError> {
        let mut rows = self.inner.rows.write();
        if rows.contains_key(&key) {
            return Err(DatabaseError::Duplicate { message: key.to_string().into(), context: Some(self.name().into()) });
        }
        trace!(table = self.name(), %key, "Row inserted");
        rows.insert(key, Arc::new(Mutex::new(Some(value))));
        Ok(())
    }

    /// Current value of the row, cloned under its lock.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let row = self.row(key)?;
        let guard = row.lock();
        guard.clone()
    }

    /// Runs `change` on a copy of the row under the row lock and commits the copy only when
    /// `change` succeeds.
    ///
    /// # Errors
    /// [`DatabaseError::NotFound`] (converted into `E`) for a missing key, or whatever
    /// `change` returns.
    pub fn update<R, E>(&self, key: &K, change: impl FnOnce(&mut V) -> Result<R, E>) -> Result<R, E>
    where
        E: From<DatabaseError>,
    {
        let row = self.row(key).ok_or_else(|| self.not_found(key))?;
        let mut guard = row.lock();
        let current = guard.as_ref().ok_or_else(|| self.not_found(key))?;

        let mut draft = current.clone();
        let result = change(&mut draft)?;
        *guard = Some(draft);
        Ok(result)
    }

    /// Removes the row once `check` accepts its current value.
    ///
    /// # Errors
    /// [`DatabaseError::NotFound`] (converted into `E`) for a missing key, or the error of `check`.
    pub fn remove<E>(&self, key: &K, check: impl FnOnce(&V) -> Result<(), E>) -> Result<V, E>
    where
        E: From<DatabaseError>,
    {
        let row = self.row(key).ok_or_else(|| self.not_found(key))?;
        let removed = {
            let mut guard = row.lock();
            let current = guard.as_ref().ok_or_else(|| self.not_found(key))?;
            check(current)?;
            guard.take().ok_or_else(|| self.not_found(key))?
        };

        let mut rows = self.inner.rows.write();
        if rows.get(key).is_some_and(|stored| Arc::ptr_eq(stored, &row)) {
            rows.remove(key);
        }
        trace!(table = self.name(), %key, "Row removed");
        Ok(removed)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.inner.rows.read().keys().cloned().collect()
    }

    /// Keys matching `predicate`. Takes no row lock, so it is safe to call from inside
    /// an [`update`](Self::update) closure.
    #[must_use]
    pub fn keys_where(&self, predicate: impl Fn(&K) -> bool) -> Vec<K> {
        self.inner.rows.read().keys().filter(|k| predicate(k)).cloned().collect()
    }

    /// Values matching `predicate`, in key order. Each row is locked briefly in turn; never
    /// call this while holding another row of the same table.
    #[must_use]
    pub fn scan(&self, predicate: impl Fn(&K, &V) -> bool) -> Vec<V> {
        let rows: Vec<(K, Row<V>)> =
            self.inner.rows.read().iter().map(|(k, row)| (k.clone(), Arc::clone(row))).collect();

        rows.into_iter()
            .filter_map(|(key, row)| {
                let guard = row.lock();
                guard.as_ref().filter(|value| predicate(&key, value)).cloned()
            })
            .collect()
    }

    fn row(&self, key: &K) -> Option<Row<V>> {
        self.inner.rows.read().get(key).cloned()
    }

    fn not_found(&self, key: &K) -> DatabaseError {
        DatabaseError::NotFound { message: key.to_string().into(), context: Some(self.name().into()) }
    }
}

/// Type-erased view used by the snapshot writer.
pub(crate) trait SnapshotTable: Send + Sync {
    fn dump(&self) -> Result<serde_json::Value, DatabaseError>;
    fn restore(&self, value: serde_json::Value) -> Result<usize, DatabaseError>;
}

impl<K: RecordKey, V: Record> SnapshotTable for TableInner<K, V> {
    fn dump(&self) -> Result<serde_json::Value, DatabaseError> {
        let handles: Vec<(K, Row<V>)> =
            self.rows.read().iter().map(|(k, row)| (k.clone(), Arc::clone(row))).collect();
        let rows: Vec<(K, V)> =
            handles.into_iter().filter_map(|(key, row)| row.lock().clone().map(|value| (key, value))).collect();
        serde_json::to_value(rows).context(format!("Encoding table {}", self.name))
    }

    fn restore(&self, value: serde_json::Value) -> Result<usize, DatabaseError> {
        let rows: Vec<(K, V)> = serde_json::from_value(value).context(format!("Decoding table {}", self.name))?;
        let count = rows.len();
        let mut map = self.rows.write();
        for (key, value) in rows {
            map.insert(key, Arc::new(Mutex::new(Some(value))));
        }
        Ok(count)
    }
}
