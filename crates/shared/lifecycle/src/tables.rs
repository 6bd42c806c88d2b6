use crate::model::Master;
use plm_database::{Database, DatabaseError, Table};
use plm_domain::content::IterationLink;
use plm_domain::keys::{EntityKind, MasterKey};

/// Handles to both master tables. Links and affected items may point at either kind.
#[derive(Debug, Clone)]
pub struct MasterTables {
    documents: Table<MasterKey, Master>,
    parts: Table<MasterKey, Master>,
}

impl MasterTables {
    /// # Errors
    /// [`DatabaseError::TypeMismatch`] if a table was opened with other record types.
    pub fn open(database: &Database) -> Result<Self, DatabaseError> {
        Ok(Self {
            documents: database.table(EntityKind::Document.table())?,
            parts: database.table(EntityKind::Part.table())?,
        })
    }

    #[must_use]
    pub const fn of(&self, kind: EntityKind) -> &Table<MasterKey, Master> {
        match kind {
            EntityKind::Document => &self.documents,
            EntityKind::Part => &self.parts,
        }
    }

    /// Whether the link names a frozen iteration of an existing master.
    #[must_use]
    pub fn iteration_exists(&self, link: &IterationLink) -> bool {
        self.of(link.kind).get(&link.master_key()).is_some_and(|m| m.iteration(link.iteration).is_some())
    }
}
