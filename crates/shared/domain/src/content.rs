//! What an iteration carries: typed attributes, weak links and attached files.

use crate::keys::{EntityKind, IterationKey, KeyError, MasterKey, Version, validate_id};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed attribute of an iteration. Dates are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceAttribute {
    Boolean { name: String, value: bool },
    Text { name: String, value: String },
    Number { name: String, value: f64 },
    Date { name: String, value: i64 },
    Url { name: String, value: String },
}

impl InstanceAttribute {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Boolean { name, .. }
            | Self::Text { name, .. }
            | Self::Number { name, .. }
            | Self::Date { name, .. }
            | Self::Url { name, .. } => name,
        }
    }
}

/// Weak reference from an iteration to an iteration of another master, by key only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct IterationLink {
    pub kind: EntityKind,
    pub workspace_id: String,
    pub id: String,
    pub version: Version,
    pub iteration: u32,
}

impl IterationLink {
    #[must_use]
    pub fn new(kind: EntityKind, key: &IterationKey) -> Self {
        Self {
            kind,
            workspace_id: key.master.workspace_id.clone(),
            id: key.master.id.clone(),
            version: key.master.version.clone(),
            iteration: key.iteration,
        }
    }

    #[must_use]
    pub fn master_key(&self) -> MasterKey {
        MasterKey { workspace_id: self.workspace_id.clone(), id: self.id.clone(), version: self.version.clone() }
    }

    /// # Errors
    /// [`KeyError::Invalid`] for a bad id or an iteration number of 0.
    pub fn validate(&self) -> Result<(), KeyError> {
        validate_id(&self.workspace_id, "workspace")?;
        validate_id(&self.id, "id")?;
        if self.iteration == 0 {
            return Err(KeyError::Invalid {
                message: format!("{self} points at iteration 0").into(),
                context: Some("link".into()),
            });
        }
        Ok(())
    }
}

impl fmt::Display for IterationLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}-{}#{}", self.kind, self.workspace_id, self.id, self.version, self.iteration)
    }
}

/// An attached file. `full_name` is
/// `{ws}/{documents|parts}/{id}/{version}/{iteration}/{blob}/{name}` and doubles as the
/// storage key below the workspace namespace. `blob` is unique per write, so a blob is never
/// overwritten once an iteration references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct BinaryResource {
    pub name: String,
    pub full_name: String,
    pub length: u64,
    /// Epoch milliseconds.
    pub last_modified: i64,
}

impl BinaryResource {
    /// Key prefix, relative to the workspace namespace, of every blob written for one iteration.
    #[must_use]
    pub fn iteration_prefix(kind: EntityKind, master: &MasterKey, iteration: u32) -> String {
        format!("{}/{}/{}/{iteration}/", kind.collection(), master.id, master.version)
    }

    #[must_use]
    pub fn new(
        kind: EntityKind,
        master: &MasterKey,
        iteration: u32,
        blob: &str,
        name: &str,
        length: u64,
        last_modified: i64,
    ) -> Self {
        Self {
            name: name.to_owned(),
            full_name: format!(
                "{}/{}{blob}/{name}",
                master.workspace_id,
                Self::iteration_prefix(kind, master, iteration)
            ),
            length,
            last_modified,
        }
    }

    /// Storage key below the workspace namespace, i.e. `full_name` without the workspace.
    #[must_use]
    pub fn key(&self) -> &str {
        self.full_name.split_once('/').map_or(self.full_name.as_str(), |(_, rest)| rest)
    }

    /// Whether the blob was written for this exact iteration (rather than inherited).
    #[must_use]
    pub fn belongs_to(&self, kind: EntityKind, master: &MasterKey, iteration: u32) -> bool {
        self.key().starts_with(&Self::iteration_prefix(kind, master, iteration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> MasterKey {
        MasterKey::from_segment("acme", "SPEC-B").unwrap()
    }

    #[test]
    fn binary_resource_paths() {
        let file = BinaryResource::new(EntityKind::Document, &key(), 3, "k2Pq", "drawing.pdf", 10, 0);
        assert_eq!(file.full_name, "acme/documents/SPEC/B/3/k2Pq/drawing.pdf");
        assert_eq!(file.key(), "documents/SPEC/B/3/k2Pq/drawing.pdf");
        assert!(file.belongs_to(EntityKind::Document, &key(), 3));
        assert!(!file.belongs_to(EntityKind::Document, &key(), 4));
        assert!(!file.belongs_to(EntityKind::Document, &key(), 31));
        assert_ne!(file, BinaryResource::new(EntityKind::Document, &key(), 3, "x7Rw", "drawing.pdf", 10, 0));
    }

    #[test]
    fn attributes_are_tagged_by_type() {
        let attr = InstanceAttribute::Number { name: "mass".into(), value: 1.5 };
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json, serde_json::json!({"type": "NUMBER", "name": "mass", "value": 1.5}));
        assert_eq!(attr.name(), "mass");
    }

    #[test]
    fn link_validation() {
        let link = IterationLink {
            kind: EntityKind::Part,
            workspace_id: "acme".into(),
            id: "BOLT".into(),
            version: Version::first(),
            iteration: 0,
        };
        assert!(link.validate().is_err());
        assert!(IterationLink { iteration: 1, ..link }.validate().is_ok());
    }
}
