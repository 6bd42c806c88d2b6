//! Change issues, change requests and their table keys.

use plm_domain::acl::Acl;
use plm_domain::content::IterationLink;
use plm_domain::keys::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Emergency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Adaptive,
    Corrective,
    #[default]
    Other,
    Perfective,
}

/// `(workspace, sequence number)` of an issue or a request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemKey {
    pub workspace_id: String,
    pub id: u64,
}

impl ItemKey {
    #[must_use]
    pub fn new(workspace_id: impl Into<String>, id: u64) -> Self {
        Self { workspace_id: workspace_id.into(), id }
    }

    /// Reference-index name of the issue with this key, e.g. `issue:acme/7`.
    #[must_use]
    pub fn issue_reference(&self) -> String {
        format!("issue:{self}")
    }

    #[must_use]
    pub fn request_reference(&self) -> String {
        format!("request:{self}")
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace_id, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeIssue {
    pub key: ItemKey,
    pub name: String,
    pub description: String,
    pub author: String,
    pub created_at: i64,
    pub initiator: Option<String>,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub category: Category,
    pub tags: BTreeSet<String>,
    pub acl: Option<Acl>,
    pub affected_documents: BTreeSet<IterationLink>,
    pub affected_parts: BTreeSet<IterationLink>,
}

impl ChangeIssue {
    /// Reference-index targets of every affected iteration's master.
    #[must_use]
    pub fn affected_references(&self) -> BTreeSet<String> {
        self.affected_documents.iter().chain(&self.affected_parts).map(|link| link.master_key().reference(link.kind)).collect()
    }

    pub(crate) fn affected_mut(&mut self, kind: EntityKind) -> &mut BTreeSet<IterationLink> {
        match kind {
            EntityKind::Document => &mut self.affected_documents,
            EntityKind::Part => &mut self.affected_parts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    pub key: ItemKey,
    pub name: String,
    pub description: String,
    pub author: String,
    pub created_at: i64,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub category: Category,
    pub tags: BTreeSet<String>,
    /// Ids of issues in the same workspace.
    pub addressed_issues: BTreeSet<u64>,
}

impl ChangeRequest {
    #[must_use]
    pub fn addressed_references(&self) -> BTreeSet<String> {
        self.addressed_issues
            .iter()
            .map(|id| ItemKey::new(self.key.workspace_id.as_str(), *id).issue_reference())
            .collect()
    }
}

/// Fields of a new issue.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub name: String,
    pub description: String,
    pub initiator: Option<String>,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub category: Category,
}

/// Fields an issue update replaces. The name is fixed at creation.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub description: String,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub category: Category,
}

#[derive(Debug, Clone, Default)]
pub struct NewRequest {
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub category: Category,
}

/// Empty or blank logins mean "nobody".
pub(crate) fn optional_login(login: Option<String>) -> Option<String> {
    login.map(|l| l.trim().to_owned()).filter(|l| !l.is_empty())
}
