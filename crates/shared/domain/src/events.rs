//! Domain events published on the bus after every successful mutation.

use crate::keys::{EntityKind, MasterKey};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Notification channel a user can subscribe to on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum NotificationKind {
    /// A check-in produced a new iteration.
    IterationChange,
    /// Checkout, check-in or undo changed the lifecycle state.
    StateChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EventKind {
    MasterCreated { entity: EntityKind, key: MasterKey },
    CheckedOut { entity: EntityKind, key: MasterKey },
    CheckedIn { entity: EntityKind, key: MasterKey, iteration: u32 },
    CheckoutUndone { entity: EntityKind, key: MasterKey },
    IterationUpdated { entity: EntityKind, key: MasterKey, iteration: u32 },
    VersionCreated { entity: EntityKind, source: MasterKey, created: MasterKey },
    TagsSaved { entity: EntityKind, key: MasterKey, tags: Vec<String> },
    MasterMoved { key: MasterKey, location: String },
    AclChanged { entity: EntityKind, key: MasterKey, removed: bool },
    FileAttached { entity: EntityKind, key: MasterKey, iteration: u32, name: String },
    FileRemoved { entity: EntityKind, key: MasterKey, iteration: u32, name: String },
    MasterDeleted { entity: EntityKind, key: MasterKey },
    SubscribersNotified { key: MasterKey, change: NotificationKind, recipients: Vec<String> },
    IssueCreated { id: u64 },
    IssueUpdated { id: u64 },
    IssueDeleted { id: u64 },
    RequestCreated { id: u64 },
    RequestUpdated { id: u64 },
    RequestDeleted { id: u64 },
}

/// Envelope carried on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlmEvent {
    pub workspace: String,
    pub actor: String,
    pub kind: EventKind,
}

impl PlmEvent {
    #[must_use]
    pub fn new(workspace: impl Into<String>, actor: impl Into<String>, kind: EventKind) -> Self {
        Self { workspace: workspace.into(), actor: actor.into(), kind }
    }
}
