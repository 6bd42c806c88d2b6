//! Per-document notification subscriptions.

use crate::error::DocumentsError;
use plm_database::{Database, DatabaseError, Table};
use plm_domain::constants::SUBSCRIPTIONS_TABLE;
use plm_domain::events::NotificationKind;
use plm_domain::keys::MasterKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Logins subscribed to one document, per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Subscribers {
    #[serde(default)]
    pub iteration_change: BTreeSet<String>,
    #[serde(default)]
    pub state_change: BTreeSet<String>,
}

impl Subscribers {
    fn channel_mut(&mut self, kind: NotificationKind) -> &mut BTreeSet<String> {
        match kind {
            NotificationKind::IterationChange => &mut self.iteration_change,
            NotificationKind::StateChange => &mut self.state_change,
        }
    }

    #[must_use]
    pub const fn channel(&self, kind: NotificationKind) -> &BTreeSet<String> {
        match kind {
            NotificationKind::IterationChange => &self.iteration_change,
            NotificationKind::StateChange => &self.state_change,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iteration_change.is_empty() && self.state_change.is_empty()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Subscriptions {
    table: Table<MasterKey, Subscribers>,
}

impl Subscriptions {
    pub(crate) fn open(database: &Database) -> Result<Self, DocumentsError> {
        Ok(Self { table: database.table(SUBSCRIPTIONS_TABLE)? })
    }

    /// Adds `login` to the channel. Returns `false` when it was already subscribed.
    pub(crate) fn subscribe(&self, key: &MasterKey, kind: NotificationKind, login: &str) -> Result<bool, DocumentsError> {
        if !self.table.contains(key)
            && let Err(err) = self.table.insert(key.clone(), Subscribers::default())
            && !matches!(err, DatabaseError::Duplicate { .. })
        {
            return Err(err.into());
        }
        self.table.update(key, |s| Ok::<_, DocumentsError>(s.channel_mut(kind).insert(login.to_owned())))
    }

    /// Removes `login` from the channel. Returns `false` when it was not subscribed.
    pub(crate) fn unsubscribe(&self, key: &MasterKey, kind: NotificationKind, login: &str) -> Result<bool, DocumentsError> {
        if !self.table.contains(key) {
            return Ok(false);
        }
        self.table.update(key, |s| Ok::<_, DocumentsError>(s.channel_mut(kind).remove(login)))
    }

    /// Everyone on the channel except `actor`.
    pub(crate) fn recipients(&self, key: &MasterKey, kind: NotificationKind, actor: &str) -> Vec<String> {
        self.table
            .get(key)
            .map(|s| s.channel(kind).iter().filter(|login| *login != actor).cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn get(&self, key: &MasterKey) -> Subscribers {
        self.table.get(key).unwrap_or_default()
    }

    /// Drops every subscription of the document. A document nobody subscribed to is fine.
    pub(crate) fn forget(&self, key: &MasterKey) -> Result<(), DatabaseError> {
        match self.table.remove(key, |_| Ok::<_, DatabaseError>(())) {
            Ok(_) | Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
