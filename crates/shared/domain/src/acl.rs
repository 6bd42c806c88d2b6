use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

/// Access level, ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    #[default]
    Forbidden,
    ReadOnly,
    FullAccess,
}

impl Permission {
    #[must_use]
    pub const fn can_read(self) -> bool {
        matches!(self, Self::ReadOnly | Self::FullAccess)
    }

    #[must_use]
    pub const fn can_write(self) -> bool {
        matches!(self, Self::FullAccess)
    }
}

/// Per-entity access list. An entity without one falls back to workspace membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Acl {
    #[serde(default)]
    pub users: BTreeMap<String, Permission>,
    #[serde(default)]
    pub groups: BTreeMap<String, Permission>,
}

impl Acl {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }

    /// `None` for an empty list, which means "remove the ACL".
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }

    /// Most permissive entry that applies to `login` directly or through `groups`, if any.
    #[must_use]
    pub fn grant_for<'a>(&self, login: &str, groups: impl IntoIterator<Item = &'a str>) -> Option<Permission> {
        let direct = self.users.get(login).copied();
        groups.into_iter().filter_map(|group| self.groups.get(group).copied()).chain(direct).max()
    }
}
