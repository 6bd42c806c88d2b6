use fxhash::FxHashMap;
use plm_domain::acl::{Acl, Permission};
use plm_domain::config::WorkspaceConfig;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Default)]
struct WorkspaceEntry {
    admin: String,
    acl_fallback: Permission,
    members: FxHashMap<String, Permission>,
    groups_of: FxHashMap<String, Vec<String>>,
}

/// What one login is within one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub workspace: String,
    pub login: String,
    pub admin: bool,
    /// Permission on entities without an ACL.
    pub permission: Permission,
    pub groups: Vec<String>,
    pub acl_fallback: Permission,
}

impl Membership {
    /// Effective permission on an entity carrying `acl`.
    ///
    /// Admins always get full access. Without an ACL the membership permission applies;
    /// with one, the most permissive of the user entry, the group entries and the
    /// workspace fallback.
    #[must_use]
    pub fn effective(&self, acl: Option<&Acl>) -> Permission {
        if self.admin {
            return Permission::FullAccess;
        }
        match acl {
            None => self.permission,
            Some(acl) => acl
                .grant_for(&self.login, self.groups.iter().map(String::as_str))
                .map_or(self.acl_fallback, |granted| granted.max(self.acl_fallback)),
        }
    }
}

/// Workspace membership, built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    workspaces: Arc<FxHashMap<String, WorkspaceEntry>>,
}

impl Directory {
    #[must_use]
    pub fn from_config(workspaces: &[WorkspaceConfig]) -> Self {
        let mut map = FxHashMap::default();
        for ws in workspaces {
            let mut entry = WorkspaceEntry {
                admin: ws.admin.clone(),
                acl_fallback: ws.acl_fallback,
                ..WorkspaceEntry::default()
            };
            for member in &ws.members {
                entry.members.insert(member.login.clone(), member.permission);
            }
            for group in &ws.groups {
                for login in &group.members {
                    if !entry.members.contains_key(login) && *login != ws.admin {
                        warn!(workspace = %ws.id, group = %group.id, %login, "Group member is not a workspace member");
                    }
                    entry.groups_of.entry(login.clone()).or_default().push(group.id.clone());
                }
            }
            if map.insert(ws.id.clone(), entry).is_some() {
                warn!(workspace = %ws.id, "Workspace configured twice, keeping the last entry");
            }
        }
        Self { workspaces: Arc::new(map) }
    }

    /// `None` when `login` is neither a member nor the admin of `workspace`.
    #[must_use]
    pub fn membership(&self, workspace: &str, login: &str) -> Option<Membership> {
        let entry = self.workspaces.get(workspace)?;
        let admin = !entry.admin.is_empty() && entry.admin == login;
        let permission = if admin { Permission::FullAccess } else { *entry.members.get(login)? };

        Some(Membership {
            workspace: workspace.to_owned(),
            login: login.to_owned(),
            admin,
            permission,
            groups: entry.groups_of.get(login).cloned().unwrap_or_default(),
            acl_fallback: entry.acl_fallback,
        })
    }
}
