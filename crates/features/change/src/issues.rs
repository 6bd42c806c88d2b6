use crate::error::{ChangeError, ChangeErrorExt};
use crate::model::{ChangeIssue, IssueUpdate, ItemKey, NewIssue, optional_login};
use plm_database::{Database, Table};
use plm_domain::acl::{Acl, Permission};
use plm_domain::constants::{ISSUE_SEQUENCE, ISSUES_TABLE, LINK_SEARCH_LIMIT};
use plm_domain::content::IterationLink;
use plm_domain::events::{EventKind, PlmEvent};
use plm_domain::keys::EntityKind;
use plm_event_bus::EventBus;
use plm_kernel::now_millis;
use plm_kernel::security::Membership;
use plm_lifecycle::MasterTables;
use plm_lifecycle::model::normalize_tags;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

/// An issue with the caller's effective permission on it.
#[derive(Debug, Clone)]
pub struct IssueView {
    pub issue: ChangeIssue,
    pub permission: Permission,
}

impl IssueView {
    #[must_use]
    pub const fn writable(&self) -> bool {
        self.permission.can_write()
    }
}

/// Change issues of every workspace.
///
/// Affected items are mirrored into the database reference index, so a master named by an
/// issue cannot be deleted, and an issue addressed by a request cannot be deleted either.
#[derive(Debug, Clone)]
pub struct IssueService {
    database: Database,
    table: Table<ItemKey, ChangeIssue>,
    masters: MasterTables,
    events: EventBus,
}

impl IssueService {
    /// # Errors
    /// [`ChangeError::Database`] when a table cannot be opened.
    pub fn new(database: &Database, events: EventBus) -> Result<Self, ChangeError> {
        Ok(Self {
            database: database.clone(),
            table: database.table(ISSUES_TABLE).context("Opening issues")?,
            masters: MasterTables::open(database).context("Opening master tables")?,
            events,
        })
    }

    pub(crate) const fn table(&self) -> &Table<ItemKey, ChangeIssue> {
        &self.table
    }

    /// Re-registers the affected items of every stored issue. Returns the issue count.
    pub fn rebuild_references(&self) -> usize {
        let mut references = self.database.references().write();
        let issues = self.table.scan(|_, _| true);
        for issue in &issues {
            references.set(&issue.key.issue_reference(), issue.affected_references());
        }
        issues.len()
    }

    #[instrument(skip_all, fields(workspace = %who.workspace, name = %draft.name))]
    pub fn create(&self, who: &Membership, draft: NewIssue) -> Result<IssueView, ChangeError> {
        if !who.effective(None).can_write() {
            return Err(ChangeError::NotAllowed {
                message: format!("'{}' may not create issues in '{}'", who.login, who.workspace).into(),
                context: None,
            });
        }
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(ChangeError::validation("an issue needs a name"));
        }

        let key = ItemKey::new(who.workspace.as_str(), self.database.next_id(ISSUE_SEQUENCE));
        let issue = ChangeIssue {
            key: key.clone(),
            name: name.to_owned(),
            description: draft.description,
            author: who.login.clone(),
            created_at: now_millis(),
            initiator: optional_login(draft.initiator),
            priority: draft.priority,
            assignee: optional_login(draft.assignee),
            category: draft.category,
            tags: BTreeSet::new(),
            acl: None,
            affected_documents: BTreeSet::new(),
            affected_parts: BTreeSet::new(),
        };
        self.table.insert(key.clone(), issue.clone())?;

        info!(%key, "Issue created");
        self.publish(who, EventKind::IssueCreated { id: key.id });
        Ok(IssueView { issue, permission: who.effective(None) })
    }

    /// Readable issues of the caller's workspace, by id.
    #[must_use]
    pub fn list(&self, who: &Membership) -> Vec<IssueView> {
        self.table
            .scan(|key, issue| key.workspace_id == who.workspace && who.effective(issue.acl.as_ref()).can_read())
            .into_iter()
            .map(|issue| IssueView { permission: who.effective(issue.acl.as_ref()), issue })
            .collect()
    }

    /// Up to eight readable issues whose name contains `query`, ignoring case.
    #[must_use]
    pub fn search(&self, who: &Membership, query: &str) -> Vec<IssueView> {
        let needle = query.trim().to_lowercase();
        let mut found = self.list(who);
        found.retain(|view| view.issue.name.to_lowercase().contains(&needle));
        found.truncate(LINK_SEARCH_LIMIT);
        found
    }

    pub fn get(&self, who: &Membership, id: u64) -> Result<IssueView, ChangeError> {
        let key = ItemKey::new(who.workspace.as_str(), id);
        let issue = self.table.get(&key).ok_or_else(|| ChangeError::not_found(format!("issue {key}")))?;
        let permission = require(who, &issue, Permission::ReadOnly)?;
        Ok(IssueView { issue, permission })
    }

    #[instrument(skip_all, fields(workspace = %who.workspace, id = id))]
    pub fn update(&self, who: &Membership, id: u64, change: IssueUpdate) -> Result<IssueView, ChangeError> {
        self.modify(who, id, |issue| {
            issue.description = change.description;
            issue.priority = change.priority;
            issue.assignee = optional_login(change.assignee);
            issue.category = change.category;
            Ok(())
        })
    }

    /// Deletes an issue no request addresses.
    ///
    /// # Errors
    /// [`ChangeError::Database`] wrapping a constraint violation while a request addresses it.
    #[instrument(skip_all, fields(workspace = %who.workspace, id = id))]
    pub fn delete(&self, who: &Membership, id: u64) -> Result<(), ChangeError> {
        let key = ItemKey::new(who.workspace.as_str(), id);
        let reference = key.issue_reference();
        {
            let mut references = self.database.references().write();
            references.ensure_unreferenced(&reference)?;
            self.table.remove(&key, |issue| require(who, issue, Permission::FullAccess).map(|_| ()))?;
            references.clear_referrer(&reference);
        }

        info!(%key, "Issue deleted");
        self.publish(who, EventKind::IssueDeleted { id });
        Ok(())
    }

    /// Replaces the tag set.
    pub fn save_tags<I, S>(&self, who: &Membership, id: u64, labels: I) -> Result<IssueView, ChangeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = normalize_tags(labels);
        self.modify(who, id, |issue| {
            issue.tags = tags;
            Ok(())
        })
    }

    /// Adds labels to the existing tags.
    pub fn add_tags<I, S>(&self, who: &Membership, id: u64, labels: I) -> Result<IssueView, ChangeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = normalize_tags(labels);
        self.modify(who, id, |issue| {
            issue.tags.extend(tags);
            Ok(())
        })
    }

    pub fn remove_tag(&self, who: &Membership, id: u64, label: &str) -> Result<IssueView, ChangeError> {
        let label = label.trim().to_owned();
        self.modify(who, id, |issue| {
            if !issue.tags.remove(&label) {
                return Err(ChangeError::not_found(format!("tag '{label}' on issue {}", issue.key)));
            }
            Ok(())
        })
    }

    /// Replaces the affected documents or parts. Every link must name an existing iteration
    /// in the caller's workspace.
    #[instrument(skip_all, fields(workspace = %who.workspace, id = id, kind = %kind, count = links.len()))]
    pub fn set_affected(
        &self,
        who: &Membership,
        id: u64,
        kind: EntityKind,
        links: Vec<IterationLink>,
    ) -> Result<IssueView, ChangeError> {
        let links: BTreeSet<IterationLink> = links.into_iter().collect();
        for link in &links {
            if link.kind != kind {
                return Err(ChangeError::validation(format!("{link} is not a {kind}")));
            }
            if link.workspace_id != who.workspace {
                return Err(ChangeError::validation(format!("{link} belongs to another workspace")));
            }
        }

        let key = ItemKey::new(who.workspace.as_str(), id);
        let view = {
            let mut references = self.database.references().write();
            if let Some(missing) = links.iter().find(|link| !self.masters.iteration_exists(link)) {
                return Err(ChangeError::not_found(format!("{missing}")));
            }
            let (view, targets) = self.table.update(&key, |issue| {
                let permission = require(who, issue, Permission::FullAccess)?;
                issue.affected_mut(kind).clone_from(&links);
                Ok::<_, ChangeError>((IssueView { issue: issue.clone(), permission }, issue.affected_references()))
            })?;
            references.set(&key.issue_reference(), targets);
            view
        };

        debug!("Affected items saved");
        self.publish(who, EventKind::IssueUpdated { id });
        Ok(view)
    }

    /// Replaces the ACL; an ACL without entries removes it.
    pub fn set_acl(&self, who: &Membership, id: u64, acl: Acl) -> Result<IssueView, ChangeError> {
        let acl = acl.normalized();
        let view = self.modify(who, id, |issue| {
            issue.acl = acl;
            Ok(())
        })?;
        // The caller's permission may have changed with the ACL.
        let permission = who.effective(view.issue.acl.as_ref());
        Ok(IssueView { permission, ..view })
    }

    /// Applies `change` under the row lock once the caller has full access.
    fn modify(
        &self,
        who: &Membership,
        id: u64,
        change: impl FnOnce(&mut ChangeIssue) -> Result<(), ChangeError>,
    ) -> Result<IssueView, ChangeError> {
        let key = ItemKey::new(who.workspace.as_str(), id);
        let view = self.table.update(&key, |issue| {
            let permission = require(who, issue, Permission::FullAccess)?;
            change(issue)?;
            Ok::<_, ChangeError>(IssueView { issue: issue.clone(), permission })
        })?;
        self.publish(who, EventKind::IssueUpdated { id });
        Ok(view)
    }

    fn publish(&self, who: &Membership, kind: EventKind) {
        if let Err(err) = self.events.publish(PlmEvent::new(who.workspace.as_str(), who.login.as_str(), kind)) {
            warn!(error = %err, "Domain event not published");
        }
    }
}

fn require(who: &Membership, issue: &ChangeIssue, level: Permission) -> Result<Permission, ChangeError> {
    let permission = who.effective(issue.acl.as_ref());
    if permission >= level {
        Ok(permission)
    } else {
        Err(ChangeError::NotAllowed {
            message: format!("'{}' has {permission} on issue {}", who.login, issue.key).into(),
            context: Some(format!("{level} required").into()),
        })
    }
}
