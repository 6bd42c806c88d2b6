use crate::error::{ChangeError, ChangeErrorExt};
use crate::model::{ChangeIssue, ChangeRequest, ItemKey, NewRequest, optional_login};
use plm_database::{Database, Table};
use plm_domain::acl::Permission;
use plm_domain::constants::{REQUEST_SEQUENCE, REQUESTS_TABLE};
use plm_domain::events::{EventKind, PlmEvent};
use plm_event_bus::EventBus;
use plm_kernel::now_millis;
use plm_kernel::security::Membership;
use plm_lifecycle::model::normalize_tags;
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

/// A request with the caller's workspace permission.
#[derive(Debug, Clone)]
pub struct RequestView {
    pub request: ChangeRequest,
    pub permission: Permission,
}

impl RequestView {
    #[must_use]
    pub const fn writable(&self) -> bool {
        self.permission.can_write()
    }
}

/// Change requests. A request addresses issues of its workspace, which keeps those issues
/// from being deleted.
#[derive(Debug, Clone)]
pub struct RequestService {
    database: Database,
    table: Table<ItemKey, ChangeRequest>,
    issues: Table<ItemKey, ChangeIssue>,
    events: EventBus,
}

impl RequestService {
    pub(crate) fn new(database: &Database, issues: Table<ItemKey, ChangeIssue>, events: EventBus) -> Result<Self, ChangeError> {
        Ok(Self { database: database.clone(), table: database.table(REQUESTS_TABLE).context("Opening requests")?, issues, events })
    }

    /// Re-registers the addressed issues of every stored request. Returns the request count.
    pub fn rebuild_references(&self) -> usize {
        let mut references = self.database.references().write();
        let requests = self.table.scan(|_, _| true);
        for request in &requests {
            references.set(&request.key.request_reference(), request.addressed_references());
        }
        requests.len()
    }

    #[instrument(skip_all, fields(workspace = %who.workspace, name = %draft.name))]
    pub fn create(&self, who: &Membership, draft: NewRequest) -> Result<RequestView, ChangeError> {
        let permission = writer(who)?;
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(ChangeError::validation("a request needs a name"));
        }

        let key = ItemKey::new(who.workspace.as_str(), self.database.next_id(REQUEST_SEQUENCE));
        let request = ChangeRequest {
            key: key.clone(),
            name: name.to_owned(),
            description: draft.description,
            author: who.login.clone(),
            created_at: now_millis(),
            priority: draft.priority,
            assignee: optional_login(draft.assignee),
            category: draft.category,
            tags: BTreeSet::new(),
            addressed_issues: BTreeSet::new(),
        };
        self.table.insert(key.clone(), request.clone())?;

        info!(%key, "Request created");
        self.publish(who, EventKind::RequestCreated { id: key.id });
        Ok(RequestView { request, permission })
    }

    #[must_use]
    pub fn list(&self, who: &Membership) -> Vec<RequestView> {
        let permission = who.effective(None);
        if !permission.can_read() {
            return Vec::new();
        }
        self.table
            .scan(|key, _| key.workspace_id == who.workspace)
            .into_iter()
            .map(|request| RequestView { request, permission })
            .collect()
    }

    pub fn get(&self, who: &Membership, id: u64) -> Result<RequestView, ChangeError> {
        let permission = who.effective(None);
        if !permission.can_read() {
            return Err(ChangeError::NotAllowed { message: format!("'{}' may not read requests", who.login).into(), context: None });
        }
        let key = ItemKey::new(who.workspace.as_str(), id);
        let request = self.table.get(&key).ok_or_else(|| ChangeError::not_found(format!("request {key}")))?;
        Ok(RequestView { request, permission })
    }

    #[instrument(skip_all, fields(workspace = %who.workspace, id = id))]
    pub fn delete(&self, who: &Membership, id: u64) -> Result<(), ChangeError> {
        writer(who)?;
        let key = ItemKey::new(who.workspace.as_str(), id);
        {
            let mut references = self.database.references().write();
            self.table.remove(&key, |_| Ok::<_, ChangeError>(()))?;
            references.clear_referrer(&key.request_reference());
        }

        info!(%key, "Request deleted");
        self.publish(who, EventKind::RequestDeleted { id });
        Ok(())
    }

    /// Replaces the addressed issues; each must exist in the caller's workspace.
    #[instrument(skip_all, fields(workspace = %who.workspace, id = id, count = issues.len()))]
    pub fn set_addressed(&self, who: &Membership, id: u64, issues: Vec<u64>) -> Result<RequestView, ChangeError> {
        let permission = writer(who)?;
        let key = ItemKey::new(who.workspace.as_str(), id);
        let addressed: BTreeSet<u64> = issues.into_iter().collect();

        let view = {
            let mut references = self.database.references().write();
            if let Some(missing) = addressed.iter().find(|issue| !self.issues.contains(&ItemKey::new(who.workspace.as_str(), **issue))) {
                return Err(ChangeError::not_found(format!("issue {}/{missing}", who.workspace)));
            }
            let request = self.table.update(&key, |request| {
                request.addressed_issues.clone_from(&addressed);
                Ok::<_, ChangeError>(request.clone())
            })?;
            references.set(&key.request_reference(), request.addressed_references());
            RequestView { request, permission }
        };

        self.publish(who, EventKind::RequestUpdated { id });
        Ok(view)
    }

    pub fn save_tags<I, S>(&self, who: &Membership, id: u64, labels: I) -> Result<RequestView, ChangeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let permission = writer(who)?;
        let tags = normalize_tags(labels);
        let key = ItemKey::new(who.workspace.as_str(), id);
        let request = self.table.update(&key, |request| {
            request.tags = tags;
            Ok::<_, ChangeError>(request.clone())
        })?;

        self.publish(who, EventKind::RequestUpdated { id });
        Ok(RequestView { request, permission })
    }

    fn publish(&self, who: &Membership, kind: EventKind) {
        if let Err(err) = self.events.publish(PlmEvent::new(who.workspace.as_str(), who.login.as_str(), kind)) {
            warn!(error = %err, "Domain event not published");
        }
    }
}

/// Requests carry no ACL; writing needs full workspace access.
fn writer(who: &Membership) -> Result<Permission, ChangeError> {
    let permission = who.effective(None);
    if permission.can_write() {
        Ok(permission)
    } else {
        Err(ChangeError::NotAllowed {
            message: format!("'{}' may not change requests in '{}'", who.login, who.workspace).into(),
            context: None,
        })
    }
}
