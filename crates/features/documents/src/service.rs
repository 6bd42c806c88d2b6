use crate::error::DocumentsError;
use crate::notifications::{Subscribers, Subscriptions};
use plm_database::Database;
use plm_domain::acl::Acl;
use plm_domain::content::BinaryResource;
use plm_domain::events::{EventKind, NotificationKind, PlmEvent};
use plm_domain::keys::{EntityKind, MasterKey};
use plm_event_bus::EventBus;
use plm_kernel::security::Membership;
use plm_lifecycle::model::normalize_location;
use plm_lifecycle::{IterationEdit, LifecycleError, LinkResolution, MasterService, MasterView, NewMaster};
use plm_storage::Storage;
use tracing::{debug, info, warn};

/// Document operations: the shared master lifecycle plus folders and subscriptions.
#[derive(Debug, Clone)]
pub struct DocumentService {
    masters: MasterService,
    subscriptions: Subscriptions,
    events: EventBus,
}

impl DocumentService {
    /// # Errors
    /// Fails when the document or subscription tables cannot be opened.
    pub fn new(database: &Database, storage: &Storage, events: EventBus) -> Result<Self, DocumentsError> {
        Ok(Self {
            masters: MasterService::new(EntityKind::Document, database, storage, events.clone())?,
            subscriptions: Subscriptions::open(database)?,
            events,
        })
    }

    #[must_use]
    pub const fn masters(&self) -> &MasterService {
        &self.masters
    }

    pub fn create(&self, who: &Membership, draft: NewMaster) -> Result<MasterView, DocumentsError> {
        Ok(self.masters.create(who, draft)?)
    }

    pub fn get(&self, who: &Membership, key: &MasterKey) -> Result<MasterView, DocumentsError> {
        Ok(self.masters.get(who, key)?)
    }

    /// Documents directly in folder `path` (the workspace root when empty), optionally carrying `tag`.
    pub fn list(&self, who: &Membership, path: &str, tag: Option<&str>) -> Result<Vec<MasterView>, DocumentsError> {
        let folder = normalize_location(path)?;
        let tag = tag.map(str::trim).filter(|t| !t.is_empty());
        Ok(self.masters.list(who, |m| m.location == folder && tag.is_none_or(|t| m.tags.contains(t))))
    }

    #[must_use]
    pub fn checked_out(&self, who: &Membership) -> Vec<MasterView> {
        self.masters.checked_out(who)
    }

    pub fn checkout(&self, who: &Membership, key: &MasterKey) -> Result<MasterView, DocumentsError> {
        let held = self.masters.get(who, key).is_ok_and(|v| v.holds_checkout);
        let view = self.masters.checkout(who, key)?;
        if !held {
            self.notify(who, key, NotificationKind::StateChange);
        }
        Ok(view)
    }

    pub fn checkin(&self, who: &Membership, key: &MasterKey) -> Result<MasterView, DocumentsError> {
        let view = self.masters.checkin(who, key)?;
        self.notify(who, key, NotificationKind::StateChange);
        self.notify(who, key, NotificationKind::IterationChange);
        Ok(view)
    }

    pub async fn undo_checkout(&self, who: &Membership, key: &MasterKey) -> Result<MasterView, DocumentsError> {
        let view = self.masters.undo_checkout(who, key).await?;
        self.notify(who, key, NotificationKind::StateChange);
        Ok(view)
    }

    pub fn relocate(&self, who: &Membership, key: &MasterKey, path: &str) -> Result<MasterView, DocumentsError> {
        Ok(self.masters.relocate(who, key, path)?)
    }

    pub async fn create_version(
        &self,
        who: &Membership,
        key: &MasterKey,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<(MasterView, MasterView), DocumentsError> {
        Ok(self.masters.create_version(who, key, title, description).await?)
    }

    pub fn save_tags<I, S>(&self, who: &Membership, key: &MasterKey, labels: I) -> Result<MasterView, DocumentsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.masters.save_tags(who, key, labels)?)
    }

    pub fn set_acl(&self, who: &Membership, key: &MasterKey, acl: Acl) -> Result<MasterView, DocumentsError> {
        Ok(self.masters.set_acl(who, key, acl)?)
    }

    pub fn update_iteration(
        &self,
        who: &Membership,
        key: &MasterKey,
        number: u32,
        edit: IterationEdit,
    ) -> Result<MasterView, DocumentsError> {
        Ok(self.masters.update_iteration(who, key, number, edit)?)
    }

    pub fn resolve_links(&self, who: &Membership, key: &MasterKey, number: u32) -> Result<Vec<LinkResolution>, DocumentsError> {
        Ok(self.masters.resolve_links(who, key, number)?)
    }

    pub async fn attach_file(
        &self,
        who: &Membership,
        key: &MasterKey,
        number: u32,
        name: &str,
        data: &[u8],
    ) -> Result<BinaryResource, DocumentsError> {
        Ok(self.masters.attach_file(who, key, number, name, data).await?)
    }

    pub async fn read_file(
        &self,
        who: &Membership,
        key: &MasterKey,
        number: u32,
        name: &str,
    ) -> Result<(BinaryResource, Vec<u8>), DocumentsError> {
        Ok(self.masters.read_file(who, key, number, name).await?)
    }

    pub async fn remove_file(&self, who: &Membership, key: &MasterKey, number: u32, name: &str) -> Result<(), DocumentsError> {
        Ok(self.masters.remove_file(who, key, number, name).await?)
    }

    /// Deletes the document and drops its subscriptions.
    pub async fn delete(&self, who: &Membership, key: &MasterKey) -> Result<(), DocumentsError> {
        self.masters.delete(who, key).await?;
        if let Err(err) = self.subscriptions.forget(key) {
            warn!(%key, error = %err, "Subscriptions of a deleted document not dropped");
        }
        Ok(())
    }

    /// Subscribes the caller to `kind` changes of a document they can read.
    ///
    /// The document is looked up again after the subscription is stored; if it was deleted
    /// (or deleted and re-created) in between, the subscription is withdrawn.
    pub fn subscribe(&self, who: &Membership, key: &MasterKey, kind: NotificationKind) -> Result<Subscribers, DocumentsError> {
        let created_at = self.masters.get(who, key)?.master.created_at;
        let added = self.subscriptions.subscribe(key, kind, &who.login)?;

        match self.masters.get(who, key) {
            Ok(view) if view.master.created_at == created_at => {}
            current => {
                self.subscriptions.unsubscribe(key, kind, &who.login)?;
                if current.is_err() {
                    self.subscriptions.forget(key)?;
                }
                return Err(DocumentsError::Lifecycle {
                    source: LifecycleError::NotFound {
                        message: key.to_string().into(),
                        context: Some("document deleted while subscribing".into()),
                    },
                    context: None,
                });
            }
        }

        if added {
            debug!(%key, %kind, login = %who.login, "Subscribed");
        }
        Ok(self.subscriptions.get(key))
    }

    pub fn unsubscribe(&self, who: &Membership, key: &MasterKey, kind: NotificationKind) -> Result<Subscribers, DocumentsError> {
        self.masters.get(who, key)?;
        if self.subscriptions.unsubscribe(key, kind, &who.login)? {
            debug!(%key, %kind, login = %who.login, "Unsubscribed");
        }
        Ok(self.subscriptions.get(key))
    }

    fn notify(&self, who: &Membership, key: &MasterKey, change: NotificationKind) {
        let recipients = self.subscriptions.recipients(key, change, &who.login);
        if recipients.is_empty() {
            return;
        }
        info!(%key, %change, recipients = recipients.len(), "Notifying subscribers");
        let event = PlmEvent::new(who.workspace.as_str(), who.login.as_str(), EventKind::SubscribersNotified {
            key: key.clone(),
            change,
            recipients,
        });
        if let Err(err) = self.events.publish(event) {
            warn!(error = %err, "Subscriber notification not published");
        }
    }
}
