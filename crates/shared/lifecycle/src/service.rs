use crate::error::{LifecycleError, LifecycleErrorExt};
use crate::links::{self, LinkResolution};
use crate::model::{IterationEdit, Master, NewMaster, normalize_location};
use crate::tables::MasterTables;
use plm_database::{Database, Table};
use plm_domain::acl::{Acl, Permission};
use plm_domain::constants::FILES_NAMESPACE;
use plm_domain::content::BinaryResource;
use plm_domain::events::{EventKind, PlmEvent};
use plm_domain::keys::{EntityKind, MasterKey, Version, validate_id};
use plm_event_bus::EventBus;
use plm_kernel::{now_millis, safe_nanoid};
use plm_kernel::security::Membership;
use plm_storage::{NamespacedStorage, Storage};
use tracing::{debug, info, instrument, warn};

/// A master as one caller sees it, with the caller's effective permission.
#[derive(Debug, Clone)]
pub struct MasterView {
    pub master: Master,
    pub permission: Permission,
    /// The viewer holds the checkout and may see the working copy.
    pub holds_checkout: bool,
}

impl MasterView {
    fn new(master: Master, permission: Permission, viewer: &str) -> Self {
        let holds_checkout = master.holder() == Some(viewer);
        Self { master: master.view_for(viewer), permission, holds_checkout }
    }

    #[must_use]
    pub const fn writable(&self) -> bool {
        self.permission.can_write()
    }
}

/// Every lifecycle operation on the masters of one kind.
///
/// State changes run inside [`Table::update`], so each master is mutated under its own row
/// lock and only committed on success. Blob I/O happens outside the lock; failed cleanups are
/// logged, not returned.
#[derive(Debug, Clone)]
pub struct MasterService {
    kind: EntityKind,
    tables: MasterTables,
    database: Database,
    files: NamespacedStorage,
    events: EventBus,
}

impl MasterService {
    /// # Errors
    /// [`LifecycleError::Database`] if a master table cannot be opened,
    /// [`LifecycleError::Storage`] if the files namespace is rejected.
    pub fn new(kind: EntityKind, database: &Database, storage: &Storage, events: EventBus) -> Result<Self, LifecycleError> {
        Ok(Self {
            kind,
            tables: MasterTables::open(database).context("Opening master tables")?,
            database: database.clone(),
            files: storage.namespace(FILES_NAMESPACE).context("Opening files namespace")?,
            events,
        })
    }

    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub const fn tables(&self) -> &MasterTables {
        &self.tables
    }

    fn table(&self) -> &Table<MasterKey, Master> {
        self.tables.of(self.kind)
    }

    #[instrument(skip_all, fields(kind = %self.kind, workspace = %who.workspace, id = %draft.id))]
    pub fn create(&self, who: &Membership, mut draft: NewMaster) -> Result<MasterView, LifecycleError> {
        if !who.effective(None).can_write() {
            return Err(LifecycleError::not_allowed(format!(
                "'{}' may not create {}s in workspace '{}'",
                who.login, self.kind, who.workspace
            )));
        }
        let key = MasterKey::new(who.workspace.as_str(), draft.id.as_str(), Version::first())?;
        if draft.title.trim().is_empty() {
            draft.title.clone_from(&draft.id);
        }
        draft.location = match self.kind {
            EntityKind::Document => normalize_location(&draft.location)?,
            EntityKind::Part => String::new(),
        };
        if self.kind == EntityKind::Document {
            draft.standard_part = false;
        }

        if !self.table().keys_where(|k| k.same_lineage(&key)).is_empty() {
            return Err(self.duplicate(&key));
        }
        let master = Master::new(self.kind, key.clone(), draft, &who.login, now_millis());
        self.table().insert(key.clone(), master.clone()).map_err(|_| self.duplicate(&key))?;

        info!(%key, "Master created");
        self.publish(who, EventKind::MasterCreated { entity: self.kind, key });
        let permission = who.effective(master.acl.as_ref());
        Ok(MasterView::new(master, permission, &who.login))
    }

    /// # Errors
    /// [`LifecycleError::NotFound`] or [`LifecycleError::NotAllowed`].
    pub fn get(&self, who: &Membership, key: &MasterKey) -> Result<MasterView, LifecycleError> {
        let master = self.load(key)?;
        let permission = self.require(who, &master, Permission::ReadOnly)?;
        Ok(MasterView::new(master, permission, &who.login))
    }

    /// Readable masters of the caller's workspace accepted by `filter`, in key order.
    #[must_use]
    pub fn list(&self, who: &Membership, filter: impl Fn(&Master) -> bool) -> Vec<MasterView> {
        self.table()
            .scan(|key, master| {
                key.workspace_id == who.workspace && who.effective(master.acl.as_ref()).can_read() && filter(master)
            })
            .into_iter()
            .map(|master| {
                let permission = who.effective(master.acl.as_ref());
                MasterView::new(master, permission, &who.login)
            })
            .collect()
    }

    /// Masters checked out by the caller.
    #[must_use]
    pub fn checked_out(&self, who: &Membership) -> Vec<MasterView> {
        self.list(who, |m| m.holder() == Some(who.login.as_str()))
    }

    #[instrument(skip_all, fields(kind = %self.kind, key = %key, actor = %who.login))]
    pub fn checkout(&self, who: &Membership, key: &MasterKey) -> Result<MasterView, LifecycleError> {
        let now = now_millis();
        let (view, changed) = self.table().update(key, |m| {
            let permission = self.require(who, m, Permission::FullAccess)?;
            let changed = m.checkout(&who.login, now)?;
            Ok::<_, LifecycleError>((MasterView::new(m.clone(), permission, &who.login), changed))
        })?;

        if changed {
            debug!("Checked out");
            self.publish(who, EventKind::CheckedOut { entity: self.kind, key: key.clone() });
        }
        Ok(view)
    }

    #[instrument(skip_all, fields(kind = %self.kind, key = %key, actor = %who.login))]
    pub fn checkin(&self, who: &Membership, key: &MasterKey) -> Result<MasterView, LifecycleError> {
        let (view, iteration) = self.table().update(key, |m| {
            let permission = self.require(who, m, Permission::FullAccess)?;
            let iteration = m.checkin(&who.login)?;
            Ok::<_, LifecycleError>((MasterView::new(m.clone(), permission, &who.login), iteration))
        })?;

        debug!(iteration, "Checked in");
        self.publish(who, EventKind::CheckedIn { entity: self.kind, key: key.clone(), iteration });
        Ok(view)
    }

    /// Discards the working copy and deletes the blobs uploaded to it.
    #[instrument(skip_all, fields(kind = %self.kind, key = %key, actor = %who.login))]
    pub async fn undo_checkout(&self, who: &Membership, key: &MasterKey) -> Result<MasterView, LifecycleError> {
        let (view, discarded) = self.table().update(key, |m| {
            let permission = self.require(who, m, Permission::FullAccess)?;
            let discarded = m.undo_checkout(&who.login)?;
            Ok::<_, LifecycleError>((MasterView::new(m.clone(), permission, &who.login), discarded))
        })?;

        let own: Vec<String> = discarded
            .files
            .values()
            .filter(|f| f.belongs_to(self.kind, key, discarded.number))
            .map(|f| f.full_name.clone())
            .collect();
        let removed = self.files.delete_all(&own).await;
        debug!(removed, "Checkout undone");

        self.publish(who, EventKind::CheckoutUndone { entity: self.kind, key: key.clone() });
        Ok(view)
    }

    #[instrument(skip_all, fields(kind = %self.kind, key = %key, iteration = number, actor = %who.login))]
    pub fn update_iteration(
        &self,
        who: &Membership,
        key: &MasterKey,
        number: u32,
        edit: IterationEdit,
    ) -> Result<MasterView, LifecycleError> {
        let view = self.table().update(key, |m| {
            let permission = self.require(who, m, Permission::FullAccess)?;
            m.edit_iteration(&who.login, number, edit)?;
            Ok::<_, LifecycleError>(MasterView::new(m.clone(), permission, &who.login))
        })?;

        self.publish(who, EventKind::IterationUpdated { entity: self.kind, key: key.clone(), iteration: number });
        Ok(view)
    }

    /// Creates `(id, next version)` seeded from the last iteration of `key`, which must be
    /// released. Returns `[source, created]`.
    ///
    /// The blobs are copied before the new master is committed; if the source changes or the
    /// commit fails, the copies are removed again.
    #[instrument(skip_all, fields(kind = %self.kind, key = %key, actor = %who.login))]
    pub async fn create_version(
        &self,
        who: &Membership,
        key: &MasterKey,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<(MasterView, MasterView), LifecycleError> {
        let now = now_millis();
        let seed = self.load(key)?;
        self.require(who, &seed, Permission::FullAccess)?;
        ensure_released(&seed, "a new version needs a released source")?;
        let last = seed.last_iteration().ok_or_else(|| LifecycleError::from(format!("{key} has no iterations")))?;

        let latest = self
            .table()
            .keys_where(|k| k.same_lineage(key))
            .into_iter()
            .map(|k| k.version)
            .max()
            .unwrap_or_else(|| key.version.clone());
        let new_key = key.with_version(latest.next());

        let mut first = last.successor(1, &who.login, now);
        first.files.clear();
        let mut copied = Vec::with_capacity(last.files.len());
        for file in last.files.values() {
            let copy = BinaryResource::new(self.kind, &new_key, 1, &blob_id(), &file.name, file.length, now);
            if let Err(err) = self.files.copy(&file.full_name, &copy.full_name).await {
                self.discard(&copied).await;
                return Err(LifecycleError::Storage {
                    source: err,
                    context: Some("Copying attachments to the new version".into()),
                });
            }
            copied.push(copy.full_name.clone());
            first.files.insert(file.name.clone(), copy);
        }
        let seeded_from = last.number;

        let committed = self.table().update(key, |m| {
            let permission = self.require(who, m, Permission::FullAccess)?;
            ensure_released(m, "a new version needs a released source")?;
            if m.last_iteration().map(|it| it.number) != Some(seeded_from) {
                return Err(LifecycleError::Conflict {
                    message: format!("{key} changed while its new version was created").into(),
                    context: None,
                });
            }

            let created = Master {
                kind: self.kind,
                key: new_key.clone(),
                title: title.unwrap_or_else(|| m.title.clone()),
                description: description.unwrap_or_else(|| m.description.clone()),
                author: who.login.clone(),
                created_at: now,
                location: m.location.clone(),
                standard_part: m.standard_part,
                tags: m.tags.clone(),
                acl: m.acl.clone(),
                iterations: vec![first],
                checkout: None,
            };
            self.table().insert(new_key.clone(), created.clone()).map_err(|_| self.duplicate(&new_key))?;

            let created_permission = who.effective(created.acl.as_ref());
            Ok((
                MasterView::new(m.clone(), permission, &who.login),
                MasterView::new(created, created_permission, &who.login),
            ))
        });
        let (source, created) = match committed {
            Ok(views) => views,
            Err(err) => {
                self.discard(&copied).await;
                return Err(err);
            }
        };

        info!(created = %new_key, blobs = copied.len(), "Version created");
        self.publish(who, EventKind::VersionCreated { entity: self.kind, source: key.clone(), created: new_key });
        Ok((source, created))
    }

    /// Replaces the tag set: labels are trimmed, empties dropped and duplicates collapsed.
    #[instrument(skip_all, fields(kind = %self.kind, key = %key))]
    pub fn save_tags<I, S>(&self, who: &Membership, key: &MasterKey, labels: I) -> Result<MasterView, LifecycleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let view = self.table().update(key, |m| {
            let permission = self.require(who, m, Permission::FullAccess)?;
            m.save_tags(labels);
            Ok::<_, LifecycleError>(MasterView::new(m.clone(), permission, &who.login))
        })?;

        let tags = view.master.tags.iter().cloned().collect();
        self.publish(who, EventKind::TagsSaved { entity: self.kind, key: key.clone(), tags });
        Ok(view)
    }

    /// Moves a document to another folder.
    #[instrument(skip_all, fields(kind = %self.kind, key = %key, path = %path))]
    pub fn relocate(&self, who: &Membership, key: &MasterKey, path: &str) -> Result<MasterView, LifecycleError> {
        if self.kind != EntityKind::Document {
            return Err(LifecycleError::validation(format!("{}s have no folder", self.kind)));
        }
        let location = normalize_location(path)?;
        let view = self.table().update(key, |m| {
            let permission = self.require(who, m, Permission::FullAccess)?;
            m.location.clone_from(&location);
            Ok::<_, LifecycleError>(MasterView::new(m.clone(), permission, &who.login))
        })?;

        self.publish(who, EventKind::MasterMoved { key: key.clone(), location });
        Ok(view)
    }

    /// Replaces the ACL; an ACL without entries removes it.
    #[instrument(skip_all, fields(kind = %self.kind, key = %key))]
    pub fn set_acl(&self, who: &Membership, key: &MasterKey, acl: Acl) -> Result<MasterView, LifecycleError> {
        let acl = acl.normalized();
        let removed = acl.is_none();
        let view = self.table().update(key, |m| {
            self.require(who, m, Permission::FullAccess)?;
            m.acl = acl;
            let permission = who.effective(m.acl.as_ref());
            Ok::<_, LifecycleError>(MasterView::new(m.clone(), permission, &who.login))
        })?;

        self.publish(who, EventKind::AclChanged { entity: self.kind, key: key.clone(), removed });
        Ok(view)
    }

    /// Deletes a released, unreferenced master together with its iterations and blobs.
    ///
    /// # Errors
    /// [`LifecycleError::Database`] wrapping a constraint violation when a change item still
    /// references the master; [`LifecycleError::AlreadyCheckedOut`] while checked out.
    #[instrument(skip_all, fields(kind = %self.kind, key = %key, actor = %who.login))]
    pub async fn delete(&self, who: &Membership, key: &MasterKey) -> Result<(), LifecycleError> {
        let removed = {
            let references = self.database.references().write();
            references.ensure_unreferenced(&key.reference(self.kind))?;
            self.table().remove(key, |m| {
                self.require(who, m, Permission::FullAccess)?;
                ensure_released(m, "delete")
            })?
        };

        let blobs = removed.blob_keys();
        let deleted = self.files.delete_all(&blobs).await;
        info!(iterations = removed.iterations.len(), blobs = deleted, "Master deleted");
        self.publish(who, EventKind::MasterDeleted { entity: self.kind, key: key.clone() });
        Ok(())
    }

    /// Stores `data` as `name` on the caller's working iteration `number`, replacing any
    /// file of that name.
    ///
    /// Every upload gets its own blob, so a check-in racing the upload can never freeze a
    /// blob that is later overwritten or cleaned up.
    #[instrument(skip_all, fields(kind = %self.kind, key = %key, iteration = number, name = %name, bytes = data.len()))]
    pub async fn attach_file(
        &self,
        who: &Membership,
        key: &MasterKey,
        number: u32,
        name: &str,
        data: &[u8],
    ) -> Result<BinaryResource, LifecycleError> {
        validate_id(name, "file name")?;
        let mut current = self.load(key)?;
        self.require(who, &current, Permission::FullAccess)?;
        current.working_mut(&who.login, number)?;

        let length = u64::try_from(data.len()).unwrap_or(u64::MAX);
        let resource = BinaryResource::new(self.kind, key, number, &blob_id(), name, length, now_millis());
        self.files.write(&resource.full_name, data).await.context("Writing attachment")?;

        let committed = self.table().update(key, |m| {
            self.require(who, m, Permission::FullAccess)?;
            Ok::<_, LifecycleError>(m.working_mut(&who.login, number)?.files.insert(name.to_owned(), resource.clone()))
        });
        let replaced = match committed {
            Ok(replaced) => replaced,
            Err(err) => {
                self.discard(std::slice::from_ref(&resource.full_name)).await;
                return Err(err);
            }
        };
        if let Some(old) = replaced.filter(|old| old.belongs_to(self.kind, key, number)) {
            self.discard(std::slice::from_ref(&old.full_name)).await;
        }

        self.publish(who, EventKind::FileAttached {
            entity: self.kind,
            key: key.clone(),
            iteration: number,
            name: name.to_owned(),
        });
        Ok(resource)
    }

    /// Reads an attachment of a frozen iteration, or of the caller's working copy.
    pub async fn read_file(
        &self,
        who: &Membership,
        key: &MasterKey,
        number: u32,
        name: &str,
    ) -> Result<(BinaryResource, Vec<u8>), LifecycleError> {
        let master = self.load(key)?;
        self.require(who, &master, Permission::ReadOnly)?;
        let file = master
            .visible_iteration(number, &who.login)
            .ok_or_else(|| LifecycleError::not_found(format!("iteration {number} of {key}")))?
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| LifecycleError::not_found(format!("file '{name}' in {key}#{number}")))?;

        let data = self.files.read(&file.full_name).await.context("Reading attachment")?;
        Ok((file, data))
    }

    /// Drops `name` from the working copy. The blob is deleted only when it was uploaded to
    /// this iteration; inherited blobs still belong to earlier iterations.
    #[instrument(skip_all, fields(kind = %self.kind, key = %key, iteration = number, name = %name))]
    pub async fn remove_file(&self, who: &Membership, key: &MasterKey, number: u32, name: &str) -> Result<(), LifecycleError> {
        let removed = self.table().update(key, |m| {
            self.require(who, m, Permission::FullAccess)?;
            m.working_mut(&who.login, number)?
                .files
                .remove(name)
                .ok_or_else(|| LifecycleError::not_found(format!("file '{name}' in {key}#{number}")))
        })?;

        if removed.belongs_to(self.kind, key, number)
            && let Err(err) = self.files.delete(&removed.full_name).await
        {
            warn!(blob = %removed.full_name, error = %err, "Attachment blob not removed");
        }

        self.publish(who, EventKind::FileRemoved {
            entity: self.kind,
            key: key.clone(),
            iteration: number,
            name: name.to_owned(),
        });
        Ok(())
    }

    /// Follows the links of iteration `number`. Dangling targets are reported, not fatal.
    pub fn resolve_links(&self, who: &Membership, key: &MasterKey, number: u32) -> Result<Vec<LinkResolution>, LifecycleError> {
        let master = self.load(key)?;
        self.require(who, &master, Permission::ReadOnly)?;
        let iteration = master
            .visible_iteration(number, &who.login)
            .ok_or_else(|| LifecycleError::not_found(format!("iteration {number} of {key}")))?;

        Ok(links::resolve(&self.tables, iteration, |target| {
            target.key.workspace_id == who.workspace && who.effective(target.acl.as_ref()).can_read()
        }))
    }

    fn load(&self, key: &MasterKey) -> Result<Master, LifecycleError> {
        self.table().get(key).ok_or_else(|| LifecycleError::NotFound {
            message: key.to_string().into(),
            context: Some(self.kind.collection().into()),
        })
    }

    /// Effective permission of `who` on `master`, failing below `level`. A master of another
    /// workspace is reported as missing.
    fn require(&self, who: &Membership, master: &Master, level: Permission) -> Result<Permission, LifecycleError> {
        if master.key.workspace_id != who.workspace {
            return Err(LifecycleError::NotFound {
                message: master.key.to_string().into(),
                context: Some(self.kind.collection().into()),
            });
        }
        let effective = who.effective(master.acl.as_ref());
        if effective >= level {
            Ok(effective)
        } else {
            let verb = if level.can_write() { "modify" } else { "read" };
            Err(LifecycleError::not_allowed(format!("'{}' may not {verb} {}", who.login, master.key)))
        }
    }

    /// Removes blobs that no iteration references.
    async fn discard(&self, blobs: &[String]) {
        let removed = self.files.delete_all(blobs).await;
        debug!(removed, "Unreferenced attachments discarded");
    }

    fn duplicate(&self, key: &MasterKey) -> LifecycleError {
        LifecycleError::Duplicate {
            message: format!("{} {} already exists", self.kind, key).into(),
            context: None,
        }
    }

    fn publish(&self, who: &Membership, kind: EventKind) {
        if let Err(err) = self.events.publish(PlmEvent::new(who.workspace.as_str(), who.login.as_str(), kind)) {
            warn!(error = %err, "Domain event not published");
        }
    }
}

fn ensure_released(master: &Master, context: &'static str) -> Result<(), LifecycleError> {
    match master.holder() {
        Some(holder) => Err(LifecycleError::AlreadyCheckedOut {
            message: format!("{} is checked out by '{holder}'", master.key).into(),
            context: Some(context.into()),
        }),
        None => Ok(()),
    }
}

fn blob_id() -> String {
    safe_nanoid!()
}
