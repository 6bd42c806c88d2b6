//! The versioned master and its checkout state machine.
//!
//! Everything here is pure: transitions mutate a `Master` value and report what changed.
//! Locking, persistence and blob I/O are the service's business.

use crate::error::LifecycleError;
use plm_domain::acl::Acl;
use plm_domain::content::{BinaryResource, InstanceAttribute, IterationLink};
use plm_domain::keys::{EntityKind, MasterKey, validate_id};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Derived lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Released,
    CheckedOut,
}

/// A snapshot of a master's content. Frozen once appended to `Master::iterations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub number: u32,
    pub author: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub revision_note: String,
    #[serde(default)]
    pub attributes: Vec<InstanceAttribute>,
    #[serde(default)]
    pub files: BTreeMap<String, BinaryResource>,
    #[serde(default)]
    pub links: BTreeSet<IterationLink>,
}

impl Iteration {
    #[must_use]
    pub fn initial(author: &str, now: i64) -> Self {
        Self {
            number: 1,
            author: author.to_owned(),
            created_at: now,
            revision_note: String::new(),
            attributes: Vec::new(),
            files: BTreeMap::new(),
            links: BTreeSet::new(),
        }
    }

    /// Copy of `self` as iteration `number`, keeping content and file entries.
    #[must_use]
    pub fn successor(&self, number: u32, author: &str, now: i64) -> Self {
        Self { number, author: author.to_owned(), created_at: now, revision_note: String::new(), ..self.clone() }
    }
}

/// Exclusive edit lock with the pending iteration it guards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    pub holder: String,
    /// Epoch milliseconds.
    pub since: i64,
    pub working: Iteration,
}

/// A document or part master: one `(workspace, id, version)` and its iteration history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Master {
    pub kind: EntityKind,
    pub key: MasterKey,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub author: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Folder path, documents only; empty is the workspace root.
    #[serde(default)]
    pub location: String,
    /// Parts only.
    #[serde(default)]
    pub standard_part: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub acl: Option<Acl>,
    pub iterations: Vec<Iteration>,
    #[serde(default)]
    pub checkout: Option<Checkout>,
}

/// Creation parameters shared by documents and parts.
#[derive(Debug, Clone, Default)]
pub struct NewMaster {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub standard_part: bool,
    pub acl: Option<Acl>,
}

/// Partial edit of a working iteration; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct IterationEdit {
    pub revision_note: Option<String>,
    pub attributes: Option<Vec<InstanceAttribute>>,
    pub links: Option<Vec<IterationLink>>,
}

impl Master {
    /// A released master at version `A` with an empty first iteration.
    #[must_use]
    pub fn new(kind: EntityKind, key: MasterKey, draft: NewMaster, author: &str, now: i64) -> Self {
        Self {
            kind,
            key,
            title: draft.title,
            description: draft.description,
            author: author.to_owned(),
            created_at: now,
            location: draft.location,
            standard_part: draft.standard_part,
            tags: BTreeSet::new(),
            acl: draft.acl.and_then(Acl::normalized),
            iterations: vec![Iteration::initial(author, now)],
            checkout: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        if self.checkout.is_some() { LifecycleState::CheckedOut } else { LifecycleState::Released }
    }

    #[must_use]
    pub fn holder(&self) -> Option<&str> {
        self.checkout.as_ref().map(|c| c.holder.as_str())
    }

    /// Number of frozen iterations.
    #[must_use]
    pub fn iteration_count(&self) -> u32 {
        u32::try_from(self.iterations.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn last_iteration(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    /// Frozen iteration `number`.
    #[must_use]
    pub fn iteration(&self, number: u32) -> Option<&Iteration> {
        let index = usize::try_from(number.checked_sub(1)?).ok()?;
        self.iterations.get(index)
    }

    /// Frozen iteration `number`, or the working copy when `viewer` holds the checkout.
    #[must_use]
    pub fn visible_iteration(&self, number: u32, viewer: &str) -> Option<&Iteration> {
        self.iteration(number).or_else(|| {
            self.checkout.as_ref().filter(|c| c.holder == viewer && c.working.number == number).map(|c| &c.working)
        })
    }

    /// `RELEASED → CHECKED_OUT`. Idempotent for the current holder; returns whether the
    /// state changed.
    ///
    /// # Errors
    /// [`LifecycleError::AlreadyCheckedOut`] when someone else holds the checkout.
    pub fn checkout(&mut self, actor: &str, now: i64) -> Result<bool, LifecycleError> {
        if let Some(current) = &self.checkout {
            if current.holder == actor {
                return Ok(false);
            }
            return Err(LifecycleError::AlreadyCheckedOut {
                message: format!("{} is checked out by '{}'", self.key, current.holder).into(),
                context: None,
            });
        }

        let next = self.iteration_count() + 1;
        let working = match self.last_iteration() {
            Some(last) => last.successor(next, actor, now),
            None => Iteration { number: next, ..Iteration::initial(actor, now) },
        };
        self.checkout = Some(Checkout { holder: actor.to_owned(), since: now, working });
        Ok(true)
    }

    /// `CHECKED_OUT → RELEASED`, freezing the working copy. Returns the new iteration number.
    ///
    /// # Errors
    /// [`LifecycleError::NotCheckedOut`] or [`LifecycleError::NotAllowed`] for another actor.
    pub fn checkin(&mut self, actor: &str) -> Result<u32, LifecycleError> {
        self.held_by(actor)?;
        let Some(checkout) = self.checkout.take() else {
            return Err(self.not_checked_out());
        };
        let number = checkout.working.number;
        self.iterations.push(checkout.working);
        Ok(number)
    }

    /// `CHECKED_OUT → RELEASED`, discarding the working copy, which is returned.
    ///
    /// # Errors
    /// Same as [`Master::checkin`].
    pub fn undo_checkout(&mut self, actor: &str) -> Result<Iteration, LifecycleError> {
        self.held_by(actor)?;
        self.checkout.take().map(|c| c.working).ok_or_else(|| self.not_checked_out())
    }

    /// The working copy, provided `actor` holds it and it is iteration `number`.
    ///
    /// # Errors
    /// [`LifecycleError::NotCheckedOut`], [`LifecycleError::NotAllowed`], or
    /// [`LifecycleError::Validation`] when `number` is not the working iteration.
    pub fn working_mut(&mut self, actor: &str, number: u32) -> Result<&mut Iteration, LifecycleError> {
        self.held_by(actor)?;
        let key = self.key.clone();
        let checkout = self.checkout.as_mut().ok_or_else(|| LifecycleError::NotCheckedOut {
            message: key.to_string().into(),
            context: None,
        })?;
        if checkout.working.number != number {
            return Err(LifecycleError::validation(format!(
                "iteration {number} of {key} is frozen; the working iteration is {}",
                checkout.working.number
            )));
        }
        Ok(&mut checkout.working)
    }

    /// Applies `edit` to the working copy.
    ///
    /// # Errors
    /// Those of [`Master::working_mut`], plus [`LifecycleError::Validation`] for duplicate or
    /// blank attribute names and for invalid or self-referencing links.
    pub fn edit_iteration(&mut self, actor: &str, number: u32, edit: IterationEdit) -> Result<(), LifecycleError> {
        if let Some(attributes) = &edit.attributes {
            validate_attributes(attributes)?;
        }
        if let Some(links) = &edit.links {
            for link in links {
                link.validate()?;
                if link.kind == self.kind && link.master_key() == self.key {
                    return Err(LifecycleError::validation(format!("{link} points at its own master")));
                }
                if link.workspace_id != self.key.workspace_id {
                    return Err(LifecycleError::validation(format!("{link} leaves workspace {}", self.key.workspace_id)));
                }
            }
        }

        let working = self.working_mut(actor, number)?;
        if let Some(note) = edit.revision_note {
            working.revision_note = note;
        }
        if let Some(attributes) = edit.attributes {
            working.attributes = attributes;
        }
        if let Some(links) = edit.links {
            working.links = links.into_iter().collect();
        }
        Ok(())
    }

    /// Replaces the tag set. Returns the stored tags.
    pub fn save_tags<I, S>(&mut self, labels: I) -> &BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(labels);
        &self.tags
    }

    /// Every blob referenced by any iteration or the working copy.
    #[must_use]
    pub fn blob_keys(&self) -> BTreeSet<String> {
        self.iterations
            .iter()
            .chain(self.checkout.as_ref().map(|c| &c.working))
            .flat_map(|it| it.files.values().map(|f| f.full_name.clone()))
            .collect()
    }

    /// Copy without the working iteration unless `viewer` holds the checkout.
    #[must_use]
    pub fn view_for(mut self, viewer: &str) -> Self {
        if let Some(checkout) = &mut self.checkout
            && checkout.holder != viewer
        {
            checkout.working.files.clear();
            checkout.working.attributes.clear();
            checkout.working.links.clear();
            checkout.working.revision_note.clear();
        }
        self
    }

    fn held_by(&self, actor: &str) -> Result<(), LifecycleError> {
        match &self.checkout {
            None => Err(self.not_checked_out()),
            Some(c) if c.holder != actor => Err(LifecycleError::not_allowed(format!(
                "{} is checked out by '{}', not '{actor}'",
                self.key, c.holder
            ))),
            Some(_) => Ok(()),
        }
    }

    fn not_checked_out(&self) -> LifecycleError {
        LifecycleError::NotCheckedOut { message: self.key.to_string().into(), context: None }
    }
}

/// Trimmed, de-duplicated labels without empties.
pub fn normalize_tags<I, S>(labels: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels.into_iter().map(|l| l.as_ref().trim().to_owned()).filter(|l| !l.is_empty()).collect()
}

/// Normalizes a folder path: surrounding slashes dropped, each segment a valid id.
/// The empty path is the workspace root.
///
/// # Errors
/// [`LifecycleError::Validation`] for empty or invalid segments.
pub fn normalize_location(path: &str) -> Result<String, LifecycleError> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    for segment in trimmed.split('/') {
        validate_id(segment, "folder").map_err(|err| LifecycleError::Validation {
            message: err.to_string().into(),
            context: Some(format!("path '{path}'").into()),
        })?;
    }
    Ok(trimmed.to_owned())
}

fn validate_attributes(attributes: &[InstanceAttribute]) -> Result<(), LifecycleError> {
    let mut seen = BTreeSet::new();
    for attribute in attributes {
        let name = attribute.name().trim();
        if name.is_empty() {
            return Err(LifecycleError::validation("attribute names must not be blank"));
        }
        if !seen.insert(name) {
            return Err(LifecycleError::validation(format!("attribute '{name}' is defined twice")));
        }
    }
    Ok(())
}
