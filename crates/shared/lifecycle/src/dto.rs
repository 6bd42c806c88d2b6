//! Request and response bodies shared by the document and part routes.

use crate::links::LinkResolution;
use crate::model::{Iteration, IterationEdit, LifecycleState};
use crate::service::MasterView;
use plm_derive::api_model;
use plm_domain::acl::Acl;
use plm_domain::content::{BinaryResource, InstanceAttribute, IterationLink};
use plm_domain::keys::{EntityKind, Version};
use std::collections::BTreeSet;

/// A document or part master as returned to one caller.
#[api_model]
pub struct MasterDto {
    pub workspace_id: String,
    pub id: String,
    pub version: Version,
    pub kind: EntityKind,
    pub title: String,
    pub description: String,
    pub author: String,
    pub created_at: i64,
    /// Folder path (documents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Standard part flag (parts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_part: Option<bool>,
    pub tags: BTreeSet<String>,
    pub acl: Option<Acl>,
    pub state: LifecycleState,
    pub check_out_user: Option<String>,
    pub check_out_date: Option<i64>,
    /// Frozen iterations, oldest first
    pub iterations: Vec<Iteration>,
    /// Pending iteration, present for the checkout holder only
    pub working_iteration: Option<Iteration>,
    /// Whether the caller has full access
    pub writable: bool,
}

impl From<MasterView> for MasterDto {
    fn from(view: MasterView) -> Self {
        let writable = view.writable();
        let holds_checkout = view.holds_checkout;
        let master = view.master;
        let state = master.state();
        let (check_out_user, check_out_date, working_iteration) = match master.checkout {
            Some(checkout) => {
                (Some(checkout.holder), Some(checkout.since), holds_checkout.then_some(checkout.working))
            },
            None => (None, None, None),
        };

        Self {
            workspace_id: master.key.workspace_id,
            id: master.key.id,
            version: master.key.version,
            kind: master.kind,
            title: master.title,
            description: master.description,
            author: master.author,
            created_at: master.created_at,
            path: (master.kind == EntityKind::Document).then_some(master.location),
            standard_part: (master.kind == EntityKind::Part).then_some(master.standard_part),
            tags: master.tags,
            acl: master.acl,
            state,
            check_out_user,
            check_out_date,
            iterations: master.iterations,
            working_iteration,
            writable,
        }
    }
}

/// Body of `newVersion`.
#[api_model]
#[derive(Default)]
pub struct NewVersionRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One tag label.
#[api_model]
#[derive(Clone)]
pub struct TagDto {
    pub label: String,
}

/// Body of `move`.
#[api_model]
pub struct MoveRequest {
    pub path: String,
}

/// Partial update of the working iteration.
#[api_model]
#[derive(Default)]
pub struct UpdateIterationRequest {
    #[serde(default)]
    pub revision_note: Option<String>,
    #[serde(default)]
    pub attributes: Option<Vec<InstanceAttribute>>,
    #[serde(default)]
    pub links: Option<Vec<IterationLink>>,
}

impl From<UpdateIterationRequest> for IterationEdit {
    fn from(req: UpdateIterationRequest) -> Self {
        Self { revision_note: req.revision_note, attributes: req.attributes, links: req.links }
    }
}

/// Result of following the links of one iteration.
#[api_model]
pub struct LinksResponse {
    pub links: Vec<LinkResolution>,
    /// One entry per dangling link
    pub warnings: Vec<String>,
}

impl From<Vec<LinkResolution>> for LinksResponse {
    fn from(links: Vec<LinkResolution>) -> Self {
        let warnings = links
            .iter()
            .filter_map(|resolution| match resolution {
                LinkResolution::Dangling { warning, .. } => Some(warning.clone()),
                LinkResolution::Resolved { .. } => None,
            })
            .collect();
        Self { links, warnings }
    }
}

/// Metadata of a stored attachment.
#[api_model]
pub struct FileDto {
    pub name: String,
    pub full_name: String,
    pub length: u64,
    pub last_modified: i64,
}

impl From<BinaryResource> for FileDto {
    fn from(file: BinaryResource) -> Self {
        Self { name: file.name, full_name: file.full_name, length: file.length, last_modified: file.last_modified }
    }
}
