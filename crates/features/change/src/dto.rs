//! Request and response bodies of the change routes.

use crate::issues::IssueView;
use crate::model::{Category, IssueUpdate, NewIssue, NewRequest, Priority};
use crate::requests::RequestView;
use plm_derive::api_model;
use plm_domain::acl::Acl;
use plm_domain::content::IterationLink;
use plm_domain::keys::{EntityKind, Version};
use plm_lifecycle::dto::TagDto;
use std::collections::BTreeSet;

#[api_model]
pub struct IssueDto {
    pub id: u64,
    pub workspace_id: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub created_at: i64,
    pub initiator: Option<String>,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub category: Category,
    pub tags: BTreeSet<String>,
    pub acl: Option<Acl>,
    pub affected_documents: Vec<IterationLink>,
    pub affected_parts: Vec<IterationLink>,
    /// Whether the caller has full access
    pub writable: bool,
}

impl From<IssueView> for IssueDto {
    fn from(view: IssueView) -> Self {
        let writable = view.writable();
        let issue = view.issue;
        Self {
            id: issue.key.id,
            workspace_id: issue.key.workspace_id,
            name: issue.name,
            description: issue.description,
            author: issue.author,
            created_at: issue.created_at,
            initiator: issue.initiator,
            priority: issue.priority,
            assignee: issue.assignee,
            category: issue.category,
            tags: issue.tags,
            acl: issue.acl,
            affected_documents: issue.affected_documents.into_iter().collect(),
            affected_parts: issue.affected_parts.into_iter().collect(),
            writable,
        }
    }
}

#[api_model]
pub struct CreateIssueRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub initiator: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub category: Category,
}

impl From<CreateIssueRequest> for NewIssue {
    fn from(req: CreateIssueRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            initiator: req.initiator,
            priority: req.priority,
            assignee: req.assignee,
            category: req.category,
        }
    }
}

#[api_model]
pub struct UpdateIssueRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub category: Category,
}

impl From<UpdateIssueRequest> for IssueUpdate {
    fn from(req: UpdateIssueRequest) -> Self {
        Self { description: req.description, priority: req.priority, assignee: req.assignee, category: req.category }
    }
}

#[api_model]
pub struct TagListRequest {
    pub tags: Vec<TagDto>,
}

impl TagListRequest {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|tag| tag.label.as_str())
    }
}

/// One iteration of a document or part, by key.
#[api_model]
pub struct IterationRef {
    pub workspace_id: String,
    pub id: String,
    pub version: Version,
    pub iteration: u32,
}

impl IterationRef {
    #[must_use]
    pub fn into_link(self, kind: EntityKind) -> IterationLink {
        IterationLink { kind, workspace_id: self.workspace_id, id: self.id, version: self.version, iteration: self.iteration }
    }
}

#[api_model]
pub struct AffectedDocumentsRequest {
    pub documents: Vec<IterationRef>,
}

#[api_model]
pub struct AffectedPartsRequest {
    pub parts: Vec<IterationRef>,
}

#[api_model]
pub struct RequestDto {
    pub id: u64,
    pub workspace_id: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub created_at: i64,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub category: Category,
    pub tags: BTreeSet<String>,
    pub addressed_issues: Vec<u64>,
    pub writable: bool,
}

impl From<RequestView> for RequestDto {
    fn from(view: RequestView) -> Self {
        let writable = view.writable();
        let request = view.request;
        Self {
            id: request.key.id,
            workspace_id: request.key.workspace_id,
            name: request.name,
            description: request.description,
            author: request.author,
            created_at: request.created_at,
            priority: request.priority,
            assignee: request.assignee,
            category: request.category,
            tags: request.tags,
            addressed_issues: request.addressed_issues.into_iter().collect(),
            writable,
        }
    }
}

#[api_model]
pub struct CreateChangeRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub category: Category,
}

impl From<CreateChangeRequest> for NewRequest {
    fn from(req: CreateChangeRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            priority: req.priority,
            assignee: req.assignee,
            category: req.category,
        }
    }
}

#[api_model]
pub struct AddressedIssuesRequest {
    pub issues: Vec<u64>,
}
