//! REST routes under `/workspaces/{workspace_id}/issues` and `/requests`.

use crate::Change;
use crate::dto::{
    AddressedIssuesRequest, AffectedDocumentsRequest, AffectedPartsRequest, CreateChangeRequest, CreateIssueRequest,
    IssueDto, RequestDto, TagListRequest, UpdateIssueRequest,
};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use plm_derive::api_handler;
use plm_domain::constants::{ISSUES_TAG, REQUESTS_TAG};
use plm_kernel::prelude::*;
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Case-insensitive part of the issue name
    #[serde(default)]
    pub q: String,
}

fn scope<'a>(state: &'a ApiState, actor: &Actor, workspace_id: &str) -> ApiResult<(&'a Change, Membership)> {
    let slice = state.try_get_slice::<Change>()?;
    let who = state.guard.member(workspace_id, actor.login())?;
    Ok((slice, who))
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/issues",
    params(("workspace_id" = String, Path)),
    responses((status = OK, body = Vec<IssueDto>)),
    tag = ISSUES_TAG,
)]
pub(crate) async fn list_issues(
    State(state): State<ApiState>,
    actor: Actor,
    Path(workspace_id): Path<String>,
) -> ApiResult<Json<Vec<IssueDto>>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.issues.list(&who).into_iter().map(IssueDto::from).collect()))
}

#[api_handler(
    post,
    path = "/workspaces/{workspace_id}/issues",
    params(("workspace_id" = String, Path)),
    request_body = CreateIssueRequest,
    responses((status = CREATED, body = IssueDto)),
    tag = ISSUES_TAG,
)]
pub(crate) async fn create_issue(
    State(state): State<ApiState>,
    actor: Actor,
    Path(workspace_id): Path<String>,
    Json(req): Json<CreateIssueRequest>,
) -> ApiResult<impl IntoResponse> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    let view = change.issues.create(&who, req.into())?;
    Ok((StatusCode::CREATED, Json(IssueDto::from(view))))
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/issues/link",
    params(("workspace_id" = String, Path), SearchQuery),
    responses((status = OK, description = "At most eight matches", body = Vec<IssueDto>)),
    tag = ISSUES_TAG,
)]
pub(crate) async fn search_issues(
    State(state): State<ApiState>,
    actor: Actor,
    Path(workspace_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<IssueDto>>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.issues.search(&who, &query.q).into_iter().map(IssueDto::from).collect()))
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/issues/{issue_id}",
    params(("workspace_id" = String, Path), ("issue_id" = u64, Path)),
    responses((status = OK, body = IssueDto), (status = NOT_FOUND, description = "No such issue")),
    tag = ISSUES_TAG,
)]
pub(crate) async fn get_issue(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, issue_id)): Path<(String, u64)>,
) -> ApiResult<Json<IssueDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.issues.get(&who, issue_id)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/issues/{issue_id}",
    params(("workspace_id" = String, Path), ("issue_id" = u64, Path)),
    request_body = UpdateIssueRequest,
    responses((status = OK, body = IssueDto)),
    tag = ISSUES_TAG,
)]
pub(crate) async fn update_issue(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, issue_id)): Path<(String, u64)>,
    Json(req): Json<UpdateIssueRequest>,
) -> ApiResult<Json<IssueDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.issues.update(&who, issue_id, req.into())?.into()))
}

#[api_handler(
    delete,
    path = "/workspaces/{workspace_id}/issues/{issue_id}",
    params(("workspace_id" = String, Path), ("issue_id" = u64, Path)),
    responses(
        (status = NO_CONTENT, description = "Deleted"),
        (status = CONFLICT, description = "Addressed by a change request"),
    ),
    tag = ISSUES_TAG,
)]
pub(crate) async fn delete_issue(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, issue_id)): Path<(String, u64)>,
) -> ApiResult<StatusCode> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    change.issues.delete(&who, issue_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/issues/{issue_id}/tags",
    params(("workspace_id" = String, Path), ("issue_id" = u64, Path)),
    request_body = TagListRequest,
    responses((status = OK, body = IssueDto)),
    tag = ISSUES_TAG,
)]
pub(crate) async fn save_issue_tags(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, issue_id)): Path<(String, u64)>,
    Json(req): Json<TagListRequest>,
) -> ApiResult<Json<IssueDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.issues.save_tags(&who, issue_id, req.labels())?.into()))
}

#[api_handler(
    post,
    path = "/workspaces/{workspace_id}/issues/{issue_id}/tags",
    params(("workspace_id" = String, Path), ("issue_id" = u64, Path)),
    request_body = TagListRequest,
    responses((status = OK, description = "Tags added to the existing ones", body = IssueDto)),
    tag = ISSUES_TAG,
)]
pub(crate) async fn add_issue_tags(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, issue_id)): Path<(String, u64)>,
    Json(req): Json<TagListRequest>,
) -> ApiResult<Json<IssueDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.issues.add_tags(&who, issue_id, req.labels())?.into()))
}

#[api_handler(
    delete,
    path = "/workspaces/{workspace_id}/issues/{issue_id}/tags/{tag}",
    params(("workspace_id" = String, Path), ("issue_id" = u64, Path), ("tag" = String, Path)),
    responses((status = OK, body = IssueDto), (status = NOT_FOUND, description = "Tag not on the issue")),
    tag = ISSUES_TAG,
)]
pub(crate) async fn remove_issue_tag(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, issue_id, tag)): Path<(String, u64, String)>,
) -> ApiResult<Json<IssueDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.issues.remove_tag(&who, issue_id, &tag)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/issues/{issue_id}/affected-documents",
    params(("workspace_id" = String, Path), ("issue_id" = u64, Path)),
    request_body = AffectedDocumentsRequest,
    responses((status = OK, body = IssueDto), (status = NOT_FOUND, description = "A document iteration does not exist")),
    tag = ISSUES_TAG,
)]
pub(crate) async fn save_affected_documents(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, issue_id)): Path<(String, u64)>,
    Json(req): Json<AffectedDocumentsRequest>,
) -> ApiResult<Json<IssueDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    let links = req.documents.into_iter().map(|r| r.into_link(EntityKind::Document)).collect();
    Ok(Json(change.issues.set_affected(&who, issue_id, EntityKind::Document, links)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/issues/{issue_id}/affected-parts",
    params(("workspace_id" = String, Path), ("issue_id" = u64, Path)),
    request_body = AffectedPartsRequest,
    responses((status = OK, body = IssueDto), (status = NOT_FOUND, description = "A part iteration does not exist")),
    tag = ISSUES_TAG,
)]
pub(crate) async fn save_affected_parts(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, issue_id)): Path<(String, u64)>,
    Json(req): Json<AffectedPartsRequest>,
) -> ApiResult<Json<IssueDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    let links = req.parts.into_iter().map(|r| r.into_link(EntityKind::Part)).collect();
    Ok(Json(change.issues.set_affected(&who, issue_id, EntityKind::Part, links)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/issues/{issue_id}/acl",
    params(("workspace_id" = String, Path), ("issue_id" = u64, Path)),
    request_body(content = Acl, description = "Empty user and group maps remove the ACL"),
    responses((status = OK, body = IssueDto)),
    tag = ISSUES_TAG,
)]
pub(crate) async fn set_issue_acl(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, issue_id)): Path<(String, u64)>,
    Json(acl): Json<Acl>,
) -> ApiResult<Json<IssueDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.issues.set_acl(&who, issue_id, acl)?.into()))
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/requests",
    params(("workspace_id" = String, Path)),
    responses((status = OK, body = Vec<RequestDto>)),
    tag = REQUESTS_TAG,
)]
pub(crate) async fn list_requests(
    State(state): State<ApiState>,
    actor: Actor,
    Path(workspace_id): Path<String>,
) -> ApiResult<Json<Vec<RequestDto>>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.requests.list(&who).into_iter().map(RequestDto::from).collect()))
}

#[api_handler(
    post,
    path = "/workspaces/{workspace_id}/requests",
    params(("workspace_id" = String, Path)),
    request_body = CreateChangeRequest,
    responses((status = CREATED, body = RequestDto)),
    tag = REQUESTS_TAG,
)]
pub(crate) async fn create_request(
    State(state): State<ApiState>,
    actor: Actor,
    Path(workspace_id): Path<String>,
    Json(req): Json<CreateChangeRequest>,
) -> ApiResult<impl IntoResponse> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    let view = change.requests.create(&who, req.into())?;
    Ok((StatusCode::CREATED, Json(RequestDto::from(view))))
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/requests/{request_id}",
    params(("workspace_id" = String, Path), ("request_id" = u64, Path)),
    responses((status = OK, body = RequestDto)),
    tag = REQUESTS_TAG,
)]
pub(crate) async fn get_request(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, request_id)): Path<(String, u64)>,
) -> ApiResult<Json<RequestDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.requests.get(&who, request_id)?.into()))
}

#[api_handler(
    delete,
    path = "/workspaces/{workspace_id}/requests/{request_id}",
    params(("workspace_id" = String, Path), ("request_id" = u64, Path)),
    responses((status = NO_CONTENT, description = "Deleted; addressed issues become deletable")),
    tag = REQUESTS_TAG,
)]
pub(crate) async fn delete_request(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, request_id)): Path<(String, u64)>,
) -> ApiResult<StatusCode> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    change.requests.delete(&who, request_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/requests/{request_id}/addressed-issues",
    params(("workspace_id" = String, Path), ("request_id" = u64, Path)),
    request_body = AddressedIssuesRequest,
    responses((status = OK, body = RequestDto), (status = NOT_FOUND, description = "An issue does not exist")),
    tag = REQUESTS_TAG,
)]
pub(crate) async fn save_addressed_issues(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, request_id)): Path<(String, u64)>,
    Json(req): Json<AddressedIssuesRequest>,
) -> ApiResult<Json<RequestDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.requests.set_addressed(&who, request_id, req.issues)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/requests/{request_id}/tags",
    params(("workspace_id" = String, Path), ("request_id" = u64, Path)),
    request_body = TagListRequest,
    responses((status = OK, body = RequestDto)),
    tag = REQUESTS_TAG,
)]
pub(crate) async fn save_request_tags(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, request_id)): Path<(String, u64)>,
    Json(req): Json<TagListRequest>,
) -> ApiResult<Json<RequestDto>> {
    let (change, who) = scope(&state, &actor, &workspace_id)?;
    Ok(Json(change.requests.save_tags(&who, request_id, req.labels())?.into()))
}

pub fn router() -> OpenApiRouter<ApiState> {
    OpenApiRouter::new()
        .routes(routes!(list_issues, create_issue))
        .routes(routes!(search_issues))
        .routes(routes!(get_issue, update_issue, delete_issue))
        .routes(routes!(save_issue_tags, add_issue_tags))
        .routes(routes!(remove_issue_tag))
        .routes(routes!(save_affected_documents))
        .routes(routes!(save_affected_parts))
        .routes(routes!(set_issue_acl))
        .routes(routes!(list_requests, create_request))
        .routes(routes!(get_request, delete_request))
        .routes(routes!(save_addressed_issues))
        .routes(routes!(save_request_tags))
}
