//! REST routes under `/workspaces/{workspace_id}/documents`.

use crate::{DocumentService, Documents, Subscribers};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use plm_derive::{api_handler, api_model};
use plm_domain::constants::DOCUMENTS_TAG;
use plm_domain::events::NotificationKind;
use plm_kernel::prelude::*;
use plm_lifecycle::NewMaster;
use plm_lifecycle::dto::{FileDto, LinksResponse, MasterDto, MoveRequest, NewVersionRequest, TagDto, UpdateIterationRequest};
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

/// Body of `POST /documents`.
#[api_model]
pub struct CreateDocumentRequest {
    /// Document id, unique in the workspace
    pub reference: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Folder, the workspace root when absent
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub acl: Option<Acl>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Folder path, `a/b/c`
    #[serde(default)]
    pub path: Option<String>,
    /// Only documents carrying this tag
    #[serde(default)]
    pub tag: Option<String>,
}

/// Slice, caller membership and parsed key of one request.
fn scope<'a>(
    state: &'a ApiState,
    actor: &Actor,
    workspace_id: &str,
    key: &str,
) -> ApiResult<(&'a DocumentService, Membership, MasterKey)> {
    let slice = state.try_get_slice::<Documents>()?;
    let who = state.guard.member(workspace_id, actor.login())?;
    let key = MasterKey::from_segment(workspace_id, key)?;
    Ok((&slice.service, who, key))
}

fn views(views: Vec<plm_lifecycle::MasterView>) -> Json<Vec<MasterDto>> {
    Json(views.into_iter().map(MasterDto::from).collect())
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/documents",
    params(("workspace_id" = String, Path), ListQuery),
    responses((status = OK, body = Vec<MasterDto>)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn list_documents(
    State(state): State<ApiState>,
    actor: Actor,
    Path(workspace_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<MasterDto>>> {
    let slice = state.try_get_slice::<Documents>()?;
    let who = state.guard.member(&workspace_id, actor.login())?;
    let found = slice.service.list(&who, query.path.as_deref().unwrap_or_default(), query.tag.as_deref())?;
    Ok(views(found))
}

#[api_handler(
    post,
    path = "/workspaces/{workspace_id}/documents",
    params(("workspace_id" = String, Path)),
    request_body = CreateDocumentRequest,
    responses((status = CREATED, body = MasterDto), (status = CONFLICT, description = "Id already used")),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn create_document(
    State(state): State<ApiState>,
    actor: Actor,
    Path(workspace_id): Path<String>,
    Json(req): Json<CreateDocumentRequest>,
) -> ApiResult<impl IntoResponse> {
    let slice = state.try_get_slice::<Documents>()?;
    let who = state.guard.member(&workspace_id, actor.login())?;
    let draft = NewMaster {
        id: req.reference,
        title: req.title,
        description: req.description,
        location: req.path.unwrap_or_default(),
        standard_part: false,
        acl: req.acl.and_then(Acl::normalized),
    };
    let view = slice.service.create(&who, draft)?;
    Ok((StatusCode::CREATED, Json(MasterDto::from(view))))
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/documents/checkedout",
    params(("workspace_id" = String, Path)),
    responses((status = OK, description = "Documents checked out by the caller", body = Vec<MasterDto>)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn checked_out_documents(
    State(state): State<ApiState>,
    actor: Actor,
    Path(workspace_id): Path<String>,
) -> ApiResult<Json<Vec<MasterDto>>> {
    let slice = state.try_get_slice::<Documents>()?;
    let who = state.guard.member(&workspace_id, actor.login())?;
    Ok(views(slice.service.checked_out(&who)))
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/documents/{key}",
    params(("workspace_id" = String, Path), ("key" = String, Path, description = "`{id}-{version}`")),
    responses((status = OK, body = MasterDto), (status = NOT_FOUND, description = "No such document")),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn get_document(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key)): Path<(String, String)>,
) -> ApiResult<Json<MasterDto>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    Ok(Json(service.get(&who, &key)?.into()))
}

#[api_handler(
    delete,
    path = "/workspaces/{workspace_id}/documents/{key}",
    params(("workspace_id" = String, Path), ("key" = String, Path)),
    responses(
        (status = NO_CONTENT, description = "Deleted with all iterations and files"),
        (status = CONFLICT, description = "Checked out or referenced by a change item"),
    ),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn delete_document(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    service.delete(&who, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/checkout",
    params(("workspace_id" = String, Path), ("key" = String, Path)),
    responses((status = OK, body = MasterDto), (status = CONFLICT, description = "Held by another user")),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn checkout(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key)): Path<(String, String)>,
) -> ApiResult<Json<MasterDto>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    Ok(Json(service.checkout(&who, &key)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/checkin",
    params(("workspace_id" = String, Path), ("key" = String, Path)),
    responses((status = OK, body = MasterDto), (status = FORBIDDEN, description = "Caller does not hold the checkout")),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn checkin(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key)): Path<(String, String)>,
) -> ApiResult<Json<MasterDto>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    Ok(Json(service.checkin(&who, &key)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/undocheckout",
    params(("workspace_id" = String, Path), ("key" = String, Path)),
    responses((status = OK, body = MasterDto)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn undo_checkout(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key)): Path<(String, String)>,
) -> ApiResult<Json<MasterDto>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    Ok(Json(service.undo_checkout(&who, &key).await?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/move",
    params(("workspace_id" = String, Path), ("key" = String, Path)),
    request_body = MoveRequest,
    responses((status = OK, body = MasterDto)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn move_document(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key)): Path<(String, String)>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<Json<MasterDto>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    Ok(Json(service.relocate(&who, &key, &req.path)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/newVersion",
    params(("workspace_id" = String, Path), ("key" = String, Path)),
    request_body = NewVersionRequest,
    responses((status = OK, description = "`[source, created]`", body = Vec<MasterDto>)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn new_version(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key)): Path<(String, String)>,
    Json(req): Json<NewVersionRequest>,
) -> ApiResult<Json<Vec<MasterDto>>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    let (source, created) = service.create_version(&who, &key, req.title, req.description).await?;
    Ok(views(vec![source, created]))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/tags",
    params(("workspace_id" = String, Path), ("key" = String, Path)),
    request_body = Vec<TagDto>,
    responses((status = OK, body = MasterDto)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn save_tags(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key)): Path<(String, String)>,
    Json(tags): Json<Vec<TagDto>>,
) -> ApiResult<Json<MasterDto>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    Ok(Json(service.save_tags(&who, &key, tags.iter().map(|t| t.label.as_str()))?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/acl",
    params(("workspace_id" = String, Path), ("key" = String, Path)),
    request_body(content = Acl, description = "Empty user and group maps remove the ACL"),
    responses((status = OK, body = MasterDto)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn set_acl(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key)): Path<(String, String)>,
    Json(acl): Json<Acl>,
) -> ApiResult<Json<MasterDto>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    Ok(Json(service.set_acl(&who, &key, acl)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/iterations/{iteration}",
    params(("workspace_id" = String, Path), ("key" = String, Path), ("iteration" = u32, Path)),
    request_body = UpdateIterationRequest,
    responses((status = OK, body = MasterDto)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn update_iteration(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key, iteration)): Path<(String, String, u32)>,
    Json(req): Json<UpdateIterationRequest>,
) -> ApiResult<Json<MasterDto>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    Ok(Json(service.update_iteration(&who, &key, iteration, req.into())?.into()))
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/documents/{key}/iterations/{iteration}/links",
    params(("workspace_id" = String, Path), ("key" = String, Path), ("iteration" = u32, Path)),
    responses((status = OK, description = "Resolved links and warnings for dangling ones", body = LinksResponse)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn resolve_links(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key, iteration)): Path<(String, String, u32)>,
) -> ApiResult<Json<LinksResponse>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    Ok(Json(service.resolve_links(&who, &key, iteration)?.into()))
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/iterations/{iteration}/files/{name}",
    params(("workspace_id" = String, Path), ("key" = String, Path), ("iteration" = u32, Path), ("name" = String, Path)),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses((status = CREATED, body = FileDto)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn upload_file(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key, iteration, name)): Path<(String, String, u32, String)>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    let file = service.attach_file(&who, &key, iteration, &name, &body).await?;
    Ok((StatusCode::CREATED, Json(FileDto::from(file))))
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/documents/{key}/iterations/{iteration}/files/{name}",
    params(("workspace_id" = String, Path), ("key" = String, Path), ("iteration" = u32, Path), ("name" = String, Path)),
    responses((status = OK, content_type = "application/octet-stream", body = Vec<u8>)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn download_file(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key, iteration, name)): Path<(String, String, u32, String)>,
) -> ApiResult<impl IntoResponse> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    let (file, data) = service.read_file(&who, &key, iteration, &name).await?;
    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file.name)),
    ];
    Ok((headers, data))
}

#[api_handler(
    delete,
    path = "/workspaces/{workspace_id}/documents/{key}/iterations/{iteration}/files/{name}",
    params(("workspace_id" = String, Path), ("key" = String, Path), ("iteration" = u32, Path), ("name" = String, Path)),
    responses((status = NO_CONTENT, description = "Removed from the working copy")),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn remove_file(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key, iteration, name)): Path<(String, String, u32, String)>,
) -> ApiResult<StatusCode> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    service.remove_file(&who, &key, iteration, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[api_handler(
    put,
    path = "/workspaces/{workspace_id}/documents/{key}/notification/{kind}/{action}",
    params(
        ("workspace_id" = String, Path),
        ("key" = String, Path),
        ("kind" = NotificationKind, Path),
        ("action" = String, Path, description = "`subscribe` or `unsubscribe`"),
    ),
    responses((status = OK, description = "Current subscribers", body = Subscribers)),
    tag = DOCUMENTS_TAG,
)]
pub(crate) async fn notification(
    State(state): State<ApiState>,
    actor: Actor,
    Path((workspace_id, key, kind, action)): Path<(String, String, String, String)>,
) -> ApiResult<Json<Subscribers>> {
    let (service, who, key) = scope(&state, &actor, &workspace_id, &key)?;
    let kind: NotificationKind =
        kind.parse().map_err(|_| ApiError::validation(format!("unknown notification '{kind}'")))?;
    let subscribers = match action.as_str() {
        "subscribe" => service.subscribe(&who, &key, kind)?,
        "unsubscribe" => service.unsubscribe(&who, &key, kind)?,
        other => return Err(ApiError::validation(format!("unknown action '{other}'"))),
    };
    Ok(Json(subscribers))
}

pub fn router() -> OpenApiRouter<ApiState> {
    OpenApiRouter::new()
        .routes(routes!(list_documents, create_document))
        .routes(routes!(checked_out_documents))
        .routes(routes!(get_document, delete_document))
        .routes(routes!(checkout))
        .routes(routes!(checkin))
        .routes(routes!(undo_checkout))
        .routes(routes!(move_document))
        .routes(routes!(new_version))
        .routes(routes!(save_tags))
        .routes(routes!(set_acl))
        .routes(routes!(update_iteration))
        .routes(routes!(resolve_links))
        .routes(routes!(upload_file, download_file, remove_file))
        .routes(routes!(notification))
}
