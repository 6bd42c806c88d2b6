//! `GET /workspaces/{workspace_id}/audit`, restricted to the workspace administrator.

use crate::{Audit, AuditEntry};
use axum::Json;
use axum::extract::{Path, Query, State};
use plm_derive::{api_handler, api_model};
use plm_domain::constants::AUDIT_TAG;
use plm_kernel::prelude::*;
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Maximum number of entries, newest first (default 100)
    #[serde(default)]
    pub limit: Option<usize>,
}

#[api_model]
pub struct AuditEntryDto {
    pub id: String,
    /// Epoch milliseconds
    pub at: i64,
    pub actor: String,
    /// The event, tagged by `type`
    #[cfg_attr(feature = "server", schema(value_type = Object))]
    pub event: serde_json::Value,
}

impl From<AuditEntry> for AuditEntryDto {
    fn from(entry: AuditEntry) -> Self {
        Self {
            id: entry.id,
            at: entry.at,
            actor: entry.actor,
            event: serde_json::to_value(&entry.event).unwrap_or_default(),
        }
    }
}

#[api_handler(
    get,
    path = "/workspaces/{workspace_id}/audit",
    params(("workspace_id" = String, Path), AuditQuery),
    responses((status = OK, body = Vec<AuditEntryDto>), (status = FORBIDDEN, description = "Caller is not the workspace administrator")),
    tag = AUDIT_TAG,
)]
pub(crate) async fn list_audit(
    State(state): State<ApiState>,
    actor: Actor,
    Path(workspace_id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEntryDto>>> {
    let slice = state.try_get_slice::<Audit>()?;
    state.guard.admin(&workspace_id, actor.login())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Ok(Json(slice.trail.recent(&workspace_id, limit).into_iter().map(AuditEntryDto::from).collect()))
}

pub fn router() -> OpenApiRouter<ApiState> {
    OpenApiRouter::new().routes(routes!(list_audit))
}
