use axum::Router;
use axum::extract::DefaultBodyLimit;
use plm::kernel::prelude::ApiState;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

/// Largest accepted request body; attachments are uploaded in one piece.
const BODY_LIMIT: usize = 64 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(info(title = "PLM Server", description = "Versioned documents, parts and change management"))]
struct ApiDoc;

#[allow(unreachable_pub)]
pub fn init(state: ApiState) -> Router {
    let (routes, api_doc) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(plm::server::router())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .split_for_parts();

    Router::new().merge(routes).merge(Scalar::with_url("/api", api_doc))
}
