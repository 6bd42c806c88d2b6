use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use plm::domain::acl::Permission;
use plm::domain::config::{
    ApiConfig, ApiConfigInner, DatabaseConfig, FeaturesConfig, MemberConfig, StorageConfig, WorkspaceConfig,
};
use plm_server::Server;
use serde_json::{Value, json};
use std::path::Path;
use tower::ServiceExt;

fn config(data_dir: &Path, features: &[&str]) -> ApiConfig {
    ApiConfig::new(ApiConfigInner {
        storage: StorageConfig { data_dir: data_dir.to_path_buf(), compression: "lz4".to_owned() },
        database: DatabaseConfig { snapshot: true },
        features: FeaturesConfig(features.iter().map(|f| (*f).to_owned()).collect()),
        workspaces: vec![WorkspaceConfig {
            id: "acme".to_owned(),
            admin: "root".to_owned(),
            members: vec![MemberConfig { login: "alice".to_owned(), permission: Permission::FullAccess }],
            ..WorkspaceConfig::default()
        }],
        ..ApiConfigInner::default()
    })
}

async fn call(server: &Server, app: &Router, login: Option<&str>, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(login) = login {
        let token = server.state().tokens.issue(login).unwrap();
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_and_docs_are_public() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::builder().config(config(dir.path(), &["all"])).build().await.unwrap();
    let app = server.app();

    let (status, health) = call(&server, &app, None, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "up");
    assert_eq!(health["slices"], 4);

    let response = app.clone().oneshot(Request::builder().uri("/api").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = call(&server, &app, None, Method::GET, "/workspaces/acme/documents", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn slices_work_together_and_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::builder().config(config(dir.path(), &["all"])).build().await.unwrap();
    let app = server.app();

    let (status, _) =
        call(&server, &app, Some("alice"), Method::POST, "/workspaces/acme/documents", Some(json!({ "reference": "SPEC" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, issue) =
        call(&server, &app, Some("alice"), Method::POST, "/workspaces/acme/issues", Some(json!({ "name": "Typo" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let affected = json!({ "documents": [{ "workspaceId": "acme", "id": "SPEC", "version": "A", "iteration": 1 }] });
    let uri = format!("/workspaces/acme/issues/{}/affected-documents", issue["id"]);
    let (status, _) = call(&server, &app, Some("alice"), Method::PUT, &uri, Some(affected)).await;
    assert_eq!(status, StatusCode::OK);

    server.shutdown().await.unwrap();

    let server = Server::builder().config(config(dir.path(), &["all"])).build().await.unwrap();
    let app = server.app();
    let (status, doc) = call(&server, &app, Some("alice"), Method::GET, "/workspaces/acme/documents/SPEC-A", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["id"], "SPEC");

    // The restored issue still pins the document.
    let (status, body) = call(&server, &app, Some("alice"), Method::DELETE, "/workspaces/acme/documents/SPEC-A", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Constraint");
}

#[tokio::test]
async fn disabled_slices_answer_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::builder().config(config(dir.path(), &["parts"])).build().await.unwrap();
    let app = server.app();

    let (status, _) = call(&server, &app, Some("alice"), Method::GET, "/workspaces/acme/parts", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&server, &app, Some("alice"), Method::GET, "/workspaces/acme/documents", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&server, &app, Some("root"), Method::GET, "/workspaces/acme/audit", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_compression_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), &["all"]);
    cfg.storage.compression = "zstd".to_owned();
    let err = Server::builder().config(cfg).build().await.unwrap_err();
    assert!(err.to_string().contains("zstd"));
}
