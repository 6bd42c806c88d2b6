#![cfg(feature = "server")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use plm_database::Database;
use plm_domain::acl::Permission;
use plm_domain::config::{ApiConfig, ApiConfigInner, MemberConfig, WorkspaceConfig};
use plm_event_bus::EventBus;
use plm_kernel::server::ApiState;
use plm_storage::Storage;
use serde_json::{Value, json};
use tower::ServiceExt;

struct App {
    _dir: tempfile::TempDir,
    state: ApiState,
    router: Router,
}

impl App {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = ApiConfig::new(ApiConfigInner {
            workspaces: vec![WorkspaceConfig {
                id: "acme".to_owned(),
                admin: "root".to_owned(),
                members: vec![
                    MemberConfig { login: "alice".to_owned(), permission: Permission::FullAccess },
                    MemberConfig { login: "bob".to_owned(), permission: Permission::FullAccess },
                    MemberConfig { login: "carol".to_owned(), permission: Permission::ReadOnly },
                ],
                ..WorkspaceConfig::default()
            }],
            ..ApiConfigInner::default()
        });
        let storage = Storage::builder().root(dir.path()).connect().await.unwrap();
        let database = Database::in_memory();
        let events = EventBus::new();
        let slice = plm_documents::init(&database, &storage, &events).unwrap();
        let state = ApiState::builder()
            .config(config)
            .db(database)
            .storage(storage)
            .events(events)
            .register_slice(slice)
            .build()
            .unwrap();
        let (router, _) = plm_documents::api::router().split_for_parts();
        Self { _dir: dir, router: router.with_state(state.clone()), state }
    }

    async fn call(&self, login: Option<&str>, method: Method, uri: &str, body: Body) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(login) = login {
            let token = self.state.tokens.issue(login).unwrap();
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = self.router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        (status, to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec())
    }

    async fn json(&self, login: &str, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.state.tokens.issue(login).unwrap()))
            .header(header::CONTENT_TYPE, "application/json");
        let response = self.router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() })
    }
}

const DOCS: &str = "/workspaces/acme/documents";

#[tokio::test]
async fn document_round_trip_over_http() {
    let app = App::new().await;

    let (status, created) = app
        .json("alice", Method::POST, DOCS, Some(json!({ "reference": "SPEC", "title": "Spec", "path": "/specs/" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], "SPEC");
    assert_eq!(created["version"], "A");
    assert_eq!(created["path"], "specs");
    assert_eq!(created["state"], "RELEASED");
    assert_eq!(created["writable"], true);

    let (status, _) = app.json("alice", Method::POST, DOCS, Some(json!({ "reference": "SPEC" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, out) = app.json("alice", Method::PUT, &format!("{DOCS}/SPEC-A/checkout"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["state"], "CHECKED_OUT");
    assert_eq!(out["workingIteration"]["number"], 2);

    let (status, seen) = app.json("bob", Method::GET, &format!("{DOCS}/SPEC-A"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen["checkOutUser"], "alice");
    assert!(seen["workingIteration"].is_null());

    let (status, _) = app.json("bob", Method::PUT, &format!("{DOCS}/SPEC-A/checkout"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call(Some("alice"), Method::PUT, &format!("{DOCS}/SPEC-A/iterations/2/files/drawing.pdf"), Body::from("%PDF-1.7"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let file: Value = serde_json::from_slice(&body).unwrap();
    let full_name = file["fullName"].as_str().unwrap();
    assert!(full_name.starts_with("acme/documents/SPEC/A/2/") && full_name.ends_with("/drawing.pdf"));
    assert_eq!(file["length"], 8);

    let (status, mine) = app.json("alice", Method::GET, &format!("{DOCS}/checkedout"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, back) = app.json("alice", Method::PUT, &format!("{DOCS}/SPEC-A/checkin"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(back["iterations"].as_array().unwrap().len(), 2);

    let (status, data) = app.call(Some("carol"), Method::GET, &format!("{DOCS}/SPEC-A/iterations/2/files/drawing.pdf"), Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data, b"%PDF-1.7");

    let (status, listed) = app.json("carol", Method::GET, &format!("{DOCS}?path=specs"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["writable"], false);

    let (status, versions) = app.json("alice", Method::PUT, &format!("{DOCS}/SPEC-A/newVersion"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(versions[0]["version"], "A");
    assert_eq!(versions[1]["version"], "B");
}

#[tokio::test]
async fn tags_acl_and_notifications() {
    let app = App::new().await;
    app.json("alice", Method::POST, DOCS, Some(json!({ "reference": "SPEC" }))).await;

    let (status, tagged) = app
        .json("alice", Method::PUT, &format!("{DOCS}/SPEC-A/tags"), Some(json!([{ "label": " b " }, { "label": "a" }, { "label": "a" }])))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tagged["tags"], json!(["a", "b"]));

    let (status, subs) = app.json("bob", Method::PUT, &format!("{DOCS}/SPEC-A/notification/stateChange/subscribe"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subs["stateChange"], json!(["bob"]));

    let (status, _) = app.json("bob", Method::PUT, &format!("{DOCS}/SPEC-A/notification/everything/subscribe"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.json("bob", Method::PUT, &format!("{DOCS}/SPEC-A/notification/stateChange/mute"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json("alice", Method::PUT, &format!("{DOCS}/SPEC-A/acl"), Some(json!({ "users": { "alice": "FULL_ACCESS" } })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.json("bob", Method::GET, &format!("{DOCS}/SPEC-A"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, cleared) = app.json("alice", Method::PUT, &format!("{DOCS}/SPEC-A/acl"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cleared["acl"].is_null());
}

#[tokio::test]
async fn callers_must_be_authenticated_members() {
    let app = App::new().await;
    let (status, _) = app.call(None, Method::GET, DOCS, Body::empty()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.json("mallory", Method::GET, DOCS, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "AccessDenied");

    let (status, _) = app.json("alice", Method::GET, &format!("{DOCS}/not-a-key"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.json("carol", Method::POST, DOCS, Some(json!({ "reference": "RO" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
