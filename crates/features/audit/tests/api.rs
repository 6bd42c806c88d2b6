#![cfg(feature = "server")]

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use plm_database::Database;
use plm_domain::acl::Permission;
use plm_domain::config::{ApiConfig, ApiConfigInner, AuditConfig, MemberConfig, WorkspaceConfig};
use plm_domain::events::{EventKind, PlmEvent};
use plm_event_bus::EventBus;
use plm_kernel::server::ApiState;
use plm_storage::Storage;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

async fn get(state: &ApiState, login: &str, uri: &str) -> (StatusCode, Value) {
    let (router, _) = plm_audit::api::router().split_for_parts();
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", state.tokens.issue(login).unwrap()))
        .body(Body::empty())
        .unwrap();
    let response = router.with_state(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() })
}

#[tokio::test]
async fn admins_read_the_trail_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let config = ApiConfig::new(ApiConfigInner {
        workspaces: vec![WorkspaceConfig {
            id: "acme".to_owned(),
            admin: "root".to_owned(),
            members: vec![MemberConfig { login: "alice".to_owned(), permission: Permission::FullAccess }],
            ..WorkspaceConfig::default()
        }],
        ..ApiConfigInner::default()
    });
    let events = EventBus::new();
    let slice = plm_audit::init(&AuditConfig::default(), &events).unwrap();
    let state = ApiState::builder()
        .config(config)
        .db(Database::in_memory())
        .storage(Storage::builder().root(dir.path()).connect().await.unwrap())
        .events(events.clone())
        .register_slice(slice)
        .build()
        .unwrap();

    for id in 1..=3 {
        events.publish(PlmEvent::new("acme", "alice", EventKind::IssueCreated { id })).unwrap();
    }
    events.publish(PlmEvent::new("globex", "zed", EventKind::IssueDeleted { id: 9 })).unwrap();

    let mut trail = Value::Null;
    for _ in 0..100 {
        let (status, body) = get(&state, "root", "/workspaces/acme/audit?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        if body.as_array().is_some_and(|entries| entries.len() == 2 && entries[0]["event"]["id"] == 3) {
            trail = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(trail[0]["event"]["type"], "issueCreated");
    assert_eq!(trail[1]["event"]["id"], 2);
    assert_eq!(trail[0]["actor"], "alice");

    let (status, _) = get(&state, "alice", "/workspaces/acme/audit").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
