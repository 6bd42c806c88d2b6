use plm_domain::acl::Permission;
use plm_domain::config::{ApiConfig, AuditConfig, ServerConfig, StorageConfig};
use plm_domain::features::FeatureSet;
use serde_json::json;

#[test]
fn config_defaults_are_sane() {
    let server = ServerConfig::default();
    assert_eq!(server.port, 4583);
    assert!(server.ssl.is_none());

    let storage = StorageConfig::default();
    assert_eq!(storage.compression, "none");
    assert_eq!(AuditConfig::default().capacity, 1024);

    let cfg = ApiConfig::default();
    assert_eq!(cfg.features.set(), FeatureSet::ALL);
    assert!(!cfg.database.snapshot);
    assert!(cfg.workspaces.is_empty());
}

#[test]
fn api_config_deserializes() {
    let raw = json!({
        "server": { "address": "::", "port": 8080 },
        "storage": { "data_dir": "/tmp/plm", "compression": "lz4" },
        "database": { "snapshot": true },
        "features": ["documents", "change"],
        "workspaces": [{
            "id": "acme",
            "admin": "root",
            "acl_fallback": "READ_ONLY",
            "members": [{ "login": "alice" }, { "login": "bob", "permission": "READ_ONLY" }],
            "groups": [{ "id": "designers", "members": ["alice"] }]
        }]
    });

    let cfg: ApiConfig = serde_json::from_value(raw).expect("config deserialize");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.storage.compression, "lz4");
    assert!(cfg.database.snapshot);
    assert_eq!(cfg.features.set(), FeatureSet::DOCUMENTS | FeatureSet::CHANGE);

    let ws = cfg.workspace("acme").expect("workspace");
    assert_eq!(ws.acl_fallback, Permission::ReadOnly);
    assert_eq!(ws.members[0].permission, Permission::FullAccess);
    assert_eq!(ws.members[1].permission, Permission::ReadOnly);
    assert_eq!(ws.groups[0].members, vec!["alice".to_owned()]);
}

#[test]
fn deref_mut_copies_on_write() {
    let original = ApiConfig::default();
    let mut changed = original.clone();
    changed.server.port = 9000;

    assert_eq!(original.server.port, 4583);
    assert_eq!(changed.server.port, 9000);
}
