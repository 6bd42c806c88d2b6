use plm_change::model::{IssueUpdate, NewIssue, NewRequest};
use plm_change::{Change, Priority};
use plm_database::Database;
use plm_domain::acl::{Acl, Permission};
use plm_domain::config::{MemberConfig, WorkspaceConfig};
use plm_domain::content::IterationLink;
use plm_domain::keys::{EntityKind, IterationKey, MasterKey};
use plm_event_bus::EventBus;
use plm_kernel::ApiError;
use plm_kernel::security::{Directory, Membership};
use plm_lifecycle::{MasterService, NewMaster};
use plm_storage::Storage;
use std::collections::BTreeMap;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    database: Database,
    events: EventBus,
    change: Change,
    documents: MasterService,
    directory: Directory,
}

impl Fixture {
    fn who(&self, login: &str) -> Membership {
        self.directory.membership("acme", login).unwrap()
    }
}

fn change_slice(database: &Database, events: &EventBus) -> Change {
    let slice = plm_change::init(database, events).unwrap();
    slice.downcast_ref::<Change>().unwrap().clone()
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::builder().root(dir.path()).connect().await.unwrap();
    let database = Database::in_memory();
    let events = EventBus::new();
    let directory = Directory::from_config(&[WorkspaceConfig {
        id: "acme".to_owned(),
        admin: "root".to_owned(),
        members: vec![
            MemberConfig { login: "alice".to_owned(), permission: Permission::FullAccess },
            MemberConfig { login: "bob".to_owned(), permission: Permission::FullAccess },
            MemberConfig { login: "carol".to_owned(), permission: Permission::ReadOnly },
        ],
        ..WorkspaceConfig::default()
    }]);

    Fixture {
        change: change_slice(&database, &events),
        documents: MasterService::new(EntityKind::Document, &database, &storage, events.clone()).unwrap(),
        _dir: dir,
        database,
        events,
        directory,
    }
}

fn issue(name: &str) -> NewIssue {
    NewIssue { name: name.to_owned(), priority: Priority::High, ..NewIssue::default() }
}

fn document_link(segment: &str, iteration: u32) -> IterationLink {
    let key = IterationKey::new(MasterKey::from_segment("acme", segment).unwrap(), iteration);
    IterationLink::new(EntityKind::Document, &key)
}

fn is_constraint(err: plm_change::ChangeError) -> bool {
    matches!(ApiError::from(err), ApiError::Constraint { .. })
}

#[tokio::test]
async fn ids_come_from_a_sequence() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    let first = fx.change.issues.create(&alice, issue("first")).unwrap();
    let second = fx.change.issues.create(&alice, issue("second")).unwrap();
    assert_eq!(first.issue.key.id, 1);
    assert_eq!(second.issue.key.id, 2);
    assert!(first.writable());

    let err = fx.change.issues.create(&alice, issue("   ")).unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::Validation { .. }));
    let err = fx.change.issues.create(&fx.who("carol"), issue("read only")).unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::AccessDenied { .. }));
}

#[tokio::test]
async fn affected_master_cannot_be_deleted() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    let spec = MasterKey::from_segment("acme", "SPEC-A").unwrap();
    fx.documents.create(&alice, NewMaster { id: "SPEC".to_owned(), ..NewMaster::default() }).unwrap();
    let id = fx.change.issues.create(&alice, issue("wrong tolerance")).unwrap().issue.key.id;

    let saved = fx.change.issues.set_affected(&alice, id, EntityKind::Document, vec![document_link("SPEC-A", 1)]).unwrap();
    assert_eq!(saved.issue.affected_documents.len(), 1);

    let err = fx.documents.delete(&alice, &spec).await.unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::Constraint { .. }));

    // Clearing the affected items releases the master.
    fx.change.issues.set_affected(&alice, id, EntityKind::Document, vec![]).unwrap();
    fx.documents.delete(&alice, &spec).await.unwrap();
}

#[tokio::test]
async fn affected_items_must_exist() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    let spec = MasterKey::from_segment("acme", "SPEC-A").unwrap();
    fx.documents.create(&alice, NewMaster { id: "SPEC".to_owned(), ..NewMaster::default() }).unwrap();
    fx.documents.checkout(&alice, &spec).unwrap();
    let id = fx.change.issues.create(&alice, issue("missing")).unwrap().issue.key.id;

    // Iteration 2 is only a working copy.
    let err = fx.change.issues.set_affected(&alice, id, EntityKind::Document, vec![document_link("SPEC-A", 2)]).unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::NotFound { .. }));
    let err = fx.change.issues.set_affected(&alice, id, EntityKind::Document, vec![document_link("GONE-A", 1)]).unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::NotFound { .. }));
    let err = fx.change.issues.set_affected(&alice, id, EntityKind::Part, vec![document_link("SPEC-A", 1)]).unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::Validation { .. }));

    assert!(fx.change.issues.get(&alice, id).unwrap().issue.affected_documents.is_empty());
}

#[tokio::test]
async fn addressed_issue_cannot_be_deleted() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    let issue_id = fx.change.issues.create(&alice, issue("crack")).unwrap().issue.key.id;
    let request = fx.change.requests.create(&alice, NewRequest { name: "fix crack".into(), ..NewRequest::default() }).unwrap();
    let request_id = request.request.key.id;

    let err = fx.change.requests.set_addressed(&alice, request_id, vec![issue_id, 99]).unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::NotFound { .. }));
    fx.change.requests.set_addressed(&alice, request_id, vec![issue_id]).unwrap();

    assert!(is_constraint(fx.change.issues.delete(&alice, issue_id).unwrap_err()));
    assert!(fx.change.issues.get(&alice, issue_id).is_ok());

    fx.change.requests.delete(&alice, request_id).unwrap();
    fx.change.issues.delete(&alice, issue_id).unwrap();
    assert!(fx.change.issues.get(&alice, issue_id).is_err());
}

#[tokio::test]
async fn references_survive_a_slice_restart() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    let issue_id = fx.change.issues.create(&alice, issue("crack")).unwrap().issue.key.id;
    let request_id = fx.change.requests.create(&alice, NewRequest { name: "fix".into(), ..NewRequest::default() }).unwrap().request.key.id;
    fx.change.requests.set_addressed(&alice, request_id, vec![issue_id]).unwrap();

    fx.database.references().write().clear();
    let restarted = change_slice(&fx.database, &fx.events);
    assert!(is_constraint(restarted.issues.delete(&alice, issue_id).unwrap_err()));
}

#[tokio::test]
async fn search_is_case_insensitive_and_capped() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    for i in 0..10 {
        fx.change.issues.create(&alice, issue(&format!("Gearbox noise {i}"))).unwrap();
    }
    fx.change.issues.create(&alice, issue("Paint")).unwrap();

    assert_eq!(fx.change.issues.search(&alice, "GEARBOX").len(), 8);
    let paint = fx.change.issues.search(&alice, "pain");
    assert_eq!(paint.len(), 1);
    assert_eq!(paint[0].issue.name, "Paint");
    assert!(fx.change.issues.search(&alice, "wheel").is_empty());
}

#[tokio::test]
async fn tags_update_and_acl() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    let bob = fx.who("bob");
    let id = fx.change.issues.create(&alice, issue("vibration")).unwrap().issue.key.id;

    fx.change.issues.save_tags(&alice, id, ["a", " b ", ""]).unwrap();
    let added = fx.change.issues.add_tags(&alice, id, ["b", "c"]).unwrap();
    assert_eq!(added.issue.tags.iter().map(String::as_str).collect::<Vec<_>>(), ["a", "b", "c"]);
    let removed = fx.change.issues.remove_tag(&alice, id, "a").unwrap();
    assert!(!removed.issue.tags.contains("a"));
    assert!(fx.change.issues.remove_tag(&alice, id, "a").is_err());

    let updated = fx
        .change
        .issues
        .update(&bob, id, IssueUpdate { description: "worse at 3000 rpm".into(), assignee: Some("bob".into()), ..IssueUpdate::default() })
        .unwrap();
    assert_eq!(updated.issue.assignee.as_deref(), Some("bob"));
    assert_eq!(updated.issue.name, "vibration");

    let acl = Acl {
        users: BTreeMap::from([("alice".to_owned(), Permission::FullAccess), ("bob".to_owned(), Permission::ReadOnly)]),
        ..Acl::default()
    };
    fx.change.issues.set_acl(&alice, id, acl).unwrap();
    let seen = fx.change.issues.get(&bob, id).unwrap();
    assert!(!seen.writable());
    assert!(fx.change.issues.save_tags(&bob, id, ["x"]).is_err());
    assert!(fx.change.issues.list(&fx.who("carol")).is_empty());

    let cleared = fx.change.issues.set_acl(&alice, id, Acl::default()).unwrap();
    assert!(cleared.issue.acl.is_none());
    assert_eq!(fx.change.issues.list(&fx.who("carol")).len(), 1);
}

#[tokio::test]
async fn missing_issue_message_reaches_clients_once() {
    let fx = fixture().await;
    let err = fx.change.issues.get(&fx.who("alice"), 99).unwrap_err();
    assert_eq!(ApiError::from(err).to_string(), "Not found: issue acme/99");
}
