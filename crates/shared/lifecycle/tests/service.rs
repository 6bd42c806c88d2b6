use plm_database::Database;
use plm_domain::acl::{Acl, Permission};
use plm_domain::config::{MemberConfig, WorkspaceConfig};
use plm_domain::constants::FILES_NAMESPACE;
use plm_domain::content::IterationLink;
use plm_domain::events::{EventKind, PlmEvent};
use plm_domain::keys::{EntityKind, IterationKey, MasterKey, Version};
use plm_event_bus::{EventBus, EventReceiverExt};
use plm_kernel::ApiError;
use plm_kernel::security::{Directory, Membership};
use plm_lifecycle::dto::MasterDto;
use plm_lifecycle::{IterationEdit, LifecycleState, MasterService, NewMaster};
use plm_storage::{NamespacedStorage, Storage};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    database: Database,
    events: EventBus,
    documents: MasterService,
    parts: MasterService,
    directory: Directory,
}

impl Fixture {
    fn who(&self, login: &str) -> Membership {
        self.directory.membership("acme", login).unwrap()
    }

    async fn files(&self) -> NamespacedStorage {
        let storage = Storage::builder().root(self.dir.path()).connect().await.unwrap();
        storage.namespace(FILES_NAMESPACE).unwrap()
    }
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::builder().root(dir.path()).connect().await.unwrap();
    let database = Database::in_memory();
    let events = EventBus::new();

    let mut members: Vec<MemberConfig> = ["alice", "bob"]
        .into_iter()
        .map(|login| MemberConfig { login: login.to_owned(), permission: Permission::FullAccess })
        .collect();
    members.push(MemberConfig { login: "carol".to_owned(), permission: Permission::ReadOnly });
    members.extend((0..16).map(|i| MemberConfig { login: format!("user{i}"), permission: Permission::FullAccess }));

    let directory = Directory::from_config(&[WorkspaceConfig {
        id: "acme".to_owned(),
        admin: "root".to_owned(),
        acl_fallback: Permission::Forbidden,
        members,
        groups: vec![],
    }]);

    Fixture {
        documents: MasterService::new(EntityKind::Document, &database, &storage, events.clone()).unwrap(),
        parts: MasterService::new(EntityKind::Part, &database, &storage, events.clone()).unwrap(),
        dir,
        database,
        events,
        directory,
    }
}

fn draft(id: &str) -> NewMaster {
    NewMaster { id: id.to_owned(), title: format!("{id} title"), ..NewMaster::default() }
}

fn key(segment: &str) -> MasterKey {
    MasterKey::from_segment("acme", segment).unwrap()
}

#[tokio::test]
async fn checkout_checkin_cycle_publishes_events() {
    let fx = fixture().await;
    let mut rx = fx.events.subscribe::<PlmEvent>().unwrap();
    let alice = fx.who("alice");

    let created = fx.documents.create(&alice, draft("SPEC")).unwrap();
    assert_eq!(created.master.key, key("SPEC-A"));
    assert_eq!(created.master.iteration_count(), 1);

    let out = fx.documents.checkout(&alice, &key("SPEC-A")).unwrap();
    assert_eq!(out.master.state(), LifecycleState::CheckedOut);
    let back = fx.documents.checkin(&alice, &key("SPEC-A")).unwrap();
    assert_eq!(back.master.iteration_count(), 2);

    let kinds: Vec<EventKind> = [rx.next_event().await, rx.next_event().await, rx.next_event().await]
        .into_iter()
        .map(|e| e.unwrap().kind.clone())
        .collect();
    assert!(matches!(kinds[0], EventKind::MasterCreated { .. }));
    assert!(matches!(kinds[1], EventKind::CheckedOut { .. }));
    assert!(matches!(kinds[2], EventKind::CheckedIn { iteration: 2, .. }));
}

#[tokio::test]
async fn concurrent_checkouts_have_a_single_winner() {
    let fx = fixture().await;
    fx.documents.create(&fx.who("alice"), draft("RACE")).unwrap();
    let service = Arc::new(fx.documents.clone());
    let target = key("RACE-A");

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let who = fx.who(&format!("user{i}"));
                let service = Arc::clone(&service);
                let target = target.clone();
                scope.spawn(move || service.checkout(&who, &target))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| e.kind() == "AlreadyCheckedOut"));
}

#[tokio::test]
async fn holder_only_operations() {
    let fx = fixture().await;
    let (alice, bob) = (fx.who("alice"), fx.who("bob"));
    fx.documents.create(&alice, draft("SPEC")).unwrap();
    let k = key("SPEC-A");

    assert_eq!(fx.documents.checkin(&alice, &k).unwrap_err().kind(), "NotCheckedOut");
    fx.documents.checkout(&alice, &k).unwrap();

    let err = fx.documents.checkin(&bob, &k).unwrap_err();
    assert_eq!(ApiError::from(err).kind(), "AccessDenied");
    let err = fx.documents.update_iteration(&bob, &k, 2, IterationEdit::default()).unwrap_err();
    assert_eq!(err.kind(), "NotAllowed");
    let err = fx.documents.checkout(&bob, &k).unwrap_err();
    assert_eq!(ApiError::from(err).kind(), "Conflict");
}

#[tokio::test]
async fn working_copy_is_visible_to_its_holder_only() {
    let fx = fixture().await;
    let (alice, bob) = (fx.who("alice"), fx.who("bob"));
    fx.documents.create(&alice, draft("SPEC")).unwrap();
    let k = key("SPEC-A");
    fx.documents.checkout(&alice, &k).unwrap();
    fx.documents.attach_file(&alice, &k, 2, "draft.txt", b"wip").await.unwrap();

    let mine = MasterDto::from(fx.documents.get(&alice, &k).unwrap());
    assert_eq!(mine.working_iteration.unwrap().files.len(), 1);

    let theirs = MasterDto::from(fx.documents.get(&bob, &k).unwrap());
    assert_eq!(theirs.state, LifecycleState::CheckedOut);
    assert_eq!(theirs.check_out_user.as_deref(), Some("alice"));
    assert!(theirs.working_iteration.is_none());

    let err = fx.documents.read_file(&bob, &k, 2, "draft.txt").await.unwrap_err();
    assert_eq!(err.kind(), "NotFound");
    let (_, data) = fx.documents.read_file(&alice, &k, 2, "draft.txt").await.unwrap();
    assert_eq!(data, b"wip");
}

#[tokio::test]
async fn undo_deletes_only_blobs_of_the_working_iteration() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    fx.documents.create(&alice, draft("SPEC")).unwrap();
    let k = key("SPEC-A");

    fx.documents.checkout(&alice, &k).unwrap();
    fx.documents.attach_file(&alice, &k, 2, "base.txt", b"v2").await.unwrap();
    fx.documents.checkin(&alice, &k).unwrap();

    fx.documents.checkout(&alice, &k).unwrap();
    let view = fx.documents.get(&alice, &k).unwrap();
    let inherited = &view.master.checkout.as_ref().unwrap().working.files["base.txt"];
    assert!(inherited.belongs_to(EntityKind::Document, &k, 2));

    fx.documents.attach_file(&alice, &k, 3, "extra.txt", b"v3").await.unwrap();
    fx.documents.remove_file(&alice, &k, 3, "base.txt").await.unwrap();
    let undone = fx.documents.undo_checkout(&alice, &k).await.unwrap();
    assert_eq!(undone.master.iteration_count(), 2);

    let (_, data) = fx.documents.read_file(&alice, &k, 2, "base.txt").await.unwrap();
    assert_eq!(data, b"v2", "inherited blob survives removal and undo");

    fx.documents.checkout(&alice, &k).unwrap();
    let err = fx.documents.read_file(&alice, &k, 3, "extra.txt").await.unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[tokio::test]
async fn new_version_copies_content_and_picks_the_next_label() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    fx.documents.create(&alice, NewMaster { location: "/specs/".into(), ..draft("SPEC") }).unwrap();
    let a = key("SPEC-A");
    fx.documents.save_tags(&alice, &a, ["draft"]).unwrap();

    fx.documents.checkout(&alice, &a).unwrap();
    fx.documents.attach_file(&alice, &a, 2, "drawing.pdf", b"%PDF").await.unwrap();
    fx.documents.checkin(&alice, &a).unwrap();

    let (source, created) = fx.documents.create_version(&alice, &a, Some("Rev B".into()), None).await.unwrap();
    assert_eq!(source.master.key, a);
    assert_eq!(created.master.key, key("SPEC-B"));
    assert_eq!(created.master.title, "Rev B");
    assert_eq!(created.master.location, "specs");
    assert!(created.master.tags.contains("draft"));
    assert_eq!(created.master.iteration_count(), 1);

    let (file, data) = fx.documents.read_file(&alice, &key("SPEC-B"), 1, "drawing.pdf").await.unwrap();
    assert!(file.full_name.starts_with("acme/documents/SPEC/B/1/"));
    assert!(file.full_name.ends_with("/drawing.pdf"));
    assert_eq!(data, b"%PDF");

    let (_, again) = fx.documents.create_version(&alice, &a, None, None).await.unwrap();
    assert_eq!(again.master.key.version, Version::parse("C").unwrap(), "next after the highest version");

    fx.documents.checkout(&alice, &a).unwrap();
    let err = fx.documents.create_version(&alice, &a, None, None).await.unwrap_err();
    assert_eq!(err.kind(), "AlreadyCheckedOut");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn upload_racing_checkin_keeps_the_frozen_iteration_intact() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    let payload = vec![7_u8; 512 * 1024];

    for round in 0..20 {
        let id = format!("RACE{round}");
        fx.documents.create(&alice, draft(&id)).unwrap();
        let k = key(&format!("{id}-A"));
        fx.documents.checkout(&alice, &k).unwrap();
        fx.documents.attach_file(&alice, &k, 2, "a.bin", b"first").await.unwrap();

        let upload = {
            let (service, who, k, payload) = (fx.documents.clone(), alice.clone(), k.clone(), payload.clone());
            tokio::spawn(async move { service.attach_file(&who, &k, 2, "a.bin", &payload).await })
        };
        tokio::task::yield_now().await;
        fx.documents.checkin(&alice, &k).unwrap();
        let uploaded = upload.await.unwrap();

        let (file, data) = fx.documents.read_file(&alice, &k, 2, "a.bin").await.unwrap();
        match uploaded {
            Ok(stored) => {
                assert_eq!(file, stored, "round {round}");
                assert_eq!(data, payload, "round {round}");
            }
            Err(_) => assert_eq!(data, b"first", "round {round}"),
        }
    }
}

#[tokio::test]
async fn replaced_upload_gets_its_own_blob() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    fx.documents.create(&alice, draft("SPEC")).unwrap();
    let k = key("SPEC-A");

    fx.documents.checkout(&alice, &k).unwrap();
    fx.documents.attach_file(&alice, &k, 2, "a.txt", b"v2").await.unwrap();
    fx.documents.checkin(&alice, &k).unwrap();

    fx.documents.checkout(&alice, &k).unwrap();
    let first = fx.documents.attach_file(&alice, &k, 3, "a.txt", b"v3").await.unwrap();
    let second = fx.documents.attach_file(&alice, &k, 3, "a.txt", b"v3 again").await.unwrap();
    assert_ne!(first.full_name, second.full_name);

    let files = fx.files().await;
    assert!(!files.exists(&first.full_name).unwrap(), "superseded blob of the working copy is removed");
    let (_, frozen) = fx.documents.read_file(&alice, &k, 2, "a.txt").await.unwrap();
    assert_eq!(frozen, b"v2");
    let (_, working) = fx.documents.read_file(&alice, &k, 3, "a.txt").await.unwrap();
    assert_eq!(working, b"v3 again");
}

#[tokio::test]
async fn new_version_fails_cleanly_when_a_source_blob_is_gone() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    fx.documents.create(&alice, draft("SPEC")).unwrap();
    let a = key("SPEC-A");

    fx.documents.checkout(&alice, &a).unwrap();
    fx.documents.attach_file(&alice, &a, 2, "kept.txt", b"kept").await.unwrap();
    let lost = fx.documents.attach_file(&alice, &a, 2, "lost.txt", b"lost").await.unwrap();
    fx.documents.checkin(&alice, &a).unwrap();
    fx.files().await.delete(&lost.full_name).await.unwrap();

    let err = fx.documents.create_version(&alice, &a, None, None).await.unwrap_err();
    assert_eq!(err.kind(), "Storage");
    assert_eq!(fx.documents.get(&alice, &key("SPEC-B")).unwrap_err().kind(), "NotFound");
    assert_eq!(fx.documents.list(&alice, |_| true).len(), 1, "no half-copied version is committed");
}

#[tokio::test]
async fn referenced_masters_cannot_be_deleted() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    fx.parts.create(&alice, draft("BOLT")).unwrap();
    let k = key("BOLT-A");

    fx.database.references().write().set("issue:acme/1", [k.reference(EntityKind::Part)]);
    let err = fx.parts.delete(&alice, &k).await.unwrap_err();
    assert_eq!(ApiError::from(err).kind(), "Constraint");
    assert!(fx.parts.get(&alice, &k).is_ok(), "nothing cascaded");

    fx.database.references().write().clear_referrer("issue:acme/1");
    fx.parts.checkout(&alice, &k).unwrap();
    assert_eq!(fx.parts.delete(&alice, &k).await.unwrap_err().kind(), "AlreadyCheckedOut");
    fx.parts.undo_checkout(&alice, &k).await.unwrap();

    fx.parts.delete(&alice, &k).await.unwrap();
    assert_eq!(fx.parts.get(&alice, &k).unwrap_err().kind(), "NotFound");
}

#[tokio::test]
async fn acl_controls_read_and_write() {
    let fx = fixture().await;
    let (alice, bob, carol) = (fx.who("alice"), fx.who("bob"), fx.who("carol"));
    fx.documents.create(&alice, draft("SPEC")).unwrap();
    let k = key("SPEC-A");

    assert!(fx.documents.get(&carol, &k).unwrap().permission == Permission::ReadOnly);
    assert_eq!(fx.documents.checkout(&carol, &k).unwrap_err().kind(), "NotAllowed");
    assert_eq!(fx.documents.create(&carol, draft("OTHER")).unwrap_err().kind(), "NotAllowed");

    let acl = Acl {
        users: BTreeMap::from([("alice".to_owned(), Permission::FullAccess), ("carol".to_owned(), Permission::FullAccess)]),
        groups: BTreeMap::new(),
    };
    let view = fx.documents.set_acl(&alice, &k, acl).unwrap();
    assert!(view.writable());
    assert!(fx.documents.checkout(&carol, &k).is_ok());

    assert_eq!(fx.documents.get(&bob, &k).unwrap_err().kind(), "NotAllowed");
    assert!(fx.documents.list(&bob, |_| true).is_empty());
    assert_eq!(fx.documents.list(&carol, |_| true).len(), 1);

    let removed = fx.documents.set_acl(&alice, &k, Acl::default()).unwrap();
    assert!(removed.master.acl.is_none());
    assert!(fx.documents.get(&bob, &k).is_ok());
}

#[tokio::test]
async fn links_resolve_with_dangling_warnings() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    fx.documents.create(&alice, draft("SPEC")).unwrap();
    fx.parts.create(&alice, draft("BOLT")).unwrap();
    let k = key("SPEC-A");

    fx.documents.checkout(&alice, &k).unwrap();
    let links = vec![
        IterationLink::new(EntityKind::Part, &IterationKey::new(key("BOLT-A"), 1)),
        IterationLink::new(EntityKind::Part, &IterationKey::new(key("BOLT-A"), 5)),
        IterationLink::new(EntityKind::Document, &IterationKey::new(key("GONE-A"), 1)),
    ];
    fx.documents.update_iteration(&alice, &k, 2, IterationEdit { links: Some(links), ..IterationEdit::default() }).unwrap();
    fx.documents.checkin(&alice, &k).unwrap();

    let resolved = fx.documents.resolve_links(&alice, &k, 2).unwrap();
    assert_eq!(resolved.len(), 3);
    assert_eq!(resolved.iter().filter(|r| r.is_dangling()).count(), 2);
}

#[tokio::test]
async fn duplicates_and_folders() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    fx.documents.create(&alice, NewMaster { location: "projects/alpha".into(), ..draft("SPEC") }).unwrap();
    let err = fx.documents.create(&alice, draft("SPEC")).unwrap_err();
    assert_eq!(ApiError::from(err).kind(), "Conflict");

    let k = key("SPEC-A");
    assert_eq!(fx.documents.relocate(&alice, &k, "a//b").unwrap_err().kind(), "Validation");
    fx.documents.relocate(&alice, &k, "/archive").unwrap();
    assert_eq!(fx.documents.list(&alice, |m| m.location == "archive").len(), 1);

    fx.parts.create(&alice, draft("BOLT")).unwrap();
    assert_eq!(fx.parts.relocate(&alice, &key("BOLT-A"), "x").unwrap_err().kind(), "Validation");
}

#[tokio::test]
async fn api_messages_are_not_prefixed_twice() {
    let fx = fixture().await;
    let err = fx.documents.get(&fx.who("alice"), &key("GONE-A")).unwrap_err();
    assert_eq!(ApiError::from(err).to_string(), "Not found (documents): acme/GONE-A");
}
