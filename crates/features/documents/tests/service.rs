use plm_database::Database;
use plm_documents::DocumentService;
use plm_domain::acl::{Acl, Permission};
use plm_domain::config::{MemberConfig, WorkspaceConfig};
use plm_domain::events::{EventKind, NotificationKind, PlmEvent};
use plm_domain::keys::MasterKey;
use plm_event_bus::EventBus;
use plm_kernel::ApiError;
use plm_kernel::security::{Directory, Membership};
use plm_lifecycle::NewMaster;
use plm_storage::Storage;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

struct Fixture {
    _dir: TempDir,
    events: EventBus,
    documents: DocumentService,
    directory: Directory,
}

impl Fixture {
    fn who(&self, login: &str) -> Membership {
        self.directory.membership("acme", login).unwrap()
    }
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::builder().root(dir.path()).connect().await.unwrap();
    let events = EventBus::new();
    let members = ["alice", "bob", "dave"]
        .into_iter()
        .map(|login| MemberConfig { login: login.to_owned(), permission: Permission::FullAccess })
        .chain([MemberConfig { login: "carol".to_owned(), permission: Permission::ReadOnly }])
        .collect();
    let directory = Directory::from_config(&[WorkspaceConfig {
        id: "acme".to_owned(),
        admin: "root".to_owned(),
        members,
        ..WorkspaceConfig::default()
    }]);

    Fixture {
        documents: DocumentService::new(&Database::in_memory(), &storage, events.clone()).unwrap(),
        _dir: dir,
        events,
        directory,
    }
}

fn filed(id: &str, location: &str) -> NewMaster {
    NewMaster { id: id.to_owned(), location: location.to_owned(), ..NewMaster::default() }
}

fn key(segment: &str) -> MasterKey {
    MasterKey::from_segment("acme", segment).unwrap()
}

/// Recipients of every `SubscribersNotified` event queued so far.
fn notified(rx: &mut Receiver<Arc<PlmEvent>>) -> Vec<(NotificationKind, Vec<String>)> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EventKind::SubscribersNotified { change, recipients, .. } = &event.kind {
            out.push((*change, recipients.clone()));
        }
    }
    out
}

#[tokio::test]
async fn listing_is_per_folder_and_tag() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    fx.documents.create(&alice, filed("ROOT", "")).unwrap();
    fx.documents.create(&alice, filed("DRAW", "/design/mech/")).unwrap();
    fx.documents.create(&alice, filed("NOTE", "design")).unwrap();
    fx.documents.save_tags(&alice, &key("DRAW-A"), ["urgent"]).unwrap();

    let ids = |views: Vec<plm_lifecycle::MasterView>| views.into_iter().map(|v| v.master.key.id).collect::<Vec<_>>();
    assert_eq!(ids(fx.documents.list(&alice, "", None).unwrap()), ["ROOT"]);
    assert_eq!(ids(fx.documents.list(&alice, "design", None).unwrap()), ["NOTE"]);
    assert_eq!(ids(fx.documents.list(&alice, "design/mech", Some("urgent")).unwrap()), ["DRAW"]);
    assert!(fx.documents.list(&alice, "design/mech", Some("later")).unwrap().is_empty());
    assert!(fx.documents.list(&alice, "../etc", None).is_err());
}

#[tokio::test]
async fn moving_changes_the_listing_folder() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    fx.documents.create(&alice, filed("SPEC", "inbox")).unwrap();
    let moved = fx.documents.relocate(&alice, &key("SPEC-A"), "/archive/2026/").unwrap();
    assert_eq!(moved.master.location, "archive/2026");
    assert!(fx.documents.list(&alice, "inbox", None).unwrap().is_empty());
    assert_eq!(fx.documents.list(&alice, "archive/2026", None).unwrap().len(), 1);
}

#[tokio::test]
async fn subscribers_are_notified_except_the_actor() {
    let fx = fixture().await;
    let mut rx = fx.events.subscribe::<PlmEvent>().unwrap();
    let alice = fx.who("alice");
    let spec = key("SPEC-A");
    fx.documents.create(&alice, filed("SPEC", "")).unwrap();

    fx.documents.subscribe(&fx.who("bob"), &spec, NotificationKind::StateChange).unwrap();
    fx.documents.subscribe(&fx.who("carol"), &spec, NotificationKind::IterationChange).unwrap();
    let subs = fx.documents.subscribe(&alice, &spec, NotificationKind::StateChange).unwrap();
    assert_eq!(subs.state_change.len(), 2);
    notified(&mut rx);

    fx.documents.checkout(&alice, &spec).unwrap();
    assert_eq!(notified(&mut rx), vec![(NotificationKind::StateChange, vec!["bob".to_owned()])]);

    // Repeating the checkout changes nothing and notifies nobody.
    fx.documents.checkout(&alice, &spec).unwrap();
    assert!(notified(&mut rx).is_empty());

    fx.documents.checkin(&alice, &spec).unwrap();
    assert_eq!(notified(&mut rx), vec![
        (NotificationKind::StateChange, vec!["bob".to_owned()]),
        (NotificationKind::IterationChange, vec!["carol".to_owned()]),
    ]);

    let bob = fx.who("bob");
    fx.documents.checkout(&bob, &spec).unwrap();
    fx.documents.undo_checkout(&bob, &spec).await.unwrap();
    assert_eq!(notified(&mut rx), vec![
        (NotificationKind::StateChange, vec!["alice".to_owned()]),
        (NotificationKind::StateChange, vec!["alice".to_owned()]),
    ]);

    fx.documents.unsubscribe(&alice, &spec, NotificationKind::StateChange).unwrap();
    fx.documents.checkout(&bob, &spec).unwrap();
    assert!(notified(&mut rx).is_empty());
}

#[tokio::test]
async fn subscribing_needs_read_access() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    let acl = Acl { users: BTreeMap::from([("alice".to_owned(), Permission::FullAccess)]), ..Acl::default() };
    fx.documents.create(&alice, NewMaster { id: "SECRET".to_owned(), acl: Some(acl), ..NewMaster::default() }).unwrap();

    let err = fx.documents.subscribe(&fx.who("dave"), &key("SECRET-A"), NotificationKind::StateChange).unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::AccessDenied { .. }));
}

#[tokio::test]
async fn deleting_drops_subscriptions() {
    let fx = fixture().await;
    let alice = fx.who("alice");
    let spec = key("SPEC-A");
    fx.documents.create(&alice, filed("SPEC", "")).unwrap();
    fx.documents.subscribe(&fx.who("bob"), &spec, NotificationKind::StateChange).unwrap();
    fx.documents.delete(&alice, &spec).await.unwrap();

    // Re-creating the id starts without the old subscribers.
    fx.documents.create(&alice, filed("SPEC", "")).unwrap();
    let subs = fx.documents.subscribe(&alice, &spec, NotificationKind::IterationChange).unwrap();
    assert!(subs.state_change.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subscribing_while_the_document_is_deleted_leaves_nothing_behind() {
    let fx = fixture().await;
    let (alice, bob) = (fx.who("alice"), fx.who("bob"));

    for round in 0..30 {
        let spec = key(&format!("RACE{round}-A"));
        fx.documents.create(&alice, filed(&format!("RACE{round}"), "")).unwrap();

        let subscribing = {
            let (documents, bob, spec) = (fx.documents.clone(), bob.clone(), spec.clone());
            tokio::task::spawn_blocking(move || documents.subscribe(&bob, &spec, NotificationKind::StateChange))
        };
        fx.documents.delete(&alice, &spec).await.unwrap();
        let _ = subscribing.await.unwrap();

        fx.documents.create(&alice, filed(&format!("RACE{round}"), "")).unwrap();
        let subs = fx.documents.subscribe(&alice, &spec, NotificationKind::IterationChange).unwrap();
        assert!(subs.state_change.is_empty(), "round {round}: {subs:?}");
    }
}
