use plm_event_bus::{EventBus, EventBusError, EventReceiverExt};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CheckedIn(u32);

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagsSaved(&'static str);

#[tokio::test]
async fn delivers_to_every_subscriber() {
    let bus = EventBus::new();
    let mut first = bus.subscribe::<CheckedIn>().unwrap();
    let mut second = bus.subscribe::<CheckedIn>().unwrap();
    assert_eq!(bus.subscriber_count::<CheckedIn>(), 2);

    assert_eq!(bus.publish(CheckedIn(2)).unwrap(), 2);

    assert_eq!(*first.next_event().await.unwrap(), CheckedIn(2));
    assert_eq!(*second.next_event().await.unwrap(), CheckedIn(2));
}

#[tokio::test]
async fn event_types_are_isolated() {
    let bus = EventBus::new();
    let mut tags = bus.subscribe::<TagsSaved>().unwrap();
    let _checkins = bus.subscribe::<CheckedIn>().unwrap();

    bus.publish(CheckedIn(1)).unwrap();
    bus.publish(TagsSaved("released")).unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), tags.next_event())
        .await
        .expect("tag event should arrive")
        .unwrap();
    assert_eq!(*received, TagsSaved("released"));
}

#[tokio::test]
async fn publishing_without_subscribers_is_not_an_error() {
    let bus = EventBus::new();
    assert_eq!(bus.publish(CheckedIn(9)).unwrap(), 0);
}

#[tokio::test]
async fn lagging_subscriber_resumes_from_the_tail() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe_with_capacity::<CheckedIn>(2).unwrap();

    for i in 0..50 {
        bus.publish(CheckedIn(i)).unwrap();
    }

    let first = rx.next_event().await.unwrap();
    assert!(first.0 >= 48, "expected the newest events, got {}", first.0);
    let second = rx.next_event().await.unwrap();
    assert_eq!(second.0, first.0 + 1);
}

#[tokio::test]
async fn shutdown_closes_receivers() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe::<CheckedIn>().unwrap();

    assert_eq!(bus.shutdown(), 1);
    assert!(rx.next_event().await.is_none());
}

#[test]
fn zero_capacity_is_rejected() {
    let bus = EventBus::new();
    let err = bus.subscribe_with_capacity::<CheckedIn>(0).unwrap_err();
    assert!(matches!(err, EventBusError::InvalidCapacity { .. }));
}
