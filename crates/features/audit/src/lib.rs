//! # Audit
//!
//! Records every domain event published on the bus into a bounded in-memory trail.
//! Workspace administrators read it newest first under `/workspaces/{workspace_id}/audit`.

mod error;
mod trail;

#[cfg(feature = "server")]
pub mod api;

pub use error::{AuditError, AuditErrorExt};
pub use trail::{AuditEntry, AuditTrail};

use plm_domain::config::AuditConfig;
use plm_domain::events::PlmEvent;
use plm_event_bus::{EventBus, EventReceiverExt};
use plm_kernel::domain::registry::InitializedSlice;
use std::sync::Arc;
use tracing::{debug, info};

#[plm_derive::plm_slice]
pub struct Audit {
    pub trail: Arc<AuditTrail>,
}

/// Subscribes the trail to domain events. The recorder task ends when the bus shuts down.
///
/// # Errors
/// [`AuditError::Runtime`] outside a Tokio runtime; [`AuditError::Subscription`] when the
/// bus refuses the subscription.
pub fn init(config: &AuditConfig, events: &EventBus) -> Result<InitializedSlice, AuditError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|err| AuditError::Runtime {
        message: err.to_string().into(),
        context: None,
    })?;
    let mut receiver = events.subscribe::<PlmEvent>().context("Audit recorder")?;
    let trail = Arc::new(AuditTrail::new(config.capacity));

    let recorder = Arc::clone(&trail);
    runtime.spawn(async move {
        while let Some(event) = receiver.next_event().await {
            recorder.record(&event);
        }
        debug!("Audit recorder stopped");
    });

    info!(capacity = trail.capacity(), "Audit slice initialized");
    Ok(InitializedSlice::new(Audit::new(AuditInner { trail })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plm_domain::events::EventKind;
    use std::time::Duration;

    #[test]
    fn init_needs_a_runtime() {
        let err = init(&AuditConfig::default(), &EventBus::new()).unwrap_err();
        assert_eq!(err.kind(), "Runtime");
    }

    #[tokio::test]
    async fn published_events_land_in_the_trail() {
        let events = EventBus::new();
        let slice = init(&AuditConfig { capacity: 8 }, &events).unwrap();
        let audit = slice.downcast_ref::<Audit>().unwrap().clone();

        events.publish(PlmEvent::new("acme", "alice", EventKind::RequestCreated { id: 7 })).unwrap();
        for _ in 0..100 {
            if !audit.trail.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let recent = audit.trail.recent("acme", 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].actor, "alice");
    }
}
