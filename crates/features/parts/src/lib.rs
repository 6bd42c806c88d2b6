//! # Parts
//!
//! Versioned parts served under `/workspaces/{workspace_id}/parts`. Parts share the
//! document lifecycle but have no folders; they carry a standard-part flag instead.

mod error;

#[cfg(feature = "server")]
pub mod api;

pub use error::{PartsError, PartsErrorExt};

use plm_database::Database;
use plm_event_bus::EventBus;
use plm_kernel::domain::keys::EntityKind;
use plm_kernel::domain::registry::InitializedSlice;
use plm_lifecycle::MasterService;
use plm_storage::Storage;
use tracing::info;

#[plm_derive::plm_slice]
pub struct Parts {
    pub service: MasterService,
}

/// # Errors
/// [`PartsError`] when the part table or the files namespace cannot be opened.
pub fn init(database: &Database, storage: &Storage, events: &EventBus) -> Result<InitializedSlice, PartsError> {
    let service = MasterService::new(EntityKind::Part, database, storage, events.clone()).context("Parts slice")?;
    info!(parts = service.tables().of(EntityKind::Part).len(), "Parts slice initialized");
    Ok(InitializedSlice::new(Parts::new(PartsInner { service })))
}
