//! # Documents
//!
//! Versioned documents filed in folders. The lifecycle comes from [`plm_lifecycle`]; this
//! slice adds folder listings and per-document notification subscriptions, and exposes
//! both over REST under `/workspaces/{workspace_id}/documents`.

mod error;
mod notifications;
mod service;

#[cfg(feature = "server")]
pub mod api;

pub use error::{DocumentsError, DocumentsErrorExt};
pub use notifications::Subscribers;
pub use service::DocumentService;

use plm_database::Database;
use plm_event_bus::EventBus;
use plm_kernel::domain::keys::EntityKind;
use plm_kernel::domain::registry::InitializedSlice;
use plm_storage::Storage;
use tracing::info;

#[plm_derive::plm_slice]
pub struct Documents {
    pub service: DocumentService,
}

/// Opens the document tables and registers the slice.
///
/// # Errors
/// [`DocumentsError`] when a table or the files namespace cannot be opened.
pub fn init(database: &Database, storage: &Storage, events: &EventBus) -> Result<InitializedSlice, DocumentsError> {
    let service = DocumentService::new(database, storage, events.clone()).context("Documents slice")?;
    let documents = service.masters().tables().of(EntityKind::Document).len();
    info!(documents, "Documents slice initialized");
    Ok(InitializedSlice::new(Documents::new(DocumentsInner { service })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::TypeId;

    #[tokio::test]
    async fn init_registers_the_documents_slice() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::builder().root(dir.path()).connect().await.unwrap();
        let slice = init(&Database::in_memory(), &storage, &EventBus::new()).unwrap();
        assert_eq!(slice.id, TypeId::of::<Documents>());
        assert!(slice.downcast_ref::<Documents>().is_some());
    }
}
