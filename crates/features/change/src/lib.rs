//! # Change management
//!
//! Change issues report a problem and name the document and part iterations it affects.
//! Change requests address issues. Both relations are mirrored into the database reference
//! index, so a referenced master or issue cannot be deleted while the relation stands.

pub mod dto;
mod error;
mod issues;
pub mod model;
mod requests;

#[cfg(feature = "server")]
pub mod api;

pub use error::{ChangeError, ChangeErrorExt};
pub use issues::{IssueService, IssueView};
pub use model::{Category, ChangeIssue, ChangeRequest, ItemKey, Priority};
pub use requests::{RequestService, RequestView};

use plm_database::Database;
use plm_event_bus::EventBus;
use plm_kernel::domain::registry::InitializedSlice;
use tracing::info;

#[plm_derive::plm_slice]
pub struct Change {
    pub issues: IssueService,
    pub requests: RequestService,
}

/// Opens the change tables and rebuilds the reference index from stored issues and requests.
///
/// # Errors
/// [`ChangeError::Database`] when a table cannot be opened.
pub fn init(database: &Database, events: &EventBus) -> Result<InitializedSlice, ChangeError> {
    let (issues, requests) = open(database, events)?;
    info!("Change slice initialized");
    Ok(InitializedSlice::new(Change::new(ChangeInner { issues, requests })))
}

/// Rebuilds the reference index without starting the slice, so stored issues and requests
/// keep guarding the masters they name while change management is switched off.
///
/// # Errors
/// [`ChangeError::Database`] when a table cannot be opened.
pub fn restore_references(database: &Database, events: &EventBus) -> Result<(), ChangeError> {
    open(database, events).map(|_| ())
}

fn open(database: &Database, events: &EventBus) -> Result<(IssueService, RequestService), ChangeError> {
    let issues = IssueService::new(database, events.clone())?;
    let requests = RequestService::new(database, issues.table().clone(), events.clone())?;

    database.references().write().clear();
    let issue_count = issues.rebuild_references();
    let request_count = requests.rebuild_references();
    info!(issues = issue_count, requests = request_count, "Reference index rebuilt");
    Ok((issues, requests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::TypeId;

    #[test]
    fn init_registers_the_change_slice() {
        let slice = init(&Database::in_memory(), &EventBus::new()).unwrap();
        assert_eq!(slice.id, TypeId::of::<Change>());
        assert!(slice.downcast_ref::<Change>().is_some());
    }
}
