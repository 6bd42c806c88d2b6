//! # Domain Models
//!
//! Plain PLM data: master keys and revision labels, ACLs, iteration content, domain events,
//! configuration and the slice registry. No I/O and no locking here; state transitions live
//! in `plm-lifecycle`.

pub mod acl;
pub mod config;
pub mod constants;
pub mod content;
pub mod events;
pub mod features;
pub mod keys;
pub mod registry;
