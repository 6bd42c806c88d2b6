//! # Versioned masters
//!
//! The lifecycle shared by documents and parts:
//!
//! * [`model`]: `Master`, `Iteration` and the `RELEASED`/`CHECKED_OUT` transitions.
//! * [`MasterService`]: the transitions run under per-master row locks, with ACL checks,
//!   attachment storage, version creation, link resolution and domain events.
//! * [`dto`]: HTTP bodies reused by both slices.
//!
//! ```text
//!            checkout                 checkin (+1 iteration)
//! RELEASED ───────────▶ CHECKED_OUT ─────────────────────────▶ RELEASED
//!                            │        undo (working copy dropped)
//!                            └───────────────────────────────▶ RELEASED
//! ```

pub mod dto;
mod error;
mod links;
pub mod model;
mod service;
mod tables;

pub use error::{LifecycleError, LifecycleErrorExt};
pub use links::LinkResolution;
pub use model::{Checkout, Iteration, IterationEdit, LifecycleState, Master, NewMaster};
pub use service::{MasterService, MasterView};
pub use tables::MasterTables;
