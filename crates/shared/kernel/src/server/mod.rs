//! Axum glue shared by every slice router.

mod actor;
mod health;
mod router;
mod state;

pub use actor::Actor;
pub use router::system_router;
pub use state::{ApiState, ApiStateBuilder, ApiStateError, ApiStateErrorExt, ApiStateInner};
