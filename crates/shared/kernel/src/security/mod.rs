//! Authentication and authorization.
//!
//! * [`TokenService`] mints and verifies HS256 bearer tokens.
//! * [`Directory`] answers who belongs to which workspace, with which permission and groups.
//! * [`AccessGuard`] resolves a login into a workspace [`Membership`], whose
//!   [`Membership::effective`] applies per-entity ACLs.

mod directory;
mod error;
mod guard;
mod token;

pub use directory::{Directory, Membership};
pub use error::{SecurityError, SecurityErrorExt};
pub use guard::AccessGuard;
pub use token::{Claims, TokenService};
