//! Common imports for slice crates.

pub use crate::error::{ApiError, ApiErrorExt, ApiResult};
pub use crate::security::{AccessGuard, Membership, SecurityError};
#[cfg(feature = "server")]
pub use crate::server::{Actor, ApiState};
pub use crate::{now_millis, safe_nanoid};
pub use plm_domain::acl::{Acl, Permission};
pub use plm_domain::keys::{EntityKind, IterationKey, MasterKey, Version};
