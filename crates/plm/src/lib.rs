//! Facade crate for the PLM server.
//! Re-exports domain and kernel primitives and composes feature slice initialization.
//! Keep this crate thin: it wires other crates together and holds no business logic.
//!
//! ## Usage
//! - Depend on `plm` with the `server` feature.
//! - Call [`init`] to build the slices enabled in `features`, then register them on the
//!   `ApiState` and serve [`server::router`].

use plm_database::Database;
use plm_domain::config::ApiConfig;
use plm_domain::features::FeatureSet;
use plm_domain::registry::InitializedSlice;
use plm_event_bus::EventBus;
use plm_storage::Storage;
use std::borrow::Cow;
use tracing::info;

pub use plm_domain as domain;
pub use plm_kernel as kernel;
pub use plm_lifecycle as lifecycle;

#[cfg(feature = "server")]
pub mod server {
    use plm_kernel::server::ApiState;
    use utoipa_axum::router::OpenApiRouter;

    pub use plm_kernel::server::system_router;

    /// System routes plus every slice router. Routes of a slice disabled at runtime answer 404.
    pub fn router() -> OpenApiRouter<ApiState> {
        system_router()
            .merge(plm_documents::api::router())
            .merge(plm_parts::api::router())
            .merge(plm_change::api::router())
            .merge(plm_audit::api::router())
    }
}

/// Feature slices and their runtime selection.
pub mod features {
    pub use plm_audit as audit;
    pub use plm_change as change;
    pub use plm_documents as documents;
    pub use plm_parts as parts;

    /// Build-time enabled surfaces (by Cargo feature).
    pub const ENABLED: &[&str] = &[
        #[cfg(feature = "server")]
        "server",
        "documents",
        "parts",
        "change",
        "audit",
    ];

    #[must_use]
    pub fn is_enabled(name: &str) -> bool {
        ENABLED.contains(&name)
    }
}

#[plm_derive::plm_error]
pub enum InitError {
    #[error("Documents slice{}: {source}", format_context(.context))]
    Documents { source: features::documents::DocumentsError, context: Option<Cow<'static, str>> },

    #[error("Parts slice{}: {source}", format_context(.context))]
    Parts { source: features::parts::PartsError, context: Option<Cow<'static, str>> },

    #[error("Change slice{}: {source}", format_context(.context))]
    Change { source: features::change::ChangeError, context: Option<Cow<'static, str>> },

    #[error("Audit slice{}: {source}", format_context(.context))]
    Audit { source: features::audit::AuditError, context: Option<Cow<'static, str>> },
}

/// Initializes the slices enabled in `config.features`.
///
/// Must run inside a Tokio runtime when the audit slice is enabled.
///
/// # Errors
/// The first slice that fails to initialize.
pub fn init(
    config: &ApiConfig,
    database: &Database,
    storage: &Storage,
    events: &EventBus,
) -> Result<Vec<InitializedSlice>, InitError> {
    let enabled = config.features.set();
    let mut slices = Vec::new();

    // Audit first so it records events published while the others start.
    if enabled.contains(FeatureSet::AUDIT) {
        slices.push(features::audit::init(&config.audit, events)?);
    }
    if enabled.contains(FeatureSet::DOCUMENTS) {
        slices.push(features::documents::init(database, storage, events)?);
    }
    if enabled.contains(FeatureSet::PARTS) {
        slices.push(features::parts::init(database, storage, events)?);
    }
    if enabled.contains(FeatureSet::CHANGE) {
        slices.push(features::change::init(database, events)?);
    } else {
        features::change::restore_references(database, events)?;
    }

    info!(slices = slices.len(), features = ?enabled, "Feature slices initialized");
    Ok(slices)
}
