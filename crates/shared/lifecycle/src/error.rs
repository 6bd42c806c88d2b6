use plm_database::DatabaseError;
use plm_domain::keys::KeyError;
use plm_kernel::ApiError;
use plm_kernel::security::SecurityError;
use plm_storage::StorageError;
use std::borrow::Cow;

#[plm_derive::plm_error]
pub enum LifecycleError {
    #[error("Not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Already checked out{}: {message}", format_context(.context))]
    AlreadyCheckedOut { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Not checked out{}: {message}", format_context(.context))]
    NotCheckedOut { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The caller lacks the permission or is not the checkout holder.
    #[error("Not allowed{}: {message}", format_context(.context))]
    NotAllowed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid request{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The master changed between reading and committing.
    #[error("Conflicting change{}: {message}", format_context(.context))]
    Conflict { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Already exists{}: {message}", format_context(.context))]
    Duplicate { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Database failure{}: {source}", format_context(.context))]
    Database { source: DatabaseError, context: Option<Cow<'static, str>> },

    #[error("Storage failure{}: {source}", format_context(.context))]
    Storage { source: StorageError, context: Option<Cow<'static, str>> },

    #[error("Internal lifecycle error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl LifecycleError {
    pub(crate) fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation { message: message.into(), context: None }
    }

    pub(crate) fn not_allowed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::NotAllowed { message: message.into(), context: None }
    }

    pub(crate) fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound { message: message.into(), context: None }
    }
}

impl From<KeyError> for LifecycleError {
    fn from(err: KeyError) -> Self {
        Self::Validation { message: err.to_string().into(), context: None }
    }
}

impl From<SecurityError> for LifecycleError {
    fn from(err: SecurityError) -> Self {
        Self::NotAllowed { message: err.to_string().into(), context: None }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound { message, context } => Self::NotFound { message, context },
            LifecycleError::AlreadyCheckedOut { message, context }
            | LifecycleError::NotCheckedOut { message, context }
            | LifecycleError::Conflict { message, context }
            | LifecycleError::Duplicate { message, context } => Self::Conflict { message, context },
            LifecycleError::NotAllowed { message, context } => Self::AccessDenied { message, context },
            LifecycleError::Validation { message, context } => Self::Validation { message, context },
            LifecycleError::Database { source, .. } => source.into(),
            LifecycleError::Storage { source, .. } => source.into(),
            LifecycleError::Internal { message, context } => Self::Internal { message, context },
        }
    }
}
