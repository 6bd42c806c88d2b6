use plm_database::DatabaseError;
use plm_kernel::ApiError;
use plm_kernel::security::SecurityError;
use std::borrow::Cow;

#[plm_derive::plm_error]
pub enum ChangeError {
    #[error("Not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Not allowed{}: {message}", format_context(.context))]
    NotAllowed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid request{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Change store{}: {source}", format_context(.context))]
    Database { source: DatabaseError, context: Option<Cow<'static, str>> },

    #[error("Internal change error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl ChangeError {
    pub(crate) fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound { message: message.into(), context: None }
    }

    pub(crate) fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation { message: message.into(), context: None }
    }
}

impl From<SecurityError> for ChangeError {
    fn from(err: SecurityError) -> Self {
        Self::NotAllowed { message: err.to_string().into(), context: None }
    }
}

impl From<ChangeError> for ApiError {
    fn from(err: ChangeError) -> Self {
        match err {
            ChangeError::NotFound { message, context } => Self::NotFound { message, context },
            ChangeError::NotAllowed { message, context } => Self::AccessDenied { message, context },
            ChangeError::Validation { message, context } => Self::Validation { message, context },
            ChangeError::Database { source, .. } => source.into(),
            ChangeError::Internal { message, context } => Self::Internal { message, context },
        }
    }
}
