use plm_database::DatabaseError;
use plm_kernel::ApiError;
use plm_lifecycle::LifecycleError;
use std::borrow::Cow;

#[plm_derive::plm_error]
pub enum DocumentsError {
    #[error("Document lifecycle{}: {source}", format_context(.context))]
    Lifecycle { source: LifecycleError, context: Option<Cow<'static, str>> },

    #[error("Subscription store{}: {source}", format_context(.context))]
    Database { source: DatabaseError, context: Option<Cow<'static, str>> },

    #[error("Invalid request{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal documents error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl From<DocumentsError> for ApiError {
    fn from(err: DocumentsError) -> Self {
        match err {
            DocumentsError::Lifecycle { source, .. } => source.into(),
            DocumentsError::Database { source, .. } => source.into(),
            DocumentsError::Validation { message, context } => Self::Validation { message, context },
            DocumentsError::Internal { message, context } => Self::Internal { message, context },
        }
    }
}
