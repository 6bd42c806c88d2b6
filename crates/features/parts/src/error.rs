use plm_kernel::ApiError;
use plm_lifecycle::LifecycleError;
use std::borrow::Cow;

#[plm_derive::plm_error]
pub enum PartsError {
    #[error("Part lifecycle{}: {source}", format_context(.context))]
    Lifecycle { source: LifecycleError, context: Option<Cow<'static, str>> },

    #[error("Internal parts error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl From<PartsError> for ApiError {
    fn from(err: PartsError) -> Self {
        match err {
            PartsError::Lifecycle { source, .. } => source.into(),
            PartsError::Internal { message, context } => Self::Internal { message, context },
        }
    }
}
