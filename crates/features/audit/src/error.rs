use plm_event_bus::EventBusError;
use plm_kernel::ApiError;
use std::borrow::Cow;

#[plm_derive::plm_error]
pub enum AuditError {
    #[error("Audit subscription{}: {source}", format_context(.context))]
    Subscription { source: EventBusError, context: Option<Cow<'static, str>> },

    #[error("Audit slice needs a Tokio runtime{}: {message}", format_context(.context))]
    Runtime { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal audit error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        Self::Internal { message: err.to_string().into(), context: None }
    }
}
