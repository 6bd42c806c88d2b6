use std::borrow::Cow;

/// Errors raised by [`crate::EventBus`].
#[plm_derive::plm_error]
pub enum EventBusError {
    /// The registry holds a sender of another type under this `TypeId`.
    #[error("Type mismatch{}: {message}", format_context(.context))]
    TypeMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid capacity{}: {message}", format_context(.context))]
    InvalidCapacity { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
