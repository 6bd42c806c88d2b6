use std::borrow::Cow;

#[plm_derive::plm_error]
pub enum SecurityError {
    #[error("Missing bearer token{}: {message}", format_context(.context))]
    MissingToken { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid token{}: {source}", format_context(.context))]
    InvalidToken { source: jsonwebtoken::errors::Error, context: Option<Cow<'static, str>> },

    #[error("Access denied{}: {message}", format_context(.context))]
    AccessDenied { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid security configuration{}: {message}", format_context(.context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
