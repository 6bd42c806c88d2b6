//! The one error category every business failure ends up in.

use crate::security::SecurityError;
use plm_database::DatabaseError;
use plm_domain::keys::KeyError;
use plm_storage::StorageError;
use std::borrow::Cow;

pub type ApiResult<T> = Result<T, ApiError>;

/// Client-facing failure. The variant name is the `error` field of the HTTP body and the
/// display string its `message`.
#[plm_derive::plm_error]
pub enum ApiError {
    #[error("Validation failed{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unauthorized{}: {message}", format_context(.context))]
    Unauthorized { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Access denied{}: {message}", format_context(.context))]
    AccessDenied { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// State conflicts: already/not checked out, duplicate keys.
    #[error("Conflict{}: {message}", format_context(.context))]
    Conflict { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The entity is still referenced elsewhere.
    #[error("Constraint violation{}: {message}", format_context(.context))]
    Constraint { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl ApiError {
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Validation { message: message.into(), context: None }
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound { message: message.into(), context: None }
    }

    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Conflict { message: message.into(), context: None }
    }

    pub fn access_denied(message: impl Into<Cow<'static, str>>) -> Self {
        Self::AccessDenied { message: message.into(), context: None }
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        Self::Validation { message: err.to_string().into(), context: None }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { message, context } => Self::NotFound { message, context },
            DatabaseError::Duplicate { message, context } => Self::Conflict { message, context },
            DatabaseError::Constraint { message, context } => Self::Constraint { message, context },
            DatabaseError::Internal { message, context } => Self::Internal { message, context },
            other => Self::Internal { message: other.to_string().into(), context: None },
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { message, context } => Self::NotFound { message, context },
            StorageError::PathRejected { message, context } => Self::Validation { message, context },
            other => Self::Internal { message: other.to_string().into(), context: None },
        }
    }
}

impl From<SecurityError> for ApiError {
    fn from(err: SecurityError) -> Self {
        let message = err.to_string().into();
        match err {
            SecurityError::InvalidToken { .. } | SecurityError::MissingToken { .. } => {
                Self::Unauthorized { message, context: None }
            },
            SecurityError::AccessDenied { .. } => Self::AccessDenied { message, context: None },
            SecurityError::InvalidConfiguration { .. } => Self::Internal { message, context: None },
        }
    }
}

#[cfg(feature = "server")]
mod response {
    use super::ApiError;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use serde::Serialize;
    use tracing::{debug, error};

    #[derive(Debug, Serialize)]
    struct ErrorBody<'a> {
        error: &'static str,
        message: &'a str,
    }

    impl ApiError {
        #[must_use]
        pub const fn status(&self) -> StatusCode {
            match self {
                Self::Validation { .. } => StatusCode::BAD_REQUEST,
                Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
                Self::AccessDenied { .. } => StatusCode::FORBIDDEN,
                Self::NotFound { .. } => StatusCode::NOT_FOUND,
                Self::Conflict { .. } | Self::Constraint { .. } => StatusCode::CONFLICT,
                Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let status = self.status();
            let message = self.to_string();
            if status.is_server_error() {
                error!(kind = self.kind(), %message, "Request failed");
            } else {
                debug!(kind = self.kind(), %message, "Request rejected");
            }
            (status, Json(ErrorBody { error: self.kind(), message: &message })).into_response()
        }
    }
}
