use std::borrow::Cow;

#[plm_derive::plm_error]
pub enum DatabaseError {
    #[error("Record not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Duplicate record{}: {message}", format_context(.context))]
    Duplicate { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The record is still referenced and cannot be removed.
    #[error("Constraint violation{}: {message}", format_context(.context))]
    Constraint { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A table name was registered twice with different record types.
    #[error("Table type mismatch{}: {message}", format_context(.context))]
    TypeMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Snapshot encoding failed{}: {source}", format_context(.context))]
    Serialization { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[error("Snapshot storage failed{}: {source}", format_context(.context))]
    Storage { source: plm_storage::StorageError, context: Option<Cow<'static, str>> },

    #[error("Internal database error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
