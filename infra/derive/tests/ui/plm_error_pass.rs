use plm_derive::plm_error;
use std::borrow::Cow;

#[plm_error]
pub enum DemoError {
    #[error("I/O error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn open() -> Result<(), DemoError> {
    std::fs::read("missing.bin").context("Reading blob")?;
    Ok(())
}

fn main() {
    let _ = open();
    let err: DemoError = "boom".into();
    assert_eq!(err.kind(), "Internal");
}
