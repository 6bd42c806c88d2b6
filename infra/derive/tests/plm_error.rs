use plm_derive::{api_model, plm_error};
use std::borrow::Cow;

#[plm_error]
enum CatalogError {
    #[error("I/O failure{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("Entity not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

#[api_model]
struct RenameRequest {
    new_title: String,
}

#[api_model(rename_all = "SCREAMING_SNAKE_CASE")]
enum Severity {
    Low,
    VeryHigh,
}

#[test]
fn plm_error_expansions_compile() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/plm_error_pass.rs");
}

#[test]
fn context_is_rendered_in_message() {
    let result: Result<(), CatalogError> =
        Err(CatalogError::NotFound { message: "DOC-1-A".into(), context: None });

    let err = result.context("Loading master").unwrap_err();
    assert_eq!(err.to_string(), "Entity not found (Loading master): DOC-1-A");
    assert_eq!(err.kind(), "NotFound");
}

#[test]
fn source_errors_convert_with_context() {
    let io: Result<(), std::io::Error> =
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));

    let err = io.context("Opening vault").unwrap_err();
    assert!(matches!(err, CatalogError::Io { context: Some(_), .. }));
    assert!(err.to_string().starts_with("I/O failure (Opening vault)"));

    let plain: CatalogError = std::io::Error::other("raw").into();
    assert_eq!(plain.kind(), "Io");
}

#[test]
fn strings_become_internal_errors() {
    let err: CatalogError = String::from("broken invariant").into();
    assert!(matches!(err, CatalogError::Internal { .. }));
    assert_eq!(err.to_string(), "Internal error: broken invariant");
}

#[test]
fn api_model_applies_camel_case_and_strictness() {
    let req: RenameRequest = serde_json::from_str(r#"{"newTitle":"Spec"}"#).unwrap();
    assert_eq!(req.new_title, "Spec");

    assert!(serde_json::from_str::<RenameRequest>(r#"{"newTitle":"x","extra":1}"#).is_err());

    assert_eq!(serde_json::to_string(&Severity::VeryHigh).unwrap(), r#""VERY_HIGH""#);
    assert!(matches!(serde_json::from_str::<Severity>(r#""LOW""#).unwrap(), Severity::Low));
}
