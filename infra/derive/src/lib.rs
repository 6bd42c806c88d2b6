#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Attribute macros used across the PLM workspace:
//!
//! * [`plm_error`] wires an error enum into `thiserror` and adds `.context(..)`.
//! * [`plm_slice`] turns a struct into a cheaply cloneable feature slice handle.
//! * [`api_model`] / [`api_handler`] keep DTOs and Axum handlers consistent with `OpenAPI`.
//! * [`main`] boots the tuned Tokio runtime (re-exported as `plm_runtime::main`).
//!
//! Examples are `ignore`d because a proc-macro crate cannot use its own macros in doctests.

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, Item, ItemFn, ItemStruct, parse_macro_input};

/// Turns an `async fn main` into a plain `fn main` running on a preset Tokio runtime.
///
/// Profiles: `high_performance`, `memory_efficient`, `default` (or no argument).
/// The function must return a `Result`.
///
/// ```rust,ignore
/// #[plm_runtime::main(high_performance)]
/// async fn main() -> anyhow::Result<()> {
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    macros::runtime::expand_main(args.into(), input).into()
}

/// Declares a request/response DTO (struct or enum).
///
/// Adds `Debug`, `Serialize` and `Deserialize` when missing, derives `utoipa::ToSchema`
/// under the consumer's `server` feature, and applies `rename_all = "camelCase"`.
/// Structs additionally get `deny_unknown_fields`.
///
/// Arguments: `rename_all = "..."`, `deny_unknown_fields = false`.
///
/// ```rust,ignore
/// #[api_model]
/// pub struct MoveRequest {
///     pub path: String,
/// }
///
/// #[api_model(rename_all = "SCREAMING_SNAKE_CASE")]
/// pub enum LifecycleState { Released, CheckedOut }
/// ```
#[proc_macro_attribute]
pub fn api_model(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as Item);
    macros::api::expand_api_model(attr.into(), input).into()
}

/// Registers an Axum handler with `utoipa::path` when the consumer's `server` feature is on.
///
/// Accepts the usual `utoipa::path` arguments.
///
/// ```rust,ignore
/// #[api_handler(
///     put,
///     path = "/workspaces/{workspace_id}/documents/{key}/checkout",
///     responses((status = OK, body = MasterDto)),
///     tag = DOCUMENTS_TAG,
/// )]
/// pub(crate) async fn checkout(/* extractors */) -> Result<Json<MasterDto>, ApiError> { todo!() }
/// ```
#[proc_macro_attribute]
pub fn api_handler(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    macros::api::expand_api_handler(args.into(), input).into()
}

/// Defines a domain error enum.
///
/// Every variant must use named fields. Variants carrying an upstream error need a
/// `source` field (or a `#[source]`/`#[from]` field) and a
/// `context: Option<Cow<'static, str>>` field.
///
/// Generated items:
///
/// * `#[derive(Debug, thiserror::Error)]` unless already derived.
/// * `<Name>Ext` with `.context(..)` for `Result<T, Name>` and for `Result<T, Source>`.
/// * `From<Source>` for each source-carrying variant.
/// * `From<&'static str>` / `From<String>` when an `Internal` variant exists.
/// * `Name::kind()` returning the variant name, used by the HTTP error body.
/// * A module-private `format_context` helper for `#[error(..)]` strings.
///
/// ```rust,ignore
/// use std::borrow::Cow;
///
/// #[plm_derive::plm_error]
/// pub enum StorageError {
///     #[error("I/O failure{}: {source}", format_context(.context))]
///     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Internal error{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn read() -> Result<Vec<u8>, StorageError> {
///     Ok(std::fs::read("blob").context("Reading blob")?)
/// }
/// ```
#[proc_macro_attribute]
pub fn plm_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(input).into()
}

/// Declares a vertical slice handle.
///
/// The annotated struct becomes `<Name>Inner`; `<Name>` wraps it in an `Arc`, derefs to it,
/// implements `FeatureSlice` and converts into an `InitializedSlice`.
///
/// ```rust,ignore
/// #[plm_derive::plm_slice]
/// pub struct Documents {
///     pub service: MasterService,
/// }
///
/// let slice: InitializedSlice = Documents::new(DocumentsInner { service }).into();
/// ```
#[proc_macro_attribute]
pub fn plm_slice(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(item as ItemStruct);
    macros::slice::expand_slice(input).into()
}
