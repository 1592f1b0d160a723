//! Procedural macros for fenlua userdata types.
//!
//! # Macros provided
//!
//! - `#[derive(UserData)]` — implements `fenlua::value::UserData` for a
//!   struct or enum, naming it for Lua's `type(v) == "userdata"` / error
//!   messages. The spec treats userdata as optional/opaque, so this is
//!   the marker-trait-plus-`Any`-downcasting glue only: field access and
//!   method binding (`obj:method(...)`) are left to hand-written
//!   `CFunction`s over `UserdataRef::downcast_ref`/`downcast_mut`, not
//!   generated here.

mod derive_userdata;

use proc_macro::TokenStream;
use syn::parse_macro_input;

/// Derive `fenlua::value::UserData` for a struct or enum.
///
/// # Attributes
/// - `#[lua(name = "...")]` — the name `type_name()` returns (defaults to
///   the Rust type's own identifier).
///
/// # Example
/// ```ignore
/// #[derive(UserData)]
/// #[lua(name = "Point")]
/// struct Point { x: f64, y: f64 }
/// ```
#[proc_macro_derive(UserData, attributes(lua))]
pub fn derive_user_data(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as syn::DeriveInput);
    derive_userdata::derive_user_data_impl(input)
}
