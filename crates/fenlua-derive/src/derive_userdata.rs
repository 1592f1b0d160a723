//! `#[derive(UserData)]` — generates `impl fenlua::value::UserData`.
//!
//! Reduced from the teacher's `derive_lua_userdata_impl`: no field-level
//! `get_field`/`set_field` generation, no `#[lua_impl(...)]` metamethod
//! mapping — just the type-name glue a host needs to hand a value to
//! `UserdataRef::new`/`into_userdata`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Meta};

/// Reads `#[lua(name = "...")]` off the item's attributes, if present.
fn lua_name_override(input: &DeriveInput) -> Option<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("lua") {
            continue;
        }
        let mut found = None;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value = meta.value()?;
                let lit: syn::LitStr = value.parse()?;
                found = Some(lit.value());
            }
            Ok(())
        });
        if found.is_some() {
            return found;
        }
        if let Meta::List(_) = &attr.meta {
            // malformed `#[lua(...)]` without `name = "..."`; ignore, the
            // default (type identifier) still applies.
        }
    }
    None
}

pub fn derive_user_data_impl(input: DeriveInput) -> TokenStream {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let type_name = lua_name_override(&input).unwrap_or_else(|| ident.to_string());

    let expanded = quote! {
        impl #impl_generics ::fenlua::value::UserData for #ident #ty_generics #where_clause {
            fn type_name() -> &'static str {
                #type_name
            }
        }
    };

    TokenStream::from(expanded)
}
