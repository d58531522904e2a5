//! Derive macro for error enums.
//!
//! Every variant declares its display message with an `#[error("...")]`
//! attribute. Tuple fields interpolate positionally (`{0}`, `{1}`), named
//! fields by name (`{field}`); every field must appear in the message.
//!
//! ```ignore
//! use wordvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MyError {
//!     #[error("not found: {0}")]
//!     NotFound(String),
//!     #[error("line {line}: {message}")]
//!     Located { line: usize, message: String },
//! }
//! ```

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta, Variant};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Error can only be derived for enums",
        ));
    };

    let name = &input.ident;
    let arms = data
        .variants
        .iter()
        .map(|variant| {
            let ident = &variant.ident;
            let message = error_message(variant)?;

            Ok(match &variant.fields {
                Fields::Unit => quote! {
                    Self::#ident => write!(f, #message),
                },
                Fields::Named(fields) => {
                    let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                    quote! {
                        Self::#ident { #(#names),* } => write!(f, #message, #(#names = #names),*),
                    }
                }
                Fields::Unnamed(fields) => {
                    let binds: Vec<_> = (0..fields.unnamed.len())
                        .map(|i| format_ident!("f{}", i))
                        .collect();
                    let message = positional_to_named(&message, binds.len());
                    quote! {
                        Self::#ident(#(#binds),*) => write!(f, #message, #(#binds = #binds),*),
                    }
                }
            })
        })
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl ::std::fmt::Display for #name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#arms)*
                }
            }
        }

        impl ::std::error::Error for #name {}
    })
}

/// Extracts the string literal from a variant's `#[error("...")]` attribute.
fn error_message(variant: &Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "use #[error(\"message\")] to describe the error",
            ));
        };
        let lit = syn::parse2::<Lit>(list.tokens.clone()).map_err(|_| {
            syn::Error::new_spanned(
                &attr.meta,
                "expected a string literal, e.g. #[error(\"invalid opcode: {0}\")]",
            )
        })?;
        if let Lit::Str(text) = lit {
            return Ok(text.value());
        }
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "the #[error] message must be a string literal",
        ));
    }
    Err(syn::Error::new_spanned(
        &variant.ident,
        "missing #[error(\"...\")] attribute; every variant must declare a display message",
    ))
}

/// Rewrites positional placeholders `{0}`, `{1}`, … to the `{f0}`, `{f1}`
/// bindings the generated match arm introduces.
fn positional_to_named(message: &str, field_count: usize) -> String {
    let mut out = message.to_string();
    for i in (0..field_count).rev() {
        out = out.replace(&format!("{{{i}}}"), &format!("{{f{i}}}"));
    }
    out
}
