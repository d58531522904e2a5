//! Derive macros for the wordvm crate.
//!
//! Provides `#[derive(Error)]`, error type boilerplate (thiserror
//! replacement): generates `std::fmt::Display` and `std::error::Error`
//! implementations from `#[error("...")]` variant attributes.

mod error;

use proc_macro::TokenStream;

/// Automatically implements `Display` and `Error` for an error enum.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
