//! Utility functions and helpers.

pub mod ident;

// Re-export commonly used types
pub use ident::quote_ident;
