//! The built-in XSD type hierarchy.
//!
//! XPath sequence types, typed atomics, and type annotations on nodes all
//! refer to the built-in schema types. This crate models that hierarchy
//! and nothing else; user-defined schema types are out of scope.

mod xs;

pub use xs::{Whitespace, Xs, XS_NAMESPACE};
