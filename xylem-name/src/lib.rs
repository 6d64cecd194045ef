#![warn(missing_docs)]

//! XML names and namespace scopes for Xylem.

mod name;
mod namespaces;
mod stack;

pub use name::Name;
pub use namespaces::{
    Namespaces, ARRAY_NAMESPACE, FN_NAMESPACE, MAP_NAMESPACE, MATH_NAMESPACE, XMLNS_NAMESPACE,
    XML_NAMESPACE, XSLT_NAMESPACE, XS_NAMESPACE,
};
pub use stack::NamespaceStack;
