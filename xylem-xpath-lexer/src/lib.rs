#![warn(missing_docs)]

//! Tokenization for XPath 3.1 expressions.
//!
//! The grammar's keyword operators (`and`, `div`, `eq`, axis names, …)
//! are not reserved words; they surface as [`Token::NCName`] and the
//! parser decides from context. Prefixed QNames are recognized in the
//! lexer because whitespace is not permitted around their colon.

mod lexer;

pub use lexer::{lex, PrefixedQName, Spanned, Token};
