#![warn(missing_docs)]

//! Push-driven, non-blocking XML parsing and serialization.
//!
//! The parser never pulls from an input source: the caller hands it byte
//! chunks with [`PushParser::feed`] and the parser emits every event
//! derivable from what it has seen, restartable at any byte boundary.
//! Character encoding is auto-detected from the BOM, the `<?xml`
//! signature, or the declaration. The serializer ([`XmlWriter`]) is the
//! inverse: a handler that renders events back to bytes.

pub mod chars;
mod dtd;
mod encoding;
mod error;
mod event;
mod handler;
mod parser;
mod tokenizer;
mod writer;

pub use error::{Diagnostic, Result, SaxError};
pub use event::{Event, EventBuffer, EventRecorder};
pub use handler::{
    Attribute, AttributeType, Attributes, ContentHandler, ContentHandlerRef, DeclHandler,
    DeclHandlerRef, DtdHandler, DtdHandlerRef, EntityResolver, EntityResolverRef, ErrorHandler,
    ErrorHandlerRef, LexicalHandler, LexicalHandlerRef, Locator,
};
pub use parser::{features, PropertyValue, PushParser};
pub use writer::{Charset, OutputMethod, XmlWriter};
