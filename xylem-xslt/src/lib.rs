#![warn(missing_docs)]

//! Streaming-first XSLT 3.0 for Xylem.
//!
//! A stylesheet compiles once into an immutable [`CompiledStylesheet`];
//! each run is a [`Transformer`]. The compiler classifies every
//! expression and template on the streamability lattice; when the whole
//! unnamed mode stays below FREE_RANGING, the transform runs as a SAX
//! filter over the push parser, grounding only the subtrees that ask
//! for it. Otherwise the input buffers into an arena and templates walk
//! it directly.

pub mod ast;
pub mod accumulator;
pub mod compiler;
mod content;
pub mod decimal;
pub mod number;
pub mod output;
pub mod pattern;
pub mod runtime;
pub mod streamability;

pub use compiler::{CompiledStylesheet, NoResolver, StylesheetResolver};
pub use runtime::{ErrorMode, StreamingFilter, Transformer, TransformerHandler};
pub use streamability::Streamability;
