#![warn(missing_docs)]

//! Xylem: a push-driven, non-blocking XML processing stack.
//!
//! Three layers, each usable on its own:
//!
//! - [`sax`]: a restartable push parser ([`PushParser`]) you feed byte
//!   chunks, and the matching serializer ([`XmlWriter`]);
//! - [`xpath`]: the XPath 3.1 engine, which compiles a [`Query`] and
//!   evaluates it over documents built from the event stream;
//! - [`xslt`]: streaming-first XSLT 3.0; [`compile_stylesheet`], then
//!   run a [`Transformer`] over bytes or live events.
//!
//! ```no_run
//! use xylem::{compile_stylesheet, Transformer};
//!
//! let stylesheet = compile_stylesheet(br#"<xsl:stylesheet .../>"#)?;
//! let mut transformer = Transformer::new(stylesheet);
//! let output = transformer.transform_bytes(b"<doc/>", Vec::new())?;
//! # Ok::<(), xylem::xpath::Error>(())
//! ```

use std::rc::Rc;

pub use xylem_name as name;
pub use xylem_sax as sax;
pub use xylem_schema_type as schema_type;
pub use xylem_xpath as xpath;
pub use xylem_xpath_ast as xpath_ast;
pub use xylem_xslt as xslt;

pub use xylem_name::Name;
pub use xylem_sax::{PushParser, XmlWriter};
pub use xylem_xpath::Query;
pub use xylem_xslt::{CompiledStylesheet, ErrorMode, Transformer};

/// Compile a self-contained stylesheet from bytes.
pub fn compile_stylesheet(
    bytes: &[u8],
) -> Result<Rc<CompiledStylesheet>, xylem_xpath::Error> {
    let mut resolver = xylem_xslt::NoResolver;
    CompiledStylesheet::compile(bytes, &mut resolver).map(Rc::new)
}

/// Compile a stylesheet that may include or import other modules.
pub fn compile_stylesheet_with_resolver(
    bytes: &[u8],
    resolver: &mut dyn xylem_xslt::StylesheetResolver,
) -> Result<Rc<CompiledStylesheet>, xylem_xpath::Error> {
    CompiledStylesheet::compile(bytes, resolver).map(Rc::new)
}
