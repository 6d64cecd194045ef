//! Handler capability traits, in the SAX2 mould.
//!
//! Rather than one monolithic handler, each concern is its own trait;
//! sinks implement the union of what they care about. All methods have
//! no-op defaults. Slices passed to handlers are valid only for the
//! duration of the call.

use std::cell::RefCell;
use std::rc::Rc;

use xylem_name::Name;

use crate::error::{Diagnostic, Result};

/// Position information for the event currently being delivered.
///
/// A cheap cloneable handle; the parser updates the shared state as it
/// advances, so a handler may retain the locator and query it during
/// later events.
#[derive(Debug, Clone, Default)]
pub struct Locator {
    state: Rc<RefCell<LocatorState>>,
}

#[derive(Debug, Default)]
struct LocatorState {
    line: u64,
    column: u64,
    system_id: Option<String>,
    public_id: Option<String>,
    encoding: Option<String>,
    xml_version: Option<String>,
}

impl Locator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 1-based line number of the current event.
    pub fn line(&self) -> u64 {
        self.state.borrow().line
    }

    /// 1-based column number of the current event.
    pub fn column(&self) -> u64 {
        self.state.borrow().column
    }

    /// The system identifier of the document entity.
    pub fn system_id(&self) -> Option<String> {
        self.state.borrow().system_id.clone()
    }

    /// The public identifier of the document entity.
    pub fn public_id(&self) -> Option<String> {
        self.state.borrow().public_id.clone()
    }

    /// The character encoding actually in use.
    pub fn encoding(&self) -> Option<String> {
        self.state.borrow().encoding.clone()
    }

    /// The XML version from the XML declaration, if any.
    pub fn xml_version(&self) -> Option<String> {
        self.state.borrow().xml_version.clone()
    }

    pub(crate) fn set_position(&self, line: u64, column: u64) {
        let mut state = self.state.borrow_mut();
        state.line = line;
        state.column = column;
    }

    pub(crate) fn set_system_id(&self, system_id: Option<&str>) {
        self.state.borrow_mut().system_id = system_id.map(|s| s.to_string());
    }

    pub(crate) fn set_public_id(&self, public_id: Option<&str>) {
        self.state.borrow_mut().public_id = public_id.map(|s| s.to_string());
    }

    pub(crate) fn set_encoding(&self, encoding: &str) {
        self.state.borrow_mut().encoding = Some(encoding.to_string());
    }

    pub(crate) fn set_xml_version(&self, version: &str) {
        self.state.borrow_mut().xml_version = Some(version.to_string());
    }
}

/// The DTD-declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttributeType {
    /// Character data; whitespace is preserved apart from the base
    /// normalization.
    #[default]
    Cdata,
    /// A unique identifier.
    Id,
    /// A reference to an ID.
    Idref,
    /// Whitespace-separated ID references.
    Idrefs,
    /// An unparsed entity name.
    Entity,
    /// Whitespace-separated unparsed entity names.
    Entities,
    /// A name token.
    Nmtoken,
    /// Whitespace-separated name tokens.
    Nmtokens,
    /// One of an enumerated set of notation names.
    Notation(Vec<String>),
    /// One of an enumerated set of name tokens.
    Enumeration(Vec<String>),
}

impl AttributeType {
    /// The SAX type string: `CDATA`, `ID`, …; enumerations report
    /// `NMTOKEN`, notations `NOTATION`.
    pub fn as_sax_str(&self) -> &'static str {
        match self {
            AttributeType::Cdata => "CDATA",
            AttributeType::Id => "ID",
            AttributeType::Idref => "IDREF",
            AttributeType::Idrefs => "IDREFS",
            AttributeType::Entity => "ENTITY",
            AttributeType::Entities => "ENTITIES",
            AttributeType::Nmtoken | AttributeType::Enumeration(_) => "NMTOKEN",
            AttributeType::Nmtokens => "NMTOKENS",
            AttributeType::Notation(_) => "NOTATION",
        }
    }

    /// Whether values of this type are whitespace-collapsed on top of
    /// the base attribute-value normalization.
    pub fn is_tokenized(&self) -> bool {
        !matches!(self, AttributeType::Cdata)
    }
}

/// One attribute of a start-element event.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Resolved qualified name.
    pub name: Name,
    /// Normalized value.
    pub value: String,
    /// Declared type, `CDATA` when undeclared.
    pub dtd_type: AttributeType,
    /// `false` when the value came from a DTD default.
    pub specified: bool,
}

/// The attribute list of a start-element event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    items: Vec<Attribute>,
}

impl Attributes {
    pub(crate) fn from_vec(items: Vec<Attribute>) -> Self {
        Self { items }
    }

    /// Construct an attribute list for serialization or synthetic events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute (used by event producers other than the
    /// parser, e.g. the transform engine).
    pub fn push(&mut self, name: Name, value: impl Into<String>) {
        self.items.push(Attribute {
            name,
            value: value.into(),
            dtd_type: AttributeType::Cdata,
            specified: true,
        });
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Attribute by index.
    pub fn get(&self, index: usize) -> Option<&Attribute> {
        self.items.get(index)
    }

    /// Iterate in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter()
    }

    /// Value lookup by expanded name.
    pub fn value(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|a| a.name.namespace() == namespace && a.name.local_name() == local_name)
            .map(|a| a.value.as_str())
    }

    /// Value lookup by qualified (prefixed) name as written.
    pub fn value_by_qname(&self, qname: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|a| a.name.qualified() == qname)
            .map(|a| a.value.as_str())
    }
}

/// Receiver of the core document event stream.
#[allow(unused_variables)]
pub trait ContentHandler {
    /// Called once before any other event, with the parser's locator.
    fn set_document_locator(&mut self, locator: Locator) {}
    /// Beginning of the document.
    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }
    /// End of the document; the last event delivered.
    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }
    /// A prefix comes into scope; delivered before the owning
    /// start-element.
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        Ok(())
    }
    /// A prefix goes out of scope; delivered after the owning
    /// end-element, in reverse declaration order.
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        Ok(())
    }
    /// Start of an element.
    fn start_element(&mut self, name: &Name, attributes: &Attributes) -> Result<()> {
        Ok(())
    }
    /// End of an element.
    fn end_element(&mut self, name: &Name) -> Result<()> {
        Ok(())
    }
    /// A run of character data. May be delivered in several pieces.
    fn characters(&mut self, text: &str) -> Result<()> {
        Ok(())
    }
    /// A processing instruction.
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        Ok(())
    }
    /// An entity that was skipped rather than expanded.
    fn skipped_entity(&mut self, name: &str) -> Result<()> {
        Ok(())
    }
}

/// Receiver of lexical events: comments, CDATA brackets, DTD brackets,
/// entity expansion boundaries.
#[allow(unused_variables)]
pub trait LexicalHandler {
    /// Start of the DOCTYPE declaration.
    fn start_dtd(&mut self, name: &str, public_id: Option<&str>, system_id: Option<&str>)
        -> Result<()> {
        Ok(())
    }
    /// End of the DOCTYPE declaration.
    fn end_dtd(&mut self) -> Result<()> {
        Ok(())
    }
    /// Start of the expansion of a general entity.
    fn start_entity(&mut self, name: &str) -> Result<()> {
        Ok(())
    }
    /// End of the expansion of a general entity.
    fn end_entity(&mut self, name: &str) -> Result<()> {
        Ok(())
    }
    /// Start of a CDATA section.
    fn start_cdata(&mut self) -> Result<()> {
        Ok(())
    }
    /// End of a CDATA section.
    fn end_cdata(&mut self) -> Result<()> {
        Ok(())
    }
    /// A comment anywhere in the document.
    fn comment(&mut self, text: &str) -> Result<()> {
        Ok(())
    }
}

/// Receiver of notation and unparsed-entity declarations.
#[allow(unused_variables)]
pub trait DtdHandler {
    /// A notation declaration.
    fn notation_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
    /// An unparsed (NDATA) entity declaration.
    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation_name: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Receiver of DTD declaration events beyond notations and unparsed
/// entities.
#[allow(unused_variables)]
pub trait DeclHandler {
    /// An element declaration with its raw content model.
    fn element_decl(&mut self, name: &str, model: &str) -> Result<()> {
        Ok(())
    }
    /// One attribute declaration out of an ATTLIST.
    fn attribute_decl(
        &mut self,
        element_name: &str,
        attribute_name: &str,
        attribute_type: &AttributeType,
        mode: &str,
        value: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
    /// An internal general or parameter entity declaration; parameter
    /// entity names carry a `%` prefix.
    fn internal_entity_decl(&mut self, name: &str, value: &str) -> Result<()> {
        Ok(())
    }
    /// An external general or parameter entity declaration.
    fn external_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Receiver of recoverable and fatal parse diagnostics.
#[allow(unused_variables)]
pub trait ErrorHandler {
    /// A condition worth flagging that violates no constraint.
    fn warning(&mut self, diagnostic: &Diagnostic) -> Result<()> {
        Ok(())
    }
    /// A recoverable error, e.g. a validity violation.
    fn error(&mut self, diagnostic: &Diagnostic) -> Result<()> {
        Ok(())
    }
    /// A fatal error; the parse will not continue past it.
    fn fatal_error(&mut self, diagnostic: &Diagnostic) -> Result<()> {
        Ok(())
    }
}

/// Resolves external entities to their bytes.
///
/// This is the only point where the parser may block on I/O for the
/// main document path.
pub trait EntityResolver {
    /// Resolve an external entity. Returning `None` skips the entity.
    fn resolve_entity(
        &mut self,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<Option<Vec<u8>>>;
}

/// Shareable handler handles; one sink may be registered for several
/// capabilities.
pub type ContentHandlerRef = Rc<RefCell<dyn ContentHandler>>;
/// Shareable lexical handler.
pub type LexicalHandlerRef = Rc<RefCell<dyn LexicalHandler>>;
/// Shareable DTD handler.
pub type DtdHandlerRef = Rc<RefCell<dyn DtdHandler>>;
/// Shareable declaration handler.
pub type DeclHandlerRef = Rc<RefCell<dyn DeclHandler>>;
/// Shareable error handler.
pub type ErrorHandlerRef = Rc<RefCell<dyn ErrorHandler>>;
/// Shareable entity resolver.
pub type EntityResolverRef = Rc<RefCell<dyn EntityResolver>>;
