//! The content parser: the push API of the crate.
//!
//! [`PushParser::feed`] accepts byte chunks and returns once every event
//! derivable from them has been delivered; nothing blocks except an
//! entity resolver the caller installed. Internally a [`Decoder`]
//! produces characters, a [`Tokenizer`] produces tokens, and
//! [`ParserCore`] turns tokens into well-formed SAX events while
//! tracking element nesting, namespace scopes and DTD state.

use ahash::{HashSet, HashSetExt};
use xylem_name::{Name, NamespaceStack, XMLNS_NAMESPACE, XML_NAMESPACE};

use crate::chars::{is_name, is_ncname, is_nmtoken};
use crate::dtd::{Declaration, DefaultMode, DtdParser, EntityDef};
use crate::encoding::Decoder;
use crate::error::{Diagnostic, Result, SaxError};
use crate::handler::{
    Attribute, AttributeType, Attributes, ContentHandlerRef, DeclHandlerRef, DtdHandlerRef,
    EntityResolverRef, ErrorHandlerRef, LexicalHandlerRef, Locator,
};
use crate::tokenizer::{Token, TokenSink, Tokenizer};

const MAX_ENTITY_DEPTH: usize = 32;

/// A value for [`PushParser::set_property`].
pub enum PropertyValue {
    /// The `lexical-handler` property.
    LexicalHandler(crate::handler::LexicalHandlerRef),
    /// The `declaration-handler` property.
    DeclarationHandler(crate::handler::DeclHandlerRef),
}

/// Recognized feature flags for [`PushParser::set_feature`].
pub mod features {
    /// Emit prefix-mapping events and resolve qualified names.
    pub const NAMESPACES: &str = "namespaces";
    /// Enforce DTD validity constraints.
    pub const VALIDATION: &str = "validation";
    /// Follow external general entities.
    pub const EXTERNAL_GENERAL_ENTITIES: &str = "external-general-entities";
    /// Follow external parameter entities and the external subset.
    pub const EXTERNAL_PARAMETER_ENTITIES: &str = "external-parameter-entities";
    /// Accept XML 1.1 documents and line-end rules.
    pub const XML_1_1: &str = "xml-1.1";
}

#[derive(Debug, Clone)]
struct Features {
    namespaces: bool,
    validation: bool,
    external_general_entities: bool,
    external_parameter_entities: bool,
    xml11: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            namespaces: true,
            validation: false,
            external_general_entities: true,
            external_parameter_entities: true,
            xml11: false,
        }
    }
}

/// A push-driven, non-blocking XML parser.
pub struct PushParser {
    decoder: Decoder,
    tokenizer: Tokenizer,
    core: ParserCore,
    char_buf: String,
    failed: bool,
    closed: bool,
}

impl Default for PushParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PushParser {
    /// A parser with default features and no handlers.
    pub fn new() -> Self {
        let core = ParserCore::new();
        let mut tokenizer = Tokenizer::new();
        tokenizer.attach_locator(core.locator.clone());
        Self {
            decoder: Decoder::new(),
            tokenizer,
            core,
            char_buf: String::new(),
            failed: false,
            closed: false,
        }
    }

    /// Feed a chunk of bytes. Returns once the chunk is exhausted and
    /// all events derivable from it have been delivered.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        if self.failed {
            return Err(SaxError::WellFormedness(Diagnostic::new(
                "parser has already failed",
                0,
                0,
            )));
        }
        if self.closed {
            return Err(SaxError::WellFormedness(Diagnostic::new(
                "parser is closed; call reset() first",
                0,
                0,
            )));
        }
        let result = self.feed_inner(chunk);
        if let Err(e) = &result {
            if e.is_fatal() {
                self.failed = true;
                self.core.report_fatal(e);
            }
        }
        result
    }

    fn feed_inner(&mut self, chunk: &[u8]) -> Result<()> {
        self.core.ensure_document_started()?;
        self.char_buf.clear();
        self.decoder.feed(chunk, &mut self.char_buf)?;
        self.sync_decoder_state();
        let buf = std::mem::take(&mut self.char_buf);
        let result = self.tokenizer.run(&buf, &mut self.core);
        self.char_buf = buf;
        self.tokenizer.set_xml11(self.core.xml11_active());
        result
    }

    /// Mark end of input: flush trailing state and emit end-document.
    pub fn close(&mut self) -> Result<()> {
        if self.failed || self.closed {
            return Ok(());
        }
        let result = self.close_inner();
        if let Err(e) = &result {
            if e.is_fatal() {
                self.failed = true;
                self.core.report_fatal(e);
            }
        }
        self.closed = true;
        result
    }

    fn close_inner(&mut self) -> Result<()> {
        self.core.ensure_document_started()?;
        self.char_buf.clear();
        self.decoder.finish(&mut self.char_buf)?;
        self.sync_decoder_state();
        let buf = std::mem::take(&mut self.char_buf);
        let result = self.tokenizer.run(&buf, &mut self.core);
        self.char_buf = buf;
        result?;
        self.tokenizer.finish(&mut self.core)?;
        self.core.finish_document()
    }

    fn sync_decoder_state(&mut self) {
        if let Some(name) = self.decoder.encoding_name() {
            self.core.locator.set_encoding(name);
        }
        if self.decoder.is_xml11() {
            self.core.set_xml11_document();
            self.tokenizer.set_xml11(true);
        }
    }

    /// Return to the initial state; handlers, features and identifiers
    /// remain bound.
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.decoder
            .set_allow_xml11(self.core.features.xml11);
        self.tokenizer = Tokenizer::new();
        self.tokenizer.attach_locator(self.core.locator.clone());
        self.core.reset();
        self.failed = false;
        self.closed = false;
    }

    /// The locator tracking the current event position.
    pub fn locator(&self) -> Locator {
        self.core.locator.clone()
    }

    /// Set the receiver of content events.
    pub fn set_content_handler(&mut self, handler: ContentHandlerRef) {
        handler
            .borrow_mut()
            .set_document_locator(self.core.locator.clone());
        self.core.content = Some(handler);
    }

    /// Set the receiver of lexical events.
    pub fn set_lexical_handler(&mut self, handler: LexicalHandlerRef) {
        self.core.lexical = Some(handler);
    }

    /// Set the receiver of notation and unparsed-entity declarations.
    pub fn set_dtd_handler(&mut self, handler: DtdHandlerRef) {
        self.core.dtd_handler = Some(handler);
    }

    /// Set the receiver of the remaining DTD declarations.
    pub fn set_declaration_handler(&mut self, handler: DeclHandlerRef) {
        self.core.decl_handler = Some(handler);
    }

    /// Set the external entity resolver.
    pub fn set_entity_resolver(&mut self, resolver: EntityResolverRef) {
        self.core.resolver = Some(resolver);
    }

    /// Set the receiver of warnings and recoverable errors.
    pub fn set_error_handler(&mut self, handler: ErrorHandlerRef) {
        self.core.error_handler = Some(handler);
    }

    /// Set the system identifier reported by the locator.
    pub fn set_system_id(&mut self, uri: &str) {
        self.core.locator.set_system_id(Some(uri));
    }

    /// Set the public identifier reported by the locator.
    pub fn set_public_id(&mut self, id: &str) {
        self.core.locator.set_public_id(Some(id));
    }

    /// Toggle a recognized feature; see [`features`].
    pub fn set_feature(&mut self, name: &str, value: bool) -> Result<()> {
        let f = &mut self.core.features;
        match name {
            features::NAMESPACES => f.namespaces = value,
            features::VALIDATION => f.validation = value,
            features::EXTERNAL_GENERAL_ENTITIES => f.external_general_entities = value,
            features::EXTERNAL_PARAMETER_ENTITIES => f.external_parameter_entities = value,
            features::XML_1_1 => {
                f.xml11 = value;
                self.decoder.set_allow_xml11(value);
            }
            _ => return Err(SaxError::UnrecognizedOption(name.to_string())),
        }
        Ok(())
    }

    /// Set a recognized property; the handler setters are the direct
    /// form of the same operation.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> Result<()> {
        match (name, value) {
            ("lexical-handler", PropertyValue::LexicalHandler(handler)) => {
                self.set_lexical_handler(handler);
                Ok(())
            }
            ("declaration-handler", PropertyValue::DeclarationHandler(handler)) => {
                self.set_declaration_handler(handler);
                Ok(())
            }
            (name, _) => Err(SaxError::UnrecognizedOption(name.to_string())),
        }
    }

    /// Query a recognized feature.
    pub fn feature(&self, name: &str) -> Result<bool> {
        let f = &self.core.features;
        Ok(match name {
            features::NAMESPACES => f.namespaces,
            features::VALIDATION => f.validation,
            features::EXTERNAL_GENERAL_ENTITIES => f.external_general_entities,
            features::EXTERNAL_PARAMETER_ENTITIES => f.external_parameter_entities,
            features::XML_1_1 => f.xml11,
            _ => return Err(SaxError::UnrecognizedOption(name.to_string())),
        })
    }
}

struct OpenElement {
    name: Name,
    raw_name: String,
}

struct PendingAttr {
    qname: String,
    value: String,
    specified: bool,
}

struct PendingTag {
    raw_name: String,
    attrs: Vec<PendingAttr>,
}

struct ParserCore {
    features: Features,
    locator: Locator,
    content: Option<ContentHandlerRef>,
    lexical: Option<LexicalHandlerRef>,
    dtd_handler: Option<DtdHandlerRef>,
    decl_handler: Option<DeclHandlerRef>,
    error_handler: Option<ErrorHandlerRef>,
    resolver: Option<EntityResolverRef>,

    started: bool,
    saw_root: bool,
    root_closed: bool,
    xml11_document: bool,
    stack: Vec<OpenElement>,
    ns: NamespaceStack,
    pending: Option<PendingTag>,
    in_cdata: bool,

    dtd: Option<DtdParser>,
    doctype_open: bool,
    dtd_reported: bool,

    entity_stack: Vec<String>,
    position: (u64, u64),

    // validation bookkeeping
    ids_seen: HashSet<String>,
    idrefs_pending: Vec<String>,
}

impl ParserCore {
    fn new() -> Self {
        Self {
            features: Features::default(),
            locator: Locator::new(),
            content: None,
            lexical: None,
            dtd_handler: None,
            decl_handler: None,
            error_handler: None,
            resolver: None,
            started: false,
            saw_root: false,
            root_closed: false,
            xml11_document: false,
            stack: Vec::new(),
            ns: NamespaceStack::new(),
            pending: None,
            in_cdata: false,
            dtd: None,
            doctype_open: false,
            dtd_reported: false,
            entity_stack: Vec::new(),
            position: (1, 1),
            ids_seen: HashSet::new(),
            idrefs_pending: Vec::new(),
        }
    }

    fn reset(&mut self) {
        let features = self.features.clone();
        let content = self.content.take();
        let lexical = self.lexical.take();
        let dtd_handler = self.dtd_handler.take();
        let decl_handler = self.decl_handler.take();
        let error_handler = self.error_handler.take();
        let resolver = self.resolver.take();
        let locator = self.locator.clone();
        *self = Self::new();
        self.features = features;
        self.content = content;
        self.lexical = lexical;
        self.dtd_handler = dtd_handler;
        self.decl_handler = decl_handler;
        self.error_handler = error_handler;
        self.resolver = resolver;
        self.locator = locator;
    }

    fn xml11_active(&self) -> bool {
        self.xml11_document
    }

    fn set_xml11_document(&mut self) {
        self.xml11_document = true;
    }

    fn wf_error(&self, message: impl Into<String>) -> SaxError {
        SaxError::WellFormedness(Diagnostic::new(message, self.position.0, self.position.1))
    }

    fn ns_error(&self, message: impl Into<String>) -> SaxError {
        SaxError::Namespace(Diagnostic::new(message, self.position.0, self.position.1))
    }

    fn report_fatal(&self, error: &SaxError) {
        if let Some(handler) = &self.error_handler {
            let diagnostic = Diagnostic::new(error.to_string(), self.position.0, self.position.1);
            let _ = handler.borrow_mut().fatal_error(&diagnostic);
        }
    }

    // validity problems are recoverable: reported, processing continues
    fn validity(&mut self, message: impl Into<String>) -> Result<()> {
        if !self.features.validation {
            return Ok(());
        }
        let diagnostic = Diagnostic::new(message, self.position.0, self.position.1);
        if let Some(handler) = &self.error_handler {
            handler.borrow_mut().error(&diagnostic)?;
        }
        Ok(())
    }

    fn ensure_document_started(&mut self) -> Result<()> {
        if !self.started {
            self.started = true;
            if let Some(content) = &self.content {
                content.borrow_mut().start_document()?;
            }
        }
        Ok(())
    }

    fn finish_document(&mut self) -> Result<()> {
        if !self.stack.is_empty() {
            let open = &self.stack.last().unwrap().raw_name;
            return Err(self.wf_error(format!("element {open:?} is not closed at end of input")));
        }
        if !self.saw_root {
            return Err(self.wf_error("document has no root element"));
        }
        if self.features.validation {
            let missing: Vec<String> = self
                .idrefs_pending
                .iter()
                .filter(|id| !self.ids_seen.contains(*id))
                .cloned()
                .collect();
            for id in missing {
                self.validity(format!("IDREF {id:?} does not match any ID"))?;
            }
        }
        if let Some(content) = &self.content {
            content.borrow_mut().end_document()?;
        }
        Ok(())
    }

    fn track_position(&mut self) {
        self.locator.set_position(self.position.0, self.position.1);
    }

    // ---- start tag assembly -------------------------------------------------

    fn finish_start_tag(&mut self, self_closing: bool) -> Result<()> {
        let pending = self
            .pending
            .take()
            .expect("start tag close without open tag");
        if self.root_closed {
            return Err(self.wf_error("content after the root element"));
        }
        if self.stack.is_empty() && self.saw_root {
            return Err(self.wf_error("document has more than one root element"));
        }
        self.saw_root = true;

        let mut attrs = pending.attrs;
        self.apply_dtd_defaults(&pending.raw_name, &mut attrs)?;

        // exact-qname duplicates are well-formedness errors
        for i in 1..attrs.len() {
            if attrs[..i].iter().any(|a| a.qname == attrs[i].qname) {
                return Err(self.wf_error(format!(
                    "attribute {:?} appears more than once",
                    attrs[i].qname
                )));
            }
        }

        self.ns.push_scope();
        let mut mappings: Vec<(String, String)> = Vec::new();
        let mut regular: Vec<PendingAttr> = Vec::new();
        if self.features.namespaces {
            for attr in attrs {
                if attr.qname == "xmlns" {
                    self.declare_prefix("", &attr.value, &mut mappings)?;
                } else if let Some(prefix) = attr.qname.strip_prefix("xmlns:") {
                    if prefix.is_empty() || !is_ncname(prefix) {
                        return Err(self.ns_error(format!("invalid namespace prefix {prefix:?}")));
                    }
                    if attr.value.is_empty() && !self.xml11_document {
                        return Err(self
                            .ns_error(format!("prefix {prefix:?} may not be undeclared in XML 1.0")));
                    }
                    self.declare_prefix(prefix, &attr.value, &mut mappings)?;
                } else {
                    regular.push(attr);
                }
            }
        } else {
            regular = attrs;
        }

        for (prefix, uri) in &mappings {
            if let Some(content) = &self.content {
                content.borrow_mut().start_prefix_mapping(prefix, uri)?;
            }
        }

        let name = self.resolve_name(&pending.raw_name, true)?;
        let mut resolved: Vec<Attribute> = Vec::with_capacity(regular.len());
        for attr in &regular {
            let attr_name = self.resolve_name(&attr.qname, false)?;
            let dtd_type = self.declared_attribute_type(&pending.raw_name, &attr.qname);
            let value = if dtd_type.is_tokenized() {
                collapse_spaces(&attr.value)
            } else {
                attr.value.clone()
            };
            self.validate_attribute(&pending.raw_name, &attr.qname, &dtd_type, &value)?;
            resolved.push(Attribute {
                name: attr_name,
                value,
                dtd_type,
                specified: attr.specified,
            });
        }
        // expanded-name duplicates are namespace errors
        for i in 1..resolved.len() {
            if resolved[..i].iter().any(|a| a.name == resolved[i].name) {
                return Err(self.ns_error(format!(
                    "attribute {} appears more than once after namespace resolution",
                    resolved[i].name.clark()
                )));
            }
        }
        self.validate_element(&pending.raw_name, &resolved)?;

        let attributes = Attributes::from_vec(resolved);
        self.track_position();
        if let Some(content) = &self.content {
            content.borrow_mut().start_element(&name, &attributes)?;
        }
        if self_closing {
            self.emit_end_element(name)?;
        } else {
            self.stack.push(OpenElement {
                name,
                raw_name: pending.raw_name,
            });
        }
        Ok(())
    }

    fn declare_prefix(
        &mut self,
        prefix: &str,
        uri: &str,
        mappings: &mut Vec<(String, String)>,
    ) -> Result<()> {
        if prefix == "xml" && uri != XML_NAMESPACE {
            return Err(self.ns_error("the xml prefix may not be rebound"));
        }
        if prefix != "xml" && uri == XML_NAMESPACE {
            return Err(self.ns_error("no other prefix may bind the xml namespace"));
        }
        if prefix == "xmlns" || uri == XMLNS_NAMESPACE {
            return Err(self.ns_error("the xmlns namespace may not be declared"));
        }
        if !self.ns.declare(prefix, uri) {
            return Err(self.ns_error(format!("prefix {prefix:?} declared twice on one element")));
        }
        mappings.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn resolve_name(&self, qname: &str, is_element: bool) -> Result<Name> {
        if !self.features.namespaces {
            return Ok(Name::local(qname));
        }
        match qname.split_once(':') {
            Some((prefix, local)) => {
                if prefix.is_empty() || local.is_empty() || local.contains(':') {
                    return Err(self.ns_error(format!("malformed qualified name {qname:?}")));
                }
                let uri = self
                    .ns
                    .resolve(prefix)
                    .ok_or_else(|| self.ns_error(format!("prefix {prefix:?} is not declared")))?;
                Ok(Name::prefixed(uri, local, prefix))
            }
            None => {
                if is_element {
                    let uri = self.ns.resolve("").unwrap_or("");
                    Ok(Name::new(uri, qname))
                } else {
                    // unprefixed attributes are in no namespace
                    Ok(Name::local(qname))
                }
            }
        }
    }

    fn apply_dtd_defaults(&mut self, element: &str, attrs: &mut Vec<PendingAttr>) -> Result<()> {
        let defaults: Vec<(String, Option<String>, DefaultMode)> = match self
            .dtd
            .as_ref()
            .and_then(|d| d.attribute_defs(element))
        {
            Some(defs) => defs
                .iter()
                .map(|d| (d.name.clone(), d.value.clone(), d.mode))
                .collect(),
            None => return Ok(()),
        };
        for (name, value, mode) in defaults {
            let present = attrs.iter().any(|a| a.qname == name);
            match mode {
                DefaultMode::Required if !present => {
                    self.validity(format!(
                        "required attribute {name:?} is missing on element {element:?}"
                    ))?;
                }
                DefaultMode::Fixed => {
                    if let Some(attr) = attrs.iter().find(|a| a.qname == name) {
                        if Some(attr.value.as_str()) != value.as_deref() {
                            self.validity(format!(
                                "attribute {name:?} must have the fixed value {:?}",
                                value.as_deref().unwrap_or_default()
                            ))?;
                        }
                    }
                    if !present {
                        if let Some(value) = value {
                            attrs.push(PendingAttr {
                                qname: name,
                                value,
                                specified: false,
                            });
                        }
                    }
                }
                DefaultMode::Default if !present => {
                    if let Some(value) = value {
                        attrs.push(PendingAttr {
                            qname: name,
                            value,
                            specified: false,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn declared_attribute_type(&self, element: &str, attribute: &str) -> AttributeType {
        self.dtd
            .as_ref()
            .and_then(|d| d.attribute_defs(element))
            .and_then(|defs| defs.iter().find(|d| d.name == attribute))
            .map(|d| d.att_type.clone())
            .unwrap_or_default()
    }

    fn validate_attribute(
        &mut self,
        element: &str,
        attribute: &str,
        dtd_type: &AttributeType,
        value: &str,
    ) -> Result<()> {
        if !self.features.validation {
            return Ok(());
        }
        match dtd_type {
            AttributeType::Id => {
                if !is_name(value) {
                    self.validity(format!("ID value {value:?} is not a Name"))?;
                } else if !self.ids_seen.insert(value.to_string()) {
                    self.validity(format!("ID {value:?} is declared more than once"))?;
                }
            }
            AttributeType::Idref => {
                if !is_name(value) {
                    self.validity(format!("IDREF value {value:?} is not a Name"))?;
                }
                self.idrefs_pending.push(value.to_string());
            }
            AttributeType::Idrefs => {
                for token in value.split(' ') {
                    if !is_name(token) {
                        self.validity(format!("IDREFS token {token:?} is not a Name"))?;
                    }
                    self.idrefs_pending.push(token.to_string());
                }
            }
            AttributeType::Nmtoken => {
                if !is_nmtoken(value) {
                    self.validity(format!("NMTOKEN value {value:?} is not a name token"))?;
                }
            }
            AttributeType::Nmtokens => {
                for token in value.split(' ') {
                    if !is_nmtoken(token) {
                        self.validity(format!("NMTOKENS token {token:?} is not a name token"))?;
                    }
                }
            }
            AttributeType::Entity => {
                if self
                    .dtd
                    .as_ref()
                    .and_then(|d| d.unparsed_entity(value))
                    .is_none()
                {
                    self.validity(format!(
                        "ENTITY attribute {attribute:?} on {element:?} names no unparsed entity"
                    ))?;
                }
            }
            AttributeType::Enumeration(choices) => {
                if !choices.iter().any(|c| c == value) {
                    self.validity(format!(
                        "value {value:?} is not among the declared choices for {attribute:?}"
                    ))?;
                }
            }
            AttributeType::Notation(choices) => {
                if !choices.iter().any(|c| c == value) {
                    self.validity(format!(
                        "value {value:?} is not a declared notation for {attribute:?}"
                    ))?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn validate_element(&mut self, raw_name: &str, attrs: &[Attribute]) -> Result<()> {
        if !self.features.validation {
            return Ok(());
        }
        let dtd = match &self.dtd {
            Some(dtd) => dtd,
            None => {
                self.validity(format!("element {raw_name:?} used without a DTD"))?;
                return Ok(());
            }
        };
        let not_declared = !dtd.is_element_declared(raw_name);
        let undeclared_attrs: Option<Vec<String>> = dtd.attribute_defs(raw_name).map(|defs| {
            attrs
                .iter()
                .map(|a| a.name.qualified())
                .filter(|q| !q.starts_with("xmlns") && !defs.iter().any(|d| &d.name == q))
                .collect()
        });
        if not_declared {
            self.validity(format!("element {raw_name:?} is not declared"))?;
        }
        if let Some(undeclared) = undeclared_attrs {
            for q in undeclared {
                self.validity(format!("attribute {q:?} is not declared on {raw_name:?}"))?;
            }
        }
        Ok(())
    }

    fn emit_end_element(&mut self, name: Name) -> Result<()> {
        self.track_position();
        if let Some(content) = &self.content {
            content.borrow_mut().end_element(&name)?;
        }
        let scope = self.ns.pop_scope();
        if self.features.namespaces {
            if let Some(content) = &self.content {
                for (prefix, _) in scope.iter().rev() {
                    content.borrow_mut().end_prefix_mapping(prefix)?;
                }
            }
        }
        if self.stack.is_empty() {
            self.root_closed = true;
        }
        Ok(())
    }

    // ---- entity expansion ---------------------------------------------------

    fn expand_general_entity(&mut self, name: &str) -> Result<()> {
        if self.entity_stack.iter().any(|n| n == name) {
            return Err(self.wf_error(format!("entity &{name}; is recursive")));
        }
        if self.entity_stack.len() >= MAX_ENTITY_DEPTH {
            return Err(self.wf_error("entity expansion too deep"));
        }
        let def = match self.dtd.as_ref().and_then(|d| d.general_entity(name)) {
            Some(def) => def.clone(),
            None => {
                // undeclared: skippable when an external subset might
                // have declared it, an error otherwise
                if self.dtd.as_ref().map(|d| d.system_id.is_some()).unwrap_or(false)
                    || !self.features.external_parameter_entities
                {
                    return self.skip_entity(name);
                }
                return Err(self.wf_error(format!("entity &{name}; is not declared")));
            }
        };
        match def {
            EntityDef::Internal(replacement) => {
                self.run_entity_text(name, &replacement, false)
            }
            EntityDef::External { public_id, system_id } => {
                if !self.features.external_general_entities {
                    return self.skip_entity(name);
                }
                let bytes = match self.resolve_bytes(public_id.as_deref(), &system_id)? {
                    Some(bytes) => bytes,
                    None => return self.skip_entity(name),
                };
                let mut decoder = Decoder::new();
                decoder.set_allow_xml11(self.features.xml11);
                let mut text = String::new();
                decoder.feed(&bytes, &mut text)?;
                decoder.finish(&mut text)?;
                self.run_entity_text(name, &text, true)
            }
            EntityDef::Unparsed { .. } => {
                Err(self.wf_error(format!("unparsed entity &{name}; referenced in content")))
            }
        }
    }

    fn run_entity_text(&mut self, name: &str, text: &str, external: bool) -> Result<()> {
        if let Some(lexical) = self.lexical.clone() {
            lexical.borrow_mut().start_entity(name)?;
        }
        self.entity_stack.push(name.to_string());
        let depth_before = self.stack.len();
        let mut tokenizer = Tokenizer::for_entity(
            self.xml11_document,
            self.position.0,
            self.position.1,
        );
        if external {
            tokenizer.allow_text_decl();
        }
        let result = tokenizer
            .run(text, self)
            .and_then(|_| tokenizer.finish(self));
        self.entity_stack.pop();
        result?;
        if self.stack.len() != depth_before {
            return Err(self.wf_error(format!("entity &{name}; is not well-balanced")));
        }
        if let Some(lexical) = self.lexical.clone() {
            lexical.borrow_mut().end_entity(name)?;
        }
        Ok(())
    }

    fn skip_entity(&mut self, name: &str) -> Result<()> {
        if let Some(content) = &self.content {
            content.borrow_mut().skipped_entity(name)?;
        }
        Ok(())
    }

    fn resolve_bytes(
        &mut self,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<Option<Vec<u8>>> {
        match self.resolver.clone() {
            Some(resolver) => resolver.borrow_mut().resolve_entity(public_id, system_id),
            None => Ok(None),
        }
    }

    // expand an entity reference inside an attribute value
    fn expand_attr_entity(&mut self, name: &str, into: &mut String, depth: usize) -> Result<()> {
        if depth > MAX_ENTITY_DEPTH {
            return Err(self.wf_error("entity expansion too deep"));
        }
        let def = self
            .dtd
            .as_ref()
            .and_then(|d| d.general_entity(name))
            .cloned();
        let replacement = match def {
            Some(EntityDef::Internal(replacement)) => replacement,
            Some(_) => {
                return Err(self.wf_error(format!(
                    "external entity &{name}; is not allowed in an attribute value"
                )));
            }
            None => {
                return Err(self.wf_error(format!("entity &{name}; is not declared")));
            }
        };
        if replacement.contains('<') {
            return Err(self.wf_error(format!(
                "entity &{name}; contains '<' and may not appear in an attribute value"
            )));
        }
        // recursively expand; literal whitespace maps to space
        let mut rest = replacement.as_str();
        while let Some(pos) = rest.find('&') {
            push_mapped(&rest[..pos], into);
            let after = &rest[pos + 1..];
            let semi = after
                .find(';')
                .ok_or_else(|| self.wf_error("unterminated reference in entity value"))?;
            let inner = &after[..semi];
            if let Some(digits) = inner.strip_prefix('#') {
                let c = parse_char_ref_str(digits)
                    .ok_or_else(|| self.wf_error("invalid character reference"))?;
                into.push(c);
            } else {
                match inner {
                    "lt" => into.push('<'),
                    "gt" => into.push('>'),
                    "amp" => into.push('&'),
                    "apos" => into.push('\''),
                    "quot" => into.push('"'),
                    _ => self.expand_attr_entity(inner, into, depth + 1)?,
                }
            }
            rest = &after[semi + 1..];
        }
        push_mapped(rest, into);
        Ok(())
    }

    // ---- doctype ------------------------------------------------------------

    fn report_start_dtd(&mut self) -> Result<()> {
        if self.dtd_reported {
            return Ok(());
        }
        self.dtd_reported = true;
        let (name, public_id, system_id) = {
            let dtd = self.dtd.as_ref().unwrap();
            (
                dtd.name.clone(),
                dtd.public_id.clone(),
                dtd.system_id.clone(),
            )
        };
        if let Some(lexical) = self.lexical.clone() {
            lexical
                .borrow_mut()
                .start_dtd(&name, public_id.as_deref(), system_id.as_deref())?;
        }
        Ok(())
    }

    fn report_declarations(&mut self, declarations: Vec<Declaration>) -> Result<()> {
        for declaration in declarations {
            match declaration {
                Declaration::Element { name, model } => {
                    if let Some(handler) = self.decl_handler.clone() {
                        handler.borrow_mut().element_decl(&name, &model)?;
                    }
                }
                Declaration::Attribute {
                    element,
                    attribute,
                    att_type,
                    mode,
                    value,
                } => {
                    if let Some(handler) = self.decl_handler.clone() {
                        handler.borrow_mut().attribute_decl(
                            &element,
                            &attribute,
                            &att_type,
                            mode.as_str(),
                            value.as_deref(),
                        )?;
                    }
                }
                Declaration::InternalEntity { name, value } => {
                    if let Some(handler) = self.decl_handler.clone() {
                        handler.borrow_mut().internal_entity_decl(&name, &value)?;
                    }
                }
                Declaration::ExternalEntity {
                    name,
                    public_id,
                    system_id,
                } => {
                    if let Some(handler) = self.decl_handler.clone() {
                        handler.borrow_mut().external_entity_decl(
                            &name,
                            public_id.as_deref(),
                            &system_id,
                        )?;
                    }
                }
                Declaration::UnparsedEntity {
                    name,
                    public_id,
                    system_id,
                    notation,
                } => {
                    if self.features.validation
                        && !self
                            .dtd
                            .as_ref()
                            .map(|d| d.is_notation_declared(&notation))
                            .unwrap_or(false)
                    {
                        self.validity(format!(
                            "unparsed entity {name:?} names undeclared notation {notation:?}"
                        ))?;
                    }
                    if let Some(handler) = self.dtd_handler.clone() {
                        handler.borrow_mut().unparsed_entity_decl(
                            &name,
                            public_id.as_deref(),
                            &system_id,
                            &notation,
                        )?;
                    }
                }
                Declaration::Notation {
                    name,
                    public_id,
                    system_id,
                } => {
                    if let Some(handler) = self.dtd_handler.clone() {
                        handler.borrow_mut().notation_decl(
                            &name,
                            public_id.as_deref(),
                            system_id.as_deref(),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn load_external_subset(&mut self) -> Result<()> {
        let (public_id, system_id) = {
            let dtd = self.dtd.as_ref().unwrap();
            (dtd.public_id.clone(), dtd.system_id.clone())
        };
        let system_id = match system_id {
            Some(system_id) => system_id,
            None => return Ok(()),
        };
        if !self.features.external_parameter_entities {
            return self.skip_entity("[dtd]");
        }
        let bytes = match self.resolve_bytes(public_id.as_deref(), &system_id)? {
            Some(bytes) => bytes,
            None => return self.skip_entity("[dtd]"),
        };
        let mut decoder = Decoder::new();
        decoder.set_allow_xml11(self.features.xml11);
        let mut text = String::new();
        decoder.feed(&bytes, &mut text)?;
        decoder.finish(&mut text)?;
        let declarations = self
            .dtd
            .as_mut()
            .unwrap()
            .external_subset(&text)?;
        self.report_declarations(declarations)
    }
}

fn push_mapped(s: &str, into: &mut String) {
    for c in s.chars() {
        if c == '\t' || c == '\n' || c == '\r' {
            into.push(' ');
        } else {
            into.push(c);
        }
    }
}

fn parse_char_ref_str(digits: &str) -> Option<char> {
    let value = if let Some(hex) = digits.strip_prefix('x') {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(value)
}

fn collapse_spaces(value: &str) -> String {
    value
        .split(' ')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl TokenSink for ParserCore {
    fn token(&mut self, token: Token<'_>) -> Result<()> {
        // the tokenizer keeps the locator current; mirror it for
        // diagnostics
        self.position = (self.locator.line(), self.locator.column());
        match token {
            Token::XmlDecl {
                version,
                encoding: _,
                standalone: _,
            } => {
                if self.entity_stack.is_empty() {
                    let version =
                        version.ok_or_else(|| self.wf_error("XML declaration requires a version"))?;
                    match version {
                        "1.0" => {}
                        "1.1" if self.features.xml11 => self.xml11_document = true,
                        other => {
                            return Err(self.wf_error(format!(
                                "unsupported XML version {other:?}"
                            )));
                        }
                    }
                    self.locator.set_xml_version(version);
                }
                Ok(())
            }
            Token::StartTagName(name) => {
                if self.doctype_open {
                    return Err(self.wf_error("element inside DOCTYPE declaration"));
                }
                self.pending = Some(PendingTag {
                    raw_name: name.to_string(),
                    attrs: Vec::new(),
                });
                Ok(())
            }
            Token::AttrName(name) => {
                let pending = self
                    .pending
                    .as_mut()
                    .expect("attribute outside start tag");
                pending.attrs.push(PendingAttr {
                    qname: name.to_string(),
                    value: String::new(),
                    specified: true,
                });
                Ok(())
            }
            Token::AttrValuePiece(piece) => {
                let pending = self.pending.as_mut().expect("value outside start tag");
                let attr = pending.attrs.last_mut().expect("value without name");
                attr.value.push_str(piece);
                Ok(())
            }
            Token::AttrValueEntityRef(name) => {
                let name = name.to_string();
                let mut value = {
                    let pending = self.pending.as_mut().expect("value outside start tag");
                    std::mem::take(&mut pending.attrs.last_mut().expect("value without name").value)
                };
                self.expand_attr_entity(&name, &mut value, 0)?;
                self.pending.as_mut().unwrap().attrs.last_mut().unwrap().value = value;
                Ok(())
            }
            Token::AttrValueEnd => Ok(()),
            Token::StartTagClose => self.finish_start_tag(false),
            Token::StartTagSelfClose => self.finish_start_tag(true),
            Token::EndTag(raw_name) => {
                let open = match self.stack.pop() {
                    Some(open) => open,
                    None => {
                        return Err(self.wf_error(format!(
                            "end tag </{raw_name}> with no open element"
                        )));
                    }
                };
                if open.raw_name != raw_name {
                    return Err(self.wf_error(format!(
                        "end tag </{raw_name}> does not match <{}>",
                        open.raw_name
                    )));
                }
                self.emit_end_element(open.name)
            }
            Token::Text(text) => {
                if self.doctype_open {
                    return Err(self.wf_error("character data inside DOCTYPE"));
                }
                if self.stack.is_empty() {
                    if text.chars().all(|c| crate::chars::is_whitespace_char(c)) {
                        // ignorable whitespace in the prolog or epilog
                        return Ok(());
                    }
                    return Err(self.wf_error("character data outside the root element"));
                }
                self.track_position();
                if let Some(content) = &self.content {
                    content.borrow_mut().characters(text)?;
                }
                Ok(())
            }
            Token::EntityRef(name) => {
                if self.stack.is_empty() {
                    return Err(self.wf_error("entity reference outside the root element"));
                }
                let name = name.to_string();
                self.expand_general_entity(&name)
            }
            Token::Pi { target, data } => {
                self.track_position();
                if let Some(content) = &self.content {
                    content.borrow_mut().processing_instruction(target, data)?;
                }
                Ok(())
            }
            Token::Comment(text) => {
                self.track_position();
                if let Some(lexical) = &self.lexical {
                    lexical.borrow_mut().comment(text)?;
                }
                Ok(())
            }
            Token::CdataStart => {
                if self.stack.is_empty() {
                    return Err(self.wf_error("CDATA section outside the root element"));
                }
                self.in_cdata = true;
                if let Some(lexical) = &self.lexical {
                    lexical.borrow_mut().start_cdata()?;
                }
                Ok(())
            }
            Token::CdataEnd => {
                self.in_cdata = false;
                if let Some(lexical) = &self.lexical {
                    lexical.borrow_mut().end_cdata()?;
                }
                Ok(())
            }
            Token::DoctypeName(name) => {
                self.doctype_open = true;
                let mut dtd = DtdParser::new();
                dtd.name = name.to_string();
                self.dtd = Some(dtd);
                Ok(())
            }
            Token::DoctypePublicId(id) => {
                self.dtd.as_mut().unwrap().public_id = Some(id.to_string());
                Ok(())
            }
            Token::DoctypeSystemId(id) => {
                self.dtd.as_mut().unwrap().system_id = Some(id.to_string());
                Ok(())
            }
            Token::DtdSubsetOpen => self.report_start_dtd(),
            Token::MarkupDecl(text) => {
                let declarations = self.dtd.as_mut().unwrap().markup_decl(text)?;
                self.report_declarations(declarations)
            }
            Token::DtdPeRef(name) => {
                let name = name.to_string();
                self.expand_parameter_entity(&name)
            }
            Token::DoctypeEnd => {
                self.report_start_dtd()?;
                self.load_external_subset()?;
                self.doctype_open = false;
                if let Some(lexical) = self.lexical.clone() {
                    lexical.borrow_mut().end_dtd()?;
                }
                Ok(())
            }
        }
    }
}

impl ParserCore {
    fn expand_parameter_entity(&mut self, name: &str) -> Result<()> {
        // subset-level parameter entity: internal ones expand to more
        // declarations, external ones are fetched when permitted
        let result = self.dtd.as_mut().unwrap().pe_reference(name);
        match result {
            Ok(declarations) => self.report_declarations(declarations),
            Err(SaxError::Entity(_)) => {
                // external parameter entity
                if !self.features.external_parameter_entities {
                    return self.skip_entity(&format!("%{name};"));
                }
                let def = self.dtd.as_ref().unwrap().parameter_entity_def(name).cloned();
                match def {
                    Some(EntityDef::External { public_id, system_id }) => {
                        let bytes =
                            match self.resolve_bytes(public_id.as_deref(), &system_id)? {
                                Some(bytes) => bytes,
                                None => return self.skip_entity(&format!("%{name};")),
                            };
                        let mut decoder = Decoder::new();
                        decoder.set_allow_xml11(self.features.xml11);
                        let mut text = String::new();
                        decoder.feed(&bytes, &mut text)?;
                        decoder.finish(&mut text)?;
                        let declarations =
                            self.dtd.as_mut().unwrap().external_subset(&text)?;
                        self.report_declarations(declarations)
                    }
                    _ => self.skip_entity(&format!("%{name};")),
                }
            }
            Err(e) => Err(e),
        }
    }
}
