//! The serializer: events in, bytes out.
//!
//! Tracks a pending start tag so `<foo/>` can be emitted when an
//! element turns out to be empty, keeps a namespace stack to drop
//! redundant declarations, and applies the configured output method's
//! escaping rules. Pretty-printing never splits mixed content: once an
//! element has received character data, neither it nor its remaining
//! children are indented.

use std::io::Write;

use xylem_name::{Name, NamespaceStack};

use crate::error::{Result, SaxError};
use crate::handler::{Attributes, ContentHandler, LexicalHandler};

/// Serialization method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMethod {
    /// Standard XML serialization.
    #[default]
    Xml,
    /// HTML5 rules: void elements, raw-text script/style, no
    /// self-closing tags.
    Html,
    /// Text only: character data, nothing else.
    Text,
    /// The JSON output method: character data becomes one JSON string
    /// literal, markup events are rejected. Data-model values (maps,
    /// arrays) serialize upstream, before they reach the event layer.
    Json,
    /// Adaptive output: nodes serialize as XML with no declaration and
    /// no document type.
    Adaptive,
}

/// Output charset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// UTF-8, no BOM.
    #[default]
    Utf8,
    /// UTF-16 big-endian with BOM.
    Utf16,
    /// US-ASCII; non-representable characters become character
    /// references.
    Ascii,
    /// ISO-8859-1; non-representable characters become character
    /// references.
    Latin1,
}

impl Charset {
    fn mime_name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Utf16 => "UTF-16",
            Charset::Ascii => "US-ASCII",
            Charset::Latin1 => "ISO-8859-1",
        }
    }

    fn can_represent(&self, c: char) -> bool {
        match self {
            Charset::Utf8 | Charset::Utf16 => true,
            Charset::Ascii => (c as u32) < 0x80,
            Charset::Latin1 => (c as u32) < 0x100,
        }
    }
}

// quote and escape per JSON string syntax
fn json_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const HTML_RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

struct OpenElement {
    name: Name,
    mixed: bool,
    had_children: bool,
}

/// Writes document events to a byte sink.
pub struct XmlWriter<W: Write> {
    sink: W,
    method: OutputMethod,
    charset: Charset,
    indent: bool,
    indent_step: String,
    omit_xml_declaration: bool,
    standalone: Option<bool>,
    xml11: bool,
    cdata_section_elements: Vec<Name>,
    doctype_public: Option<String>,
    doctype_system: Option<String>,

    wrote_declaration: bool,
    started_output: bool,
    wrote_bom: bool,
    json_text: String,
    pending_tag: Option<(Name, Attributes)>,
    pending_mappings: Vec<(String, String)>,
    stack: Vec<OpenElement>,
    ns: NamespaceStack,
    in_cdata: bool,
    in_dtd: bool,
}

impl<W: Write> XmlWriter<W> {
    /// A writer with default properties: XML method, UTF-8, indent off.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            method: OutputMethod::Xml,
            charset: Charset::Utf8,
            indent: false,
            indent_step: "  ".to_string(),
            omit_xml_declaration: false,
            standalone: None,
            xml11: false,
            cdata_section_elements: Vec::new(),
            doctype_public: None,
            doctype_system: None,
            wrote_declaration: false,
            started_output: false,
            wrote_bom: false,
            json_text: String::new(),
            pending_tag: None,
            pending_mappings: Vec::new(),
            stack: Vec::new(),
            ns: NamespaceStack::new(),
            in_cdata: false,
            in_dtd: false,
        }
    }

    /// Consume the writer, returning the sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.sink.flush()?;
        Ok(self.sink)
    }

    /// Set the serialization method.
    pub fn set_method(&mut self, method: OutputMethod) {
        self.method = method;
    }

    /// Toggle pretty-printing.
    pub fn set_indent(&mut self, indent: bool) {
        self.indent = indent;
    }

    /// Set the output charset.
    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    /// Set the standalone flag written in the XML declaration.
    pub fn set_standalone(&mut self, standalone: Option<bool>) {
        self.standalone = standalone;
    }

    /// Serialize with an XML 1.1 declaration.
    pub fn set_xml11(&mut self, xml11: bool) {
        self.xml11 = xml11;
    }

    /// Suppress the XML declaration.
    pub fn set_omit_xml_declaration(&mut self, omit: bool) {
        self.omit_xml_declaration = omit;
    }

    /// Elements whose text children are wrapped in CDATA sections.
    pub fn set_cdata_section_elements(&mut self, names: Vec<Name>) {
        self.cdata_section_elements = names;
    }

    /// DOCTYPE identifiers emitted before the root element.
    pub fn set_doctype(&mut self, public_id: Option<String>, system_id: Option<String>) {
        self.doctype_public = public_id;
        self.doctype_system = system_id;
    }

    // ---- low-level byte output ---------------------------------------------

    fn put(&mut self, s: &str) -> Result<()> {
        match self.charset {
            Charset::Utf8 => self.sink.write_all(s.as_bytes())?,
            Charset::Utf16 => {
                if !self.wrote_bom {
                    self.wrote_bom = true;
                    self.sink.write_all(&[0xFE, 0xFF])?;
                }
                for unit in s.encode_utf16() {
                    self.sink.write_all(&unit.to_be_bytes())?;
                }
            }
            Charset::Ascii | Charset::Latin1 => {
                for c in s.chars() {
                    if self.charset.can_represent(c) {
                        self.sink.write_all(&[c as u32 as u8])?;
                    } else {
                        // markup has already been vetted; this is
                        // escapable content
                        self.sink
                            .write_all(format!("&#{};", c as u32).as_bytes())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn put_escaped_text(&mut self, text: &str) -> Result<()> {
        let mut buf = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => buf.push_str("&amp;"),
                '<' => buf.push_str("&lt;"),
                '>' => buf.push_str("&gt;"),
                '\r' => buf.push_str("&#13;"),
                c if !self.charset.can_represent(c) => {
                    buf.push_str(&format!("&#{};", c as u32));
                }
                c => buf.push(c),
            }
        }
        self.put(&buf)
    }

    fn put_escaped_attribute(&mut self, value: &str) -> Result<()> {
        let mut buf = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '&' => buf.push_str("&amp;"),
                '<' => buf.push_str("&lt;"),
                '"' => buf.push_str("&quot;"),
                '\t' => buf.push_str("&#9;"),
                '\n' => buf.push_str("&#10;"),
                '\r' => buf.push_str("&#13;"),
                c if !self.charset.can_represent(c) => {
                    buf.push_str(&format!("&#{};", c as u32));
                }
                c => buf.push(c),
            }
        }
        self.put(&buf)
    }

    // ---- structure helpers --------------------------------------------------

    // the json method serializes a data-model value; markup in the
    // event stream has no JSON representation
    fn reject_json_markup(&self) -> Result<()> {
        Err(SaxError::Handler(
            "the json output method cannot serialize markup (SERE0023)".to_string(),
        ))
    }

    fn ensure_declaration(&mut self) -> Result<()> {
        if self.wrote_declaration {
            return Ok(());
        }
        self.wrote_declaration = true;
        if self.method != OutputMethod::Xml || self.omit_xml_declaration {
            return Ok(());
        }
        let version = if self.xml11 { "1.1" } else { "1.0" };
        let mut decl = format!(
            "<?xml version=\"{}\" encoding=\"{}\"",
            version,
            self.charset.mime_name()
        );
        if let Some(standalone) = self.standalone {
            decl.push_str(if standalone {
                " standalone=\"yes\""
            } else {
                " standalone=\"no\""
            });
        }
        decl.push_str("?>");
        self.started_output = true;
        self.put(&decl)
    }

    // close a pending start tag, as a full tag since children follow
    fn flush_pending_tag(&mut self) -> Result<()> {
        if let Some((name, attributes)) = self.pending_tag.take() {
            self.write_start_tag(&name, &attributes)?;
            self.put(">")?;
            self.stack.push(OpenElement {
                name,
                mixed: false,
                had_children: false,
            });
        }
        Ok(())
    }

    fn write_start_tag(&mut self, name: &Name, attributes: &Attributes) -> Result<()> {
        self.put("<")?;
        let rendered = self.render_name(name);
        self.put(&rendered)?;
        self.ns.push_scope();
        // explicit mappings first, deduplicated against the outer scope
        let mappings = std::mem::take(&mut self.pending_mappings);
        for (prefix, uri) in &mappings {
            if self.ns.resolve(prefix) == Some(uri.as_str())
                || (uri.is_empty() && self.ns.resolve(prefix).is_none())
            {
                continue;
            }
            self.ns.declare(prefix, uri);
            self.write_xmlns(prefix, uri)?;
        }
        // the element's own name may need a declaration
        self.ensure_name_declared(name)?;
        let attrs: Vec<_> = attributes.iter().cloned().collect();
        for attr in &attrs {
            if !attr.name.namespace().is_empty() {
                self.ensure_name_declared(&attr.name)?;
            }
        }
        for attr in &attrs {
            self.put(" ")?;
            let rendered = self.render_name(&attr.name);
            self.put(&rendered)?;
            self.put("=\"")?;
            self.put_escaped_attribute(&attr.value)?;
            self.put("\"")?;
        }
        Ok(())
    }

    fn write_xmlns(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if prefix.is_empty() {
            self.put(" xmlns=\"")?;
        } else {
            self.put(" xmlns:")?;
            self.put(prefix)?;
            self.put("=\"")?;
            self.put_escaped_attribute(uri)?;
            self.put("\"")?;
            return Ok(());
        }
        self.put_escaped_attribute(uri)?;
        self.put("\"")
    }

    fn ensure_name_declared(&mut self, name: &Name) -> Result<()> {
        if name.namespace().is_empty() {
            // an unprefixed name in no namespace needs the default
            // namespace to be empty
            if name.prefix().is_empty() && self.ns.resolve("").map_or(false, |u| !u.is_empty()) {
                self.ns.declare("", "");
                self.write_xmlns("", "")?;
            }
            return Ok(());
        }
        let prefix = name.prefix();
        if self.ns.resolve(prefix) != Some(name.namespace()) {
            self.ns.declare(prefix, name.namespace());
            self.write_xmlns(prefix, name.namespace())?;
        }
        Ok(())
    }

    fn render_name(&self, name: &Name) -> String {
        name.qualified()
    }

    fn indent_for_new_child(&mut self) -> Result<()> {
        if !self.indent || self.method == OutputMethod::Text {
            return Ok(());
        }
        if self.stack.iter().any(|e| e.mixed) {
            return Ok(());
        }
        if self.stack.is_empty() && !self.started_output {
            return Ok(());
        }
        let mut s = String::from("\n");
        for _ in 0..self.stack.len() {
            s.push_str(&self.indent_step);
        }
        self.put(&s)
    }

    fn mark_child(&mut self, text: bool) {
        if let Some(top) = self.stack.last_mut() {
            top.had_children = true;
            if text {
                top.mixed = true;
            }
        }
    }

    fn is_html_void(&self, name: &Name) -> bool {
        self.method == OutputMethod::Html
            && HTML_VOID_ELEMENTS
                .iter()
                .any(|v| name.local_name().eq_ignore_ascii_case(v))
    }

    fn in_raw_text_element(&self) -> bool {
        self.method == OutputMethod::Html
            && self
                .stack
                .last()
                .map(|e| {
                    HTML_RAW_TEXT_ELEMENTS
                        .iter()
                        .any(|v| e.name.local_name().eq_ignore_ascii_case(v))
                })
                .unwrap_or(false)
    }

    fn wants_cdata(&self) -> bool {
        self.stack
            .last()
            .map(|e| self.cdata_section_elements.iter().any(|n| *n == e.name))
            .unwrap_or(false)
    }

    // ---- event API ----------------------------------------------------------

    /// Begin the document; writes the XML declaration unless omitted.
    pub fn start_document(&mut self) -> Result<()> {
        self.ensure_declaration()
    }

    /// Finish the document, flushing the sink.
    pub fn end_document(&mut self) -> Result<()> {
        if self.method == OutputMethod::Json {
            let rendered = json_string_literal(&std::mem::take(&mut self.json_text));
            self.put(&rendered)?;
            self.sink.flush()?;
            return Ok(());
        }
        self.flush_pending_tag()?;
        self.sink.flush()?;
        Ok(())
    }

    /// Record a prefix mapping for the next start tag.
    pub fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.pending_mappings.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    /// End of a prefix scope; the namespace stack tracks this with the
    /// element structure.
    pub fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    /// Start an element.
    pub fn start_element(&mut self, name: &Name, attributes: &Attributes) -> Result<()> {
        match self.method {
            OutputMethod::Text => return Ok(()),
            OutputMethod::Json => return self.reject_json_markup(),
            _ => {}
        }
        self.ensure_declaration()?;
        self.write_doctype_if_pending(name)?;
        self.flush_pending_tag()?;
        self.indent_for_new_child()?;
        self.mark_child(false);
        self.started_output = true;
        self.pending_tag = Some((name.clone(), attributes.clone()));
        Ok(())
    }

    /// End an element; collapses `<a></a>` to `<a/>` in the XML method.
    pub fn end_element(&mut self, name: &Name) -> Result<()> {
        if matches!(self.method, OutputMethod::Text | OutputMethod::Json) {
            return Ok(());
        }
        if let Some((pending_name, attributes)) = self.pending_tag.take() {
            self.write_start_tag(&pending_name, &attributes)?;
            if self.method == OutputMethod::Html {
                if self.is_html_void(&pending_name) {
                    self.put(">")?;
                } else {
                    self.put(">")?;
                    let rendered = self.render_name(&pending_name);
                    self.put("</")?;
                    self.put(&rendered)?;
                    self.put(">")?;
                }
            } else {
                self.put("/>")?;
            }
            self.ns.pop_scope();
            return Ok(());
        }
        let open = self.stack.pop().ok_or_else(|| {
            SaxError::Handler("end_element without matching start_element".to_string())
        })?;
        if open.had_children && !open.mixed && self.indent {
            let mut s = String::from("\n");
            for _ in 0..self.stack.len() {
                s.push_str(&self.indent_step);
            }
            self.put(&s)?;
        }
        let rendered = self.render_name(name);
        self.put("</")?;
        self.put(&rendered)?;
        self.put(">")?;
        self.ns.pop_scope();
        Ok(())
    }

    /// Character data.
    pub fn characters(&mut self, text: &str) -> Result<()> {
        match self.method {
            OutputMethod::Text => return self.put(text),
            OutputMethod::Json => {
                self.json_text.push_str(text);
                return Ok(());
            }
            _ => {}
        }
        self.flush_pending_tag()?;
        if !text.chars().all(|c| c.is_whitespace()) {
            self.mark_child(true);
        }
        if self.in_cdata || self.wants_cdata() {
            let needs_own_section = !self.in_cdata;
            if needs_own_section {
                self.put("<![CDATA[")?;
            }
            // a ]]> inside the data splits the section
            self.put(&text.replace("]]>", "]]]]><![CDATA[>"))?;
            if needs_own_section {
                self.put("]]>")?;
            }
            return Ok(());
        }
        if self.in_raw_text_element() {
            return self.put(text);
        }
        self.put_escaped_text(text)
    }

    /// A comment.
    pub fn comment(&mut self, text: &str) -> Result<()> {
        match self.method {
            OutputMethod::Text => return Ok(()),
            OutputMethod::Json => return self.reject_json_markup(),
            _ => {}
        }
        self.ensure_declaration()?;
        self.flush_pending_tag()?;
        self.indent_for_new_child()?;
        self.mark_child(false);
        self.started_output = true;
        self.put("<!--")?;
        self.put(text)?;
        self.put("-->")
    }

    /// A processing instruction.
    pub fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        match self.method {
            OutputMethod::Text => return Ok(()),
            OutputMethod::Json => return self.reject_json_markup(),
            _ => {}
        }
        self.ensure_declaration()?;
        self.flush_pending_tag()?;
        self.indent_for_new_child()?;
        self.mark_child(false);
        self.started_output = true;
        self.put("<?")?;
        self.put(target)?;
        if !data.is_empty() {
            self.put(" ")?;
            self.put(data)?;
        }
        self.put("?>")
    }

    /// Begin a CDATA section.
    pub fn start_cdata(&mut self) -> Result<()> {
        if self.method != OutputMethod::Xml {
            return Ok(());
        }
        self.flush_pending_tag()?;
        self.mark_child(true);
        self.in_cdata = true;
        self.put("<![CDATA[")
    }

    /// End a CDATA section.
    pub fn end_cdata(&mut self) -> Result<()> {
        if self.method != OutputMethod::Xml {
            return Ok(());
        }
        self.in_cdata = false;
        self.put("]]>")
    }

    /// Write a string with no escaping.
    pub fn write_raw(&mut self, text: &str) -> Result<()> {
        self.flush_pending_tag()?;
        self.put(text)
    }

    fn write_doctype_if_pending(&mut self, root: &Name) -> Result<()> {
        if matches!(self.method, OutputMethod::Json | OutputMethod::Adaptive) {
            return Ok(());
        }
        if self.stack.is_empty() && self.pending_tag.is_none() {
            if self.method == OutputMethod::Html
                && self.doctype_public.is_none()
                && self.doctype_system.is_none()
            {
                self.started_output = true;
                self.put("<!DOCTYPE html>")?;
                return Ok(());
            }
            if self.doctype_public.is_some() || self.doctype_system.is_some() {
                let public = self.doctype_public.take();
                let system = self.doctype_system.take();
                self.put(&format!("<!DOCTYPE {}", root.qualified()))?;
                match (public, system) {
                    (Some(public), Some(system)) => {
                        self.put(&format!(" PUBLIC \"{public}\" \"{system}\""))?;
                    }
                    (None, Some(system)) => {
                        self.put(&format!(" SYSTEM \"{system}\""))?;
                    }
                    (Some(public), None) => {
                        self.put(&format!(" PUBLIC \"{public}\""))?;
                    }
                    (None, None) => {}
                }
                self.put(">")?;
            }
        }
        Ok(())
    }

    // ---- DTD writing --------------------------------------------------------

    /// Open a DOCTYPE declaration with an internal subset.
    pub fn write_start_dtd(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<()> {
        self.ensure_declaration()?;
        self.put(&format!("<!DOCTYPE {name}"))?;
        match (public_id, system_id) {
            (Some(public), Some(system)) => {
                self.put(&format!(" PUBLIC \"{public}\" \"{system}\""))?;
            }
            (None, Some(system)) => self.put(&format!(" SYSTEM \"{system}\""))?,
            _ => {}
        }
        self.in_dtd = true;
        self.put(" [")
    }

    /// Close the DOCTYPE declaration.
    pub fn write_end_dtd(&mut self) -> Result<()> {
        if !self.in_dtd {
            return Err(SaxError::Handler(
                "write_end_dtd without write_start_dtd".to_string(),
            ));
        }
        self.in_dtd = false;
        self.put("]>")
    }

    /// An element declaration.
    pub fn write_element_decl(&mut self, name: &str, model: &str) -> Result<()> {
        self.put(&format!("<!ELEMENT {name} {model}>"))
    }

    /// An attribute declaration.
    pub fn write_attribute_decl(
        &mut self,
        element: &str,
        attribute: &str,
        att_type: &str,
        mode: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let mut decl = format!("<!ATTLIST {element} {attribute} {att_type}");
        if !mode.is_empty() {
            decl.push(' ');
            decl.push_str(mode);
        }
        if let Some(value) = value {
            decl.push_str(&format!(" \"{value}\""));
        }
        decl.push('>');
        self.put(&decl)
    }

    /// An internal entity declaration.
    pub fn write_internal_entity_decl(&mut self, name: &str, value: &str) -> Result<()> {
        if let Some(pe) = name.strip_prefix('%') {
            self.put(&format!("<!ENTITY % {pe} \"{value}\">"))
        } else {
            self.put(&format!("<!ENTITY {name} \"{value}\">"))
        }
    }

    /// An external entity declaration.
    pub fn write_external_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<()> {
        match public_id {
            Some(public) => {
                self.put(&format!("<!ENTITY {name} PUBLIC \"{public}\" \"{system_id}\">"))
            }
            None => self.put(&format!("<!ENTITY {name} SYSTEM \"{system_id}\">")),
        }
    }

    /// A notation declaration.
    pub fn write_notation_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<()> {
        match (public_id, system_id) {
            (Some(public), Some(system)) => {
                self.put(&format!("<!NOTATION {name} PUBLIC \"{public}\" \"{system}\">"))
            }
            (Some(public), None) => self.put(&format!("<!NOTATION {name} PUBLIC \"{public}\">")),
            (None, Some(system)) => self.put(&format!("<!NOTATION {name} SYSTEM \"{system}\">")),
            (None, None) => Err(SaxError::Handler(
                "notation declaration requires an identifier".to_string(),
            )),
        }
    }

    /// An unparsed entity declaration.
    pub fn write_unparsed_entity_decl(
        &mut self,
        name: &str,
        public_id: Option<&str>,
        system_id: &str,
        notation: &str,
    ) -> Result<()> {
        match public_id {
            Some(public) => self.put(&format!(
                "<!ENTITY {name} PUBLIC \"{public}\" \"{system_id}\" NDATA {notation}>"
            )),
            None => self.put(&format!(
                "<!ENTITY {name} SYSTEM \"{system_id}\" NDATA {notation}>"
            )),
        }
    }
}

impl<W: Write> ContentHandler for XmlWriter<W> {
    fn start_document(&mut self) -> Result<()> {
        XmlWriter::start_document(self)
    }
    fn end_document(&mut self) -> Result<()> {
        XmlWriter::end_document(self)
    }
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        XmlWriter::start_prefix_mapping(self, prefix, uri)
    }
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        XmlWriter::end_prefix_mapping(self, prefix)
    }
    fn start_element(&mut self, name: &Name, attributes: &Attributes) -> Result<()> {
        XmlWriter::start_element(self, name, attributes)
    }
    fn end_element(&mut self, name: &Name) -> Result<()> {
        XmlWriter::end_element(self, name)
    }
    fn characters(&mut self, text: &str) -> Result<()> {
        XmlWriter::characters(self, text)
    }
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        XmlWriter::processing_instruction(self, target, data)
    }
    fn skipped_entity(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }
}

impl<W: Write> LexicalHandler for XmlWriter<W> {
    fn comment(&mut self, text: &str) -> Result<()> {
        XmlWriter::comment(self, text)
    }
    fn start_cdata(&mut self) -> Result<()> {
        XmlWriter::start_cdata(self)
    }
    fn end_cdata(&mut self) -> Result<()> {
        XmlWriter::end_cdata(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xylem_name::Name;

    fn utf8(writer: XmlWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn empty_element_optimization() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_omit_xml_declaration(true);
        w.start_document().unwrap();
        let name = Name::local("a");
        w.start_element(&name, &Attributes::new()).unwrap();
        w.end_element(&name).unwrap();
        w.end_document().unwrap();
        assert_eq!(utf8(w), "<a/>");
    }

    #[test]
    fn attribute_and_text_escaping() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_omit_xml_declaration(true);
        w.start_document().unwrap();
        let name = Name::local("a");
        let mut attrs = Attributes::new();
        attrs.push(Name::local("q"), "a\"b<c\n");
        w.start_element(&name, &attrs).unwrap();
        w.characters("x < y & z").unwrap();
        w.end_element(&name).unwrap();
        w.end_document().unwrap();
        assert_eq!(
            utf8(w),
            "<a q=\"a&quot;b&lt;c&#10;\">x &lt; y &amp; z</a>"
        );
    }

    #[test]
    fn prefix_mappings_become_xmlns() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_omit_xml_declaration(true);
        w.start_document().unwrap();
        w.start_prefix_mapping("p", "urn:u").unwrap();
        let name = Name::prefixed("urn:u", "a", "p");
        w.start_element(&name, &Attributes::new()).unwrap();
        w.end_element(&name).unwrap();
        w.end_document().unwrap();
        assert_eq!(utf8(w), "<p:a xmlns:p=\"urn:u\"/>");
    }

    #[test]
    fn redundant_redeclaration_dropped() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_omit_xml_declaration(true);
        w.start_document().unwrap();
        w.start_prefix_mapping("p", "urn:u").unwrap();
        let outer = Name::prefixed("urn:u", "a", "p");
        w.start_element(&outer, &Attributes::new()).unwrap();
        w.start_prefix_mapping("p", "urn:u").unwrap();
        let inner = Name::prefixed("urn:u", "b", "p");
        w.start_element(&inner, &Attributes::new()).unwrap();
        w.end_element(&inner).unwrap();
        w.end_element(&outer).unwrap();
        w.end_document().unwrap();
        assert_eq!(utf8(w), "<p:a xmlns:p=\"urn:u\"><p:b/></p:a>");
    }

    #[test]
    fn indent_skips_mixed_content() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_omit_xml_declaration(true);
        w.set_indent(true);
        w.start_document().unwrap();
        let doc = Name::local("doc");
        let a = Name::local("a");
        let b = Name::local("b");
        w.start_element(&doc, &Attributes::new()).unwrap();
        w.start_element(&a, &Attributes::new()).unwrap();
        w.characters("mixed ").unwrap();
        w.start_element(&b, &Attributes::new()).unwrap();
        w.end_element(&b).unwrap();
        w.end_element(&a).unwrap();
        w.end_element(&doc).unwrap();
        w.end_document().unwrap();
        assert_eq!(utf8(w), "<doc>\n  <a>mixed <b/></a>\n</doc>");
    }

    #[test]
    fn html_void_elements() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_method(OutputMethod::Html);
        w.start_document().unwrap();
        let html = Name::local("html");
        let br = Name::local("br");
        w.start_element(&html, &Attributes::new()).unwrap();
        w.start_element(&br, &Attributes::new()).unwrap();
        w.end_element(&br).unwrap();
        w.end_element(&html).unwrap();
        w.end_document().unwrap();
        assert_eq!(utf8(w), "<!DOCTYPE html><html><br></html>");
    }

    #[test]
    fn json_method_renders_text_as_a_json_string() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_method(OutputMethod::Json);
        w.start_document().unwrap();
        w.characters("say \"hi\"\n").unwrap();
        w.end_document().unwrap();
        assert_eq!(utf8(w), r#""say \"hi\"\n""#);
    }

    #[test]
    fn json_method_rejects_markup() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_method(OutputMethod::Json);
        w.start_document().unwrap();
        let result = w.start_element(&Name::local("a"), &Attributes::new());
        assert!(result.is_err());
    }

    #[test]
    fn adaptive_method_serializes_nodes_as_xml_without_declaration() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_method(OutputMethod::Adaptive);
        w.start_document().unwrap();
        let name = Name::local("a");
        w.start_element(&name, &Attributes::new()).unwrap();
        w.characters("x < y").unwrap();
        w.end_element(&name).unwrap();
        w.end_document().unwrap();
        assert_eq!(utf8(w), "<a>x &lt; y</a>");
    }

    #[test]
    fn cdata_section_elements() {
        let mut w = XmlWriter::new(Vec::new());
        w.set_omit_xml_declaration(true);
        w.set_cdata_section_elements(vec![Name::local("code")]);
        w.start_document().unwrap();
        let code = Name::local("code");
        w.start_element(&code, &Attributes::new()).unwrap();
        w.characters("if (a < b) {}").unwrap();
        w.end_element(&code).unwrap();
        w.end_document().unwrap();
        assert_eq!(utf8(w), "<code><![CDATA[if (a < b) {}]]></code>");
    }
}
