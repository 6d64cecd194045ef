//! The DTD parser.
//!
//! Activated when the tokenizer reports a DOCTYPE. Parses markup
//! declarations out of the internal subset (and, through the entity
//! resolver, the external subset), reports declaration events, and
//! maintains the entity and attribute-default tables the content parser
//! consults. Content models are parsed for well-formedness and reported
//! verbatim; they are not enforced here.

use ahash::{HashMap, HashMapExt};

use crate::chars::{is_name, is_name_char, is_name_start_char, is_whitespace_char};
use crate::error::{Diagnostic, Result, SaxError};
use crate::handler::AttributeType;

// parameter-entity expansion depth guard
const MAX_PE_DEPTH: usize = 32;

/// A declared entity.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EntityDef {
    /// Internal entity with replacement text.
    Internal(String),
    /// External parsed entity.
    External {
        public_id: Option<String>,
        system_id: String,
    },
    /// Unparsed (NDATA) entity.
    Unparsed {
        public_id: Option<String>,
        system_id: String,
        notation: String,
    },
}

/// How an attribute default was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DefaultMode {
    Required,
    Implied,
    Fixed,
    Default,
}

impl DefaultMode {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            DefaultMode::Required => "#REQUIRED",
            DefaultMode::Implied => "#IMPLIED",
            DefaultMode::Fixed => "#FIXED",
            DefaultMode::Default => "",
        }
    }
}

/// One attribute definition out of an ATTLIST declaration.
#[derive(Debug, Clone)]
pub(crate) struct AttDef {
    pub(crate) name: String,
    pub(crate) att_type: AttributeType,
    pub(crate) mode: DefaultMode,
    pub(crate) value: Option<String>,
}

/// A declaration parsed out of a markup declaration; the content parser
/// relays these to the registered handlers.
#[derive(Debug, Clone)]
pub(crate) enum Declaration {
    Element {
        name: String,
        model: String,
    },
    Attribute {
        element: String,
        attribute: String,
        att_type: AttributeType,
        mode: DefaultMode,
        value: Option<String>,
    },
    InternalEntity {
        name: String,
        value: String,
    },
    ExternalEntity {
        name: String,
        public_id: Option<String>,
        system_id: String,
    },
    UnparsedEntity {
        name: String,
        public_id: Option<String>,
        system_id: String,
        notation: String,
    },
    Notation {
        name: String,
        public_id: Option<String>,
        system_id: Option<String>,
    },
}

#[derive(Debug, Default)]
pub(crate) struct DtdParser {
    pub(crate) name: String,
    pub(crate) public_id: Option<String>,
    pub(crate) system_id: Option<String>,
    general: HashMap<String, EntityDef>,
    parameter: HashMap<String, EntityDef>,
    attlists: HashMap<String, Vec<AttDef>>,
    declared_elements: HashMap<String, String>,
    notations: HashMap<String, (Option<String>, Option<String>)>,
}

impl DtdParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn general_entity(&self, name: &str) -> Option<&EntityDef> {
        self.general.get(name)
    }

    pub(crate) fn parameter_entity_def(&self, name: &str) -> Option<&EntityDef> {
        self.parameter.get(name)
    }

    pub(crate) fn unparsed_entity(&self, name: &str) -> Option<(&str, Option<&str>)> {
        match self.general.get(name) {
            Some(EntityDef::Unparsed { system_id, public_id, .. }) => {
                Some((system_id.as_str(), public_id.as_deref()))
            }
            _ => None,
        }
    }

    pub(crate) fn attribute_defs(&self, element: &str) -> Option<&[AttDef]> {
        self.attlists.get(element).map(|v| v.as_slice())
    }

    pub(crate) fn is_element_declared(&self, element: &str) -> bool {
        self.declared_elements.contains_key(element)
    }

    pub(crate) fn is_notation_declared(&self, notation: &str) -> bool {
        self.notations.contains_key(notation)
    }

    /// Parse one markup declaration interior, e.g. `ELEMENT a (b|c)*`.
    /// Returns the declarations to report (an ATTLIST yields one per
    /// attribute definition).
    pub(crate) fn markup_decl(&mut self, text: &str) -> Result<Vec<Declaration>> {
        let expanded = self.expand_pe_refs(text, 0)?;
        let mut scanner = Scanner::new(&expanded);
        let keyword = scanner.name_or_keyword()?;
        match keyword.as_str() {
            "ELEMENT" => self.element_decl(&mut scanner).map(|d| vec![d]),
            "ATTLIST" => self.attlist_decl(&mut scanner),
            "ENTITY" => self.entity_decl(&mut scanner).map(|d| d.into_iter().collect()),
            "NOTATION" => self.notation_decl(&mut scanner).map(|d| vec![d]),
            other => Err(decl_error(format!(
                "unknown markup declaration {other:?}"
            ))),
        }
    }

    /// Parse the text of an external DTD subset (or external parameter
    /// entity), collecting declarations in order.
    pub(crate) fn external_subset(&mut self, text: &str) -> Result<Vec<Declaration>> {
        let mut declarations = Vec::new();
        self.subset_text(text, 0, &mut declarations)?;
        Ok(declarations)
    }

    fn subset_text(
        &mut self,
        text: &str,
        depth: usize,
        declarations: &mut Vec<Declaration>,
    ) -> Result<()> {
        if depth > MAX_PE_DEPTH {
            return Err(decl_error("parameter entity expansion too deep"));
        }
        let mut rest = text;
        loop {
            rest = rest.trim_start_matches(|c| is_whitespace_char(c));
            if rest.is_empty() {
                return Ok(());
            }
            if let Some(after) = rest.strip_prefix("<!--") {
                let end = after
                    .find("-->")
                    .ok_or_else(|| decl_error("unterminated comment in DTD"))?;
                rest = &after[end + 3..];
            } else if let Some(after) = rest.strip_prefix("<?") {
                let end = after
                    .find("?>")
                    .ok_or_else(|| decl_error("unterminated processing instruction in DTD"))?;
                rest = &after[end + 2..];
            } else if let Some(after) = rest.strip_prefix("<![") {
                // conditional section
                let open = after
                    .find('[')
                    .ok_or_else(|| decl_error("malformed conditional section"))?;
                let keyword = self.expand_pe_refs(after[..open].trim(), depth + 1)?;
                let body_start = open + 1;
                let end = find_conditional_end(&after[body_start..])
                    .ok_or_else(|| decl_error("unterminated conditional section"))?;
                let body = &after[body_start..body_start + end];
                match keyword.trim() {
                    "INCLUDE" => self.subset_text(body, depth + 1, declarations)?,
                    "IGNORE" => {}
                    other => {
                        return Err(decl_error(format!(
                            "unknown conditional section keyword {other:?}"
                        )))
                    }
                }
                rest = &after[body_start + end + 3..];
            } else if let Some(after) = rest.strip_prefix("<!") {
                let end = find_decl_end(after)
                    .ok_or_else(|| decl_error("unterminated markup declaration"))?;
                declarations.extend(self.markup_decl(&after[..end])?);
                rest = &after[end + 1..];
            } else if let Some(after) = rest.strip_prefix('%') {
                let semi = after
                    .find(';')
                    .ok_or_else(|| decl_error("unterminated parameter entity reference"))?;
                let name = &after[..semi];
                let replacement = self.parameter_replacement(name)?;
                self.subset_text(&replacement, depth + 1, declarations)?;
                rest = &after[semi + 1..];
            } else {
                return Err(decl_error(format!(
                    "unexpected content in DTD subset: {:?}",
                    &rest[..rest.len().min(20)]
                )));
            }
        }
    }

    /// A parameter entity reference at subset level.
    pub(crate) fn pe_reference(&mut self, name: &str) -> Result<Vec<Declaration>> {
        let replacement = self.parameter_replacement(name)?;
        self.external_subset(&replacement)
    }

    fn parameter_replacement(&self, name: &str) -> Result<String> {
        match self.parameter.get(name) {
            Some(EntityDef::Internal(value)) => Ok(value.clone()),
            Some(_) => Err(SaxError::Entity(Diagnostic::new(
                format!("external parameter entity %{name}; was not loaded"),
                0,
                0,
            ))),
            None => Err(decl_error(format!("parameter entity %{name}; is not declared"))),
        }
    }

    // expand %pe; references occurring outside quoted literals
    fn expand_pe_refs(&self, text: &str, depth: usize) -> Result<String> {
        if !text.contains('%') {
            return Ok(text.to_string());
        }
        if depth > MAX_PE_DEPTH {
            return Err(decl_error("parameter entity expansion too deep"));
        }
        let mut out = String::with_capacity(text.len());
        let mut quote: Option<char> = None;
        let mut chars = text.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match quote {
                Some(q) => {
                    out.push(c);
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '"' | '\'' => {
                        quote = Some(c);
                        out.push(c);
                    }
                    '%' => {
                        let rest = &text[i + 1..];
                        match rest.find(';') {
                            Some(semi) if is_name(&rest[..semi]) => {
                                let name = &rest[..semi];
                                let replacement = self.parameter_replacement(name)?;
                                // per XML 1.0 §4.4.8 the replacement is
                                // padded with spaces in declarations
                                out.push(' ');
                                out.push_str(&self.expand_pe_refs(&replacement, depth + 1)?);
                                out.push(' ');
                                for _ in 0..semi + 1 {
                                    chars.next();
                                }
                            }
                            _ => out.push(c),
                        }
                    }
                    _ => out.push(c),
                },
            }
        }
        Ok(out)
    }

    fn element_decl(&mut self, scanner: &mut Scanner) -> Result<Declaration> {
        let name = scanner.name()?;
        scanner.skip_ws();
        let model = scanner.rest().trim().to_string();
        if model.is_empty() {
            return Err(decl_error("element declaration is missing a content model"));
        }
        self.declared_elements
            .entry(name.clone())
            .or_insert_with(|| model.clone());
        Ok(Declaration::Element { name, model })
    }

    fn attlist_decl(&mut self, scanner: &mut Scanner) -> Result<Vec<Declaration>> {
        let element = scanner.name()?;
        let mut declarations = Vec::new();
        loop {
            scanner.skip_ws();
            if scanner.at_end() {
                break;
            }
            let attribute = scanner.name()?;
            scanner.skip_ws();
            let att_type = self.attribute_type(scanner)?;
            scanner.skip_ws();
            let (mode, value) = self.default_decl(scanner, &att_type)?;
            let def = AttDef {
                name: attribute.clone(),
                att_type: att_type.clone(),
                mode,
                value: value.clone(),
            };
            let defs = self.attlists.entry(element.clone()).or_default();
            // first declaration of an attribute wins
            if !defs.iter().any(|d| d.name == attribute) {
                defs.push(def);
            }
            declarations.push(Declaration::Attribute {
                element: element.clone(),
                attribute,
                att_type,
                mode,
                value,
            });
        }
        Ok(declarations)
    }

    fn attribute_type(&self, scanner: &mut Scanner) -> Result<AttributeType> {
        if scanner.peek() == Some('(') {
            let names = scanner.enumeration()?;
            return Ok(AttributeType::Enumeration(names));
        }
        let keyword = scanner.name_or_keyword()?;
        Ok(match keyword.as_str() {
            "CDATA" => AttributeType::Cdata,
            "ID" => AttributeType::Id,
            "IDREF" => AttributeType::Idref,
            "IDREFS" => AttributeType::Idrefs,
            "ENTITY" => AttributeType::Entity,
            "ENTITIES" => AttributeType::Entities,
            "NMTOKEN" => AttributeType::Nmtoken,
            "NMTOKENS" => AttributeType::Nmtokens,
            "NOTATION" => {
                scanner.skip_ws();
                AttributeType::Notation(scanner.enumeration()?)
            }
            other => {
                return Err(decl_error(format!("unknown attribute type {other:?}")));
            }
        })
    }

    fn default_decl(
        &self,
        scanner: &mut Scanner,
        att_type: &AttributeType,
    ) -> Result<(DefaultMode, Option<String>)> {
        if scanner.peek() == Some('#') {
            scanner.bump();
            let keyword = scanner.name_or_keyword()?;
            match keyword.as_str() {
                "REQUIRED" => return Ok((DefaultMode::Required, None)),
                "IMPLIED" => return Ok((DefaultMode::Implied, None)),
                "FIXED" => {
                    scanner.skip_ws();
                    let raw = scanner.quoted()?;
                    let value = self.normalize_default(&raw, att_type)?;
                    return Ok((DefaultMode::Fixed, Some(value)));
                }
                other => {
                    return Err(decl_error(format!("unknown default keyword #{other}")));
                }
            }
        }
        let raw = scanner.quoted()?;
        let value = self.normalize_default(&raw, att_type)?;
        Ok((DefaultMode::Default, Some(value)))
    }

    // char refs resolved, whitespace mapped; entity refs must be
    // predefined or internal
    fn normalize_default(&self, raw: &str, att_type: &AttributeType) -> Result<String> {
        let mut value = resolve_value_references(raw, &self.general, 0)?;
        if att_type.is_tokenized() {
            value = value.split(' ').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
        }
        Ok(value)
    }

    fn entity_decl(&mut self, scanner: &mut Scanner) -> Result<Option<Declaration>> {
        scanner.skip_ws();
        let is_parameter = if scanner.peek() == Some('%') {
            scanner.bump();
            scanner.skip_ws();
            true
        } else {
            false
        };
        let name = scanner.name()?;
        scanner.skip_ws();
        let declaration = if scanner.peek() == Some('"') || scanner.peek() == Some('\'') {
            let raw = scanner.quoted()?;
            let value = resolve_entity_value(&raw)?;
            let def = EntityDef::Internal(value.clone());
            let fresh = self.store_entity(is_parameter, &name, def);
            fresh.then(|| Declaration::InternalEntity {
                name: decorated_name(is_parameter, &name),
                value,
            })
        } else {
            let (public_id, system_id) = scanner.external_id()?;
            let system_id = system_id
                .ok_or_else(|| decl_error("external entity requires a system identifier"))?;
            scanner.skip_ws();
            if !scanner.at_end() {
                let keyword = scanner.name_or_keyword()?;
                if keyword != "NDATA" {
                    return Err(decl_error(format!("unexpected keyword {keyword:?}")));
                }
                if is_parameter {
                    return Err(decl_error("parameter entities may not be unparsed"));
                }
                scanner.skip_ws();
                let notation = scanner.name()?;
                let def = EntityDef::Unparsed {
                    public_id: public_id.clone(),
                    system_id: system_id.clone(),
                    notation: notation.clone(),
                };
                let fresh = self.store_entity(false, &name, def);
                fresh.then_some(Declaration::UnparsedEntity {
                    name,
                    public_id,
                    system_id,
                    notation,
                })
            } else {
                let def = EntityDef::External {
                    public_id: public_id.clone(),
                    system_id: system_id.clone(),
                };
                let fresh = self.store_entity(is_parameter, &name, def);
                fresh.then(|| Declaration::ExternalEntity {
                    name: decorated_name(is_parameter, &name),
                    public_id,
                    system_id,
                })
            }
        };
        Ok(declaration)
    }

    // first declaration wins; returns whether this one was fresh
    fn store_entity(&mut self, parameter: bool, name: &str, def: EntityDef) -> bool {
        let table = if parameter {
            &mut self.parameter
        } else {
            &mut self.general
        };
        if table.contains_key(name) {
            return false;
        }
        table.insert(name.to_string(), def);
        true
    }

    fn notation_decl(&mut self, scanner: &mut Scanner) -> Result<Declaration> {
        let name = scanner.name()?;
        scanner.skip_ws();
        let (public_id, system_id) = scanner.notation_id()?;
        self.notations
            .insert(name.clone(), (public_id.clone(), system_id.clone()));
        Ok(Declaration::Notation {
            name,
            public_id,
            system_id,
        })
    }
}

fn decorated_name(parameter: bool, name: &str) -> String {
    if parameter {
        format!("%{name}")
    } else {
        name.to_string()
    }
}

fn decl_error(message: impl Into<String>) -> SaxError {
    SaxError::WellFormedness(Diagnostic::new(message, 0, 0))
}

// entity values keep general entity refs as-is but resolve character
// references and validate parameter entity absence (internal subset rule)
fn resolve_entity_value(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find("&#") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let semi = after
            .find(';')
            .ok_or_else(|| decl_error("unterminated character reference"))?;
        let c = parse_char_ref(&after[..semi])?;
        out.push(c);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

// resolve references in an attribute default value: char refs inline,
// predefined and internal general entities recursively
fn resolve_value_references(
    raw: &str,
    general: &HashMap<String, EntityDef>,
    depth: usize,
) -> Result<String> {
    if depth > MAX_PE_DEPTH {
        return Err(decl_error("entity expansion too deep"));
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&map_literal_whitespace(&rest[..pos]));
        let after = &rest[pos + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| decl_error("unterminated reference in attribute default"))?;
        let name = &after[..semi];
        if let Some(digits) = name.strip_prefix('#') {
            out.push(parse_char_ref(digits)?);
        } else {
            match name {
                "lt" => out.push('<'),
                "gt" => out.push('>'),
                "amp" => out.push('&'),
                "apos" => out.push('\''),
                "quot" => out.push('"'),
                _ => match general.get(name) {
                    Some(EntityDef::Internal(value)) => {
                        out.push_str(&resolve_value_references(value, general, depth + 1)?);
                    }
                    Some(_) => {
                        return Err(decl_error(format!(
                            "external entity &{name}; is not allowed in an attribute value"
                        )));
                    }
                    None => {
                        return Err(decl_error(format!("entity &{name}; is not declared")));
                    }
                },
            }
        }
        rest = &after[semi + 1..];
    }
    out.push_str(&map_literal_whitespace(rest));
    Ok(out)
}

fn map_literal_whitespace(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

fn parse_char_ref(digits: &str) -> Result<char> {
    let value = if let Some(hex) = digits.strip_prefix('x') {
        u32::from_str_radix(hex, 16)
    } else {
        digits.parse::<u32>()
    }
    .map_err(|_| decl_error("invalid character reference"))?;
    char::from_u32(value).ok_or_else(|| decl_error("invalid character reference"))
}

// find the '>' ending a declaration, respecting quoted literals
fn find_decl_end(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

// find the "]]>" ending a conditional section, allowing nesting; byte
// comparisons, since both markers are ASCII and cannot begin inside a
// UTF-8 continuation
fn find_conditional_end(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i + 3 <= bytes.len() {
        if &bytes[i..i + 3] == b"<![" {
            depth += 1;
            i += 3;
        } else if &bytes[i..i + 3] == b"]]>" {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
            i += 3;
        } else {
            i += 1;
        }
    }
    None
}

/// A little cursor over declaration text.
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.rest().trim().is_empty()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if is_whitespace_char(c)) {
            self.bump();
        }
    }

    fn name(&mut self) -> Result<String> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some(c) if is_name_start_char(c) => self.bump(),
            _ => return Err(decl_error("expected a name")),
        }
        while matches!(self.peek(), Some(c) if is_name_char(c)) {
            self.bump();
        }
        Ok(self.text[start..self.pos].to_string())
    }

    // a name or an all-caps keyword such as CDATA
    fn name_or_keyword(&mut self) -> Result<String> {
        self.name()
    }

    fn quoted(&mut self) -> Result<String> {
        self.skip_ws();
        let quote = match self.peek() {
            Some(c @ ('"' | '\'')) => c,
            _ => return Err(decl_error("expected a quoted literal")),
        };
        self.bump();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let value = self.text[start..self.pos].to_string();
                self.bump();
                return Ok(value);
            }
            self.bump();
        }
        Err(decl_error("unterminated literal"))
    }

    fn enumeration(&mut self) -> Result<Vec<String>> {
        self.skip_ws();
        if self.peek() != Some('(') {
            return Err(decl_error("expected '('"));
        }
        self.bump();
        let mut names = Vec::new();
        loop {
            self.skip_ws();
            let start = self.pos;
            while matches!(self.peek(), Some(c) if is_name_char(c)) {
                self.bump();
            }
            if start == self.pos {
                return Err(decl_error("expected a name token in enumeration"));
            }
            names.push(self.text[start..self.pos].to_string());
            self.skip_ws();
            match self.peek() {
                Some('|') => self.bump(),
                Some(')') => {
                    self.bump();
                    return Ok(names);
                }
                _ => return Err(decl_error("expected '|' or ')' in enumeration")),
            }
        }
    }

    fn external_id(&mut self) -> Result<(Option<String>, Option<String>)> {
        let keyword = self.name_or_keyword()?;
        match keyword.as_str() {
            "SYSTEM" => {
                let system = self.quoted()?;
                Ok((None, Some(system)))
            }
            "PUBLIC" => {
                let public = self.quoted()?;
                let system = self.quoted()?;
                Ok((Some(public), Some(system)))
            }
            other => Err(decl_error(format!("expected SYSTEM or PUBLIC, got {other:?}"))),
        }
    }

    // notations may have a public id with no system id
    fn notation_id(&mut self) -> Result<(Option<String>, Option<String>)> {
        let keyword = self.name_or_keyword()?;
        match keyword.as_str() {
            "SYSTEM" => {
                let system = self.quoted()?;
                Ok((None, Some(system)))
            }
            "PUBLIC" => {
                let public = self.quoted()?;
                self.skip_ws();
                if self.at_end() {
                    Ok((Some(public), None))
                } else {
                    let system = self.quoted()?;
                    Ok((Some(public), Some(system)))
                }
            }
            other => Err(decl_error(format!("expected SYSTEM or PUBLIC, got {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_and_attlist() {
        let mut dtd = DtdParser::new();
        let decls = dtd.markup_decl("ELEMENT doc (item+)").unwrap();
        assert!(matches!(
            &decls[0],
            Declaration::Element { name, model } if name == "doc" && model == "(item+)"
        ));
        let decls = dtd
            .markup_decl("ATTLIST item id ID #REQUIRED kind (a|b) \"a\"")
            .unwrap();
        assert_eq!(decls.len(), 2);
        let defs = dtd.attribute_defs("item").unwrap();
        assert_eq!(defs[0].name, "id");
        assert_eq!(defs[0].att_type, AttributeType::Id);
        assert_eq!(defs[1].value.as_deref(), Some("a"));
    }

    #[test]
    fn internal_entity_and_first_wins() {
        let mut dtd = DtdParser::new();
        dtd.markup_decl("ENTITY greeting \"hi\"").unwrap();
        let dup = dtd.markup_decl("ENTITY greeting \"bye\"").unwrap();
        assert!(dup.is_empty());
        assert_eq!(
            dtd.general_entity("greeting"),
            Some(&EntityDef::Internal("hi".to_string()))
        );
    }

    #[test]
    fn parameter_entity_expansion() {
        let mut dtd = DtdParser::new();
        dtd.markup_decl("ENTITY % model \"(a|b)\"").unwrap();
        let decls = dtd.markup_decl("ELEMENT doc %model;").unwrap();
        assert!(matches!(
            &decls[0],
            Declaration::Element { model, .. } if model == "(a|b)"
        ));
    }

    #[test]
    fn unparsed_entity() {
        let mut dtd = DtdParser::new();
        dtd.markup_decl("NOTATION gif SYSTEM \"gif-viewer\"").unwrap();
        let decls = dtd
            .markup_decl("ENTITY pic SYSTEM \"pic.gif\" NDATA gif")
            .unwrap();
        assert!(matches!(&decls[0], Declaration::UnparsedEntity { notation, .. } if notation == "gif"));
        assert_eq!(dtd.unparsed_entity("pic"), Some(("pic.gif", None)));
    }

    #[test]
    fn external_subset_with_conditionals() {
        let mut dtd = DtdParser::new();
        let decls = dtd
            .external_subset(
                "<!ELEMENT a (#PCDATA)>\n<![INCLUDE[<!ENTITY x \"1\">]]>\n<![IGNORE[<!ENTITY y \"2\">]]>",
            )
            .unwrap();
        assert_eq!(decls.len(), 2);
        assert!(dtd.general_entity("x").is_some());
        assert!(dtd.general_entity("y").is_none());
    }

    #[test]
    fn attribute_default_resolves_references() {
        let mut dtd = DtdParser::new();
        dtd.markup_decl("ENTITY brand \"Acme\"").unwrap();
        dtd.markup_decl("ATTLIST p vendor CDATA \"&brand;&#33;\"").unwrap();
        let defs = dtd.attribute_defs("p").unwrap();
        assert_eq!(defs[0].value.as_deref(), Some("Acme!"));
    }
}
