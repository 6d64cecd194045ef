//! Stylesheet compilation.
//!
//! A stylesheet is itself XML, so it arrives through the same parser
//! as any document and lands in an arena; the compiler walks that tree
//! and produces an immutable [`CompiledStylesheet`]. Includes and
//! imports re-invoke the parser on the referenced URIs through the
//! caller's resolver, with import precedence decreasing into imports.

use ahash::{HashMap, HashMapExt};
use xylem_name::{Name, Namespaces, XSLT_NAMESPACE};
use xylem_xpath_ast::ast::{Expr, SequenceType};
use xylem_xpath_ast::{parse_sequence_type, parse_xpath};

use xylem_xpath::{Error, Result};
use xylem_xpath::node::{Documents, NodeId, NodeKind};

use crate::ast::*;
use crate::decimal::DecimalFormat;
use crate::pattern::Pattern;
use crate::streamability::{build_stream_plan, Analyzer, Streamability, SyntheticAccumulator};

/// Resolves `xsl:include`/`xsl:import`/`doc()` URIs to bytes.
pub trait StylesheetResolver {
    /// Fetch the bytes behind a URI; `None` fails the compile.
    fn resolve(&mut self, href: &str) -> Option<Vec<u8>>;
}

/// A resolver that refuses everything; fine for self-contained
/// stylesheets.
pub struct NoResolver;

impl StylesheetResolver for NoResolver {
    fn resolve(&mut self, _href: &str) -> Option<Vec<u8>> {
        None
    }
}

/// The compiled, immutable stylesheet.
pub struct CompiledStylesheet {
    /// Template rules in declaration order.
    pub templates: Vec<Template>,
    /// Named templates by name.
    pub named_templates: HashMap<Name, usize>,
    /// Accumulator declarations.
    pub accumulators: Vec<Accumulator>,
    /// Global variables and parameters, in declaration order.
    pub globals: Vec<GlobalVariable>,
    /// Attribute sets by name.
    pub attribute_sets: HashMap<Name, AttributeSet>,
    /// Key declarations.
    pub keys: Vec<KeyDecl>,
    /// Decimal formats; the `None` entry is the default format.
    pub decimal_formats: HashMap<Option<Name>, DecimalFormat>,
    /// Namespace aliases: stylesheet URI → result URI.
    pub namespace_aliases: HashMap<String, (String, String)>,
    /// Output properties.
    pub output: OutputProperties,
    /// Element name tests whose whitespace-only text children are
    /// stripped.
    pub strip_space: Vec<NameTestList>,
    /// Element name tests exempted from stripping.
    pub preserve_space: Vec<NameTestList>,
    /// Modes declared streamable via `xsl:mode`.
    pub streamable_modes: Vec<Option<Name>>,
    /// Synthetic accumulators introduced by the analyzer.
    pub synthetics: Vec<SyntheticAccumulator>,
    /// Whether the unnamed mode can run without whole-document
    /// buffering.
    pub streamable: bool,
    /// The `version` attribute of the outermost stylesheet element.
    pub version: String,
}

/// One entry of a strip-space/preserve-space list.
#[derive(Debug, Clone)]
pub enum NameTestList {
    /// `*`
    Any,
    /// `prefix:*`
    AnyLocal(String),
    /// A full name.
    Name(Name),
}

impl NameTestList {
    /// Whether an element name matches this test.
    pub fn matches(&self, name: &Name) -> bool {
        match self {
            NameTestList::Any => true,
            NameTestList::AnyLocal(namespace) => name.namespace() == namespace,
            NameTestList::Name(expected) => name == expected,
        }
    }

    /// Specificity for conflict resolution: higher wins.
    pub fn specificity(&self) -> u8 {
        match self {
            NameTestList::Any => 0,
            NameTestList::AnyLocal(_) => 1,
            NameTestList::Name(_) => 2,
        }
    }
}

impl CompiledStylesheet {
    /// Compile a stylesheet from bytes.
    pub fn compile(bytes: &[u8], resolver: &mut dyn StylesheetResolver) -> Result<Self> {
        let mut documents = Documents::new();
        let root = xylem_xpath::node::parse_bytes_into(&mut documents, bytes, None)
            .map_err(|_| Error::XTSE0010)?;
        let mut compiler = Compiler::new(resolver);
        compiler.compile_document(&documents, root, None)?;
        compiler.finish()
    }

    /// Whether whitespace-only text under `element` is stripped.
    pub fn strips_whitespace_in(&self, element: &Name) -> bool {
        let best_strip = self
            .strip_space
            .iter()
            .filter(|t| t.matches(element))
            .map(|t| t.specificity())
            .max();
        let best_preserve = self
            .preserve_space
            .iter()
            .filter(|t| t.matches(element))
            .map(|t| t.specificity())
            .max();
        match (best_strip, best_preserve) {
            (Some(strip), Some(preserve)) => strip > preserve,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

pub(crate) struct Compiler<'a> {
    resolver: &'a mut dyn StylesheetResolver,
    templates: Vec<Template>,
    accumulators: Vec<Accumulator>,
    globals: Vec<GlobalVariable>,
    attribute_sets: HashMap<Name, AttributeSet>,
    keys: Vec<KeyDecl>,
    decimal_formats: HashMap<Option<Name>, DecimalFormat>,
    namespace_aliases: HashMap<String, (String, String)>,
    output: OutputProperties,
    strip_space: Vec<NameTestList>,
    preserve_space: Vec<NameTestList>,
    streamable_modes: Vec<Option<Name>>,
    version: String,
    order: usize,
    precedence_counter: usize,
}

impl<'a> Compiler<'a> {
    pub(crate) fn aliases(&self) -> &HashMap<String, (String, String)> {
        &self.namespace_aliases
    }

    fn new(resolver: &'a mut dyn StylesheetResolver) -> Self {
        Self {
            resolver,
            templates: Vec::new(),
            accumulators: Vec::new(),
            globals: Vec::new(),
            attribute_sets: HashMap::new(),
            keys: Vec::new(),
            decimal_formats: HashMap::new(),
            namespace_aliases: HashMap::new(),
            output: OutputProperties::default(),
            strip_space: Vec::new(),
            preserve_space: Vec::new(),
            streamable_modes: Vec::new(),
            version: "3.0".to_string(),
            order: 0,
            precedence_counter: 0,
        }
    }

    fn finish(mut self) -> Result<CompiledStylesheet> {
        // streamability pass over every template body
        let mut analyzer = Analyzer::new();
        for template in self.templates.iter_mut() {
            let class = analyzer.classify_instructions(&mut template.body);
            let pattern_class = match &template.pattern {
                Some(pattern) if pattern.has_predicates() => Streamability::Grounded,
                _ => Streamability::Motionless,
            };
            template.streamability = class.max(pattern_class);
            template.stream_plan = if template.streamability <= Streamability::Consuming {
                build_stream_plan(&template.body)
            } else {
                None
            };
            // a body the plan builder cannot flatten needs its subtree
            // grounded, whatever the expression analysis said
            if template.stream_plan.is_none()
                && template.streamability < Streamability::Grounded
            {
                template.streamability = Streamability::Grounded;
            }
        }
        let mut globals_streamable = true;
        for global in self.globals.iter_mut() {
            if let Some(select) = &mut global.select {
                if analyzer.classify_expr(select) != Streamability::Motionless {
                    globals_streamable = false;
                }
            }
            if !global.content.is_empty() {
                globals_streamable = false;
            }
        }
        let streamable = globals_streamable
            && self.keys.is_empty()
            && self
                .templates
                .iter()
                .all(|t| t.streamability < Streamability::FreeRanging);
        let mut named_templates = HashMap::new();
        for (i, template) in self.templates.iter().enumerate() {
            if let Some(name) = &template.name {
                if named_templates.insert(name.clone(), i).is_some() {
                    return Err(Error::XTSE0080);
                }
            }
        }
        if !self.decimal_formats.contains_key(&None) {
            self.decimal_formats.insert(None, DecimalFormat::default());
        }
        Ok(CompiledStylesheet {
            templates: self.templates,
            named_templates,
            accumulators: self.accumulators,
            globals: self.globals,
            attribute_sets: self.attribute_sets,
            keys: self.keys,
            decimal_formats: self.decimal_formats,
            namespace_aliases: self.namespace_aliases,
            output: self.output,
            strip_space: self.strip_space,
            preserve_space: self.preserve_space,
            streamable_modes: self.streamable_modes,
            synthetics: analyzer.synthetics,
            streamable,
            version: self.version,
        })
    }

    // forced precedence keeps included modules at their includer's
    // level; imports allocate their own, below the importer's
    fn compile_document(
        &mut self,
        documents: &Documents,
        root: NodeId,
        forced_precedence: Option<usize>,
    ) -> Result<()> {
        let stylesheet_element = documents
            .children(root)
            .into_iter()
            .find(|node| documents.is_element(*node))
            .ok_or(Error::XTSE0010)?;
        let name = documents.name(stylesheet_element).ok_or(Error::XTSE0010)?;
        if name.namespace() == XSLT_NAMESPACE
            && (name.local_name() == "stylesheet" || name.local_name() == "transform")
        {
            self.compile_stylesheet_element(documents, stylesheet_element, forced_precedence)
        } else {
            let precedence = forced_precedence.unwrap_or_else(|| {
                self.precedence_counter += 1;
                self.precedence_counter
            });
            // simplified stylesheet: the literal element is the body of
            // a match="/" template
            let mut walker = Walker::new(documents, self);
            let body = vec![walker.literal_result_element(stylesheet_element)?];
            let pattern = Pattern::from_expr(&parse_xpath("/", &Namespaces::default()).unwrap())?;
            self.order += 1;
            self.templates.push(Template {
                pattern: Some(pattern),
                name: None,
                modes: Vec::new(),
                priority: None,
                precedence,
                order: self.order,
                params: Vec::new(),
                body,
                streamability: Streamability::Grounded,
                stream_plan: None,
            });
            Ok(())
        }
    }

    fn compile_stylesheet_element(
        &mut self,
        documents: &Documents,
        stylesheet: NodeId,
        forced_precedence: Option<usize>,
    ) -> Result<()> {
        if let Some(version) = documents.attribute_value(stylesheet, &Name::local("version")) {
            self.version = version;
        }
        // imports and namespace aliases first: imported modules take
        // their precedence numbers before this module's, aliases so
        // literal elements anywhere see them
        for child in documents.children(stylesheet) {
            if let Some(name) = documents.name(child) {
                if name.namespace() != XSLT_NAMESPACE {
                    continue;
                }
                match name.local_name() {
                    "import" => {
                        let href = documents
                            .attribute_value(child, &Name::local("href"))
                            .ok_or(Error::XTSE0010)?;
                        self.load_module(&href, None)?;
                    }
                    "namespace-alias" => {
                        self.compile_namespace_alias(documents, child)?;
                    }
                    _ => {}
                }
            }
        }
        let precedence = forced_precedence.unwrap_or_else(|| {
            self.precedence_counter += 1;
            self.precedence_counter
        });
        for child in documents.children(stylesheet) {
            let name = match documents.name(child) {
                Some(name) if documents.is_element(child) => name,
                _ => continue,
            };
            if name.namespace() != XSLT_NAMESPACE {
                // top-level non-XSLT elements are ignored data
                continue;
            }
            match name.local_name() {
                "import" => {}
                "include" => {
                    let href = documents
                        .attribute_value(child, &Name::local("href"))
                        .ok_or(Error::XTSE0010)?;
                    self.load_module(&href, Some(precedence))?;
                }
                "template" => self.compile_template(documents, child, precedence)?,
                "variable" | "param" => self.compile_global(documents, child)?,
                "output" => self.compile_output(documents, child)?,
                "key" => self.compile_key(documents, child)?,
                "attribute-set" => self.compile_attribute_set(documents, child)?,
                "decimal-format" => self.compile_decimal_format(documents, child)?,
                "accumulator" => self.compile_accumulator(documents, child)?,
                "mode" => {
                    let mode_name = documents
                        .attribute_value(child, &Name::local("name"))
                        .map(|n| resolve_qname(documents, child, &n))
                        .transpose()?;
                    let streamable = documents
                        .attribute_value(child, &Name::local("streamable"))
                        .map(|v| v == "yes" || v == "true" || v == "1")
                        .unwrap_or(false);
                    if streamable {
                        self.streamable_modes.push(mode_name);
                    }
                }
                "strip-space" => {
                    let tests = self.name_test_list(documents, child)?;
                    self.strip_space.extend(tests);
                }
                "preserve-space" => {
                    let tests = self.name_test_list(documents, child)?;
                    self.preserve_space.extend(tests);
                }
                "namespace-alias" => {}
                "import-schema" => {
                    // type references only; nothing to register without
                    // a schema validator attached
                }
                _ => return Err(Error::XTSE0010),
            }
        }
        Ok(())
    }

    fn load_module(&mut self, href: &str, forced_precedence: Option<usize>) -> Result<()> {
        let bytes = self.resolver.resolve(href).ok_or(Error::XTSE0010)?;
        let mut documents = Documents::new();
        let root = xylem_xpath::node::parse_bytes_into(&mut documents, &bytes, Some(href))
            .map_err(|_| Error::XTSE0010)?;
        self.compile_document(&documents, root, forced_precedence)
    }

    fn name_test_list(
        &mut self,
        documents: &Documents,
        element: NodeId,
    ) -> Result<Vec<NameTestList>> {
        let elements = documents
            .attribute_value(element, &Name::local("elements"))
            .ok_or(Error::XTSE0010)?;
        let namespaces = in_scope_namespaces(documents, element);
        let mut tests = Vec::new();
        for token in elements.split_whitespace() {
            tests.push(if token == "*" {
                NameTestList::Any
            } else if let Some(prefix) = token.strip_suffix(":*") {
                let uri = namespaces.by_prefix(prefix).ok_or(Error::XPST0081)?;
                NameTestList::AnyLocal(uri.to_string())
            } else {
                NameTestList::Name(resolve_element_qname(&namespaces, token)?)
            });
        }
        Ok(tests)
    }

    fn compile_template(
        &mut self,
        documents: &Documents,
        element: NodeId,
        precedence: usize,
    ) -> Result<()> {
        let namespaces = in_scope_namespaces(documents, element);
        let pattern = documents
            .attribute_value(element, &Name::local("match"))
            .map(|source| {
                let expr =
                    parse_xpath(&source, &namespaces).map_err(|_| Error::XTSE0010)?;
                Pattern::from_expr(&expr)
            })
            .transpose()?;
        let name = documents
            .attribute_value(element, &Name::local("name"))
            .map(|n| resolve_qname(documents, element, &n))
            .transpose()?;
        if pattern.is_none() && name.is_none() {
            return Err(Error::XTSE0010);
        }
        let priority = documents
            .attribute_value(element, &Name::local("priority"))
            .map(|p| p.trim().parse::<f64>().map_err(|_| Error::XTSE0010))
            .transpose()?;
        let modes = match documents.attribute_value(element, &Name::local("mode")) {
            None => Vec::new(),
            Some(value) => {
                let mut modes = Vec::new();
                for token in value.split_whitespace() {
                    if token == "#default" || token == "#all" {
                        continue;
                    }
                    modes.push(resolve_qname(documents, element, token)?);
                }
                modes
            }
        };
        let mut walker = Walker::new(documents, self);
        let (params, body) = walker.template_content(element)?;
        self.order += 1;
        self.templates.push(Template {
            pattern,
            name,
            modes,
            priority,
            precedence,
            order: self.order,
            params,
            body,
            streamability: Streamability::Grounded,
            stream_plan: None,
        });
        Ok(())
    }

    fn compile_global(&mut self, documents: &Documents, element: NodeId) -> Result<()> {
        let namespaces = in_scope_namespaces(documents, element);
        let name = documents
            .attribute_value(element, &Name::local("name"))
            .ok_or(Error::XTSE0010)?;
        let name = resolve_variable_qname(&namespaces, &name)?;
        let is_param = documents
            .name(element)
            .map(|n| n.local_name() == "param")
            .unwrap_or(false);
        let select = documents
            .attribute_value(element, &Name::local("select"))
            .map(|source| parse_xpath(&source, &namespaces).map_err(|_| Error::XTSE0010))
            .transpose()?;
        let as_type = self.sequence_type_attr(documents, element, &namespaces)?;
        let mut walker = Walker::new(documents, self);
        let content = walker.sequence_constructor(element)?;
        self.globals.push(GlobalVariable {
            name,
            is_param,
            select,
            as_type,
            content,
        });
        Ok(())
    }

    fn sequence_type_attr(
        &mut self,
        documents: &Documents,
        element: NodeId,
        namespaces: &Namespaces,
    ) -> Result<Option<SequenceType>> {
        documents
            .attribute_value(element, &Name::local("as"))
            .map(|source| parse_sequence_type(&source, namespaces).map_err(|_| Error::XTSE0010))
            .transpose()
    }

    fn compile_output(&mut self, documents: &Documents, element: NodeId) -> Result<()> {
        let get = |name: &str| documents.attribute_value(element, &Name::local(name));
        if let Some(method) = get("method") {
            self.output.method = Some(method);
        }
        if let Some(encoding) = get("encoding") {
            self.output.encoding = Some(encoding);
        }
        if let Some(indent) = get("indent") {
            self.output.indent = indent == "yes" || indent == "true" || indent == "1";
        }
        if let Some(omit) = get("omit-xml-declaration") {
            self.output.omit_xml_declaration = omit == "yes" || omit == "true" || omit == "1";
        }
        if let Some(standalone) = get("standalone") {
            if standalone != "omit" {
                self.output.standalone = Some(standalone == "yes");
            }
        }
        if let Some(public) = get("doctype-public") {
            self.output.doctype_public = Some(public);
        }
        if let Some(system) = get("doctype-system") {
            self.output.doctype_system = Some(system);
        }
        if let Some(cdata) = get("cdata-section-elements") {
            let namespaces = in_scope_namespaces(documents, element);
            for token in cdata.split_whitespace() {
                self.output
                    .cdata_section_elements
                    .push(resolve_element_qname(&namespaces, token)?);
            }
        }
        Ok(())
    }

    fn compile_key(&mut self, documents: &Documents, element: NodeId) -> Result<()> {
        let namespaces = in_scope_namespaces(documents, element);
        let name = documents
            .attribute_value(element, &Name::local("name"))
            .ok_or(Error::XTSE0010)?;
        let name = resolve_qname(documents, element, &name)?;
        let match_source = documents
            .attribute_value(element, &Name::local("match"))
            .ok_or(Error::XTSE0010)?;
        let use_source = documents
            .attribute_value(element, &Name::local("use"))
            .ok_or(Error::XTSE0010)?;
        let pattern = Pattern::from_expr(
            &parse_xpath(&match_source, &namespaces).map_err(|_| Error::XTSE0010)?,
        )?;
        let use_expr = parse_xpath(&use_source, &namespaces).map_err(|_| Error::XTSE0010)?;
        self.keys.push(KeyDecl {
            name,
            pattern,
            use_expr,
        });
        Ok(())
    }

    fn compile_attribute_set(&mut self, documents: &Documents, element: NodeId) -> Result<()> {
        let name = documents
            .attribute_value(element, &Name::local("name"))
            .ok_or(Error::XTSE0010)?;
        let name = resolve_qname(documents, element, &name)?;
        let mut walker = Walker::new(documents, self);
        let attributes = walker.sequence_constructor(element)?;
        self.attribute_sets.insert(
            name.clone(),
            AttributeSet { name, attributes },
        );
        Ok(())
    }

    fn compile_decimal_format(&mut self, documents: &Documents, element: NodeId) -> Result<()> {
        let name = documents
            .attribute_value(element, &Name::local("name"))
            .map(|n| resolve_qname(documents, element, &n))
            .transpose()?;
        let mut format = DecimalFormat::default();
        let get = |attr: &str| documents.attribute_value(element, &Name::local(attr));
        if let Some(v) = get("decimal-separator") {
            format.decimal_separator = single_char(&v)?;
        }
        if let Some(v) = get("grouping-separator") {
            format.grouping_separator = single_char(&v)?;
        }
        if let Some(v) = get("minus-sign") {
            format.minus_sign = single_char(&v)?;
        }
        if let Some(v) = get("percent") {
            format.percent = single_char(&v)?;
        }
        if let Some(v) = get("per-mille") {
            format.per_mille = single_char(&v)?;
        }
        if let Some(v) = get("zero-digit") {
            format.zero_digit = single_char(&v)?;
        }
        if let Some(v) = get("digit") {
            format.digit = single_char(&v)?;
        }
        if let Some(v) = get("pattern-separator") {
            format.pattern_separator = single_char(&v)?;
        }
        if let Some(v) = get("infinity") {
            format.infinity = v;
        }
        if let Some(v) = get("NaN") {
            format.nan = v;
        }
        if self.decimal_formats.insert(name, format).is_some() {
            return Err(Error::XTSE0080);
        }
        Ok(())
    }

    fn compile_accumulator(&mut self, documents: &Documents, element: NodeId) -> Result<()> {
        let namespaces = in_scope_namespaces(documents, element);
        let name = documents
            .attribute_value(element, &Name::local("name"))
            .ok_or(Error::XTSE0010)?;
        let name = resolve_qname(documents, element, &name)?;
        let initial = documents
            .attribute_value(element, &Name::local("initial-value"))
            .ok_or(Error::XTSE0010)?;
        let initial = parse_xpath(&initial, &namespaces).map_err(|_| Error::XTSE0010)?;
        let mut rules = Vec::new();
        for child in documents.children(element) {
            let child_name = match documents.name(child) {
                Some(name) if documents.is_element(child) => name,
                _ => continue,
            };
            if child_name.namespace() != XSLT_NAMESPACE
                || child_name.local_name() != "accumulator-rule"
            {
                return Err(Error::XTSE0010);
            }
            let rule_namespaces = in_scope_namespaces(documents, child);
            let match_source = documents
                .attribute_value(child, &Name::local("match"))
                .ok_or(Error::XTSE0010)?;
            let pattern = Pattern::from_expr(
                &parse_xpath(&match_source, &rule_namespaces).map_err(|_| Error::XTSE0010)?,
            )?;
            let post_descent = documents
                .attribute_value(child, &Name::local("phase"))
                .map(|phase| phase == "end")
                .unwrap_or(false);
            let select = documents
                .attribute_value(child, &Name::local("select"))
                .ok_or(Error::XTSE0010)?;
            let select = parse_xpath(&select, &rule_namespaces).map_err(|_| Error::XTSE0010)?;
            rules.push(AccumulatorRule {
                pattern,
                post_descent,
                select,
            });
        }
        self.accumulators.push(Accumulator {
            name,
            initial,
            rules,
        });
        Ok(())
    }

    fn compile_namespace_alias(&mut self, documents: &Documents, element: NodeId) -> Result<()> {
        let namespaces = in_scope_namespaces(documents, element);
        let stylesheet_prefix = documents
            .attribute_value(element, &Name::local("stylesheet-prefix"))
            .ok_or(Error::XTSE0010)?;
        let result_prefix = documents
            .attribute_value(element, &Name::local("result-prefix"))
            .ok_or(Error::XTSE0010)?;
        let resolve = |prefix: &str| -> Result<String> {
            if prefix == "#default" {
                Ok(namespaces.default_element_namespace().to_string())
            } else {
                namespaces
                    .by_prefix(prefix)
                    .map(|s| s.to_string())
                    .ok_or(Error::XPST0081)
            }
        };
        let from = resolve(&stylesheet_prefix)?;
        let to = resolve(&result_prefix)?;
        let to_prefix = if result_prefix == "#default" {
            String::new()
        } else {
            result_prefix
        };
        self.namespace_aliases.insert(from, (to, to_prefix));
        Ok(())
    }
}

fn single_char(value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(Error::XTSE0010),
    }
}

/// The namespaces in scope on a stylesheet element, for compiling the
/// expressions written on it.
pub(crate) fn in_scope_namespaces(documents: &Documents, element: NodeId) -> Namespaces {
    let mut namespaces = Namespaces::default();
    let mut chain: Vec<NodeId> = vec![element];
    chain.extend(documents.ancestors(element));
    for node in chain.into_iter().rev() {
        if let NodeKind::Element { declarations, .. } = documents.kind(node) {
            for (prefix, uri) in declarations {
                namespaces.add(&[(prefix.as_str(), uri.as_str())]);
            }
        }
    }
    namespaces
}

pub(crate) fn resolve_qname(
    documents: &Documents,
    element: NodeId,
    token: &str,
) -> Result<Name> {
    let namespaces = in_scope_namespaces(documents, element);
    resolve_variable_qname(&namespaces, token)
}

// qualified names in name attributes: unprefixed gets no namespace
pub(crate) fn resolve_variable_qname(namespaces: &Namespaces, token: &str) -> Result<Name> {
    match token.split_once(':') {
        Some((prefix, local)) => {
            let uri = namespaces.by_prefix(prefix).ok_or(Error::XPST0081)?;
            Ok(Name::prefixed(uri, local, prefix))
        }
        None => Ok(Name::local(token)),
    }
}

// element names in lists default into the default element namespace
pub(crate) fn resolve_element_qname(namespaces: &Namespaces, token: &str) -> Result<Name> {
    match token.split_once(':') {
        Some((prefix, local)) => {
            let uri = namespaces.by_prefix(prefix).ok_or(Error::XPST0081)?;
            Ok(Name::prefixed(uri, local, prefix))
        }
        None => Ok(Name::new(namespaces.default_element_namespace(), token)),
    }
}

// the sequence-constructor walker is defined alongside the compiler to
// share its resolvers
pub(crate) use crate::content::Walker;
