//! Compiling sequence constructors: the bodies of templates and the
//! other content-bearing declarations.

use ahash::HashMap;
use xylem_name::{Name, Namespaces, XSLT_NAMESPACE};
use xylem_xpath_ast::ast::Expr;
use xylem_xpath_ast::{parse_sequence_type, parse_xpath};

use xylem_xpath::{Error, Result};
use xylem_xpath::node::{Documents, NodeId, NodeKind};

use crate::ast::*;
use crate::compiler::{in_scope_namespaces, resolve_variable_qname};
use crate::pattern::Pattern;

/// Walks stylesheet content into instruction trees.
pub(crate) struct Walker<'a> {
    documents: &'a Documents,
    aliases: HashMap<String, (String, String)>,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(
        documents: &'a Documents,
        compiler: &crate::compiler::Compiler<'_>,
    ) -> Self {
        Self {
            documents,
            aliases: compiler.aliases().clone(),
        }
    }

    fn namespaces(&self, element: NodeId) -> Namespaces {
        in_scope_namespaces(self.documents, element)
    }

    fn attr(&self, element: NodeId, name: &str) -> Option<String> {
        self.documents.attribute_value(element, &Name::local(name))
    }

    fn required_attr(&self, element: NodeId, name: &str) -> Result<String> {
        self.attr(element, name).ok_or(Error::XTSE0010)
    }

    fn expr_attr(&self, element: NodeId, name: &str) -> Result<Option<Expr>> {
        self.attr(element, name)
            .map(|source| {
                parse_xpath(&source, &self.namespaces(element)).map_err(|_| Error::XTSE0010)
            })
            .transpose()
    }

    fn required_expr_attr(&self, element: NodeId, name: &str) -> Result<Expr> {
        self.expr_attr(element, name)?.ok_or(Error::XTSE0010)
    }

    fn avt_attr(&self, element: NodeId, name: &str) -> Result<Option<Avt>> {
        self.attr(element, name)
            .map(|value| parse_avt(&value, &self.namespaces(element)))
            .transpose()
    }

    fn pattern_attr(&self, element: NodeId, name: &str) -> Result<Option<Pattern>> {
        self.attr(element, name)
            .map(|source| {
                let expr =
                    parse_xpath(&source, &self.namespaces(element)).map_err(|_| Error::XTSE0010)?;
                Pattern::from_expr(&expr)
            })
            .transpose()
    }

    fn qname_attr(&self, element: NodeId, name: &str) -> Result<Option<Name>> {
        self.attr(element, name)
            .map(|token| resolve_variable_qname(&self.namespaces(element), &token))
            .transpose()
    }

    /// Split leading `xsl:param` children off a template body.
    pub(crate) fn template_content(
        &mut self,
        template: NodeId,
    ) -> Result<(Vec<Param>, Vec<Instruction>)> {
        let mut params = Vec::new();
        let mut body = Vec::new();
        let mut in_params = true;
        for instruction in self.sequence_constructor(template)? {
            match instruction {
                Instruction::Param(param) if in_params => params.push(param),
                other => {
                    in_params = false;
                    body.push(other);
                }
            }
        }
        Ok((params, body))
    }

    /// Compile the children of an element into instructions.
    pub(crate) fn sequence_constructor(&mut self, parent: NodeId) -> Result<Vec<Instruction>> {
        let preserve_space = self
            .attr(parent, "xml:space")
            .map(|v| v == "preserve")
            .unwrap_or(false);
        let mut instructions = Vec::new();
        for child in self.documents.children(parent) {
            match self.documents.kind(child).clone() {
                NodeKind::Text(text) => {
                    if preserve_space || !text.chars().all(char::is_whitespace) {
                        instructions.push(Instruction::Text(text));
                    }
                }
                NodeKind::Element { name, .. } => {
                    if name.namespace() == XSLT_NAMESPACE {
                        if let Some(instruction) = self.xsl_instruction(&name, child)? {
                            instructions.push(instruction);
                        }
                    } else {
                        instructions.push(self.literal_result_element(child)?);
                    }
                }
                // comments and PIs in the stylesheet are not output
                _ => {}
            }
        }
        Ok(instructions)
    }

    fn xsl_instruction(
        &mut self,
        name: &Name,
        element: NodeId,
    ) -> Result<Option<Instruction>> {
        let instruction = match name.local_name() {
            "text" => {
                let text = self.documents.string_value(element);
                Instruction::Text(text)
            }
            "apply-templates" => {
                let mode = match self.attr(element, "mode") {
                    None => None,
                    Some(mode) if mode == "#current" || mode == "#default" => None,
                    Some(mode) => {
                        Some(resolve_variable_qname(&self.namespaces(element), &mode)?)
                    }
                };
                Instruction::ApplyTemplates {
                    select: self.expr_attr(element, "select")?,
                    mode,
                    sort: self.sort_keys(element)?,
                    with_params: self.with_params(element)?,
                }
            }
            "call-template" => {
                let name = self
                    .qname_attr(element, "name")?
                    .ok_or(Error::XTSE0650)?;
                Instruction::CallTemplate {
                    name,
                    with_params: self.with_params(element)?,
                }
            }
            "apply-imports" => Instruction::ApplyImports,
            "next-match" => Instruction::NextMatch,
            "value-of" => {
                let select = match self.expr_attr(element, "select")? {
                    Some(select) => select,
                    // content form: value-of over the constructed text
                    None => {
                        let text = self.documents.string_value(element);
                        return Ok(Some(Instruction::Text(text)));
                    }
                };
                Instruction::ValueOf {
                    select,
                    separator: self.avt_attr(element, "separator")?,
                    disable_output_escaping: self
                        .attr(element, "disable-output-escaping")
                        .map(|v| v == "yes")
                        .unwrap_or(false),
                }
            }
            "sequence" => Instruction::SequenceInstr {
                select: self.required_expr_attr(element, "select")?,
            },
            "if" => Instruction::If {
                test: self.required_expr_attr(element, "test")?,
                content: self.sequence_constructor(element)?,
            },
            "choose" => {
                let mut whens = Vec::new();
                let mut otherwise = Vec::new();
                for child in self.documents.children(element) {
                    let child_name = match self.documents.name(child) {
                        Some(name) if self.documents.is_element(child) => name,
                        _ => continue,
                    };
                    if child_name.namespace() != XSLT_NAMESPACE {
                        return Err(Error::XTSE0010);
                    }
                    match child_name.local_name() {
                        "when" => {
                            let test = self.required_expr_attr(child, "test")?;
                            whens.push((test, self.sequence_constructor(child)?));
                        }
                        "otherwise" => {
                            otherwise = self.sequence_constructor(child)?;
                        }
                        _ => return Err(Error::XTSE0010),
                    }
                }
                Instruction::Choose { whens, otherwise }
            }
            "for-each" => Instruction::ForEach {
                select: self.required_expr_attr(element, "select")?,
                sort: self.sort_keys(element)?,
                content: self.sequence_constructor_without(element, &["sort"])?,
            },
            "for-each-group" => {
                let spec = if let Some(expr) = self.expr_attr(element, "group-by")? {
                    GroupSpec::By(expr)
                } else if let Some(expr) = self.expr_attr(element, "group-adjacent")? {
                    GroupSpec::Adjacent(expr)
                } else if let Some(pattern) =
                    self.pattern_attr(element, "group-starting-with")?
                {
                    GroupSpec::StartingWith(pattern)
                } else if let Some(pattern) = self.pattern_attr(element, "group-ending-with")? {
                    GroupSpec::EndingWith(pattern)
                } else {
                    return Err(Error::XTSE0010);
                };
                Instruction::ForEachGroup {
                    select: self.required_expr_attr(element, "select")?,
                    spec,
                    sort: self.sort_keys(element)?,
                    content: self.sequence_constructor_without(element, &["sort"])?,
                }
            }
            "iterate" => {
                let mut params = Vec::new();
                let mut on_completion = Vec::new();
                let mut content = Vec::new();
                for child in self.documents.children(element) {
                    match self.documents.kind(child).clone() {
                        NodeKind::Text(text) => {
                            if !text.chars().all(char::is_whitespace) {
                                content.push(Instruction::Text(text));
                            }
                        }
                        NodeKind::Element { name: child_name, .. } => {
                            if child_name.namespace() == XSLT_NAMESPACE {
                                match child_name.local_name() {
                                    "param" => params.push(self.param(child)?),
                                    "on-completion" => {
                                        on_completion = self.sequence_constructor(child)?;
                                    }
                                    _ => {
                                        if let Some(i) =
                                            self.xsl_instruction(&child_name, child)?
                                        {
                                            content.push(i);
                                        }
                                    }
                                }
                            } else {
                                content.push(self.literal_result_element(child)?);
                            }
                        }
                        _ => {}
                    }
                }
                Instruction::Iterate {
                    select: self.required_expr_attr(element, "select")?,
                    params,
                    content,
                    on_completion,
                }
            }
            "next-iteration" => Instruction::NextIteration {
                with_params: self.with_params(element)?,
            },
            "break" => Instruction::Break {
                content: self.sequence_constructor(element)?,
            },
            "copy" => Instruction::Copy {
                use_attribute_sets: self.attribute_set_names(element, "use-attribute-sets")?,
                content: self.sequence_constructor(element)?,
            },
            "copy-of" => Instruction::CopyOf {
                select: self.required_expr_attr(element, "select")?,
            },
            "element" => Instruction::Element {
                name: self
                    .avt_attr(element, "name")?
                    .ok_or(Error::XTSE0010)?,
                namespace: self.avt_attr(element, "namespace")?,
                use_attribute_sets: self.attribute_set_names(element, "use-attribute-sets")?,
                content: self.sequence_constructor(element)?,
            },
            "attribute" => Instruction::Attribute {
                name: self
                    .avt_attr(element, "name")?
                    .ok_or(Error::XTSE0010)?,
                namespace: self.avt_attr(element, "namespace")?,
                select: self.expr_attr(element, "select")?,
                content: self.sequence_constructor(element)?,
            },
            "comment" => Instruction::Comment {
                select: self.expr_attr(element, "select")?,
                content: self.sequence_constructor(element)?,
            },
            "processing-instruction" => Instruction::ProcessingInstruction {
                name: self
                    .avt_attr(element, "name")?
                    .ok_or(Error::XTSE0010)?,
                select: self.expr_attr(element, "select")?,
                content: self.sequence_constructor(element)?,
            },
            "variable" => {
                let namespaces = self.namespaces(element);
                Instruction::Variable {
                    name: resolve_variable_qname(
                        &namespaces,
                        &self.required_attr(element, "name")?,
                    )?,
                    select: self.expr_attr(element, "select")?,
                    as_type: self
                        .attr(element, "as")
                        .map(|source| {
                            parse_sequence_type(&source, &namespaces)
                                .map_err(|_| Error::XTSE0010)
                        })
                        .transpose()?,
                    content: self.sequence_constructor(element)?,
                }
            }
            "param" => Instruction::Param(self.param(element)?),
            "number" => {
                let level = match self.attr(element, "level").as_deref() {
                    None | Some("single") => NumberLevel::Single,
                    Some("multiple") => NumberLevel::Multiple,
                    Some("any") => NumberLevel::Any,
                    Some(_) => return Err(Error::XTSE0010),
                };
                Instruction::Number {
                    level,
                    count: self.pattern_attr(element, "count")?,
                    from: self.pattern_attr(element, "from")?,
                    value: self.expr_attr(element, "value")?,
                    format: self
                        .avt_attr(element, "format")?
                        .unwrap_or_else(|| Avt::literal("1")),
                }
            }
            "analyze-string" => {
                let mut matching = Vec::new();
                let mut non_matching = Vec::new();
                for child in self.documents.children(element) {
                    let child_name = match self.documents.name(child) {
                        Some(name) if self.documents.is_element(child) => name,
                        _ => continue,
                    };
                    match child_name.local_name() {
                        "matching-substring" => {
                            matching = self.sequence_constructor(child)?;
                        }
                        "non-matching-substring" => {
                            non_matching = self.sequence_constructor(child)?;
                        }
                        "fallback" => {}
                        _ => return Err(Error::XTSE0010),
                    }
                }
                Instruction::AnalyzeString {
                    select: self.required_expr_attr(element, "select")?,
                    regex: self
                        .avt_attr(element, "regex")?
                        .ok_or(Error::XTSE0010)?,
                    flags: self
                        .avt_attr(element, "flags")?
                        .unwrap_or_else(|| Avt::literal("")),
                    matching,
                    non_matching,
                }
            }
            "message" => Instruction::Message {
                select: self.expr_attr(element, "select")?,
                content: self.sequence_constructor(element)?,
                terminate: self
                    .avt_attr(element, "terminate")?
                    .unwrap_or_else(|| Avt::literal("no")),
            },
            "result-document" => Instruction::ResultDocument {
                href: self.avt_attr(element, "href")?,
                content: self.sequence_constructor(element)?,
            },
            "fork" => {
                let mut branches = Vec::new();
                for child in self.documents.children(element) {
                    let child_name = match self.documents.name(child) {
                        Some(name) if self.documents.is_element(child) => name,
                        _ => continue,
                    };
                    if child_name.namespace() == XSLT_NAMESPACE
                        && child_name.local_name() == "sequence"
                    {
                        branches.push(self.sequence_constructor(child)?);
                    } else {
                        return Err(Error::XTSE0010);
                    }
                }
                Instruction::Fork { branches }
            }
            "stream" | "source-document" => Instruction::Stream {
                href: self
                    .avt_attr(element, "href")?
                    .ok_or(Error::XTSE0010)?,
                content: self.sequence_constructor(element)?,
            },
            "fallback" => return Ok(None),
            "sort" | "with-param" => return Ok(None),
            _ => return Err(Error::XTSE0010),
        };
        Ok(Some(instruction))
    }

    fn param(&mut self, element: NodeId) -> Result<Param> {
        let namespaces = self.namespaces(element);
        Ok(Param {
            name: resolve_variable_qname(&namespaces, &self.required_attr(element, "name")?)?,
            select: self.expr_attr(element, "select")?,
            as_type: self
                .attr(element, "as")
                .map(|source| {
                    parse_sequence_type(&source, &namespaces).map_err(|_| Error::XTSE0010)
                })
                .transpose()?,
            required: self
                .attr(element, "required")
                .map(|v| v == "yes" || v == "true")
                .unwrap_or(false),
            content: self.sequence_constructor(element)?,
        })
    }

    fn sort_keys(&mut self, element: NodeId) -> Result<Vec<SortKey>> {
        let mut keys = Vec::new();
        for child in self.documents.children(element) {
            let child_name = match self.documents.name(child) {
                Some(name) if self.documents.is_element(child) => name,
                _ => continue,
            };
            if child_name.namespace() == XSLT_NAMESPACE && child_name.local_name() == "sort" {
                keys.push(SortKey {
                    select: self.expr_attr(child, "select")?,
                    order: self
                        .avt_attr(child, "order")?
                        .unwrap_or_else(|| Avt::literal("ascending")),
                    data_type: self
                        .avt_attr(child, "data-type")?
                        .unwrap_or_else(|| Avt::literal("text")),
                });
            }
        }
        Ok(keys)
    }

    fn with_params(&mut self, element: NodeId) -> Result<Vec<WithParam>> {
        let mut params = Vec::new();
        for child in self.documents.children(element) {
            let child_name = match self.documents.name(child) {
                Some(name) if self.documents.is_element(child) => name,
                _ => continue,
            };
            if child_name.namespace() == XSLT_NAMESPACE
                && child_name.local_name() == "with-param"
            {
                let namespaces = self.namespaces(child);
                params.push(WithParam {
                    name: resolve_variable_qname(
                        &namespaces,
                        &self.required_attr(child, "name")?,
                    )?,
                    select: self.expr_attr(child, "select")?,
                    content: self.sequence_constructor(child)?,
                });
            }
        }
        Ok(params)
    }

    fn attribute_set_names(&self, element: NodeId, attr: &str) -> Result<Vec<Name>> {
        let value = match self.attr(element, attr) {
            None => return Ok(Vec::new()),
            Some(value) => value,
        };
        let namespaces = self.namespaces(element);
        value
            .split_whitespace()
            .map(|token| resolve_variable_qname(&namespaces, token))
            .collect()
    }

    // like sequence_constructor but skipping named xsl children that
    // the caller consumed separately (xsl:sort)
    fn sequence_constructor_without(
        &mut self,
        parent: NodeId,
        skip: &[&str],
    ) -> Result<Vec<Instruction>> {
        let mut instructions = Vec::new();
        for child in self.documents.children(parent) {
            match self.documents.kind(child).clone() {
                NodeKind::Text(text) => {
                    if !text.chars().all(char::is_whitespace) {
                        instructions.push(Instruction::Text(text));
                    }
                }
                NodeKind::Element { name, .. } => {
                    if name.namespace() == XSLT_NAMESPACE
                        && skip.contains(&name.local_name())
                    {
                        continue;
                    }
                    if name.namespace() == XSLT_NAMESPACE {
                        if let Some(instruction) = self.xsl_instruction(&name, child)? {
                            instructions.push(instruction);
                        }
                    } else {
                        instructions.push(self.literal_result_element(child)?);
                    }
                }
                _ => {}
            }
        }
        Ok(instructions)
    }

    /// A literal result element, with namespace aliasing applied.
    pub(crate) fn literal_result_element(&mut self, element: NodeId) -> Result<Instruction> {
        let name = self.documents.name(element).ok_or(Error::XTSE0010)?;
        let name = self.apply_alias(&name);
        let namespaces_on_element: Vec<(String, String)> =
            match self.documents.kind(element) {
                NodeKind::Element { declarations, .. } => declarations
                    .iter()
                    .filter(|(_, uri)| uri != XSLT_NAMESPACE)
                    .filter(|(_, uri)| !self.aliases.contains_key(uri))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
        let namespaces = self.namespaces(element);
        let mut attributes = Vec::new();
        let mut use_attribute_sets = Vec::new();
        for attr in self.documents.attributes(element) {
            if let NodeKind::Attribute { name: attr_name, value } =
                self.documents.kind(attr).clone()
            {
                if attr_name.namespace() == XSLT_NAMESPACE {
                    if attr_name.local_name() == "use-attribute-sets" {
                        for token in value.split_whitespace() {
                            use_attribute_sets
                                .push(resolve_variable_qname(&namespaces, token)?);
                        }
                    }
                    // version, exclude-result-prefixes and friends are
                    // processed, not copied
                    continue;
                }
                attributes.push((
                    self.apply_alias(&attr_name),
                    parse_avt(&value, &namespaces)?,
                ));
            }
        }
        Ok(Instruction::LiteralElement {
            name,
            namespaces: namespaces_on_element,
            attributes,
            use_attribute_sets,
            content: self.sequence_constructor(element)?,
        })
    }

    fn apply_alias(&self, name: &Name) -> Name {
        match self.aliases.get(name.namespace()) {
            Some((uri, prefix)) => Name::prefixed(uri, name.local_name(), prefix),
            None => name.clone(),
        }
    }
}

/// Parse an attribute value template.
pub(crate) fn parse_avt(value: &str, namespaces: &Namespaces) -> Result<Avt> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    literal.push('{');
                    continue;
                }
                if !literal.is_empty() {
                    parts.push(AvtPart::Text(std::mem::take(&mut literal)));
                }
                // scan to the matching close brace, respecting string
                // literals inside the expression
                let mut expr_source = String::new();
                let mut quote: Option<char> = None;
                let mut closed = false;
                for c in chars.by_ref() {
                    match quote {
                        Some(q) => {
                            expr_source.push(c);
                            if c == q {
                                quote = None;
                            }
                        }
                        None => match c {
                            '\'' | '"' => {
                                quote = Some(c);
                                expr_source.push(c);
                            }
                            '}' => {
                                closed = true;
                                break;
                            }
                            c => expr_source.push(c),
                        },
                    }
                }
                if !closed {
                    return Err(Error::XTSE0010);
                }
                let expr =
                    parse_xpath(&expr_source, namespaces).map_err(|_| Error::XTSE0010)?;
                parts.push(AvtPart::Expr(expr));
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    literal.push('}');
                } else {
                    return Err(Error::XTSE0010);
                }
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() || parts.is_empty() {
        parts.push(AvtPart::Text(literal));
    }
    Ok(Avt { parts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avt_parsing() {
        let namespaces = Namespaces::default();
        let avt = parse_avt("a{1 + 1}b{{literal}}", &namespaces).unwrap();
        assert_eq!(avt.parts.len(), 3);
        assert!(matches!(&avt.parts[0], AvtPart::Text(t) if t == "a"));
        assert!(matches!(&avt.parts[1], AvtPart::Expr(_)));
        assert!(matches!(&avt.parts[2], AvtPart::Text(t) if t == "b{literal}"));
        assert!(parse_avt("{unclosed", &namespaces).is_err());
        let avt = parse_avt("{ 'a}b' }", &namespaces).unwrap();
        assert!(matches!(&avt.parts[0], AvtPart::Expr(_)));
    }
}
