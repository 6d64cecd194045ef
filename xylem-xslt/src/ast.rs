//! The compiled stylesheet and its instruction tree.

use xylem_name::Name;
use xylem_xpath_ast::ast::{Expr, SequenceType};

use crate::pattern::Pattern;
use crate::streamability::{StreamOp, Streamability};

/// A value template: literal pieces interleaved with expressions, as
/// written in `title="{@name} report"`.
#[derive(Debug, Clone)]
pub enum AvtPart {
    /// Literal text.
    Text(String),
    /// An embedded expression.
    Expr(Expr),
}

/// An attribute value template.
#[derive(Debug, Clone)]
pub struct Avt {
    /// The parts in order.
    pub parts: Vec<AvtPart>,
}

impl Avt {
    /// An AVT holding only literal text.
    pub fn literal(text: &str) -> Avt {
        Avt {
            parts: vec![AvtPart::Text(text.to_string())],
        }
    }

    /// Whether the AVT contains no expressions.
    pub fn is_literal(&self) -> bool {
        self.parts
            .iter()
            .all(|part| matches!(part, AvtPart::Text(_)))
    }

    /// Expressions embedded in the AVT.
    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        self.parts.iter().filter_map(|part| match part {
            AvtPart::Expr(expr) => Some(expr),
            AvtPart::Text(_) => None,
        })
    }
}

/// One instruction of a sequence constructor.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Literal text written in the stylesheet.
    Text(String),
    /// A literal result element with AVT attributes.
    LiteralElement {
        /// The element name.
        name: Name,
        /// Namespace declarations written on the element that must be
        /// copied to the output.
        namespaces: Vec<(String, String)>,
        /// The attributes, with value templates.
        attributes: Vec<(Name, Avt)>,
        /// Names of attribute sets pulled in via `xsl:use-attribute-sets`.
        use_attribute_sets: Vec<Name>,
        /// Child instructions.
        content: Vec<Instruction>,
    },
    /// `xsl:apply-templates`
    ApplyTemplates {
        /// The select expression; children when absent.
        select: Option<Expr>,
        /// The mode; `None` is the unnamed mode, `Some(#current)` is
        /// handled at compile time.
        mode: Option<Name>,
        /// Sort keys.
        sort: Vec<SortKey>,
        /// Parameters passed with `xsl:with-param`.
        with_params: Vec<WithParam>,
    },
    /// `xsl:call-template`
    CallTemplate {
        /// The named template.
        name: Name,
        /// Parameters.
        with_params: Vec<WithParam>,
    },
    /// `xsl:apply-imports`
    ApplyImports,
    /// `xsl:next-match`
    NextMatch,
    /// `xsl:value-of`
    ValueOf {
        /// The selected value.
        select: Expr,
        /// The separator between items.
        separator: Option<Avt>,
        /// Disable output escaping flag (honored by the serializer via
        /// raw writes).
        disable_output_escaping: bool,
    },
    /// `xsl:if`
    If {
        /// The test.
        test: Expr,
        /// Instantiated when true.
        content: Vec<Instruction>,
    },
    /// `xsl:choose`
    Choose {
        /// The `xsl:when` branches.
        whens: Vec<(Expr, Vec<Instruction>)>,
        /// The `xsl:otherwise` branch.
        otherwise: Vec<Instruction>,
    },
    /// `xsl:for-each`
    ForEach {
        /// The selected sequence.
        select: Expr,
        /// Sort keys.
        sort: Vec<SortKey>,
        /// The body.
        content: Vec<Instruction>,
    },
    /// `xsl:for-each-group`
    ForEachGroup {
        /// The population.
        select: Expr,
        /// The grouping specification.
        spec: GroupSpec,
        /// Sort keys applied to the groups.
        sort: Vec<SortKey>,
        /// The body, run once per group.
        content: Vec<Instruction>,
    },
    /// `xsl:iterate`
    Iterate {
        /// The selected sequence.
        select: Expr,
        /// Iteration parameters.
        params: Vec<Param>,
        /// The body.
        content: Vec<Instruction>,
        /// `xsl:on-completion` body.
        on_completion: Vec<Instruction>,
    },
    /// `xsl:next-iteration`
    NextIteration {
        /// Updated parameter values.
        with_params: Vec<WithParam>,
    },
    /// `xsl:break`
    Break {
        /// Content emitted before breaking.
        content: Vec<Instruction>,
    },
    /// `xsl:copy`
    Copy {
        /// Attribute sets applied to copied elements.
        use_attribute_sets: Vec<Name>,
        /// The body.
        content: Vec<Instruction>,
    },
    /// `xsl:copy-of`
    CopyOf {
        /// The copied value.
        select: Expr,
    },
    /// `xsl:element`
    Element {
        /// The computed name.
        name: Avt,
        /// The computed namespace, if any.
        namespace: Option<Avt>,
        /// Attribute sets.
        use_attribute_sets: Vec<Name>,
        /// The body.
        content: Vec<Instruction>,
    },
    /// `xsl:attribute`
    Attribute {
        /// The computed name.
        name: Avt,
        /// The computed namespace.
        namespace: Option<Avt>,
        /// The value, either select or body.
        select: Option<Expr>,
        /// The body when no select.
        content: Vec<Instruction>,
    },
    /// `xsl:comment`
    Comment {
        /// The value.
        select: Option<Expr>,
        /// The body when no select.
        content: Vec<Instruction>,
    },
    /// `xsl:processing-instruction`
    ProcessingInstruction {
        /// The computed target.
        name: Avt,
        /// The value.
        select: Option<Expr>,
        /// The body when no select.
        content: Vec<Instruction>,
    },
    /// `xsl:variable`
    Variable {
        /// The variable name.
        name: Name,
        /// Select expression, or a content-constructed tree fragment.
        select: Option<Expr>,
        /// Declared type.
        as_type: Option<SequenceType>,
        /// The body when no select.
        content: Vec<Instruction>,
    },
    /// `xsl:param` inside a sequence constructor (template parameter).
    Param(Param),
    /// `xsl:number`
    Number {
        /// The level: single, multiple, any.
        level: NumberLevel,
        /// The counted pattern; defaults from the context node.
        count: Option<Pattern>,
        /// The from pattern.
        from: Option<Pattern>,
        /// Explicit value expression.
        value: Option<Expr>,
        /// The format picture.
        format: Avt,
    },
    /// `xsl:analyze-string`
    AnalyzeString {
        /// The input string.
        select: Expr,
        /// The regex, as an AVT.
        regex: Avt,
        /// Regex flags.
        flags: Avt,
        /// Body for matching substrings.
        matching: Vec<Instruction>,
        /// Body for non-matching substrings.
        non_matching: Vec<Instruction>,
    },
    /// `xsl:message`
    Message {
        /// The message content.
        select: Option<Expr>,
        /// Body content.
        content: Vec<Instruction>,
        /// Whether to terminate the transform.
        terminate: Avt,
    },
    /// `xsl:result-document`
    ResultDocument {
        /// The target URI.
        href: Option<Avt>,
        /// The body.
        content: Vec<Instruction>,
    },
    /// `xsl:fork`: branches evaluated in order, results concatenated.
    Fork {
        /// The branches.
        branches: Vec<Vec<Instruction>>,
    },
    /// `xsl:stream` / `xsl:source-document`: read a secondary document.
    Stream {
        /// The document URI.
        href: Avt,
        /// The body, run with the loaded document root as context.
        content: Vec<Instruction>,
    },
    /// `xsl:sequence`
    SequenceInstr {
        /// The selected value.
        select: Expr,
    },
}

/// An `xsl:sort` key.
#[derive(Debug, Clone)]
pub struct SortKey {
    /// The key expression; string value of the item when absent.
    pub select: Option<Expr>,
    /// `ascending` / `descending`, as an AVT.
    pub order: Avt,
    /// `text` or `number`, as an AVT.
    pub data_type: Avt,
}

/// An `xsl:with-param`.
#[derive(Debug, Clone)]
pub struct WithParam {
    /// The parameter name.
    pub name: Name,
    /// The value.
    pub select: Option<Expr>,
    /// Body when no select.
    pub content: Vec<Instruction>,
}

/// An `xsl:param` declaration.
#[derive(Debug, Clone)]
pub struct Param {
    /// The parameter name.
    pub name: Name,
    /// Default value expression.
    pub select: Option<Expr>,
    /// Declared type.
    pub as_type: Option<SequenceType>,
    /// Whether a value must be supplied.
    pub required: bool,
    /// Default body when no select.
    pub content: Vec<Instruction>,
}

/// `xsl:number` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberLevel {
    /// Count among preceding siblings.
    Single,
    /// Count along the ancestor chain.
    Multiple,
    /// Count all preceding nodes.
    Any,
}

/// Grouping specification of `xsl:for-each-group`.
#[derive(Debug, Clone)]
pub enum GroupSpec {
    /// `group-by`
    By(Expr),
    /// `group-adjacent`
    Adjacent(Expr),
    /// `group-starting-with`
    StartingWith(Pattern),
    /// `group-ending-with`
    EndingWith(Pattern),
}

/// A compiled template rule.
#[derive(Debug)]
pub struct Template {
    /// The match pattern; `None` for named-only templates.
    pub pattern: Option<Pattern>,
    /// The template name, if named.
    pub name: Option<Name>,
    /// The modes the rule belongs to; empty means the unnamed mode.
    pub modes: Vec<Name>,
    /// Explicit priority; pattern-derived when absent.
    pub priority: Option<f64>,
    /// Import precedence: higher wins after priority.
    pub precedence: usize,
    /// Declaration order, the final tie-breaker.
    pub order: usize,
    /// Declared parameters.
    pub params: Vec<Param>,
    /// The body.
    pub body: Vec<Instruction>,
    /// The compile-time streamability classification of the body.
    pub streamability: Streamability,
    /// The flattened streaming execution plan, when the body has at
    /// most one consuming point in a streamable shape.
    pub stream_plan: Option<Vec<StreamOp>>,
}

/// An accumulator rule.
#[derive(Debug)]
pub struct AccumulatorRule {
    /// The pattern the rule applies to.
    pub pattern: Pattern,
    /// Whether it fires before (pre-descent) or after (post-descent).
    pub post_descent: bool,
    /// The new-value expression; `$value` is bound to the old value.
    pub select: Expr,
}

/// A compiled accumulator declaration.
#[derive(Debug)]
pub struct Accumulator {
    /// The accumulator name.
    pub name: Name,
    /// The initial value expression.
    pub initial: Expr,
    /// Its rules.
    pub rules: Vec<AccumulatorRule>,
}

/// A compiled key declaration.
#[derive(Debug)]
pub struct KeyDecl {
    /// The key name.
    pub name: Name,
    /// The match pattern.
    pub pattern: Pattern,
    /// The use expression.
    pub use_expr: Expr,
}

/// A global `xsl:variable` or `xsl:param`.
#[derive(Debug)]
pub struct GlobalVariable {
    /// The name.
    pub name: Name,
    /// Whether this is a parameter the caller may override.
    pub is_param: bool,
    /// The value expression.
    pub select: Option<Expr>,
    /// Declared type.
    pub as_type: Option<SequenceType>,
    /// Content when no select.
    pub content: Vec<Instruction>,
}

/// A named attribute set.
#[derive(Debug)]
pub struct AttributeSet {
    /// The set name.
    pub name: Name,
    /// The attribute instructions.
    pub attributes: Vec<Instruction>,
}

/// Properties of `xsl:output`.
#[derive(Debug, Clone, Default)]
pub struct OutputProperties {
    /// The method: xml (default), html, text.
    pub method: Option<String>,
    /// Output encoding.
    pub encoding: Option<String>,
    /// Indentation flag.
    pub indent: bool,
    /// Omit the XML declaration.
    pub omit_xml_declaration: bool,
    /// Standalone flag.
    pub standalone: Option<bool>,
    /// DOCTYPE public identifier.
    pub doctype_public: Option<String>,
    /// DOCTYPE system identifier.
    pub doctype_system: Option<String>,
    /// Elements whose text is wrapped in CDATA.
    pub cdata_section_elements: Vec<Name>,
}
