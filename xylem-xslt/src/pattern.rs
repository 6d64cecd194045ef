//! Match patterns.
//!
//! A pattern is the restricted path grammar of XSLT match attributes:
//! alternatives of rightmost-anchored step chains using only the child
//! and attribute axes (with `//` gaps). Matching proceeds from the
//! matched node upward through its ancestors.

use xylem_name::Name;
use xylem_xpath_ast::ast::{Axis, Expr, KindTest, NameTest, NodeTest, PathExpr, Step};

use xylem_xpath::context::EvalContext;
use xylem_xpath::{Error, Result};
use xylem_xpath::interpreter::Interpreter;
use xylem_xpath::node::{NodeId, NodeKind};
use xylem_xpath::sequence::Item;

/// A compiled pattern: one or more alternatives.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The alternatives; any match makes the pattern match.
    pub alternatives: Vec<PathPattern>,
}

/// One alternative of a pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    /// Steps, leftmost to rightmost; the rightmost matches the node
    /// itself.
    pub steps: Vec<PatternStep>,
    /// Whether the pattern is anchored at the document root.
    pub rooted: bool,
}

/// One step of a pattern.
#[derive(Debug, Clone)]
pub struct PatternStep {
    /// Whether this step matches attributes rather than elements.
    pub attribute_axis: bool,
    /// The node test.
    pub test: NodeTest,
    /// Predicates on the step.
    pub predicates: Vec<Expr>,
    /// Whether any number of intermediate ancestors may sit between
    /// this step and the previous one (`//`).
    pub descendant_gap: bool,
}

impl Pattern {
    /// Compile a pattern from a parsed expression.
    pub fn from_expr(expr: &Expr) -> Result<Pattern> {
        let mut alternatives = Vec::new();
        collect_alternatives(expr, &mut alternatives)?;
        Ok(Pattern { alternatives })
    }

    /// The default priority of a single-alternative pattern, per the
    /// XSLT specificity rules.
    pub fn default_priority(&self) -> f64 {
        if self.alternatives.len() != 1 {
            return 0.5;
        }
        self.alternatives[0].default_priority()
    }

    /// Match a node in a buffered tree. Predicates are evaluated with
    /// the interpreter.
    pub fn matches(
        &self,
        interp: &Interpreter,
        ctx: &EvalContext,
        node: NodeId,
    ) -> Result<bool> {
        for alternative in &self.alternatives {
            if alternative.matches(interp, ctx, node)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Match against a streaming ancestor chain (root-most first, the
    /// candidate node's name last). Patterns with predicates never get
    /// here; the classifier routes them through buffering.
    pub fn matches_streaming(&self, chain: &[StreamingName]) -> bool {
        self.alternatives
            .iter()
            .any(|alternative| alternative.matches_streaming(chain))
    }

    /// Whether any step carries a predicate.
    pub fn has_predicates(&self) -> bool {
        self.alternatives
            .iter()
            .any(|a| a.steps.iter().any(|s| !s.predicates.is_empty()))
    }
}

/// The name/kind of one open element (or the document) in streaming
/// mode.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamingName {
    /// The document node.
    Document,
    /// An element with its expanded name.
    Element(Name),
}

impl PathPattern {
    fn default_priority(&self) -> f64 {
        if self.steps.len() != 1 || self.rooted {
            if self.steps.is_empty() && self.rooted {
                // the "/" pattern
                return -0.5;
            }
            return 0.5;
        }
        let step = &self.steps[0];
        if !step.predicates.is_empty() {
            return 0.5;
        }
        match &step.test {
            NodeTest::Name(NameTest::Any) => -0.5,
            NodeTest::Name(NameTest::AnyLocal { .. })
            | NodeTest::Name(NameTest::AnyNamespace { .. }) => -0.25,
            NodeTest::Name(NameTest::Name(_)) => 0.0,
            NodeTest::Kind(KindTest::Pi(Some(_))) => 0.0,
            NodeTest::Kind(_) => -0.5,
        }
    }

    fn matches(
        &self,
        interp: &Interpreter,
        ctx: &EvalContext,
        node: NodeId,
    ) -> Result<bool> {
        if self.steps.is_empty() {
            // "/": the document node
            return Ok(matches!(
                interp.documents().kind(node),
                NodeKind::Document
            ));
        }
        self.match_from(interp, ctx, node, self.steps.len() - 1)
    }

    fn match_from(
        &self,
        interp: &Interpreter,
        ctx: &EvalContext,
        node: NodeId,
        step_index: usize,
    ) -> Result<bool> {
        let step = &self.steps[step_index];
        if !step.matches_node(interp, ctx, node)? {
            return Ok(false);
        }
        let parent = interp.documents().parent(node);
        if step_index == 0 {
            if self.rooted && !step.descendant_gap {
                // parent must be the document node
                return Ok(matches!(
                    parent.map(|p| interp.documents().kind(p).clone()),
                    Some(NodeKind::Document)
                ));
            }
            return Ok(true);
        }
        let mut candidate = parent;
        while let Some(current) = candidate {
            if self.match_from(interp, ctx, current, step_index - 1)? {
                return Ok(true);
            }
            if !step.descendant_gap {
                return Ok(false);
            }
            candidate = interp.documents().parent(current);
        }
        Ok(false)
    }

    fn matches_streaming(&self, chain: &[StreamingName]) -> bool {
        let candidate = match chain.last() {
            Some(candidate) => candidate,
            None => return false,
        };
        if self.steps.is_empty() {
            return *candidate == StreamingName::Document;
        }
        self.match_streaming_from(chain, chain.len() - 1, self.steps.len() - 1)
    }

    fn match_streaming_from(
        &self,
        chain: &[StreamingName],
        chain_index: usize,
        step_index: usize,
    ) -> bool {
        let step = &self.steps[step_index];
        if !step.matches_streaming_name(&chain[chain_index]) {
            return false;
        }
        if step_index == 0 {
            if self.rooted && !step.descendant_gap {
                return chain_index >= 1 && chain[chain_index - 1] == StreamingName::Document;
            }
            return true;
        }
        if chain_index == 0 {
            return false;
        }
        let mut ancestor = chain_index - 1;
        loop {
            if self.match_streaming_from(chain, ancestor, step_index - 1) {
                return true;
            }
            if !step.descendant_gap || ancestor == 0 {
                return false;
            }
            ancestor -= 1;
        }
    }
}

impl PatternStep {
    fn matches_node(
        &self,
        interp: &Interpreter,
        ctx: &EvalContext,
        node: NodeId,
    ) -> Result<bool> {
        let documents = interp.documents();
        let kind = documents.kind(node).clone();
        let kind_ok = if self.attribute_axis {
            matches!(kind, NodeKind::Attribute { .. })
        } else {
            !matches!(kind, NodeKind::Attribute { .. } | NodeKind::Namespace { .. })
        };
        if !kind_ok {
            return Ok(false);
        }
        let test_ok = match &self.test {
            NodeTest::Name(name_test) => {
                let principal = if self.attribute_axis {
                    matches!(kind, NodeKind::Attribute { .. })
                } else {
                    matches!(kind, NodeKind::Element { .. })
                };
                principal
                    && match (name_test, documents.name(node)) {
                        (NameTest::Any, _) => true,
                        (NameTest::Name(expected), Some(name)) => name == *expected,
                        (NameTest::AnyLocal { namespace }, Some(name)) => {
                            name.namespace() == namespace
                        }
                        (NameTest::AnyNamespace { local }, Some(name)) => {
                            name.local_name() == local
                        }
                        _ => false,
                    }
            }
            NodeTest::Kind(kind_test) => match (kind_test, &kind) {
                (KindTest::AnyKind, _) => true,
                (KindTest::Text, NodeKind::Text(_)) => true,
                (KindTest::Comment, NodeKind::Comment(_)) => true,
                (KindTest::Document(_), NodeKind::Document) => true,
                (KindTest::Pi(None), NodeKind::Pi { .. }) => true,
                (KindTest::Pi(Some(expected)), NodeKind::Pi { target, .. }) => {
                    target == expected
                }
                (KindTest::Element { name, .. }, NodeKind::Element { .. }) => match name {
                    None => true,
                    Some(expected) => documents.name(node).as_ref() == Some(expected),
                },
                (KindTest::Attribute { name, .. }, NodeKind::Attribute { .. }) => match name {
                    None => true,
                    Some(expected) => documents.name(node).as_ref() == Some(expected),
                },
                _ => false,
            },
        };
        if !test_ok {
            return Ok(false);
        }
        if self.predicates.is_empty() {
            return Ok(true);
        }
        // predicate position counts siblings passing the same test
        drop(documents);
        let (position, size) = self.sibling_position(interp, ctx, node)?;
        for predicate in &self.predicates {
            let inner = ctx.focused(Item::Node(node), position, size);
            let value = interp.evaluate(predicate, &inner)?;
            let keep = match value.zero_or_one() {
                Ok(Some(Item::Atomic(atomic))) if atomic.is_numeric() => {
                    atomic.to_double()? == position as f64
                }
                _ => value.effective_boolean_value()?,
            };
            if !keep {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn sibling_position(
        &self,
        interp: &Interpreter,
        ctx: &EvalContext,
        node: NodeId,
    ) -> Result<(usize, usize)> {
        let documents = interp.documents();
        let parent = match documents.parent(node) {
            Some(parent) => parent,
            None => return Ok((1, 1)),
        };
        let siblings: Vec<NodeId> = if self.attribute_axis {
            documents.attributes(parent)
        } else {
            documents.children(parent)
        };
        drop(documents);
        let mut matching = Vec::new();
        for sibling in siblings {
            let step_without_predicates = PatternStep {
                attribute_axis: self.attribute_axis,
                test: self.test.clone(),
                predicates: Vec::new(),
                descendant_gap: false,
            };
            if step_without_predicates.matches_node(interp, ctx, sibling)? {
                matching.push(sibling);
            }
        }
        let position = matching
            .iter()
            .position(|candidate| *candidate == node)
            .map(|i| i + 1)
            .unwrap_or(1);
        Ok((position, matching.len()))
    }

    fn matches_streaming_name(&self, name: &StreamingName) -> bool {
        match name {
            StreamingName::Document => {
                matches!(
                    self.test,
                    NodeTest::Kind(KindTest::Document(_)) | NodeTest::Kind(KindTest::AnyKind)
                ) && !self.attribute_axis
            }
            StreamingName::Element(element_name) => {
                if self.attribute_axis {
                    return false;
                }
                match &self.test {
                    NodeTest::Name(NameTest::Any) => true,
                    NodeTest::Name(NameTest::Name(expected)) => element_name == expected,
                    NodeTest::Name(NameTest::AnyLocal { namespace }) => {
                        element_name.namespace() == namespace
                    }
                    NodeTest::Name(NameTest::AnyNamespace { local }) => {
                        element_name.local_name() == local
                    }
                    NodeTest::Kind(KindTest::AnyKind) => true,
                    NodeTest::Kind(KindTest::Element { name, .. }) => match name {
                        None => true,
                        Some(expected) => element_name == expected,
                    },
                    NodeTest::Kind(_) => false,
                }
            }
        }
    }
}

fn collect_alternatives(expr: &Expr, alternatives: &mut Vec<PathPattern>) -> Result<()> {
    match expr {
        Expr::Binary {
            op: xylem_xpath_ast::ast::BinaryOp::Union,
            left,
            right,
        } => {
            collect_alternatives(left, alternatives)?;
            collect_alternatives(right, alternatives)?;
            Ok(())
        }
        Expr::Parenthesized(inner) => collect_alternatives(inner, alternatives),
        Expr::Path(path) => {
            alternatives.push(compile_path_pattern(path)?);
            Ok(())
        }
        _ => Err(Error::XTSE0010),
    }
}

fn compile_path_pattern(path: &PathExpr) -> Result<PathPattern> {
    let mut steps = Vec::new();
    let mut rooted = false;
    let mut pending_gap = false;
    for (i, step) in path.steps.iter().enumerate() {
        match step {
            Step::Root => {
                if i != 0 {
                    return Err(Error::XTSE0010);
                }
                rooted = true;
            }
            Step::Axis {
                axis,
                test,
                predicates,
            } => match axis {
                Axis::DescendantOrSelf
                    if matches!(test, NodeTest::Kind(KindTest::AnyKind))
                        && predicates.is_empty() =>
                {
                    pending_gap = true;
                }
                Axis::Child | Axis::Attribute | Axis::SelfAxis | Axis::Descendant => {
                    steps.push(PatternStep {
                        attribute_axis: *axis == Axis::Attribute,
                        test: test.clone(),
                        predicates: predicates.clone(),
                        descendant_gap: pending_gap || *axis == Axis::Descendant,
                    });
                    pending_gap = false;
                }
                _ => return Err(Error::XTSE0010),
            },
            Step::Expr { .. } => return Err(Error::XTSE0010),
        }
    }
    // an unrooted pattern may match at any depth
    if let Some(first) = steps.first_mut() {
        if !rooted {
            first.descendant_gap = true;
        }
    }
    Ok(PathPattern { steps, rooted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xylem_name::Namespaces;
    use xylem_xpath_ast::parse_xpath;

    fn pattern(source: &str) -> Pattern {
        let expr = parse_xpath(source, &Namespaces::default()).unwrap();
        Pattern::from_expr(&expr).unwrap()
    }

    #[test]
    fn priorities_follow_specificity() {
        assert_eq!(pattern("*").default_priority(), -0.5);
        assert_eq!(pattern("@*").default_priority(), -0.5);
        assert_eq!(pattern("item").default_priority(), 0.0);
        assert_eq!(pattern("*:item").default_priority(), -0.25);
        assert_eq!(pattern("a/b").default_priority(), 0.5);
        assert_eq!(pattern("item[1]").default_priority(), 0.5);
        assert_eq!(pattern("text()").default_priority(), -0.5);
    }

    #[test]
    fn streaming_match_walks_ancestors() {
        let chain = vec![
            StreamingName::Document,
            StreamingName::Element(Name::local("doc")),
            StreamingName::Element(Name::local("section")),
            StreamingName::Element(Name::local("item")),
        ];
        assert!(pattern("item").matches_streaming(&chain));
        assert!(pattern("section/item").matches_streaming(&chain));
        assert!(pattern("doc//item").matches_streaming(&chain));
        assert!(pattern("/doc/section/item").matches_streaming(&chain));
        assert!(!pattern("other/item").matches_streaming(&chain));
        assert!(!pattern("/section/item").matches_streaming(&chain));
        assert!(pattern("section").matches_streaming(&chain[..3].to_vec().as_slice()));
    }
}
