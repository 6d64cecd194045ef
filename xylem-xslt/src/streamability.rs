//! Compile-time streamability analysis.
//!
//! Every expression and template body gets one of four classes,
//! ordered from cheapest to most demanding. The runtime picks its
//! buffering strategy from the class: MOTIONLESS and CONSUMING run
//! directly on the stream, GROUNDED captures the current subtree, and
//! FREE_RANGING forces whole-document buffering.
//!
//! The analyzer also performs the positional rewrites: expressions
//! that read backwards in ways a counter can carry: `position()`,
//! `count(preceding-sibling::X)`, `sum(preceding-sibling::X/@y)` -
//! are replaced by references to synthetic accumulators so the
//! generated execution stays motionless.

use xylem_name::{Name, FN_NAMESPACE};
use xylem_xpath_ast::ast::{Axis, Expr, NodeTest, PathExpr, Step};

use crate::ast::{Avt, GroupSpec, Instruction, SortKey, WithParam};

/// One step of a flattened streaming execution plan.
///
/// A streamable template body flattens into operations executed at the
/// element's start event, at most one consuming point served by the
/// children's events, and operations executed at the end event.
#[derive(Debug, Clone)]
pub enum StreamOp {
    /// A motionless instruction, evaluated in place.
    Instr(Instruction),
    /// Open a literal result element.
    StartLiteral {
        /// The element name.
        name: Name,
        /// Namespace declarations to copy out.
        namespaces: Vec<(String, String)>,
        /// AVT attributes, all motionless.
        attributes: Vec<(Name, Avt)>,
        /// Attribute sets to apply.
        use_attribute_sets: Vec<Name>,
    },
    /// Close the literal element opened by the matching
    /// [`StreamOp::StartLiteral`].
    EndLiteral,
    /// The consuming point: dispatch child events to templates.
    ApplyChildren {
        /// The dispatch mode.
        mode: Option<Name>,
    },
    /// The consuming point: echo the subtree's text (value-of `.`).
    EchoText,
}

/// Flatten a template body into a streaming plan, if its shape allows:
/// any number of motionless instructions around at most one consuming
/// point, with literal elements the only nesting construct crossing
/// the point.
pub fn build_stream_plan(body: &[Instruction]) -> Option<Vec<StreamOp>> {
    let mut ops = Vec::new();
    let mut seen_consuming = false;
    flatten(body, &mut ops, &mut seen_consuming)?;
    Some(ops)
}

fn flatten(
    body: &[Instruction],
    ops: &mut Vec<StreamOp>,
    seen_consuming: &mut bool,
) -> Option<()> {
    for instruction in body {
        match instruction {
            Instruction::ApplyTemplates {
                select: None,
                mode,
                sort,
                with_params,
            } if sort.is_empty() && with_params.is_empty() => {
                if *seen_consuming {
                    return None;
                }
                *seen_consuming = true;
                ops.push(StreamOp::ApplyChildren { mode: mode.clone() });
            }
            Instruction::ValueOf {
                select: Expr::ContextItem,
                separator: None,
                ..
            } => {
                if *seen_consuming {
                    return None;
                }
                *seen_consuming = true;
                ops.push(StreamOp::EchoText);
            }
            Instruction::LiteralElement {
                name,
                namespaces,
                attributes,
                use_attribute_sets,
                content,
            } => {
                if contains_consuming_point(content) {
                    ops.push(StreamOp::StartLiteral {
                        name: name.clone(),
                        namespaces: namespaces.clone(),
                        attributes: attributes.clone(),
                        use_attribute_sets: use_attribute_sets.clone(),
                    });
                    flatten(content, ops, seen_consuming)?;
                    ops.push(StreamOp::EndLiteral);
                } else {
                    let mut probe = instruction.clone();
                    let mut throwaway = Analyzer::new();
                    if throwaway.classify_instruction(&mut probe) != Streamability::Motionless {
                        return None;
                    }
                    ops.push(StreamOp::Instr(instruction.clone()));
                }
            }
            other => {
                // everything else must be motionless to evaluate at the
                // start event; anything that moves invalidates the plan
                let mut probe = other.clone();
                let mut throwaway = Analyzer::new();
                if throwaway.classify_instruction(&mut probe) != Streamability::Motionless {
                    return None;
                }
                ops.push(StreamOp::Instr(other.clone()));
            }
        }
    }
    Some(())
}

// a cheap syntactic scan for the two recognized consuming points
fn contains_consuming_point(body: &[Instruction]) -> bool {
    body.iter().any(|instruction| match instruction {
        Instruction::ApplyTemplates { select: None, .. } => true,
        Instruction::ValueOf {
            select: Expr::ContextItem,
            ..
        } => true,
        Instruction::LiteralElement { content, .. } => contains_consuming_point(content),
        Instruction::If { content, .. } => contains_consuming_point(content),
        Instruction::Choose { whens, otherwise } => {
            whens.iter().any(|(_, c)| contains_consuming_point(c))
                || contains_consuming_point(otherwise)
        }
        _ => false,
    })
}

/// The namespace synthetic accumulator variables live in.
pub const INTERNAL_NAMESPACE: &str = "http://xylem.dev/internal";

/// The streamability lattice, weakest requirement first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Streamability {
    /// Needs no traversal at all: attributes, ancestors, variables.
    Motionless,
    /// Consumes the current subtree once, in document order.
    Consuming,
    /// Needs random access within the current subtree.
    Grounded,
    /// Needs nodes outside the current subtree.
    FreeRanging,
}

impl Streamability {
    /// Sequential composition: two subtree sweeps cannot both stream.
    pub fn then(self, other: Streamability) -> Streamability {
        use Streamability::*;
        match (self, other) {
            (FreeRanging, _) | (_, FreeRanging) => FreeRanging,
            (Grounded, _) | (_, Grounded) => Grounded,
            (Consuming, Consuming) => Grounded,
            (Consuming, Motionless) | (Motionless, Consuming) => Consuming,
            (Motionless, Motionless) => Motionless,
        }
    }

    /// Parallel composition for operands evaluated independently over
    /// the same focus (both still run left to right here, so the rule
    /// is the same).
    pub fn join(self, other: Streamability) -> Streamability {
        self.then(other)
    }
}

/// A rewrite the analyzer introduced: a reverse-looking expression
/// replaced by a counter the runtime maintains.
#[derive(Debug, Clone)]
pub enum SyntheticAccumulator {
    /// `position()` in a dispatch context: the child counter.
    Position,
    /// `count(preceding-sibling::X)`: a per-parent counter keyed on
    /// the sibling test.
    CountPreceding {
        /// The counted test.
        test: NodeTest,
        /// The variable the rewrite references.
        var: Name,
    },
    /// `sum(preceding-sibling::X/@y)`: a running sum.
    SumPrecedingAttribute {
        /// The sibling test.
        test: NodeTest,
        /// The summed attribute.
        attribute: Name,
        /// The variable the rewrite references.
        var: Name,
    },
}

impl SyntheticAccumulator {
    /// The variable name carrying this accumulator's value, when it
    /// has one.
    pub fn var(&self) -> Option<&Name> {
        match self {
            SyntheticAccumulator::Position => None,
            SyntheticAccumulator::CountPreceding { var, .. } => Some(var),
            SyntheticAccumulator::SumPrecedingAttribute { var, .. } => Some(var),
        }
    }
}

/// The analyzer; collects rewrites as it classifies.
#[derive(Debug, Default)]
pub struct Analyzer {
    /// Rewrites introduced so far.
    pub synthetics: Vec<SyntheticAccumulator>,
}

impl Analyzer {
    /// A fresh analyzer.
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_var(&self) -> Name {
        Name::new(INTERNAL_NAMESPACE, &format!("acc-{}", self.synthetics.len()))
    }

    /// Classify an expression, applying rewrites in place.
    pub fn classify_expr(&mut self, expr: &mut Expr) -> Streamability {
        use Streamability::*;
        // table-driven rewrites first
        if let Some(rewritten) = self.try_rewrite(expr) {
            *expr = rewritten;
            return Motionless;
        }
        match expr {
            Expr::Literal(_) | Expr::VarRef(_) | Expr::Empty | Expr::Placeholder => Motionless,
            Expr::ContextItem => Motionless,
            Expr::Parenthesized(inner) => self.classify_expr(inner),
            Expr::Sequence(items) => items
                .iter_mut()
                .map(|item| self.classify_expr(item))
                .fold(Motionless, Streamability::then),
            Expr::Binary { left, right, .. } => {
                let l = self.classify_expr(left);
                let r = self.classify_expr(right);
                l.join(r)
            }
            Expr::UnaryMinus(inner) | Expr::UnaryPlus(inner) => self.classify_expr(inner),
            Expr::Path(path) => self.classify_path(path),
            Expr::SimpleMap(left, right) => {
                let l = self.classify_expr(left);
                let r = self.classify_expr(right);
                // the right side runs under a moved focus
                match l.join(r) {
                    Motionless => Motionless,
                    Consuming => Consuming,
                    _ => Grounded.join(l),
                }
            }
            Expr::Filter { base, predicate } => {
                let b = self.classify_expr(base);
                let p = self.classify_expr(predicate);
                b.join(p)
            }
            Expr::FunctionCall { name, args } => {
                let mut result = function_baseline(name);
                for arg in args.iter_mut() {
                    result = result.join(self.classify_expr(arg));
                }
                result
            }
            Expr::DynamicCall { base, args } => {
                let mut result = self.classify_expr(base);
                for arg in args.iter_mut() {
                    result = result.join(self.classify_expr(arg));
                }
                // the called function's body is unknown
                result.join(Streamability::Grounded)
            }
            Expr::NamedFunctionRef { .. } => Motionless,
            Expr::InlineFunction(_) => Motionless,
            Expr::Lookup { base, key } => {
                let mut result = self.classify_expr(base);
                if let xylem_xpath_ast::ast::LookupKey::Expr(inner) = key {
                    result = result.join(self.classify_expr(inner));
                }
                result
            }
            Expr::UnaryLookup(key) => match key {
                xylem_xpath_ast::ast::LookupKey::Expr(inner) => self.classify_expr(inner),
                _ => Motionless,
            },
            Expr::MapConstructor(entries) => entries
                .iter_mut()
                .map(|(k, v)| self.classify_expr(k).join(self.classify_expr(v)))
                .fold(Motionless, Streamability::join),
            Expr::SquareArray(members) => members
                .iter_mut()
                .map(|member| self.classify_expr(member))
                .fold(Motionless, Streamability::join),
            Expr::CurlyArray(body) => match body {
                None => Motionless,
                Some(body) => self.classify_expr(body),
            },
            Expr::If {
                condition,
                then,
                else_,
            } => {
                let c = self.classify_expr(condition);
                // branches are alternatives, not sequenced
                let t = self.classify_expr(then);
                let e = self.classify_expr(else_);
                c.then(t.max(e))
            }
            Expr::Binding { bindings, body, .. } => {
                let mut result = Motionless;
                for (_, value) in bindings.iter_mut() {
                    result = result.join(self.classify_expr(value));
                }
                result.join(self.classify_expr(body))
            }
            Expr::Cast { expr, .. }
            | Expr::Castable { expr, .. }
            | Expr::Treat { expr, .. }
            | Expr::InstanceOf { expr, .. } => self.classify_expr(expr),
        }
    }

    // the rewrite table
    fn try_rewrite(&mut self, expr: &Expr) -> Option<Expr> {
        let Expr::FunctionCall { name, args } = expr else {
            return None;
        };
        if name.namespace() != FN_NAMESPACE || args.len() != 1 {
            return None;
        }
        match name.local_name() {
            "count" => {
                let test = preceding_sibling_test(&args[0])?;
                let var = self.fresh_var();
                self.synthetics.push(SyntheticAccumulator::CountPreceding {
                    test,
                    var: var.clone(),
                });
                Some(Expr::VarRef(var))
            }
            "sum" => {
                let (test, attribute) = preceding_sibling_attribute(&args[0])?;
                let var = self.fresh_var();
                self.synthetics
                    .push(SyntheticAccumulator::SumPrecedingAttribute {
                        test,
                        attribute,
                        var: var.clone(),
                    });
                Some(Expr::VarRef(var))
            }
            _ => None,
        }
    }

    fn classify_path(&mut self, path: &mut PathExpr) -> Streamability {
        use Streamability::*;
        let mut result = Motionless;
        for step in path.steps.iter_mut() {
            let step_class = match step {
                Step::Root => FreeRanging,
                Step::Axis {
                    axis, predicates, ..
                } => {
                    let axis_class = match axis {
                        Axis::SelfAxis | Axis::Attribute | Axis::Namespace => Motionless,
                        Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf => Motionless,
                        Axis::Child | Axis::Descendant | Axis::DescendantOrSelf => Consuming,
                        Axis::FollowingSibling
                        | Axis::Following
                        | Axis::Preceding
                        | Axis::PrecedingSibling => FreeRanging,
                    };
                    let mut class = axis_class;
                    for predicate in predicates.iter_mut() {
                        class = class.join(self.classify_expr(predicate));
                    }
                    class
                }
                Step::Expr { expr, predicates } => {
                    let mut class = self.classify_expr(expr);
                    for predicate in predicates.iter_mut() {
                        class = class.join(self.classify_expr(predicate));
                    }
                    class
                }
            };
            result = result.then(step_class);
        }
        result
    }

    /// Classify a sequence constructor.
    pub fn classify_instructions(&mut self, instructions: &mut [Instruction]) -> Streamability {
        let mut result = Streamability::Motionless;
        for instruction in instructions.iter_mut() {
            result = result.then(self.classify_instruction(instruction));
        }
        result
    }

    fn classify_avt(&mut self, avt: &mut Avt) -> Streamability {
        let mut result = Streamability::Motionless;
        for part in avt.parts.iter_mut() {
            if let crate::ast::AvtPart::Expr(expr) = part {
                result = result.join(self.classify_expr(expr));
            }
        }
        result
    }

    fn classify_sorts(&mut self, sorts: &mut [SortKey]) -> Streamability {
        // sorting requires the whole selected population
        if sorts.is_empty() {
            Streamability::Motionless
        } else {
            Streamability::Grounded
        }
    }

    fn classify_with_params(&mut self, params: &mut [WithParam]) -> Streamability {
        let mut result = Streamability::Motionless;
        for param in params.iter_mut() {
            if let Some(select) = &mut param.select {
                result = result.join(self.classify_expr(select));
            }
            result = result.join(self.classify_instructions(&mut param.content));
        }
        result
    }

    pub(crate) fn classify_instruction(&mut self, instruction: &mut Instruction) -> Streamability {
        use Streamability::*;
        match instruction {
            Instruction::Text(_) => Motionless,
            Instruction::LiteralElement {
                attributes,
                content,
                ..
            } => {
                let mut result = Motionless;
                for (_, avt) in attributes.iter_mut() {
                    result = result.join(self.classify_avt(avt));
                }
                result.then(self.classify_instructions(content))
            }
            Instruction::ApplyTemplates {
                select,
                sort,
                with_params,
                ..
            } => {
                let base = match select {
                    // dispatching over the children consumes the
                    // subtree exactly once
                    None => Consuming,
                    Some(select) => match self.classify_expr(select) {
                        Motionless | Consuming => Grounded,
                        other => other,
                    },
                };
                base.join(self.classify_sorts(sort))
                    .join(self.classify_with_params(with_params))
            }
            Instruction::CallTemplate { with_params, .. } => {
                // the called template's own class is accounted at its
                // declaration; parameters evaluate here
                Grounded.join(self.classify_with_params(with_params))
            }
            Instruction::ApplyImports | Instruction::NextMatch => Grounded,
            Instruction::ValueOf { select, .. } => match select {
                // string(.) and . stream the text of the subtree
                Expr::ContextItem => Consuming,
                other => self.classify_expr(other),
            },
            Instruction::If { test, content } => {
                let t = self.classify_expr(test);
                t.then(self.classify_instructions(content))
            }
            Instruction::Choose { whens, otherwise } => {
                let mut result = Motionless;
                let mut branch_max = Motionless;
                for (test, content) in whens.iter_mut() {
                    result = result.join(self.classify_expr(test));
                    branch_max = branch_max.max(self.classify_instructions(content));
                }
                branch_max = branch_max.max(self.classify_instructions(otherwise));
                result.then(branch_max)
            }
            Instruction::ForEach {
                select,
                sort,
                content,
            } => {
                let s = self.classify_expr(select);
                let body = self.classify_instructions(content);
                let combined = match (s, body) {
                    (Motionless, b) => b,
                    (Consuming, Motionless) => Consuming,
                    _ => Grounded,
                };
                combined.join(self.classify_sorts(sort))
            }
            Instruction::ForEachGroup {
                select,
                spec,
                sort,
                content,
            } => {
                let mut result = self.classify_expr(select).join(Grounded);
                match spec {
                    GroupSpec::By(expr) | GroupSpec::Adjacent(expr) => {
                        result = result.join(self.classify_expr(expr));
                    }
                    GroupSpec::StartingWith(_) | GroupSpec::EndingWith(_) => {}
                }
                result
                    .join(self.classify_sorts(sort))
                    .join(self.classify_instructions(content))
            }
            Instruction::Iterate {
                select,
                params,
                content,
                on_completion,
            } => {
                let mut result = self.classify_expr(select);
                for param in params.iter_mut() {
                    if let Some(select) = &mut param.select {
                        result = result.join(self.classify_expr(select));
                    }
                }
                result = result.then(self.classify_instructions(content));
                result.then(self.classify_instructions(on_completion))
            }
            Instruction::NextIteration { with_params } => self.classify_with_params(with_params),
            Instruction::Break { content } => self.classify_instructions(content),
            Instruction::Copy { content, .. } => {
                Motionless.then(self.classify_instructions(content))
            }
            Instruction::CopyOf { select } => match self.classify_expr(select) {
                Motionless => Consuming,
                other => other,
            },
            Instruction::Element {
                name,
                namespace,
                content,
                ..
            } => {
                let mut result = self.classify_avt(name);
                if let Some(namespace) = namespace {
                    result = result.join(self.classify_avt(namespace));
                }
                result.then(self.classify_instructions(content))
            }
            Instruction::Attribute {
                name,
                namespace,
                select,
                content,
            } => {
                let mut result = self.classify_avt(name);
                if let Some(namespace) = namespace {
                    result = result.join(self.classify_avt(namespace));
                }
                if let Some(select) = select {
                    result = result.join(self.classify_expr(select));
                }
                result.then(self.classify_instructions(content))
            }
            Instruction::Comment { select, content }
            | Instruction::ProcessingInstruction {
                select, content, ..
            } => {
                let mut result = Motionless;
                if let Some(select) = select {
                    result = result.join(self.classify_expr(select));
                }
                result.then(self.classify_instructions(content))
            }
            Instruction::Variable {
                select, content, ..
            } => {
                let mut result = Motionless;
                if let Some(select) = select {
                    result = result.join(self.classify_expr(select));
                }
                // tree-fragment construction buffers its own output,
                // not the input; classify the body's input needs
                result.then(self.classify_instructions(content))
            }
            Instruction::Param(param) => {
                let mut result = Motionless;
                if let Some(select) = &mut param.select {
                    result = result.join(self.classify_expr(select));
                }
                result
            }
            Instruction::Number { value, .. } => match value {
                Some(value) => self.classify_expr(value),
                // counting looks backwards through the document
                None => FreeRanging,
            },
            Instruction::AnalyzeString {
                select,
                matching,
                non_matching,
                ..
            } => {
                let mut result = self.classify_expr(select);
                result = result.then(
                    self.classify_instructions(matching)
                        .max(self.classify_instructions(non_matching)),
                );
                result
            }
            Instruction::Message { select, content, .. } => {
                let mut result = Motionless;
                if let Some(select) = select {
                    result = result.join(self.classify_expr(select));
                }
                result.then(self.classify_instructions(content))
            }
            Instruction::ResultDocument { content, .. } => self.classify_instructions(content),
            Instruction::Fork { branches } => {
                // fork exists so multiple consuming branches can share
                // one pass; this implementation grounds the subtree
                let mut result = Motionless;
                for branch in branches.iter_mut() {
                    result = result.max(self.classify_instructions(branch));
                }
                if branches.len() > 1 && result >= Consuming {
                    Grounded
                } else {
                    result
                }
            }
            Instruction::Stream { content, .. } => {
                // the secondary document gets its own streaming pass
                self.classify_instructions(content);
                Motionless
            }
            Instruction::SequenceInstr { select } => self.classify_expr(select),
        }
    }
}

fn function_baseline(name: &Name) -> Streamability {
    if name.namespace() != FN_NAMESPACE {
        return Streamability::Motionless;
    }
    match name.local_name() {
        // reaching other documents or indexes leaves the stream
        "doc" | "document" | "key" | "id" => Streamability::FreeRanging,
        // needs the size of the current node list
        "last" => Streamability::FreeRanging,
        // atomizing the focus reads the subtree's text
        "string" | "data" | "number" | "string-length" | "normalize-space" => {
            Streamability::Consuming
        }
        _ => Streamability::Motionless,
    }
}

// count(preceding-sibling::X): the argument must be exactly one
// preceding-sibling step without predicates
fn preceding_sibling_test(expr: &Expr) -> Option<NodeTest> {
    let Expr::Path(path) = expr else { return None };
    let [Step::Axis {
        axis: Axis::PrecedingSibling,
        test,
        predicates,
    }] = path.steps.as_slice()
    else {
        return None;
    };
    predicates.is_empty().then(|| test.clone())
}

// sum(preceding-sibling::X/@y)
fn preceding_sibling_attribute(expr: &Expr) -> Option<(NodeTest, Name)> {
    let Expr::Path(path) = expr else { return None };
    let [Step::Axis {
        axis: Axis::PrecedingSibling,
        test,
        predicates,
    }, Step::Axis {
        axis: Axis::Attribute,
        test: attr_test,
        predicates: attr_predicates,
    }] = path.steps.as_slice()
    else {
        return None;
    };
    if !predicates.is_empty() || !attr_predicates.is_empty() {
        return None;
    }
    let attribute = match attr_test {
        NodeTest::Name(xylem_xpath_ast::ast::NameTest::Name(name)) => name.clone(),
        _ => return None,
    };
    Some((test.clone(), attribute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xylem_name::Namespaces;
    use xylem_xpath_ast::parse_xpath;

    fn classify(source: &str) -> (Streamability, usize) {
        let mut expr = parse_xpath(source, &Namespaces::default()).unwrap();
        let mut analyzer = Analyzer::new();
        let class = analyzer.classify_expr(&mut expr);
        (class, analyzer.synthetics.len())
    }

    #[test]
    fn attribute_access_is_motionless() {
        assert_eq!(classify("@id").0, Streamability::Motionless);
        assert_eq!(classify("@a + @b").0, Streamability::Motionless);
    }

    #[test]
    fn downward_selection_is_consuming() {
        assert_eq!(classify("item").0, Streamability::Consuming);
        assert_eq!(classify("string(.)").0, Streamability::Consuming);
        assert_eq!(classify(".//text()").0, Streamability::Consuming);
    }

    #[test]
    fn two_sweeps_are_grounded() {
        assert_eq!(classify("item + other").0, Streamability::Grounded);
    }

    #[test]
    fn reverse_axis_is_free_ranging() {
        assert_eq!(classify("preceding-sibling::x/@n").0, Streamability::FreeRanging);
    }

    #[test]
    fn count_preceding_sibling_rewrites_to_counter() {
        let (class, synthetics) = classify("count(preceding-sibling::item)");
        assert_eq!(class, Streamability::Motionless);
        assert_eq!(synthetics, 1);
    }

    #[test]
    fn sum_preceding_attribute_rewrites_to_running_sum() {
        let (class, synthetics) = classify("sum(preceding-sibling::item/@qty)");
        assert_eq!(class, Streamability::Motionless);
        assert_eq!(synthetics, 1);
    }
}
