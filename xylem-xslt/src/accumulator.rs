//! The accumulator engine.
//!
//! In full-document mode accumulator values are precomputed in one
//! pre/post-order walk and answered from maps. In streaming mode the
//! engine folds values forward as elements open and close;
//! `accumulator-before` reads the running value and `accumulator-after`
//! is only answerable once the subtree has closed.

use ahash::{HashMap, HashMapExt};
use xylem_name::Name;

use xylem_xpath::context::EvalContext;
use xylem_xpath::{Error, Result};
use xylem_xpath::interpreter::Interpreter;
use xylem_xpath::node::{NodeId, NodeKind};
use xylem_xpath::sequence::{Item, Sequence};

use crate::compiler::CompiledStylesheet;

/// Precomputed per-node accumulator observations for a buffered
/// document.
#[derive(Debug, Default)]
pub struct AccumulatorValues {
    before: Vec<HashMap<NodeId, Sequence>>,
    after: Vec<HashMap<NodeId, Sequence>>,
    names: Vec<Name>,
}

impl AccumulatorValues {
    /// Index of an accumulator by name.
    pub fn index_of(&self, name: &Name) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// The value after pre-descent at the node.
    pub fn before(&self, index: usize, node: NodeId) -> Option<&Sequence> {
        self.before.get(index).and_then(|map| map.get(&node))
    }

    /// The value after post-descent at the node.
    pub fn after(&self, index: usize, node: NodeId) -> Option<&Sequence> {
        self.after.get(index).and_then(|map| map.get(&node))
    }
}

/// Walk a whole document, filling the observation maps.
pub fn precompute(
    stylesheet: &CompiledStylesheet,
    interp: &Interpreter,
    root: NodeId,
) -> Result<AccumulatorValues> {
    let mut values = AccumulatorValues {
        before: vec![HashMap::new(); stylesheet.accumulators.len()],
        after: vec![HashMap::new(); stylesheet.accumulators.len()],
        names: stylesheet
            .accumulators
            .iter()
            .map(|a| a.name.clone())
            .collect(),
    };
    let ctx = EvalContext::new();
    let mut current: Vec<Sequence> = Vec::with_capacity(stylesheet.accumulators.len());
    for accumulator in &stylesheet.accumulators {
        current.push(interp.evaluate(&accumulator.initial, &ctx)?);
    }
    walk(stylesheet, interp, root, &mut current, &mut values)?;
    Ok(values)
}

fn walk(
    stylesheet: &CompiledStylesheet,
    interp: &Interpreter,
    node: NodeId,
    current: &mut Vec<Sequence>,
    values: &mut AccumulatorValues,
) -> Result<()> {
    apply_rules(stylesheet, interp, node, current, false)?;
    for (i, value) in current.iter().enumerate() {
        values.before[i].insert(node, value.clone());
    }
    let children: Vec<NodeId> = {
        let documents = interp.documents();
        match documents.kind(node) {
            NodeKind::Document | NodeKind::Element { .. } => documents.children(node),
            _ => Vec::new(),
        }
    };
    for child in children {
        walk(stylesheet, interp, child, current, values)?;
    }
    apply_rules(stylesheet, interp, node, current, true)?;
    for (i, value) in current.iter().enumerate() {
        values.after[i].insert(node, value.clone());
    }
    Ok(())
}

fn apply_rules(
    stylesheet: &CompiledStylesheet,
    interp: &Interpreter,
    node: NodeId,
    current: &mut [Sequence],
    post_descent: bool,
) -> Result<()> {
    let ctx = EvalContext::new();
    for (i, accumulator) in stylesheet.accumulators.iter().enumerate() {
        for rule in &accumulator.rules {
            if rule.post_descent != post_descent {
                continue;
            }
            if !rule.pattern.matches(interp, &ctx, node)? {
                continue;
            }
            let inner = EvalContext::with_item(Item::Node(node))
                .bound(Name::local("value"), current[i].clone());
            current[i] = interp.evaluate(&rule.select, &inner)?;
        }
    }
    Ok(())
}

/// The streaming engine: the running value per accumulator.
#[derive(Debug, Default)]
pub struct StreamingAccumulators {
    values: Vec<Sequence>,
    names: Vec<Name>,
}

impl StreamingAccumulators {
    /// Initialize from the stylesheet's initial-value expressions.
    pub fn start(stylesheet: &CompiledStylesheet, interp: &Interpreter) -> Result<Self> {
        let ctx = EvalContext::new();
        let mut values = Vec::with_capacity(stylesheet.accumulators.len());
        for accumulator in &stylesheet.accumulators {
            values.push(interp.evaluate(&accumulator.initial, &ctx)?);
        }
        Ok(Self {
            values,
            names: stylesheet
                .accumulators
                .iter()
                .map(|a| a.name.clone())
                .collect(),
        })
    }

    /// Pre-descent rules at an opening element (a skeleton-arena node).
    pub fn on_start(
        &mut self,
        stylesheet: &CompiledStylesheet,
        interp: &Interpreter,
        node: NodeId,
    ) -> Result<()> {
        apply_rules(stylesheet, interp, node, &mut self.values, false)
    }

    /// Post-descent rules at a closing element.
    pub fn on_end(
        &mut self,
        stylesheet: &CompiledStylesheet,
        interp: &Interpreter,
        node: NodeId,
    ) -> Result<()> {
        apply_rules(stylesheet, interp, node, &mut self.values, true)
    }

    /// The running value: what `accumulator-before` observes.
    pub fn current(&self, name: &Name) -> Result<Sequence> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i].clone())
            .ok_or(Error::XTDE3340)
    }
}
