//! The transform runtime.
//!
//! Two execution strategies share one instruction executor. In
//! full-document mode the input is buffered into an arena and template
//! dispatch walks nodes recursively. In streaming mode the transformer
//! is a SAX filter: a skeleton tree of element names and attributes
//! mirrors the open-element chain, MOTIONLESS and CONSUMING templates
//! execute against the live stream, and GROUNDED templates capture
//! their subtree into a fragment before instantiation: the only
//! buffering the streaming path ever does, which the instrumentation
//! counter exposes for verification.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::{HashMap, HashMapExt};
use xylem_name::{Name, Namespaces};
use xylem_sax::{
    Attributes, ContentHandler, ContentHandlerRef, EventBuffer, EventRecorder, LexicalHandler,
    LexicalHandlerRef, PushParser,
};

use xylem_xpath::atomic::Atomic;
use xylem_xpath::context::{
    DynamicContext, EvalContext, ResourceLoader, Variables, XsltHooks,
};
use xylem_xpath::{Error, Result};
use xylem_xpath::interpreter::Interpreter;
use xylem_xpath::library::core_library;
use xylem_xpath::node::{DocumentBuilder, Documents, NodeId, NodeKind};
use xylem_xpath::sequence::{sort_document_order, Item, Sequence};

use crate::accumulator::{self, AccumulatorValues, StreamingAccumulators};
use crate::ast::*;
use crate::compiler::CompiledStylesheet;
use crate::number::format_values;
use crate::output::{Emitter, EventEmitter, FragmentEmitter};
use crate::pattern::Pattern;
use crate::streamability::{StreamOp, Streamability, SyntheticAccumulator};

/// How dynamic and type errors are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Type and dynamic errors fail the transform.
    #[default]
    Strict,
    /// Log and continue with best-effort values.
    Recover,
    /// Continue silently wherever safe.
    Silent,
}

// errors a non-strict transform keeps running past
fn is_recoverable(error: &Error) -> bool {
    matches!(
        error,
        Error::XPDY0002
            | Error::XPTY0004
            | Error::XPTY0018
            | Error::XPTY0019
            | Error::XPTY0020
            | Error::XTDE0540
            | Error::XTTE0570
            | Error::FORG0001
            | Error::FOAR0001
    )
}

// -------------------------------------------------------------------------
// dynamic state the XPath library sees through the hooks

struct XsltState {
    stylesheet: Rc<CompiledStylesheet>,
    current: RefCell<Option<Item>>,
    current_group: RefCell<Sequence>,
    current_grouping_key: RefCell<Sequence>,
    regex_groups: RefCell<Vec<String>>,
    key_indexes: RefCell<HashMap<Name, HashMap<String, Vec<NodeId>>>>,
    accumulator_values: RefCell<Option<Rc<AccumulatorValues>>>,
    streaming_accumulators: Rc<RefCell<Option<StreamingAccumulators>>>,
    focus_node: RefCell<Option<NodeId>>,
    documents: Rc<RefCell<Documents>>,
}

impl XsltState {
    fn new(stylesheet: Rc<CompiledStylesheet>, documents: Rc<RefCell<Documents>>) -> Self {
        Self {
            stylesheet,
            current: RefCell::new(None),
            current_group: RefCell::new(Sequence::Empty),
            current_grouping_key: RefCell::new(Sequence::Empty),
            regex_groups: RefCell::new(Vec::new()),
            key_indexes: RefCell::new(HashMap::new()),
            accumulator_values: RefCell::new(None),
            streaming_accumulators: Rc::new(RefCell::new(None)),
            focus_node: RefCell::new(None),
            documents,
        }
    }
}

impl XsltHooks for XsltState {
    fn current(&self) -> Option<Item> {
        self.current.borrow().clone()
    }

    fn key(&self, name: &Name, values: &[Atomic]) -> Result<Sequence> {
        let indexes = self.key_indexes.borrow();
        let index = indexes.get(name).ok_or(Error::XTDE1260)?;
        let mut nodes: Vec<Item> = Vec::new();
        for value in values {
            if let Some(found) = index.get(&value.string_value()) {
                nodes.extend(found.iter().map(|n| Item::Node(*n)));
            }
        }
        sort_document_order(&mut nodes, &self.documents.borrow())?;
        Ok(Sequence::from_vec(nodes))
    }

    fn current_group(&self) -> Sequence {
        self.current_group.borrow().clone()
    }

    fn current_grouping_key(&self) -> Sequence {
        self.current_grouping_key.borrow().clone()
    }

    fn regex_group(&self, number: usize) -> String {
        self.regex_groups
            .borrow()
            .get(number)
            .cloned()
            .unwrap_or_default()
    }

    fn accumulator_before(&self, name: &Name) -> Result<Sequence> {
        if let Some(streaming) = self.streaming_accumulators.borrow().as_ref() {
            return streaming.current(name);
        }
        let values = self.accumulator_values.borrow();
        let values = values.as_ref().ok_or(Error::XTDE3340)?;
        let index = values.index_of(name).ok_or(Error::XTDE3340)?;
        let node = self.focus_node.borrow().ok_or(Error::XPDY0002)?;
        values
            .before(index, node)
            .cloned()
            .ok_or(Error::XTDE3340)
    }

    fn accumulator_after(&self, name: &Name) -> Result<Sequence> {
        if self.streaming_accumulators.borrow().is_some() {
            // the subtree has not been consumed yet at this point
            return Err(Error::XTDE3382);
        }
        let values = self.accumulator_values.borrow();
        let values = values.as_ref().ok_or(Error::XTDE3340)?;
        let index = values.index_of(name).ok_or(Error::XTDE3340)?;
        let node = self.focus_node.borrow().ok_or(Error::XPDY0002)?;
        values.after(index, node).cloned().ok_or(Error::XTDE3340)
    }

    fn system_property(&self, name: &Name) -> String {
        match name.qualified().as_str() {
            "xsl:version" => self.stylesheet.version.clone(),
            "xsl:vendor" => "Xylem".to_string(),
            "xsl:vendor-url" => "https://xylem.dev".to_string(),
            "xsl:product-name" => "Xylem".to_string(),
            "xsl:supports-streaming" => "yes".to_string(),
            _ => String::new(),
        }
    }

    fn element_available(&self, name: &Name) -> bool {
        name.namespace() == xylem_name::XSLT_NAMESPACE
            && matches!(
                name.local_name(),
                "apply-templates"
                    | "call-template"
                    | "value-of"
                    | "if"
                    | "choose"
                    | "for-each"
                    | "for-each-group"
                    | "copy"
                    | "copy-of"
                    | "element"
                    | "attribute"
                    | "text"
                    | "comment"
                    | "processing-instruction"
                    | "variable"
                    | "param"
                    | "sort"
                    | "number"
                    | "result-document"
                    | "analyze-string"
                    | "iterate"
                    | "next-iteration"
                    | "break"
                    | "on-completion"
                    | "stream"
                    | "source-document"
                    | "fork"
                    | "apply-imports"
                    | "next-match"
                    | "message"
                    | "sequence"
            )
    }

    fn format_number(
        &self,
        value: f64,
        picture: &str,
        format_name: Option<&Name>,
    ) -> Result<String> {
        let key = format_name.cloned();
        let format = self
            .stylesheet
            .decimal_formats
            .get(&key)
            .ok_or(Error::XTDE1280)?;
        format.format(value, picture).map_err(|_| Error::XTDE1310)
    }
}

// -------------------------------------------------------------------------
// flow control through sequence constructors

enum Flow {
    Normal,
    Break,
    NextIteration(Vec<(Name, Sequence)>),
}

// rank of a template rule: import precedence, priority, declaration
// order
type Rank = (usize, f64, usize);

#[derive(Clone, Default)]
struct Frame {
    rank: Option<Rank>,
    mode: Option<Name>,
}

// -------------------------------------------------------------------------
// the shared instruction engine

struct Engine {
    stylesheet: Rc<CompiledStylesheet>,
    dynamic: DynamicContext,
    state: Rc<XsltState>,
    error_mode: ErrorMode,
    buffered: Rc<Cell<usize>>,
    globals: RefCell<Variables>,
    messages: RefCell<Vec<String>>,
    result_documents: RefCell<Vec<(String, EventBuffer)>>,
}

impl Engine {
    fn new(
        stylesheet: Rc<CompiledStylesheet>,
        documents: Rc<RefCell<Documents>>,
        error_mode: ErrorMode,
        buffered: Rc<Cell<usize>>,
        loader: Option<Rc<RefCell<dyn ResourceLoader>>>,
    ) -> Self {
        let state = Rc::new(XsltState::new(stylesheet.clone(), documents.clone()));
        let dynamic = DynamicContext {
            documents,
            library: core_library(),
            namespaces: Namespaces::default(),
            xslt: Some(state.clone() as Rc<dyn XsltHooks>),
            loader,
            base_uri: None,
        };
        Self {
            stylesheet,
            dynamic,
            state,
            error_mode,
            buffered,
            globals: RefCell::new(Variables::new()),
            messages: RefCell::new(Vec::new()),
            result_documents: RefCell::new(Vec::new()),
        }
    }

    fn interp(&self) -> Interpreter<'_> {
        Interpreter::new(&self.dynamic)
    }

    fn recover(&self, error: Error) -> Result<()> {
        if self.error_mode != ErrorMode::Strict && is_recoverable(&error) {
            if self.error_mode == ErrorMode::Recover {
                self.messages
                    .borrow_mut()
                    .push(format!("recovered from {error}"));
            }
            return Ok(());
        }
        Err(error)
    }

    // evaluate the global variables and stylesheet parameters
    fn prepare_globals(
        &self,
        root: Option<NodeId>,
        parameters: &HashMap<Name, Sequence>,
    ) -> Result<()> {
        let mut variables = Variables::new();
        for global in &self.stylesheet.globals {
            let supplied = global
                .is_param
                .then(|| parameters.get(&global.name).cloned())
                .flatten();
            let value = match supplied {
                Some(value) => value,
                None => {
                    let ctx = EvalContext {
                        item: root.map(Item::Node),
                        position: 1,
                        size: 1,
                        variables: variables.clone(),
                    };
                    if let Some(select) = &global.select {
                        self.interp().evaluate(select, &ctx)?
                    } else if !global.content.is_empty() {
                        self.construct_fragment(&global.content, &ctx)?
                    } else {
                        Sequence::Empty
                    }
                }
            };
            if let Some(as_type) = &global.as_type {
                if !self.interp().matches_sequence_type(&value, as_type)? {
                    self.recover(Error::XTTE0570)?;
                }
            }
            variables = variables.bind(global.name.clone(), value);
        }
        *self.globals.borrow_mut() = variables;
        Ok(())
    }

    fn prepare_keys(&self, root: NodeId) -> Result<()> {
        if self.stylesheet.keys.is_empty() {
            return Ok(());
        }
        let interp = self.interp();
        let all_nodes: Vec<NodeId> = {
            let documents = interp.documents();
            let mut nodes = vec![root];
            nodes.extend(documents.descendants(root));
            let mut with_attrs = Vec::new();
            for node in nodes {
                with_attrs.push(node);
                with_attrs.extend(documents.attributes(node));
            }
            with_attrs
        };
        let ctx = EvalContext::new();
        let mut indexes = self.state.key_indexes.borrow_mut();
        for key in &self.stylesheet.keys {
            let index = indexes.entry(key.name.clone()).or_default();
            for node in &all_nodes {
                if key.pattern.matches(&interp, &ctx, *node)? {
                    let focus = EvalContext::with_item(Item::Node(*node));
                    let values = interp.evaluate(&key.use_expr, &focus)?;
                    for atomic in values.atomized(&interp.documents())? {
                        index.entry(atomic.string_value()).or_default().push(*node);
                    }
                }
            }
        }
        Ok(())
    }

    fn prepare_accumulators(&self, root: NodeId) -> Result<()> {
        if self.stylesheet.accumulators.is_empty() {
            return Ok(());
        }
        let values = accumulator::precompute(&self.stylesheet, &self.interp(), root)?;
        *self.state.accumulator_values.borrow_mut() = Some(Rc::new(values));
        Ok(())
    }

    fn base_context(&self) -> EvalContext {
        EvalContext {
            item: None,
            position: 1,
            size: 1,
            variables: self.globals.borrow().clone(),
        }
    }

    // ---- template dispatch -------------------------------------------------

    fn mode_matches(template: &Template, mode: &Option<Name>) -> bool {
        match mode {
            None => template.modes.is_empty(),
            Some(mode) => template.modes.iter().any(|m| m == mode),
        }
    }

    fn rank_of(template: &Template) -> Rank {
        let priority = template.priority.unwrap_or_else(|| {
            template
                .pattern
                .as_ref()
                .map(|p| p.default_priority())
                .unwrap_or(0.0)
        });
        (template.precedence, priority, template.order)
    }

    // the best matching template below an optional rank bound
    fn select_template(
        &self,
        node: NodeId,
        mode: &Option<Name>,
        below: Option<Rank>,
        imports_only: bool,
    ) -> Result<Option<usize>> {
        let interp = self.interp();
        let ctx = self.base_context();
        let mut best: Option<(Rank, usize)> = None;
        let mut conflict: Option<usize> = None;
        for (index, template) in self.stylesheet.templates.iter().enumerate() {
            let pattern = match &template.pattern {
                Some(pattern) => pattern,
                None => continue,
            };
            if !Self::mode_matches(template, mode) {
                continue;
            }
            let rank = Self::rank_of(template);
            if let Some(bound) = below {
                if imports_only {
                    if rank.0 >= bound.0 {
                        continue;
                    }
                } else if (rank.0, rank.1, rank.2) >= (bound.0, bound.1, bound.2) {
                    continue;
                }
            }
            if !pattern.matches(&interp, &ctx, node)? {
                continue;
            }
            match &best {
                None => best = Some((rank, index)),
                Some((best_rank, _)) => {
                    if rank.0 > best_rank.0
                        || (rank.0 == best_rank.0 && rank.1 > best_rank.1)
                    {
                        best = Some((rank, index));
                        conflict = None;
                    } else if rank.0 == best_rank.0 && rank.1 == best_rank.1 {
                        // same precedence and priority: latest declared
                        // wins under RECOVER, errors under STRICT
                        if rank.2 > best_rank.2 {
                            conflict = Some(best.unwrap().1);
                            best = Some((rank, index));
                        } else {
                            conflict = Some(index);
                        }
                    }
                }
            }
        }
        if conflict.is_some() && self.error_mode == ErrorMode::Strict {
            return Err(Error::XTDE0540);
        }
        Ok(best.map(|(_, index)| index))
    }

    fn apply_templates(
        &self,
        items: Vec<Item>,
        mode: &Option<Name>,
        params: &[(Name, Sequence)],
        emitter: &mut dyn Emitter,
    ) -> Result<()> {
        let size = items.len();
        for (i, item) in items.into_iter().enumerate() {
            self.apply_one(item, i + 1, size, mode, params, emitter)?;
        }
        Ok(())
    }

    fn apply_one(
        &self,
        item: Item,
        position: usize,
        size: usize,
        mode: &Option<Name>,
        params: &[(Name, Sequence)],
        emitter: &mut dyn Emitter,
    ) -> Result<()> {
        let node = match &item {
            Item::Node(node) => *node,
            other => {
                // built-in rule for atomic items: emit the string value
                let text = other.string_value(&self.interp().documents())?;
                return emitter.text(&text);
            }
        };
        match self.select_template(node, mode, None, false)? {
            Some(index) => {
                self.instantiate(index, item, position, size, mode, params, emitter)
            }
            None => self.builtin_rule(node, position, size, mode, emitter),
        }
    }

    fn builtin_rule(
        &self,
        node: NodeId,
        _position: usize,
        _size: usize,
        mode: &Option<Name>,
        emitter: &mut dyn Emitter,
    ) -> Result<()> {
        let kind = self.interp().documents().kind(node).clone();
        match kind {
            NodeKind::Document | NodeKind::Element { .. } => {
                let children: Vec<Item> = {
                    let interp = self.interp();
                    let documents = interp.documents();
                    documents
                        .children(node)
                        .into_iter()
                        .map(Item::Node)
                        .collect()
                };
                self.apply_templates(children, mode, &[], emitter)
            }
            NodeKind::Text(text) => emitter.text(&text),
            NodeKind::Attribute { value, .. } => emitter.text(&value),
            _ => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn instantiate(
        &self,
        index: usize,
        item: Item,
        position: usize,
        size: usize,
        mode: &Option<Name>,
        params: &[(Name, Sequence)],
        emitter: &mut dyn Emitter,
    ) -> Result<()> {
        let template = &self.stylesheet.templates[index];
        let mut ctx = EvalContext {
            item: Some(item.clone()),
            position,
            size,
            variables: self.globals.borrow().clone(),
        };
        // bind declared parameters
        for param in &template.params {
            let supplied = params
                .iter()
                .find(|(name, _)| name == &param.name)
                .map(|(_, value)| value.clone());
            let value = match supplied {
                Some(value) => value,
                None => {
                    if param.required {
                        return Err(Error::XTDE0050);
                    }
                    self.param_default(param, &ctx)?
                }
            };
            ctx = ctx.bound(param.name.clone(), value);
        }
        *self.state.current.borrow_mut() = Some(item.clone());
        if let Item::Node(node) = &item {
            *self.state.focus_node.borrow_mut() = Some(*node);
            // the analyzer's counter rewrites reference these variables;
            // with a buffered tree they are computed directly
            for descriptor in &self.stylesheet.synthetics {
                let var = match descriptor.var() {
                    Some(var) => var.clone(),
                    None => continue,
                };
                let value = self.synthetic_value(descriptor, *node)?;
                ctx = ctx.bound(var, value);
            }
        }
        let frame = Frame {
            rank: Some(Self::rank_of(template)),
            mode: mode.clone(),
        };
        self.execute(&template.body, &mut ctx, &frame, emitter)
            .map(|_| ())
    }

    fn synthetic_value(
        &self,
        descriptor: &SyntheticAccumulator,
        node: NodeId,
    ) -> Result<Sequence> {
        let interp = self.interp();
        let documents = interp.documents();
        match descriptor {
            SyntheticAccumulator::Position => Ok(Sequence::Empty),
            SyntheticAccumulator::CountPreceding { test, .. } => {
                let mut count = 0i64;
                for sibling in documents.preceding_siblings(node) {
                    if !documents.is_element(sibling) {
                        continue;
                    }
                    if let Some(name) = documents.name(sibling) {
                        if streaming_name_test(test, &name) {
                            count += 1;
                        }
                    }
                }
                Ok(Sequence::One(Item::Atomic(Atomic::integer(count))))
            }
            SyntheticAccumulator::SumPrecedingAttribute { test, attribute, .. } => {
                let mut total = 0f64;
                for sibling in documents.preceding_siblings(node) {
                    if !documents.is_element(sibling) {
                        continue;
                    }
                    let matches = documents
                        .name(sibling)
                        .map(|name| streaming_name_test(test, &name))
                        .unwrap_or(false);
                    if matches {
                        if let Some(value) = documents.attribute_value(sibling, attribute) {
                            total += value.trim().parse::<f64>().unwrap_or(0.0);
                        }
                    }
                }
                Ok(Sequence::One(Item::Atomic(Atomic::Double(total))))
            }
        }
    }

    fn param_default(&self, param: &Param, ctx: &EvalContext) -> Result<Sequence> {
        if let Some(select) = &param.select {
            self.interp().evaluate(select, ctx)
        } else if !param.content.is_empty() {
            self.construct_fragment(&param.content, ctx)
        } else {
            Ok(Sequence::Empty)
        }
    }

    // ---- sequence constructor execution ------------------------------------

    fn execute(
        &self,
        instructions: &[Instruction],
        ctx: &mut EvalContext,
        frame: &Frame,
        emitter: &mut dyn Emitter,
    ) -> Result<Flow> {
        for instruction in instructions {
            match self.execute_one(instruction, ctx, frame, emitter) {
                Ok(Flow::Normal) => {}
                Ok(flow) => return Ok(flow),
                Err(error) => self.recover(error)?,
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_one(
        &self,
        instruction: &Instruction,
        ctx: &mut EvalContext,
        frame: &Frame,
        emitter: &mut dyn Emitter,
    ) -> Result<Flow> {
        match instruction {
            Instruction::Text(text) => emitter.text(text)?,
            Instruction::LiteralElement {
                name,
                namespaces,
                attributes,
                use_attribute_sets,
                content,
            } => {
                emitter.start_element(name, namespaces)?;
                self.apply_attribute_sets(use_attribute_sets, ctx, frame, emitter)?;
                for (attr_name, avt) in attributes {
                    let value = self.eval_avt(avt, ctx)?;
                    emitter.attribute(attr_name, &value)?;
                }
                let flow = self.execute(content, &mut ctx.clone(), frame, emitter)?;
                emitter.end_element()?;
                if !matches!(flow, Flow::Normal) {
                    return Ok(flow);
                }
            }
            Instruction::ApplyTemplates {
                select,
                mode,
                sort,
                with_params,
            } => {
                let mut items = match select {
                    Some(select) => self.interp().evaluate(select, ctx)?.to_vec(),
                    None => {
                        let node = ctx.item()?.to_node().map_err(|_| Error::XPTY0020)?;
                        self.interp()
                            .documents()
                            .children(node)
                            .into_iter()
                            .map(Item::Node)
                            .collect()
                    }
                };
                self.sort_items(&mut items, sort, ctx)?;
                let params = self.eval_with_params(with_params, ctx)?;
                let saved_current = self.state.current.borrow().clone();
                self.apply_templates(items, mode, &params, emitter)?;
                *self.state.current.borrow_mut() = saved_current;
            }
            Instruction::CallTemplate { name, with_params } => {
                let index = *self
                    .stylesheet
                    .named_templates
                    .get(name)
                    .ok_or(Error::XTSE0650)?;
                let params = self.eval_with_params(with_params, ctx)?;
                let item = ctx.item.clone().ok_or(Error::XPDY0002)?;
                self.instantiate(
                    index,
                    item,
                    ctx.position,
                    ctx.size,
                    &frame.mode,
                    &params,
                    emitter,
                )?;
            }
            Instruction::ApplyImports | Instruction::NextMatch => {
                let rank = frame.rank.ok_or(Error::XTDE0555)?;
                let node = ctx.item()?.to_node().map_err(|_| Error::XPTY0020)?;
                let imports_only = matches!(instruction, Instruction::ApplyImports);
                match self.select_template(node, &frame.mode, Some(rank), imports_only)? {
                    Some(index) => {
                        let item = ctx.item.clone().unwrap();
                        self.instantiate(
                            index,
                            item,
                            ctx.position,
                            ctx.size,
                            &frame.mode,
                            &[],
                            emitter,
                        )?;
                    }
                    None => {
                        self.builtin_rule(node, ctx.position, ctx.size, &frame.mode, emitter)?;
                    }
                }
            }
            Instruction::ValueOf {
                select, separator, ..
            } => {
                let value = self.interp().evaluate(select, ctx)?;
                let separator = match separator {
                    Some(avt) => self.eval_avt(avt, ctx)?,
                    None => " ".to_string(),
                };
                let interp = self.interp();
                let documents = interp.documents();
                let parts: Vec<String> = value
                    .iter()
                    .map(|item| item.string_value(&documents))
                    .collect::<Result<_>>()?;
                drop(documents);
                drop(interp);
                emitter.text(&parts.join(&separator))?;
            }
            Instruction::SequenceInstr { select } => {
                let value = self.interp().evaluate(select, ctx)?;
                self.emit_sequence(&value, emitter)?;
            }
            Instruction::If { test, content } => {
                if self.interp().evaluate(test, ctx)?.effective_boolean_value()? {
                    let flow = self.execute(content, &mut ctx.clone(), frame, emitter)?;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
            }
            Instruction::Choose { whens, otherwise } => {
                for (test, content) in whens {
                    if self.interp().evaluate(test, ctx)?.effective_boolean_value()? {
                        let flow = self.execute(content, &mut ctx.clone(), frame, emitter)?;
                        if !matches!(flow, Flow::Normal) {
                            return Ok(flow);
                        }
                        return Ok(Flow::Normal);
                    }
                }
                let flow = self.execute(otherwise, &mut ctx.clone(), frame, emitter)?;
                if !matches!(flow, Flow::Normal) {
                    return Ok(flow);
                }
            }
            Instruction::ForEach {
                select,
                sort,
                content,
            } => {
                let mut items = self.interp().evaluate(select, ctx)?.to_vec();
                self.sort_items(&mut items, sort, ctx)?;
                let size = items.len();
                let saved_current = self.state.current.borrow().clone();
                for (i, item) in items.into_iter().enumerate() {
                    *self.state.current.borrow_mut() = Some(item.clone());
                    let mut inner = ctx.focused(item, i + 1, size);
                    let flow = self.execute(content, &mut inner, frame, emitter)?;
                    if !matches!(flow, Flow::Normal) {
                        *self.state.current.borrow_mut() = saved_current;
                        return Ok(flow);
                    }
                }
                *self.state.current.borrow_mut() = saved_current;
            }
            Instruction::ForEachGroup {
                select,
                spec,
                sort: _,
                content,
            } => {
                let items = self.interp().evaluate(select, ctx)?.to_vec();
                let groups = self.group_items(&items, spec, ctx)?;
                let size = groups.len();
                for (i, (key, members)) in groups.into_iter().enumerate() {
                    let saved_group = self.state.current_group.borrow().clone();
                    let saved_key = self.state.current_grouping_key.borrow().clone();
                    *self.state.current_group.borrow_mut() =
                        Sequence::from_vec(members.clone());
                    *self.state.current_grouping_key.borrow_mut() = key;
                    let lead = members[0].clone();
                    let mut inner = ctx.focused(lead, i + 1, size);
                    let flow = self.execute(content, &mut inner, frame, emitter)?;
                    *self.state.current_group.borrow_mut() = saved_group;
                    *self.state.current_grouping_key.borrow_mut() = saved_key;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
            }
            Instruction::Iterate {
                select,
                params,
                content,
                on_completion,
            } => {
                let items = self.interp().evaluate(select, ctx)?.to_vec();
                // parameters persist and re-bind per iteration
                let mut current_params: Vec<(Name, Sequence)> = Vec::new();
                for param in params {
                    current_params
                        .push((param.name.clone(), self.param_default(param, ctx)?));
                }
                let size = items.len();
                let mut broke = false;
                for (i, item) in items.into_iter().enumerate() {
                    let mut inner = ctx.focused(item, i + 1, size);
                    for (name, value) in &current_params {
                        inner = inner.bound(name.clone(), value.clone());
                    }
                    match self.execute(content, &mut inner, frame, emitter)? {
                        Flow::Normal => {}
                        Flow::Break => {
                            broke = true;
                            break;
                        }
                        Flow::NextIteration(updates) => {
                            for (name, value) in updates {
                                if let Some(slot) = current_params
                                    .iter_mut()
                                    .find(|(n, _)| *n == name)
                                {
                                    slot.1 = value;
                                }
                            }
                        }
                    }
                }
                if !broke && !on_completion.is_empty() {
                    let mut inner = ctx.clone();
                    for (name, value) in &current_params {
                        inner = inner.bound(name.clone(), value.clone());
                    }
                    self.execute(on_completion, &mut inner, frame, emitter)?;
                }
            }
            Instruction::NextIteration { with_params } => {
                let updates = self.eval_with_params(with_params, ctx)?;
                return Ok(Flow::NextIteration(updates));
            }
            Instruction::Break { content } => {
                self.execute(content, &mut ctx.clone(), frame, emitter)?;
                return Ok(Flow::Break);
            }
            Instruction::Copy {
                use_attribute_sets,
                content,
            } => {
                let item = ctx.item()?.clone();
                match &item {
                    Item::Node(node) => {
                        let kind = self.interp().documents().kind(*node).clone();
                        match kind {
                            NodeKind::Element { name, declarations, .. } => {
                                emitter.start_element(&name, &declarations)?;
                                self.apply_attribute_sets(
                                    use_attribute_sets,
                                    ctx,
                                    frame,
                                    emitter,
                                )?;
                                let flow =
                                    self.execute(content, &mut ctx.clone(), frame, emitter)?;
                                emitter.end_element()?;
                                if !matches!(flow, Flow::Normal) {
                                    return Ok(flow);
                                }
                            }
                            NodeKind::Document => {
                                let flow =
                                    self.execute(content, &mut ctx.clone(), frame, emitter)?;
                                if !matches!(flow, Flow::Normal) {
                                    return Ok(flow);
                                }
                            }
                            NodeKind::Text(text) => emitter.text(&text)?,
                            NodeKind::Comment(text) => emitter.comment(&text)?,
                            NodeKind::Pi { target, data } => emitter.pi(&target, &data)?,
                            NodeKind::Attribute { name, value } => {
                                emitter.attribute(&name, &value)?;
                            }
                            NodeKind::Namespace { .. } => {}
                        }
                    }
                    other => {
                        let text = other.string_value(&self.interp().documents())?;
                        emitter.text(&text)?;
                    }
                }
            }
            Instruction::CopyOf { select } => {
                let value = self.interp().evaluate(select, ctx)?;
                self.emit_sequence(&value, emitter)?;
            }
            Instruction::Element {
                name,
                namespace,
                use_attribute_sets,
                content,
            } => {
                let lexical = self.eval_avt(name, ctx)?;
                let element_name = self.computed_name(&lexical, namespace, ctx)?;
                emitter.start_element(&element_name, &[])?;
                self.apply_attribute_sets(use_attribute_sets, ctx, frame, emitter)?;
                let flow = self.execute(content, &mut ctx.clone(), frame, emitter)?;
                emitter.end_element()?;
                if !matches!(flow, Flow::Normal) {
                    return Ok(flow);
                }
            }
            Instruction::Attribute {
                name,
                namespace,
                select,
                content,
            } => {
                let lexical = self.eval_avt(name, ctx)?;
                let attr_name = self.computed_name(&lexical, namespace, ctx)?;
                let value = match select {
                    Some(select) => {
                        let value = self.interp().evaluate(select, ctx)?;
                        self.sequence_to_string(&value)?
                    }
                    None => self.construct_text(content, ctx, frame)?,
                };
                emitter.attribute(&attr_name, &value)?;
            }
            Instruction::Comment { select, content } => {
                let text = match select {
                    Some(select) => {
                        let value = self.interp().evaluate(select, ctx)?;
                        self.sequence_to_string(&value)?
                    }
                    None => self.construct_text(content, ctx, frame)?,
                };
                emitter.comment(&text)?;
            }
            Instruction::ProcessingInstruction {
                name,
                select,
                content,
            } => {
                let target = self.eval_avt(name, ctx)?;
                let data = match select {
                    Some(select) => {
                        let value = self.interp().evaluate(select, ctx)?;
                        self.sequence_to_string(&value)?
                    }
                    None => self.construct_text(content, ctx, frame)?,
                };
                emitter.pi(&target, &data)?;
            }
            Instruction::Variable {
                name,
                select,
                as_type,
                content,
            } => {
                let value = if let Some(select) = select {
                    self.interp().evaluate(select, ctx)?
                } else {
                    self.construct_fragment(content, ctx)?
                };
                if let Some(as_type) = as_type {
                    if !self.interp().matches_sequence_type(&value, as_type)? {
                        self.recover(Error::XTTE0570)?;
                    }
                }
                *ctx = ctx.bound(name.clone(), value);
            }
            Instruction::Param(param) => {
                // an unbound template parameter reached during execution
                // takes its default
                if ctx.variables.get(&param.name).is_none() {
                    let value = self.param_default(param, ctx)?;
                    *ctx = ctx.bound(param.name.clone(), value);
                }
            }
            Instruction::Number {
                level,
                count,
                from,
                value,
                format,
            } => {
                let picture = self.eval_avt(format, ctx)?;
                let values = match value {
                    Some(value) => {
                        let n = self
                            .interp()
                            .evaluate(value, ctx)?
                            .atomized_one(&self.interp().documents())?
                            .to_double()?;
                        vec![n.round().max(0.0) as usize]
                    }
                    None => {
                        let node = ctx.item()?.to_node().map_err(|_| Error::XPTY0020)?;
                        self.number_values(node, *level, count, from)?
                    }
                };
                emitter.text(&format_values(&values, &picture))?;
            }
            Instruction::AnalyzeString {
                select,
                regex,
                flags,
                matching,
                non_matching,
            } => {
                let input = {
                    let value = self.interp().evaluate(select, ctx)?;
                    self.sequence_to_string(&value)?
                };
                let pattern = self.eval_avt(regex, ctx)?;
                let flags = self.eval_avt(flags, ctx)?;
                let regex = compile_regex(&pattern, &flags)?;
                if regex.is_match("") {
                    return Err(Error::FORX0003);
                }
                let mut last = 0usize;
                for captures in regex.captures_iter(&input) {
                    let whole = captures.get(0).unwrap();
                    if whole.start() > last {
                        let mut inner =
                            ctx.focused(Item::Atomic(Atomic::string(&input[last..whole.start()])), 1, 1);
                        self.execute(non_matching, &mut inner, frame, emitter)?;
                    }
                    let groups: Vec<String> = (0..captures.len())
                        .map(|i| {
                            captures
                                .get(i)
                                .map(|m| m.as_str().to_string())
                                .unwrap_or_default()
                        })
                        .collect();
                    *self.state.regex_groups.borrow_mut() = groups;
                    let mut inner =
                        ctx.focused(Item::Atomic(Atomic::string(whole.as_str())), 1, 1);
                    self.execute(matching, &mut inner, frame, emitter)?;
                    self.state.regex_groups.borrow_mut().clear();
                    last = whole.end();
                }
                if last < input.len() {
                    let mut inner =
                        ctx.focused(Item::Atomic(Atomic::string(&input[last..])), 1, 1);
                    self.execute(non_matching, &mut inner, frame, emitter)?;
                }
            }
            Instruction::Message {
                select,
                content,
                terminate,
            } => {
                let text = match select {
                    Some(select) => {
                        let value = self.interp().evaluate(select, ctx)?;
                        self.sequence_to_string(&value)?
                    }
                    None => self.construct_text(content, ctx, frame)?,
                };
                self.messages.borrow_mut().push(text);
                if self.eval_avt(terminate, ctx)? == "yes" {
                    return Err(Error::XTMM9000);
                }
            }
            Instruction::ResultDocument { href, content } => {
                let uri = match href {
                    Some(href) => self.eval_avt(href, ctx)?,
                    None => String::new(),
                };
                let recorder = Rc::new(RefCell::new(EventRecorder::new()));
                {
                    let content_ref: ContentHandlerRef = recorder.clone();
                    let lexical_ref: LexicalHandlerRef = recorder.clone();
                    let mut secondary = EventEmitter::new(content_ref, Some(lexical_ref));
                    self.execute(content, &mut ctx.clone(), frame, &mut secondary)?;
                    secondary.finish()?;
                }
                let buffer = recorder.borrow().buffer.clone();
                self.result_documents.borrow_mut().push((uri, buffer));
            }
            Instruction::Fork { branches } => {
                for branch in branches {
                    let flow = self.execute(branch, &mut ctx.clone(), frame, emitter)?;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
            }
            Instruction::Stream { href, content } => {
                let uri = self.eval_avt(href, ctx)?;
                let loader = self.dynamic.loader.clone().ok_or(Error::FODC0002)?;
                let bytes = loader.borrow_mut().load(&uri).ok_or(Error::FODC0002)?;
                let root = {
                    let mut documents = self.dynamic.documents.borrow_mut();
                    xylem_xpath::node::parse_bytes_into(&mut documents, &bytes, Some(&uri))
                        .map_err(|_| Error::FODC0002)?
                };
                let mut inner = ctx.focused(Item::Node(root), 1, 1);
                let flow = self.execute(content, &mut inner, frame, emitter)?;
                if !matches!(flow, Flow::Normal) {
                    return Ok(flow);
                }
            }
        }
        Ok(Flow::Normal)
    }

    // ---- helpers -----------------------------------------------------------

    fn eval_avt(&self, avt: &Avt, ctx: &EvalContext) -> Result<String> {
        let mut out = String::new();
        for part in &avt.parts {
            match part {
                AvtPart::Text(text) => out.push_str(text),
                AvtPart::Expr(expr) => {
                    let value = self.interp().evaluate(expr, ctx)?;
                    let interp = self.interp();
                    let documents = interp.documents();
                    let parts: Vec<String> = value
                        .iter()
                        .map(|item| item.string_value(&documents))
                        .collect::<Result<_>>()?;
                    out.push_str(&parts.join(" "));
                }
            }
        }
        Ok(out)
    }

    fn eval_with_params(
        &self,
        with_params: &[WithParam],
        ctx: &EvalContext,
    ) -> Result<Vec<(Name, Sequence)>> {
        let mut out = Vec::with_capacity(with_params.len());
        for param in with_params {
            let value = if let Some(select) = &param.select {
                self.interp().evaluate(select, ctx)?
            } else {
                self.construct_fragment(&param.content, ctx)?
            };
            out.push((param.name.clone(), value));
        }
        Ok(out)
    }

    fn apply_attribute_sets(
        &self,
        names: &[Name],
        ctx: &EvalContext,
        frame: &Frame,
        emitter: &mut dyn Emitter,
    ) -> Result<()> {
        for name in names {
            let set = self
                .stylesheet
                .attribute_sets
                .get(name)
                .ok_or(Error::XTDE0710)?;
            self.execute(&set.attributes, &mut ctx.clone(), frame, emitter)?;
        }
        Ok(())
    }

    // construct content into a tree fragment, returning its root
    fn construct_fragment(
        &self,
        content: &[Instruction],
        ctx: &EvalContext,
    ) -> Result<Sequence> {
        let mut emitter = FragmentEmitter::new();
        let frame = Frame::default();
        self.execute(content, &mut ctx.clone(), &frame, &mut emitter)?;
        let root = emitter.finish(&self.dynamic.documents)?;
        Ok(Sequence::One(Item::Node(root)))
    }

    // construct content and take its string value
    fn construct_text(
        &self,
        content: &[Instruction],
        ctx: &EvalContext,
        frame: &Frame,
    ) -> Result<String> {
        let mut emitter = FragmentEmitter::new();
        self.execute(content, &mut ctx.clone(), frame, &mut emitter)?;
        let root = emitter.finish(&self.dynamic.documents)?;
        Ok(self.interp().documents().string_value(root))
    }

    fn sequence_to_string(&self, value: &Sequence) -> Result<String> {
        let interp = self.interp();
        let documents = interp.documents();
        let parts: Vec<String> = value
            .iter()
            .map(|item| item.string_value(&documents))
            .collect::<Result<_>>()?;
        Ok(parts.join(" "))
    }

    // copy a sequence into the output: nodes deeply, atomics as text
    fn emit_sequence(&self, value: &Sequence, emitter: &mut dyn Emitter) -> Result<()> {
        let mut previous_atomic = false;
        for item in value.iter() {
            match item {
                Item::Node(node) => {
                    self.copy_node(*node, emitter)?;
                    previous_atomic = false;
                }
                Item::Atomic(atomic) => {
                    if previous_atomic {
                        emitter.text(" ")?;
                    }
                    emitter.text(&atomic.string_value())?;
                    previous_atomic = true;
                }
                Item::Function(_) => return Err(Error::XPTY0004),
            }
        }
        Ok(())
    }

    fn copy_node(&self, node: NodeId, emitter: &mut dyn Emitter) -> Result<()> {
        let kind = self.interp().documents().kind(node).clone();
        match kind {
            NodeKind::Document => {
                let children = self.interp().documents().children(node);
                for child in children {
                    self.copy_node(child, emitter)?;
                }
            }
            NodeKind::Element { name, declarations, .. } => {
                emitter.start_element(&name, &declarations)?;
                let attributes = self.interp().documents().attributes(node);
                for attr in attributes {
                    if let NodeKind::Attribute { name, value } =
                        self.interp().documents().kind(attr).clone()
                    {
                        emitter.attribute(&name, &value)?;
                    }
                }
                let children = self.interp().documents().children(node);
                for child in children {
                    self.copy_node(child, emitter)?;
                }
                emitter.end_element()?;
            }
            NodeKind::Attribute { name, value } => emitter.attribute(&name, &value)?,
            NodeKind::Text(text) => emitter.text(&text)?,
            NodeKind::Comment(text) => emitter.comment(&text)?,
            NodeKind::Pi { target, data } => emitter.pi(&target, &data)?,
            NodeKind::Namespace { .. } => {}
        }
        Ok(())
    }

    fn computed_name(
        &self,
        lexical: &str,
        namespace: &Option<Avt>,
        ctx: &EvalContext,
    ) -> Result<Name> {
        let namespace = namespace
            .as_ref()
            .map(|avt| self.eval_avt(avt, ctx))
            .transpose()?;
        match lexical.split_once(':') {
            Some((prefix, local)) => {
                let uri = match namespace {
                    Some(uri) => uri,
                    None => self
                        .dynamic
                        .namespaces
                        .by_prefix(prefix)
                        .ok_or(Error::XPST0081)?
                        .to_string(),
                };
                Ok(Name::prefixed(&uri, local, prefix))
            }
            None => Ok(match namespace {
                Some(uri) => Name::new(&uri, lexical),
                None => Name::local(lexical),
            }),
        }
    }

    fn sort_items(
        &self,
        items: &mut Vec<Item>,
        sorts: &[SortKey],
        ctx: &EvalContext,
    ) -> Result<()> {
        if sorts.is_empty() {
            return Ok(());
        }
        #[derive(PartialEq)]
        enum Key {
            Text(String),
            Number(f64),
        }
        let mut keyed: Vec<(Vec<(Key, bool)>, Item)> = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let mut keys = Vec::with_capacity(sorts.len());
            for sort in sorts {
                let inner = ctx.focused(item.clone(), i + 1, items.len());
                let value = match &sort.select {
                    Some(select) => {
                        let value = self.interp().evaluate(select, &inner)?;
                        self.sequence_to_string(&value)?
                    }
                    None => item.string_value(&self.interp().documents())?,
                };
                let descending = self.eval_avt(&sort.order, &inner)? == "descending";
                let numeric = self.eval_avt(&sort.data_type, &inner)? == "number";
                let key = if numeric {
                    Key::Number(value.trim().parse::<f64>().unwrap_or(f64::NAN))
                } else {
                    Key::Text(value)
                };
                keys.push((key, descending));
            }
            keyed.push((keys, item.clone()));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for ((ka, descending), (kb, _)) in a.iter().zip(b.iter()) {
                let ordering = match (ka, kb) {
                    (Key::Text(x), Key::Text(y)) => x.cmp(y),
                    (Key::Number(x), Key::Number(y)) => {
                        x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal)
                    }
                    _ => std::cmp::Ordering::Equal,
                };
                let ordering = if *descending { ordering.reverse() } else { ordering };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        *items = keyed.into_iter().map(|(_, item)| item).collect();
        Ok(())
    }

    fn group_items(
        &self,
        items: &[Item],
        spec: &GroupSpec,
        ctx: &EvalContext,
    ) -> Result<Vec<(Sequence, Vec<Item>)>> {
        let mut groups: Vec<(Sequence, Vec<Item>)> = Vec::new();
        match spec {
            GroupSpec::By(expr) => {
                let mut index: HashMap<String, usize> = HashMap::new();
                for (i, item) in items.iter().enumerate() {
                    let inner = ctx.focused(item.clone(), i + 1, items.len());
                    let keys = self.interp().evaluate(expr, &inner)?;
                    let atoms = keys.atomized(&self.interp().documents())?;
                    for atomic in atoms {
                        let key_string = atomic.string_value();
                        match index.get(&key_string) {
                            Some(slot) => groups[*slot].1.push(item.clone()),
                            None => {
                                index.insert(key_string, groups.len());
                                groups.push((
                                    Sequence::One(Item::Atomic(atomic)),
                                    vec![item.clone()],
                                ));
                            }
                        }
                    }
                }
            }
            GroupSpec::Adjacent(expr) => {
                let mut last_key: Option<String> = None;
                for (i, item) in items.iter().enumerate() {
                    let inner = ctx.focused(item.clone(), i + 1, items.len());
                    let key = self
                        .interp()
                        .evaluate(expr, &inner)?
                        .atomized_one(&self.interp().documents())?;
                    let key_string = key.string_value();
                    if last_key.as_deref() == Some(key_string.as_str()) {
                        groups.last_mut().unwrap().1.push(item.clone());
                    } else {
                        groups.push((
                            Sequence::One(Item::Atomic(key)),
                            vec![item.clone()],
                        ));
                        last_key = Some(key_string);
                    }
                }
            }
            GroupSpec::StartingWith(pattern) => {
                for item in items {
                    let starts = match item {
                        Item::Node(node) => {
                            pattern.matches(&self.interp(), ctx, *node)?
                        }
                        _ => false,
                    };
                    if starts || groups.is_empty() {
                        groups.push((Sequence::Empty, vec![item.clone()]));
                    } else {
                        groups.last_mut().unwrap().1.push(item.clone());
                    }
                }
            }
            GroupSpec::EndingWith(pattern) => {
                let mut open = false;
                for item in items {
                    if !open {
                        groups.push((Sequence::Empty, Vec::new()));
                        open = true;
                    }
                    groups.last_mut().unwrap().1.push(item.clone());
                    let ends = match item {
                        Item::Node(node) => {
                            pattern.matches(&self.interp(), ctx, *node)?
                        }
                        _ => false,
                    };
                    if ends {
                        open = false;
                    }
                }
            }
        }
        Ok(groups)
    }

    fn number_values(
        &self,
        node: NodeId,
        level: NumberLevel,
        count: &Option<Pattern>,
        from: &Option<Pattern>,
    ) -> Result<Vec<usize>> {
        let interp = self.interp();
        let ctx = self.base_context();
        let counts = |candidate: NodeId| -> Result<bool> {
            match count {
                Some(pattern) => pattern.matches(&interp, &ctx, candidate),
                None => {
                    // default: same kind and name as the context node
                    let documents = interp.documents();
                    Ok(
                        std::mem::discriminant(documents.kind(candidate))
                            == std::mem::discriminant(documents.kind(node))
                            && documents.name(candidate) == documents.name(node),
                    )
                }
            }
        };
        let from_matches = |candidate: NodeId| -> Result<bool> {
            match from {
                Some(pattern) => pattern.matches(&interp, &ctx, candidate),
                None => Ok(false),
            }
        };
        match level {
            NumberLevel::Single => {
                let mut chain = vec![node];
                chain.extend(interp.documents().ancestors(node));
                for candidate in chain {
                    if from_matches(candidate)? {
                        break;
                    }
                    if counts(candidate)? {
                        let mut value = 1;
                        for sibling in interp.documents().preceding_siblings(candidate) {
                            if counts(sibling)? {
                                value += 1;
                            }
                        }
                        return Ok(vec![value]);
                    }
                }
                Ok(vec![])
            }
            NumberLevel::Multiple => {
                let mut chain = vec![node];
                chain.extend(interp.documents().ancestors(node));
                let mut values = Vec::new();
                for candidate in chain {
                    if from_matches(candidate)? {
                        break;
                    }
                    if counts(candidate)? {
                        let mut value = 1;
                        for sibling in interp.documents().preceding_siblings(candidate) {
                            if counts(sibling)? {
                                value += 1;
                            }
                        }
                        values.push(value);
                    }
                }
                values.reverse();
                Ok(values)
            }
            NumberLevel::Any => {
                let root = interp.documents().root(node);
                let mut value = 0usize;
                let mut all = vec![root];
                all.extend(interp.documents().descendants(root));
                for candidate in all {
                    if from_matches(candidate)? {
                        value = 0;
                    }
                    if counts(candidate)? {
                        value += 1;
                    }
                    if candidate == node {
                        break;
                    }
                }
                Ok(vec![value.max(1)])
            }
        }
    }
}

// XPath regex compilation, shared with analyze-string
fn compile_regex(pattern: &str, flags: &str) -> Result<regex::Regex> {
    let mut prefix = String::new();
    let mut literal = false;
    for flag in flags.chars() {
        match flag {
            'i' => prefix.push_str("(?i)"),
            's' => prefix.push_str("(?s)"),
            'm' => prefix.push_str("(?m)"),
            'x' => prefix.push_str("(?x)"),
            'q' => literal = true,
            _ => return Err(Error::FORX0002),
        }
    }
    let body = if literal {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };
    regex::Regex::new(&format!("{prefix}{body}")).map_err(|_| Error::FORX0002)
}

// -------------------------------------------------------------------------
// the streaming filter

// what events inside an open element do when no capture is active
#[derive(Clone)]
enum ChildPolicy {
    // dispatch child nodes to templates in a mode
    Dispatch(Option<Name>),
    // forward text events, drop markup (value-of ".")
    EchoText,
    // ignore everything until the element closes
    Skip,
}

struct StreamFrame {
    node: NodeId,
    policy: ChildPolicy,
    // ops to run when the element closes
    tail: Vec<StreamOp>,
    // children seen so far, for position()
    children_seen: usize,
    // synthetic accumulator values, parallel to stylesheet.synthetics
    counters: Vec<f64>,
    // the parent's counter snapshot when this element was dispatched;
    // tail ops evaluate against it
    dispatch_counters: Vec<f64>,
    // the position this element was dispatched at
    position: usize,
}

// an active grounded capture: everything below base_depth records
struct Capture {
    base_depth: usize,
    template: usize,
    recorder: EventRecorder,
    position: usize,
}

/// The streaming transformer: a SAX filter over the input events.
pub struct StreamingFilter {
    engine: Engine,
    emitter: EventEmitter,
    frames: Vec<StreamFrame>,
    capture: Option<Capture>,
    accumulators: Rc<RefCell<Option<StreamingAccumulators>>>,
    failed: Option<Error>,
}

impl StreamingFilter {
    fn new(
        engine: Engine,
        content: ContentHandlerRef,
        lexical: Option<LexicalHandlerRef>,
    ) -> Result<Self> {
        let skeleton_root = engine.dynamic.documents.borrow_mut().new_document();
        let accumulators = engine.state.streaming_accumulators.clone();
        *accumulators.borrow_mut() = Some(StreamingAccumulators::start(
            &engine.stylesheet,
            &engine.interp(),
        )?);
        let counters = vec![0.0; engine.stylesheet.synthetics.len()];
        let mut filter = Self {
            engine,
            emitter: EventEmitter::new(content, lexical),
            frames: Vec::new(),
            capture: None,
            accumulators,
            failed: None,
        };
        filter.frames.push(StreamFrame {
            node: skeleton_root,
            policy: ChildPolicy::Dispatch(None),
            tail: Vec::new(),
            children_seen: 0,
            counters: counters.clone(),
            dispatch_counters: counters,
            position: 1,
        });
        Ok(filter)
    }

    /// How many subtrees the run buffered; MOTIONLESS and CONSUMING
    /// templates never increment this.
    pub fn buffered_subtree_count(&self) -> usize {
        self.engine.buffered.get()
    }

    fn fail(&mut self, error: Error) -> xylem_sax::SaxError {
        self.failed = Some(error.clone());
        xylem_sax::SaxError::Handler(error.to_string())
    }

    fn fresh_counters(&self) -> Vec<f64> {
        vec![0.0; self.engine.stylesheet.synthetics.len()]
    }

    // a context for evaluating plan expressions at an element
    fn frame_context(&self, node: NodeId, position: usize, counters: &[f64]) -> EvalContext {
        let mut ctx = EvalContext {
            item: Some(Item::Node(node)),
            position,
            size: position,
            variables: self.engine.globals.borrow().clone(),
        };
        for (descriptor, value) in self.engine.stylesheet.synthetics.iter().zip(counters) {
            if let Some(var) = descriptor.var() {
                let value = match descriptor {
                    SyntheticAccumulator::CountPreceding { .. } => {
                        Sequence::One(Item::Atomic(Atomic::integer(*value as i64)))
                    }
                    SyntheticAccumulator::SumPrecedingAttribute { .. } => {
                        Sequence::One(Item::Atomic(Atomic::Double(*value)))
                    }
                    SyntheticAccumulator::Position => continue,
                };
                ctx = ctx.bound(var.clone(), value);
            }
        }
        ctx
    }

    fn run_ops(
        &mut self,
        ops: Vec<StreamOp>,
        node: NodeId,
        position: usize,
        counters: &[f64],
        stop_at_consuming: bool,
    ) -> Result<(ChildPolicy, Vec<StreamOp>)> {
        let mut ctx = self.frame_context(node, position, counters);
        let frame = Frame::default();
        let mut iter = ops.into_iter();
        while let Some(op) = iter.next() {
            match op {
                StreamOp::Instr(instruction) => {
                    match self
                        .engine
                        .execute_one(&instruction, &mut ctx, &frame, &mut self.emitter)
                    {
                        Ok(_) => {}
                        Err(error) => self.engine.recover(error)?,
                    }
                }
                StreamOp::StartLiteral {
                    name,
                    namespaces,
                    attributes,
                    use_attribute_sets,
                } => {
                    self.emitter.start_element(&name, &namespaces)?;
                    self.engine.apply_attribute_sets(
                        &use_attribute_sets,
                        &ctx,
                        &frame,
                        &mut self.emitter,
                    )?;
                    for (attr_name, avt) in &attributes {
                        let value = self.engine.eval_avt(avt, &ctx)?;
                        self.emitter.attribute(attr_name, &value)?;
                    }
                }
                StreamOp::EndLiteral => self.emitter.end_element()?,
                StreamOp::ApplyChildren { mode } => {
                    if stop_at_consuming {
                        return Ok((ChildPolicy::Dispatch(mode), iter.collect()));
                    }
                }
                StreamOp::EchoText => {
                    if stop_at_consuming {
                        return Ok((ChildPolicy::EchoText, iter.collect()));
                    }
                }
            }
        }
        Ok((ChildPolicy::Skip, Vec::new()))
    }

    fn note_child_for_counters(&mut self, name: Option<&Name>, attrs: Option<&Attributes>) {
        let synthetics = self.engine.stylesheet.synthetics.clone();
        if let Some(frame) = self.frames.last_mut() {
            frame.children_seen += 1;
            for (i, descriptor) in synthetics.iter().enumerate() {
                match descriptor {
                    SyntheticAccumulator::CountPreceding { test, .. } => {
                        if let Some(name) = name {
                            if streaming_name_test(test, name) {
                                frame.counters[i] += 1.0;
                            }
                        }
                    }
                    SyntheticAccumulator::SumPrecedingAttribute {
                        test, attribute, ..
                    } => {
                        if let (Some(name), Some(attrs)) = (name, attrs) {
                            if streaming_name_test(test, name) {
                                if let Some(value) =
                                    attrs.value(attribute.namespace(), attribute.local_name())
                                {
                                    frame.counters[i] +=
                                        value.trim().parse::<f64>().unwrap_or(0.0);
                                }
                            }
                        }
                    }
                    SyntheticAccumulator::Position => {}
                }
            }
        }
    }

    fn start_element_inner(&mut self, name: &Name, attributes: &Attributes) -> Result<()> {
        // the skeleton mirrors the open chain (names and attributes,
        // never content)
        let parent_node = self.frames.last().ok_or(Error::FOER0000)?.node;
        let attrs: Vec<(Name, String)> = attributes
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect();
        let node = self.engine.dynamic.documents.borrow_mut().append_element(
            parent_node,
            name.clone(),
            attrs,
            Vec::new(),
        );
        if let Some(acc) = self.accumulators.borrow_mut().as_mut() {
            acc.on_start(&self.engine.stylesheet, &self.engine.interp(), node)?;
        }
        *self.engine.state.focus_node.borrow_mut() = Some(node);

        // the counters preceding this child feed its expressions;
        // noting the child updates the parent's counters for the next
        // sibling
        let parent_counters = self.frames.last().unwrap().counters.clone();
        self.note_child_for_counters(Some(name), Some(attributes));
        let position = self.frames.last().unwrap().children_seen;

        if let Some(capture) = &mut self.capture {
            capture.recorder.start_element(name, attributes).ok();
            self.frames.push(StreamFrame {
                node,
                policy: ChildPolicy::Skip,
                tail: Vec::new(),
                children_seen: 0,
                counters: self.fresh_counters(),
                dispatch_counters: parent_counters,
                position,
            });
            return Ok(());
        }

        let parent_policy = self.frames.last().unwrap().policy.clone();
        let dispatch_mode = match parent_policy {
            ChildPolicy::Skip | ChildPolicy::EchoText => {
                let policy = parent_policy;
                self.frames.push(StreamFrame {
                    node,
                    policy,
                    tail: Vec::new(),
                    children_seen: 0,
                    counters: self.fresh_counters(),
                    dispatch_counters: parent_counters,
                    position,
                });
                return Ok(());
            }
            ChildPolicy::Dispatch(mode) => mode,
        };

        // template dispatch against the skeleton
        *self.engine.state.current.borrow_mut() = Some(Item::Node(node));
        let selected = self
            .engine
            .select_template(node, &dispatch_mode, None, false)?;
        let (policy, tail) = match selected {
            None => {
                // built-in rule: descend in the same mode
                (ChildPolicy::Dispatch(dispatch_mode), Vec::new())
            }
            Some(index) => {
                let template = &self.engine.stylesheet.templates[index];
                match template.stream_plan.clone() {
                    Some(plan) if template.streamability <= Streamability::Consuming => {
                        self.run_ops(plan, node, position, &parent_counters, true)?
                    }
                    _ => {
                        // grounded: capture the subtree
                        self.engine.buffered.set(self.engine.buffered.get() + 1);
                        let mut recorder = EventRecorder::new();
                        recorder.start_element(name, attributes).ok();
                        self.capture = Some(Capture {
                            base_depth: self.frames.len(),
                            template: index,
                            recorder,
                            position,
                        });
                        (ChildPolicy::Skip, Vec::new())
                    }
                }
            }
        };
        self.frames.push(StreamFrame {
            node,
            policy,
            tail,
            children_seen: 0,
            counters: self.fresh_counters(),
            dispatch_counters: parent_counters,
            position,
        });
        Ok(())
    }

    fn end_element_inner(&mut self) -> Result<()> {
        let frame = self.frames.pop().ok_or(Error::FOER0000)?;
        if let Some(acc) = self.accumulators.borrow_mut().as_mut() {
            acc.on_end(&self.engine.stylesheet, &self.engine.interp(), frame.node)?;
        }
        if let Some(capture) = &mut self.capture {
            let name = self
                .engine
                .interp()
                .documents()
                .name(frame.node)
                .ok_or(Error::FOER0000)?;
            capture.recorder.end_element(&name).ok();
            if self.frames.len() > capture.base_depth {
                return Ok(());
            }
            // the captured subtree is complete: materialize and run the
            // grounded template over it
            let capture = self.capture.take().unwrap();
            let fragment_root = {
                let mut builder = DocumentBuilder::new();
                capture
                    .recorder
                    .buffer
                    .replay(&mut builder, None)
                    .map_err(|_| Error::FOER0000)?;
                builder.finish(&mut self.engine.dynamic.documents.borrow_mut())
            };
            let element = self
                .engine
                .interp()
                .documents()
                .children(fragment_root)
                .into_iter()
                .next()
                .ok_or(Error::FOER0000)?;
            self.engine.instantiate(
                capture.template,
                Item::Node(element),
                capture.position,
                capture.position,
                &None,
                &[],
                &mut self.emitter,
            )?;
            return Ok(());
        }
        self.run_ops(
            frame.tail,
            frame.node,
            frame.position,
            &frame.dispatch_counters,
            false,
        )
        .map(|_| ())
    }

    // templates may match the document node itself; fire them when the
    // stream opens
    fn dispatch_document(&mut self) -> Result<()> {
        let root = self.frames[0].node;
        *self.engine.state.current.borrow_mut() = Some(Item::Node(root));
        let selected = self.engine.select_template(root, &None, None, false)?;
        match selected {
            None => Ok(()),
            Some(index) => {
                let template = &self.engine.stylesheet.templates[index];
                match template.stream_plan.clone() {
                    Some(plan) if template.streamability <= Streamability::Consuming => {
                        let counters = self.fresh_counters();
                        let (policy, tail) = self.run_ops(plan, root, 1, &counters, true)?;
                        let frame = self.frames.first_mut().unwrap();
                        frame.policy = policy;
                        frame.tail = tail;
                        Ok(())
                    }
                    _ => {
                        // the whole document grounds: FULL_DOCUMENT mode
                        self.engine.buffered.set(self.engine.buffered.get() + 1);
                        self.capture = Some(Capture {
                            base_depth: 0,
                            template: index,
                            recorder: EventRecorder::new(),
                            position: 1,
                        });
                        Ok(())
                    }
                }
            }
        }
    }

    fn finish_document(&mut self) -> Result<()> {
        if let Some(capture) = self.capture.take() {
            // a document-level capture materializes now
            let fragment_root = {
                let mut builder = DocumentBuilder::new();
                capture
                    .recorder
                    .buffer
                    .replay(&mut builder, None)
                    .map_err(|_| Error::FOER0000)?;
                builder.finish(&mut self.engine.dynamic.documents.borrow_mut())
            };
            self.engine.instantiate(
                capture.template,
                Item::Node(fragment_root),
                1,
                1,
                &None,
                &[],
                &mut self.emitter,
            )?;
        } else {
            let frame = self.frames.pop().ok_or(Error::FOER0000)?;
            self.run_ops(
                frame.tail,
                frame.node,
                frame.position,
                &frame.dispatch_counters,
                false,
            )?;
        }
        self.emitter.finish()
    }

    fn characters_inner(&mut self, text: &str) -> Result<()> {
        self.note_child_for_counters(None, None);
        if let Some(capture) = &mut self.capture {
            capture.recorder.characters(text).ok();
            return Ok(());
        }
        let policy = self.frames.last().ok_or(Error::FOER0000)?.policy.clone();
        match policy {
            ChildPolicy::Skip => Ok(()),
            // the built-in rule for text and value-of "." both copy it
            ChildPolicy::EchoText | ChildPolicy::Dispatch(_) => self.emitter.text(text),
        }
    }
}

impl ContentHandler for StreamingFilter {
    fn start_document(&mut self) -> xylem_sax::Result<()> {
        self.dispatch_document().map_err(|e| self.fail(e))
    }

    fn end_document(&mut self) -> xylem_sax::Result<()> {
        self.finish_document().map_err(|e| {
            let message = e.to_string();
            self.failed = Some(e);
            xylem_sax::SaxError::Handler(message)
        })
    }

    fn start_element(&mut self, name: &Name, attributes: &Attributes) -> xylem_sax::Result<()> {
        self.start_element_inner(name, attributes)
            .map_err(|e| self.fail(e))
    }

    fn end_element(&mut self, _name: &Name) -> xylem_sax::Result<()> {
        self.end_element_inner().map_err(|e| self.fail(e))
    }

    fn characters(&mut self, text: &str) -> xylem_sax::Result<()> {
        self.characters_inner(text).map_err(|e| self.fail(e))
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> xylem_sax::Result<()> {
        if let Some(capture) = &mut self.capture {
            capture.recorder.processing_instruction(target, data).ok();
        }
        Ok(())
    }
}

impl LexicalHandler for StreamingFilter {
    fn comment(&mut self, text: &str) -> xylem_sax::Result<()> {
        if let Some(capture) = &mut self.capture {
            LexicalHandler::comment(&mut capture.recorder, text).ok();
        }
        Ok(())
    }
}

// match a node test against an element name without a tree
fn streaming_name_test(test: &xylem_xpath_ast::ast::NodeTest, name: &Name) -> bool {
    use xylem_xpath_ast::ast::{KindTest, NameTest, NodeTest};
    match test {
        NodeTest::Name(NameTest::Any) => true,
        NodeTest::Name(NameTest::Name(expected)) => name == expected,
        NodeTest::Name(NameTest::AnyLocal { namespace }) => name.namespace() == namespace,
        NodeTest::Name(NameTest::AnyNamespace { local }) => name.local_name() == local,
        NodeTest::Kind(KindTest::AnyKind) => true,
        NodeTest::Kind(KindTest::Element { name: expected, .. }) => match expected {
            None => true,
            Some(expected) => name == expected,
        },
        NodeTest::Kind(_) => false,
    }
}

// -------------------------------------------------------------------------
// the public transformer

/// A prepared transformation: one compiled stylesheet plus per-run
/// settings. Compiled stylesheets are shared read-only; transformers
/// are single-threaded and per-run.
pub struct Transformer {
    stylesheet: Rc<CompiledStylesheet>,
    parameters: HashMap<Name, Sequence>,
    error_mode: ErrorMode,
    output_overrides: Vec<(String, String)>,
    loader: Option<Rc<RefCell<dyn ResourceLoader>>>,
    buffered: Rc<Cell<usize>>,
    messages: RefCell<Vec<String>>,
    result_documents: RefCell<Vec<(String, EventBuffer)>>,
}

impl Transformer {
    /// A transformer over a compiled stylesheet.
    pub fn new(stylesheet: Rc<CompiledStylesheet>) -> Self {
        Self {
            stylesheet,
            parameters: HashMap::new(),
            error_mode: ErrorMode::Strict,
            output_overrides: Vec::new(),
            loader: None,
            buffered: Rc::new(Cell::new(0)),
            messages: RefCell::new(Vec::new()),
            result_documents: RefCell::new(Vec::new()),
        }
    }

    /// Supply a value for a global `xsl:param`.
    pub fn set_parameter(&mut self, name: Name, value: Sequence) {
        self.parameters.insert(name, value);
    }

    /// Override a serialization property by name.
    pub fn set_output_property(&mut self, name: &str, value: &str) {
        self.output_overrides
            .push((name.to_string(), value.to_string()));
    }

    /// Select the error mode.
    pub fn set_error_mode(&mut self, mode: ErrorMode) {
        self.error_mode = mode;
    }

    /// Install a loader for `doc()`/`document()`/`xsl:stream`.
    pub fn set_resource_loader(&mut self, loader: Rc<RefCell<dyn ResourceLoader>>) {
        self.loader = Some(loader);
    }

    /// Buffer instrumentation: the number of subtrees the run captured.
    pub fn buffered_subtree_count(&self) -> usize {
        self.buffered.get()
    }

    /// Messages emitted by `xsl:message` during the last run.
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    /// Secondary results produced by `xsl:result-document` during the
    /// last run, as (href, recorded events).
    pub fn result_documents(&self) -> Vec<(String, EventBuffer)> {
        self.result_documents.borrow().clone()
    }

    /// Whether this transformer will stream rather than buffer the
    /// whole input.
    pub fn is_streaming(&self) -> bool {
        self.stylesheet.streamable
    }

    fn merged_output(&self) -> OutputProperties {
        let mut output = self.stylesheet.output.clone();
        for (name, value) in &self.output_overrides {
            match name.as_str() {
                "method" => output.method = Some(value.clone()),
                "encoding" => output.encoding = Some(value.clone()),
                "indent" => output.indent = value == "yes",
                "omit-xml-declaration" => output.omit_xml_declaration = value == "yes",
                "standalone" => output.standalone = Some(value == "yes"),
                "doctype-public" => output.doctype_public = Some(value.clone()),
                "doctype-system" => output.doctype_system = Some(value.clone()),
                _ => {}
            }
        }
        output
    }

    fn configure_writer<W: std::io::Write>(&self, sink: W) -> xylem_sax::XmlWriter<W> {
        let output = self.merged_output();
        let mut writer = xylem_sax::XmlWriter::new(sink);
        match output.method.as_deref() {
            Some("html") => writer.set_method(xylem_sax::OutputMethod::Html),
            Some("text") => writer.set_method(xylem_sax::OutputMethod::Text),
            Some("json") => writer.set_method(xylem_sax::OutputMethod::Json),
            Some("adaptive") => writer.set_method(xylem_sax::OutputMethod::Adaptive),
            _ => {}
        }
        match output.encoding.as_deref() {
            Some("UTF-16") => writer.set_charset(xylem_sax::Charset::Utf16),
            Some("US-ASCII") => writer.set_charset(xylem_sax::Charset::Ascii),
            Some("ISO-8859-1") => writer.set_charset(xylem_sax::Charset::Latin1),
            _ => {}
        }
        writer.set_indent(output.indent);
        writer.set_omit_xml_declaration(output.omit_xml_declaration);
        writer.set_standalone(output.standalone);
        writer.set_doctype(output.doctype_public.clone(), output.doctype_system.clone());
        writer.set_cdata_section_elements(output.cdata_section_elements.clone());
        writer
    }

    /// Transform bytes, serializing to `sink`; returns the sink.
    pub fn transform_bytes<W: std::io::Write + 'static>(
        &self,
        input: &[u8],
        sink: W,
    ) -> Result<W> {
        let writer = Rc::new(RefCell::new(self.configure_writer(sink)));
        let content: ContentHandlerRef = writer.clone();
        let lexical: LexicalHandlerRef = writer.clone();
        self.transform_bytes_to_handlers(input, content, Some(lexical))?;
        let writer = Rc::try_unwrap(writer)
            .map_err(|_| Error::FOER0000)?
            .into_inner();
        writer.into_inner().map_err(|_| Error::FOER0000)
    }

    /// Transform bytes into SAX handler sinks (pipeline composition).
    pub fn transform_bytes_to_handlers(
        &self,
        input: &[u8],
        content: ContentHandlerRef,
        lexical: Option<LexicalHandlerRef>,
    ) -> Result<()> {
        self.buffered.set(0);
        content
            .borrow_mut()
            .start_document()
            .map_err(|_| Error::FOER0000)?;
        if self.stylesheet.streamable {
            self.run_streaming(input, content.clone(), lexical)?;
        } else {
            self.run_full(input, content.clone(), lexical)?;
        }
        content
            .borrow_mut()
            .end_document()
            .map_err(|_| Error::FOER0000)?;
        Ok(())
    }

    /// A live-event handler: feed it SAX events, it forwards
    /// transformed events to the sinks.
    pub fn handler(
        &self,
        content: ContentHandlerRef,
        lexical: Option<LexicalHandlerRef>,
    ) -> Result<TransformerHandler> {
        let inner = if self.stylesheet.streamable {
            let documents = Rc::new(RefCell::new(Documents::new()));
            let engine = Engine::new(
                self.stylesheet.clone(),
                documents,
                self.error_mode,
                self.buffered.clone(),
                self.loader.clone(),
            );
            engine.prepare_globals(None, &self.parameters)?;
            HandlerInner::Streaming(Box::new(StreamingFilter::new(engine, content, lexical)?))
        } else {
            HandlerInner::Buffering {
                builder: Some(DocumentBuilder::new()),
                config: TransformerConfig {
                    stylesheet: self.stylesheet.clone(),
                    parameters: self.parameters.clone(),
                    error_mode: self.error_mode,
                    loader: self.loader.clone(),
                    buffered: self.buffered.clone(),
                },
                content,
                lexical,
            }
        };
        Ok(TransformerHandler { inner })
    }

    fn run_streaming(
        &self,
        input: &[u8],
        content: ContentHandlerRef,
        lexical: Option<LexicalHandlerRef>,
    ) -> Result<()> {
        let documents = Rc::new(RefCell::new(Documents::new()));
        let engine = Engine::new(
            self.stylesheet.clone(),
            documents,
            self.error_mode,
            self.buffered.clone(),
            self.loader.clone(),
        );
        engine.prepare_globals(None, &self.parameters)?;
        let filter = Rc::new(RefCell::new(StreamingFilter::new(
            engine, content, lexical,
        )?));
        let mut parser = PushParser::new();
        parser.set_content_handler(filter.clone());
        let feed_result = parser.feed(input).and_then(|_| parser.close());
        if let Err(parse_error) = feed_result {
            let failed = filter.borrow().failed.clone();
            return Err(failed.unwrap_or_else(|| {
                let _ = parse_error;
                Error::FODC0002
            }));
        }
        let filter = filter.borrow();
        *self.messages.borrow_mut() = filter.engine.messages.borrow().clone();
        *self.result_documents.borrow_mut() =
            filter.engine.result_documents.borrow().clone();
        Ok(())
    }

    fn run_full(
        &self,
        input: &[u8],
        content: ContentHandlerRef,
        lexical: Option<LexicalHandlerRef>,
    ) -> Result<()> {
        let documents = Rc::new(RefCell::new(Documents::new()));
        let root = {
            let mut pool = documents.borrow_mut();
            xylem_xpath::node::parse_bytes_into(&mut pool, input, None)
                .map_err(|_| Error::FODC0002)?
        };
        run_full_over(
            self.stylesheet.clone(),
            documents,
            root,
            &self.parameters,
            self.error_mode,
            self.loader.clone(),
            self.buffered.clone(),
            content,
            lexical,
            &self.messages,
            Some(&self.result_documents),
        )
    }
}

// per-run settings a buffering handler needs to hold on to
struct TransformerConfig {
    stylesheet: Rc<CompiledStylesheet>,
    parameters: HashMap<Name, Sequence>,
    error_mode: ErrorMode,
    loader: Option<Rc<RefCell<dyn ResourceLoader>>>,
    buffered: Rc<Cell<usize>>,
}

#[allow(clippy::too_many_arguments)]
fn run_full_over(
    stylesheet: Rc<CompiledStylesheet>,
    documents: Rc<RefCell<Documents>>,
    root: NodeId,
    parameters: &HashMap<Name, Sequence>,
    error_mode: ErrorMode,
    loader: Option<Rc<RefCell<dyn ResourceLoader>>>,
    buffered: Rc<Cell<usize>>,
    content: ContentHandlerRef,
    lexical: Option<LexicalHandlerRef>,
    messages: &RefCell<Vec<String>>,
    result_documents: Option<&RefCell<Vec<(String, EventBuffer)>>>,
) -> Result<()> {
    let engine = Engine::new(stylesheet, documents, error_mode, buffered, loader);
    engine.prepare_globals(Some(root), parameters)?;
    engine.prepare_keys(root)?;
    engine.prepare_accumulators(root)?;
    let mut emitter = EventEmitter::new(content, lexical);
    engine.apply_templates(vec![Item::Node(root)], &None, &[], &mut emitter)?;
    emitter.finish()?;
    *messages.borrow_mut() = engine.messages.borrow().clone();
    if let Some(result_documents) = result_documents {
        *result_documents.borrow_mut() = engine.result_documents.borrow().clone();
    }
    Ok(())
}

/// A SAX-pipeline stage: accepts live input events, forwards
/// transformed events to its sinks.
pub struct TransformerHandler {
    inner: HandlerInner,
}

enum HandlerInner {
    Streaming(Box<StreamingFilter>),
    Buffering {
        builder: Option<DocumentBuilder>,
        config: TransformerConfig,
        content: ContentHandlerRef,
        lexical: Option<LexicalHandlerRef>,
    },
}

impl ContentHandler for TransformerHandler {
    fn start_document(&mut self) -> xylem_sax::Result<()> {
        match &mut self.inner {
            HandlerInner::Streaming(filter) => filter.start_document(),
            HandlerInner::Buffering { content, .. } => content.borrow_mut().start_document(),
        }
    }

    fn end_document(&mut self) -> xylem_sax::Result<()> {
        match &mut self.inner {
            HandlerInner::Streaming(filter) => filter.end_document(),
            HandlerInner::Buffering {
                builder,
                config,
                content,
                lexical,
            } => {
                let builder = builder
                    .take()
                    .ok_or_else(|| xylem_sax::SaxError::Handler("already finished".into()))?;
                let documents = Rc::new(RefCell::new(Documents::new()));
                let root = builder.finish(&mut documents.borrow_mut());
                let messages = RefCell::new(Vec::new());
                run_full_over(
                    config.stylesheet.clone(),
                    documents,
                    root,
                    &config.parameters,
                    config.error_mode,
                    config.loader.clone(),
                    config.buffered.clone(),
                    content.clone(),
                    lexical.clone(),
                    &messages,
                    None,
                )
                .map_err(|e| xylem_sax::SaxError::Handler(e.to_string()))?;
                content.borrow_mut().end_document()
            }
        }
    }

    fn start_element(&mut self, name: &Name, attributes: &Attributes) -> xylem_sax::Result<()> {
        match &mut self.inner {
            HandlerInner::Streaming(filter) => filter.start_element(name, attributes),
            HandlerInner::Buffering { builder, .. } => match builder {
                Some(builder) => builder.start_element(name, attributes),
                None => Ok(()),
            },
        }
    }

    fn end_element(&mut self, name: &Name) -> xylem_sax::Result<()> {
        match &mut self.inner {
            HandlerInner::Streaming(filter) => filter.end_element(name),
            HandlerInner::Buffering { builder, .. } => match builder {
                Some(builder) => builder.end_element(name),
                None => Ok(()),
            },
        }
    }

    fn characters(&mut self, text: &str) -> xylem_sax::Result<()> {
        match &mut self.inner {
            HandlerInner::Streaming(filter) => filter.characters(text),
            HandlerInner::Buffering { builder, .. } => match builder {
                Some(builder) => builder.characters(text),
                None => Ok(()),
            },
        }
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> xylem_sax::Result<()> {
        match &mut self.inner {
            HandlerInner::Streaming(filter) => filter.processing_instruction(target, data),
            HandlerInner::Buffering { builder, .. } => match builder {
                Some(builder) => builder.processing_instruction(target, data),
                None => Ok(()),
            },
        }
    }
}
