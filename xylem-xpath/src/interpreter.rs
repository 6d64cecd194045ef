//! The expression evaluator.
//!
//! A tree-walking interpreter over the parsed AST. The dynamic context
//! is fixed per run; the [`EvalContext`] carries the focus and variable
//! scope and is cheap to fork. Axis steps produce nodes in axis order;
//! step results are merged into document order with duplicates removed
//! by identity, as path semantics require.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use ibig::IBig;
use xylem_name::Name;
use xylem_schema_type::Xs;
use xylem_xpath_ast::ast::{
    Axis, BinaryOp, BindingKind, Expr, ItemType, KindTest, Literal, LookupKey, NameTest, NodeTest,
    Occurrence, PathExpr, SequenceType, SingleType, Step,
};

use crate::atomic::{
    arithmetic, negate, value_compare, ArithOp, Atomic, CompareOp,
};
use crate::context::{DynamicContext, EvalContext};
use crate::error::{Error, Result};
use crate::function::{Array, Function, InlineFunction, Map, PartialApplication};
use crate::node::{Documents, NodeId, NodeKind};
use crate::sequence::{sort_document_order, Item, Sequence};

/// The evaluator.
pub struct Interpreter<'a> {
    /// The per-run dynamic context.
    pub dynamic: &'a DynamicContext,
}

impl<'a> Interpreter<'a> {
    /// Wrap a dynamic context.
    pub fn new(dynamic: &'a DynamicContext) -> Self {
        Self { dynamic }
    }

    /// Borrow the document pool.
    pub fn documents(&self) -> Ref<'_, Documents> {
        self.dynamic.documents.borrow()
    }

    /// The shared document pool cell.
    pub fn documents_cell(&self) -> &Rc<RefCell<Documents>> {
        &self.dynamic.documents
    }

    /// Evaluate an expression.
    pub fn evaluate(&self, expr: &Expr, ctx: &EvalContext) -> Result<Sequence> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Integer(i) => Atomic::integer(i.clone()).into(),
                Literal::Decimal(d) => Atomic::Decimal(*d).into(),
                Literal::Double(d) => Atomic::Double(*d).into(),
                Literal::String(s) => Atomic::string(s.as_str()).into(),
            }),
            Expr::VarRef(name) => ctx
                .variables
                .get(name)
                .cloned()
                .ok_or(Error::XPST0008),
            Expr::ContextItem => Ok(Sequence::One(ctx.item()?.clone())),
            Expr::Empty => Ok(Sequence::empty()),
            Expr::Sequence(exprs) => {
                let mut parts = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    parts.push(self.evaluate(expr, ctx)?);
                }
                Ok(Sequence::concat(parts))
            }
            Expr::Parenthesized(inner) => self.evaluate(inner, ctx),
            Expr::Binary { op, left, right } => self.binary(*op, left, right, ctx),
            Expr::UnaryMinus(inner) => {
                let value = self.evaluate(inner, ctx)?;
                match value.atomized_option(&self.documents())? {
                    None => Ok(Sequence::empty()),
                    Some(atomic) => Ok(negate(&atomic)?.into()),
                }
            }
            Expr::UnaryPlus(inner) => {
                let value = self.evaluate(inner, ctx)?;
                match value.atomized_option(&self.documents())? {
                    None => Ok(Sequence::empty()),
                    Some(atomic) => {
                        if !atomic.is_numeric() && !atomic.is_untyped() {
                            return Err(Error::XPTY0004);
                        }
                        arithmetic(ArithOp::Add, &atomic, &Atomic::integer(0)).map(Into::into)
                    }
                }
            }
            Expr::Path(path) => self.eval_path(path, ctx),
            Expr::SimpleMap(left, right) => {
                let input = self.evaluate(left, ctx)?;
                let size = input.len();
                let mut parts = Vec::with_capacity(size);
                for (i, item) in input.iter().enumerate() {
                    let inner = ctx.focused(item.clone(), i + 1, size);
                    parts.push(self.evaluate(right, &inner)?);
                }
                Ok(Sequence::concat(parts))
            }
            Expr::Filter { base, predicate } => {
                let input = self.evaluate(base, ctx)?;
                self.apply_predicate(input.to_vec(), predicate, ctx)
                    .map(Sequence::from_vec)
            }
            Expr::FunctionCall { name, args } => self.static_call(name, args, ctx),
            Expr::DynamicCall { base, args } => {
                let function = self
                    .evaluate(base, ctx)?
                    .exactly_one()?
                    .to_function()?;
                if args.iter().any(|a| matches!(a, Expr::Placeholder)) {
                    return self.partial_apply(function, args, ctx);
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg, ctx)?);
                }
                self.call_function(&function, &values, ctx)
            }
            Expr::NamedFunctionRef { name, arity } => {
                let id = self
                    .dynamic
                    .library
                    .lookup(name, *arity)
                    .ok_or(Error::XPST0017)?;
                Ok(Sequence::One(Item::Function(Function::Static {
                    id,
                    name: name.clone(),
                    arity: *arity,
                })))
            }
            Expr::InlineFunction(inline) => {
                let function = Function::Inline(Rc::new(InlineFunction {
                    params: inline.params.iter().map(|p| p.name.clone()).collect(),
                    body: (*inline.body).clone(),
                    closure: ctx.variables.clone(),
                }));
                Ok(Sequence::One(Item::Function(function)))
            }
            Expr::Placeholder => Err(Error::XPST0003),
            Expr::Lookup { base, key } => {
                let input = self.evaluate(base, ctx)?;
                let mut parts = Vec::new();
                for item in input.iter() {
                    parts.push(self.lookup(item, key, ctx)?);
                }
                Ok(Sequence::concat(parts))
            }
            Expr::UnaryLookup(key) => {
                let item = ctx.item()?.clone();
                self.lookup(&item, key, ctx)
            }
            Expr::MapConstructor(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (key_expr, value_expr) in entries {
                    let key = self
                        .evaluate(key_expr, ctx)?
                        .atomized_one(&self.documents())?;
                    let value = self.evaluate(value_expr, ctx)?;
                    pairs.push((key, value));
                }
                Ok(Sequence::One(Item::Function(Function::Map(Map::new(
                    pairs,
                )?))))
            }
            Expr::SquareArray(members) => {
                let mut values = Vec::with_capacity(members.len());
                for member in members {
                    values.push(self.evaluate(member, ctx)?);
                }
                Ok(Sequence::One(Item::Function(Function::Array(Array::new(
                    values,
                )))))
            }
            Expr::CurlyArray(body) => {
                let members = match body {
                    None => Vec::new(),
                    Some(body) => self
                        .evaluate(body, ctx)?
                        .iter()
                        .map(|item| Sequence::One(item.clone()))
                        .collect(),
                };
                Ok(Sequence::One(Item::Function(Function::Array(Array::new(
                    members,
                )))))
            }
            Expr::If {
                condition,
                then,
                else_,
            } => {
                if self.evaluate(condition, ctx)?.effective_boolean_value()? {
                    self.evaluate(then, ctx)
                } else {
                    self.evaluate(else_, ctx)
                }
            }
            Expr::Binding {
                kind,
                bindings,
                body,
            } => self.binding(*kind, bindings, body, ctx),
            Expr::Cast { expr, target } => {
                let value = self.evaluate(expr, ctx)?;
                self.cast(&value, target)
            }
            Expr::Castable { expr, target } => {
                let value = self.evaluate(expr, ctx)?;
                Ok(Sequence::from(self.cast(&value, target).is_ok()))
            }
            Expr::Treat { expr, target } => {
                let value = self.evaluate(expr, ctx)?;
                if !self.matches_sequence_type(&value, target)? {
                    return Err(Error::XPDY0050);
                }
                Ok(value)
            }
            Expr::InstanceOf { expr, target } => {
                let value = self.evaluate(expr, ctx)?;
                Ok(Sequence::from(self.matches_sequence_type(&value, target)?))
            }
        }
    }

    // ---- binary operators ---------------------------------------------------

    fn binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        ctx: &EvalContext,
    ) -> Result<Sequence> {
        match op {
            BinaryOp::Or => {
                let l = self.evaluate(left, ctx)?.effective_boolean_value()?;
                if l {
                    return Ok(true.into());
                }
                let r = self.evaluate(right, ctx)?.effective_boolean_value()?;
                Ok(r.into())
            }
            BinaryOp::And => {
                let l = self.evaluate(left, ctx)?.effective_boolean_value()?;
                if !l {
                    return Ok(false.into());
                }
                let r = self.evaluate(right, ctx)?.effective_boolean_value()?;
                Ok(r.into())
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::IDiv
            | BinaryOp::Mod => {
                let arith_op = match op {
                    BinaryOp::Add => ArithOp::Add,
                    BinaryOp::Sub => ArithOp::Sub,
                    BinaryOp::Mul => ArithOp::Mul,
                    BinaryOp::Div => ArithOp::Div,
                    BinaryOp::IDiv => ArithOp::IDiv,
                    _ => ArithOp::Mod,
                };
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                let documents = self.documents();
                let (l, r) = (
                    l.atomized_option(&documents)?,
                    r.atomized_option(&documents)?,
                );
                match (l, r) {
                    (Some(l), Some(r)) => Ok(arithmetic(arith_op, &l, &r)?.into()),
                    _ => Ok(Sequence::empty()),
                }
            }
            BinaryOp::ValEq | BinaryOp::ValNe | BinaryOp::ValLt | BinaryOp::ValLe
            | BinaryOp::ValGt | BinaryOp::ValGe => {
                let compare_op = value_op(op);
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                let documents = self.documents();
                let (l, r) = (
                    l.atomized_option(&documents)?,
                    r.atomized_option(&documents)?,
                );
                match (l, r) {
                    (Some(l), Some(r)) => {
                        let l = untyped_to_string(l);
                        let r = untyped_to_string(r);
                        Ok(Sequence::from(value_compare(compare_op, &l, &r)?))
                    }
                    _ => Ok(Sequence::empty()),
                }
            }
            BinaryOp::GenEq | BinaryOp::GenNe | BinaryOp::GenLt | BinaryOp::GenLe
            | BinaryOp::GenGt | BinaryOp::GenGe => {
                let compare_op = general_op(op);
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                let documents = self.documents();
                let l = l.atomized(&documents)?;
                let r = r.atomized(&documents)?;
                for a in &l {
                    for b in &r {
                        let (a, b) = general_coerce(a, b)?;
                        if value_compare(compare_op, &a, &b)? {
                            return Ok(true.into());
                        }
                    }
                }
                Ok(false.into())
            }
            BinaryOp::Is | BinaryOp::Precedes | BinaryOp::Follows => {
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                let (l, r) = (l.zero_or_one()?.cloned(), r.zero_or_one()?.cloned());
                match (l, r) {
                    (Some(Item::Node(a)), Some(Item::Node(b))) => {
                        let documents = self.documents();
                        let result = match op {
                            BinaryOp::Is => a == b,
                            BinaryOp::Precedes => {
                                documents.compare_order(a, b) == std::cmp::Ordering::Less
                            }
                            _ => documents.compare_order(a, b) == std::cmp::Ordering::Greater,
                        };
                        Ok(result.into())
                    }
                    (None, _) | (_, None) => Ok(Sequence::empty()),
                    _ => Err(Error::XPTY0004),
                }
            }
            BinaryOp::Concat => {
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                let documents = self.documents();
                let l = l
                    .atomized_option(&documents)?
                    .map(|a| a.string_value())
                    .unwrap_or_default();
                let r = r
                    .atomized_option(&documents)?
                    .map(|a| a.string_value())
                    .unwrap_or_default();
                Ok(format!("{l}{r}").into())
            }
            BinaryOp::Range => {
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                let documents = self.documents();
                let l = l.atomized_option(&documents)?;
                let r = r.atomized_option(&documents)?;
                match (l, r) {
                    (Some(l), Some(r)) => {
                        let start = atomic_to_ibig(&l)?;
                        let end = atomic_to_ibig(&r)?;
                        let mut items = Vec::new();
                        let mut current = start;
                        while current <= end {
                            items.push(Item::Atomic(Atomic::integer(current.clone())));
                            current += IBig::from(1u8);
                        }
                        Ok(Sequence::from_vec(items))
                    }
                    _ => Ok(Sequence::empty()),
                }
            }
            BinaryOp::Union | BinaryOp::Intersect | BinaryOp::Except => {
                let l = self.evaluate(left, ctx)?;
                let r = self.evaluate(right, ctx)?;
                let mut left_nodes = node_vec(&l)?;
                let right_nodes = node_vec(&r)?;
                let documents = self.documents();
                match op {
                    BinaryOp::Union => {
                        left_nodes.extend(right_nodes);
                    }
                    BinaryOp::Intersect => {
                        left_nodes.retain(|n| right_nodes.contains(n));
                    }
                    _ => {
                        left_nodes.retain(|n| !right_nodes.contains(n));
                    }
                }
                let mut items: Vec<Item> = left_nodes.into_iter().map(Item::Node).collect();
                sort_document_order(&mut items, &documents)?;
                Ok(Sequence::from_vec(items))
            }
            _ => Err(Error::Unsupported),
        }
    }

    // ---- paths --------------------------------------------------------------

    fn eval_path(&self, path: &PathExpr, ctx: &EvalContext) -> Result<Sequence> {
        let mut current: Vec<Item> = vec![ctx.item.clone().ok_or(Error::XPDY0002)?];
        let last = path.steps.len().saturating_sub(1);
        for (step_index, step) in path.steps.iter().enumerate() {
            let mut output: Vec<Item> = Vec::new();
            let mut saw_node = false;
            let mut saw_other = false;
            let input_size = current.len();
            for (i, item) in current.iter().enumerate() {
                let results = match step {
                    Step::Root => {
                        let node = item.to_node().map_err(|_| Error::XPTY0020)?;
                        let root = self.documents().root(node);
                        vec![Item::Node(root)]
                    }
                    Step::Axis {
                        axis,
                        test,
                        predicates,
                    } => {
                        let node = item.to_node().map_err(|_| Error::XPTY0020)?;
                        let mut nodes = self.axis_nodes(*axis, node, test)?;
                        for predicate in predicates {
                            nodes = self
                                .apply_predicate(
                                    nodes.into_iter().map(Item::Node).collect(),
                                    predicate,
                                    ctx,
                                )?
                                .into_iter()
                                .map(|item| item.to_node())
                                .collect::<Result<Vec<_>>>()?;
                        }
                        nodes.into_iter().map(Item::Node).collect()
                    }
                    Step::Expr { expr, predicates } => {
                        let inner = ctx.focused(item.clone(), i + 1, input_size);
                        let mut items = self.evaluate(expr, &inner)?.to_vec();
                        for predicate in predicates {
                            items = self.apply_predicate(items, predicate, &inner)?;
                        }
                        items
                    }
                };
                for result in results {
                    match &result {
                        Item::Node(_) => saw_node = true,
                        _ => saw_other = true,
                    }
                    output.push(result);
                }
            }
            if saw_node && saw_other {
                return Err(Error::XPTY0018);
            }
            if saw_other && step_index != last {
                return Err(Error::XPTY0019);
            }
            if saw_node {
                let documents = self.documents();
                sort_document_order(&mut output, &documents)?;
            }
            current = output;
        }
        Ok(Sequence::from_vec(current))
    }

    // nodes on an axis, in axis order, filtered by the node test
    fn axis_nodes(&self, axis: Axis, node: NodeId, test: &NodeTest) -> Result<Vec<NodeId>> {
        let candidates: Vec<NodeId> = match axis {
            Axis::Child => self.documents().children(node),
            Axis::Descendant => self.documents().descendants(node),
            Axis::DescendantOrSelf => {
                let mut nodes = vec![node];
                nodes.extend(self.documents().descendants(node));
                nodes
            }
            Axis::SelfAxis => vec![node],
            Axis::Attribute => self.documents().attributes(node),
            Axis::Parent => self.documents().parent(node).into_iter().collect(),
            Axis::Ancestor => self.documents().ancestors(node),
            Axis::AncestorOrSelf => {
                let mut nodes = vec![node];
                nodes.extend(self.documents().ancestors(node));
                nodes
            }
            Axis::FollowingSibling => self.documents().following_siblings(node),
            Axis::PrecedingSibling => self.documents().preceding_siblings(node),
            Axis::Following => {
                let documents = self.documents();
                let mut nodes = Vec::new();
                let mut chain = vec![node];
                chain.extend(documents.ancestors(node));
                for current in chain {
                    for sibling in documents.following_siblings(current) {
                        nodes.push(sibling);
                        nodes.extend(documents.descendants(sibling));
                    }
                }
                nodes
            }
            Axis::Preceding => {
                let documents = self.documents();
                let mut nodes = Vec::new();
                let mut chain = vec![node];
                chain.extend(documents.ancestors(node));
                for current in chain.into_iter().rev() {
                    for sibling in documents
                        .preceding_siblings(current)
                        .into_iter()
                        .rev()
                    {
                        nodes.push(sibling);
                        nodes.extend(documents.descendants(sibling));
                    }
                }
                nodes.reverse();
                nodes
            }
            Axis::Namespace => self.dynamic.documents.borrow_mut().namespace_nodes(node),
        };
        let documents = self.documents();
        Ok(candidates
            .into_iter()
            .filter(|candidate| self.matches_node_test(&documents, *candidate, test, axis))
            .collect())
    }

    fn matches_node_test(
        &self,
        documents: &Documents,
        node: NodeId,
        test: &NodeTest,
        axis: Axis,
    ) -> bool {
        let kind = documents.kind(node);
        match test {
            NodeTest::Name(name_test) => {
                // name tests select the axis's principal node kind
                let principal = match axis {
                    Axis::Attribute => matches!(kind, NodeKind::Attribute { .. }),
                    Axis::Namespace => matches!(kind, NodeKind::Namespace { .. }),
                    _ => matches!(kind, NodeKind::Element { .. }),
                };
                if !principal {
                    return false;
                }
                let name = match documents.name(node) {
                    Some(name) => name,
                    None => return matches!(name_test, NameTest::Any),
                };
                match name_test {
                    NameTest::Any => true,
                    NameTest::Name(expected) => {
                        // attribute names ignore the default element
                        // namespace; the parser resolved accordingly
                        &name == expected
                    }
                    NameTest::AnyLocal { namespace } => name.namespace() == namespace,
                    NameTest::AnyNamespace { local } => name.local_name() == local,
                }
            }
            NodeTest::Kind(kind_test) => self.matches_kind_test(documents, node, kind_test),
        }
    }

    fn matches_kind_test(
        &self,
        documents: &Documents,
        node: NodeId,
        test: &KindTest,
    ) -> bool {
        let kind = documents.kind(node);
        match test {
            KindTest::AnyKind => true,
            KindTest::Text => matches!(kind, NodeKind::Text(_)),
            KindTest::Comment => matches!(kind, NodeKind::Comment(_)),
            KindTest::NamespaceNode => matches!(kind, NodeKind::Namespace { .. }),
            KindTest::Pi(target) => match kind {
                NodeKind::Pi { target: actual, .. } => match target {
                    Some(expected) => actual == expected,
                    None => true,
                },
                _ => false,
            },
            KindTest::Document(inner) => {
                if !matches!(kind, NodeKind::Document) {
                    return false;
                }
                match inner {
                    None => true,
                    Some(element_test) => documents
                        .children(node)
                        .into_iter()
                        .filter(|child| documents.is_element(*child))
                        .any(|child| self.matches_kind_test(documents, child, element_test)),
                }
            }
            KindTest::Element {
                name,
                type_name,
                nillable: _,
            } => {
                if !matches!(kind, NodeKind::Element { .. }) {
                    return false;
                }
                if let Some(expected) = name {
                    if documents.name(node).as_ref() != Some(expected) {
                        return false;
                    }
                }
                self.annotation_matches(documents, node, type_name)
            }
            KindTest::Attribute { name, type_name } => {
                if !matches!(kind, NodeKind::Attribute { .. }) {
                    return false;
                }
                if let Some(expected) = name {
                    if documents.name(node).as_ref() != Some(expected) {
                        return false;
                    }
                }
                self.annotation_matches(documents, node, type_name)
            }
            KindTest::SchemaElement(name) => {
                matches!(kind, NodeKind::Element { .. })
                    && documents.name(node).as_ref() == Some(name)
            }
            KindTest::SchemaAttribute(name) => {
                matches!(kind, NodeKind::Attribute { .. })
                    && documents.name(node).as_ref() == Some(name)
            }
        }
    }

    fn annotation_matches(
        &self,
        documents: &Documents,
        node: NodeId,
        type_name: &Option<Name>,
    ) -> bool {
        let type_name = match type_name {
            None => return true,
            Some(type_name) => type_name,
        };
        let expected = match Xs::by_name(Some(type_name.namespace()), type_name.local_name()) {
            Some(expected) => expected,
            None => return false,
        };
        if expected == Xs::AnyType {
            return true;
        }
        let actual = documents.annotation(node).unwrap_or(Xs::Untyped);
        actual.matches(expected)
    }

    // apply one predicate over a sequence, with numeric-predicate
    // position semantics
    fn apply_predicate(
        &self,
        items: Vec<Item>,
        predicate: &Expr,
        ctx: &EvalContext,
    ) -> Result<Vec<Item>> {
        let size = items.len();
        let mut output = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            let inner = ctx.focused(item.clone(), i + 1, size);
            let value = self.evaluate(predicate, &inner)?;
            let keep = match value.zero_or_one() {
                Ok(Some(Item::Atomic(atomic))) if atomic.is_numeric() => {
                    let wanted = atomic.to_double()?;
                    (i + 1) as f64 == wanted
                }
                _ => value.effective_boolean_value()?,
            };
            if keep {
                output.push(item);
            }
        }
        Ok(output)
    }

    // ---- bindings -----------------------------------------------------------

    fn binding(
        &self,
        kind: BindingKind,
        bindings: &[(Name, Expr)],
        body: &Expr,
        ctx: &EvalContext,
    ) -> Result<Sequence> {
        match kind {
            BindingKind::Let => {
                let mut current = ctx.clone();
                for (name, expr) in bindings {
                    let value = self.evaluate(expr, &current)?;
                    current = current.bound(name.clone(), value);
                }
                self.evaluate(body, &current)
            }
            BindingKind::For => {
                let mut parts = Vec::new();
                self.for_loop(bindings, body, ctx, &mut parts)?;
                Ok(Sequence::concat(parts))
            }
            BindingKind::Some | BindingKind::Every => {
                let mut result = kind == BindingKind::Every;
                self.quantified(bindings, body, ctx, kind, &mut result)?;
                Ok(result.into())
            }
        }
    }

    fn for_loop(
        &self,
        bindings: &[(Name, Expr)],
        body: &Expr,
        ctx: &EvalContext,
        parts: &mut Vec<Sequence>,
    ) -> Result<()> {
        match bindings.split_first() {
            None => {
                parts.push(self.evaluate(body, ctx)?);
                Ok(())
            }
            Some(((name, expr), rest)) => {
                let input = self.evaluate(expr, ctx)?;
                for item in input.iter() {
                    let inner = ctx.bound(name.clone(), Sequence::One(item.clone()));
                    self.for_loop(rest, body, &inner, parts)?;
                }
                Ok(())
            }
        }
    }

    fn quantified(
        &self,
        bindings: &[(Name, Expr)],
        body: &Expr,
        ctx: &EvalContext,
        kind: BindingKind,
        result: &mut bool,
    ) -> Result<()> {
        match bindings.split_first() {
            None => {
                let satisfied = self.evaluate(body, ctx)?.effective_boolean_value()?;
                match kind {
                    BindingKind::Some if satisfied => *result = true,
                    BindingKind::Every if !satisfied => *result = false,
                    _ => {}
                }
                Ok(())
            }
            Some(((name, expr), rest)) => {
                let input = self.evaluate(expr, ctx)?;
                for item in input.iter() {
                    let inner = ctx.bound(name.clone(), Sequence::One(item.clone()));
                    self.quantified(rest, body, &inner, kind, result)?;
                    // short-circuit once decided
                    if (kind == BindingKind::Some && *result)
                        || (kind == BindingKind::Every && !*result)
                    {
                        return Ok(());
                    }
                }
                Ok(())
            }
        }
    }

    // ---- function calls -----------------------------------------------------

    fn static_call(&self, name: &Name, args: &[Expr], ctx: &EvalContext) -> Result<Sequence> {
        let id = self
            .dynamic
            .library
            .lookup(name, args.len())
            .ok_or(Error::XPST0017)?;
        let function = Function::Static {
            id,
            name: name.clone(),
            arity: args.len(),
        };
        if args.iter().any(|a| matches!(a, Expr::Placeholder)) {
            return self.partial_apply(function, args, ctx);
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate(arg, ctx)?);
        }
        self.call_function(&function, &values, ctx)
    }

    fn partial_apply(
        &self,
        function: Function,
        args: &[Expr],
        ctx: &EvalContext,
    ) -> Result<Sequence> {
        let mut bound = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Expr::Placeholder => bound.push(None),
                other => bound.push(Some(self.evaluate(other, ctx)?)),
            }
        }
        Ok(Sequence::One(Item::Function(Function::Partial(Rc::new(
            PartialApplication {
                base: function,
                bound,
            },
        )))))
    }

    /// Invoke any function item with evaluated arguments.
    pub fn call_function(
        &self,
        function: &Function,
        args: &[Sequence],
        ctx: &EvalContext,
    ) -> Result<Sequence> {
        match function {
            Function::Static { id, arity, .. } => {
                if args.len() != *arity {
                    return Err(Error::XPTY0004);
                }
                (self.dynamic.library.get(*id).func)(self, ctx, args)
            }
            Function::Inline(inline) => {
                if args.len() != inline.params.len() {
                    return Err(Error::XPTY0004);
                }
                let mut variables = inline.closure.clone();
                for (name, value) in inline.params.iter().zip(args) {
                    variables = variables.bind(name.clone(), value.clone());
                }
                let inner = EvalContext {
                    item: None,
                    position: 1,
                    size: 1,
                    variables,
                };
                self.evaluate(&inline.body, &inner)
            }
            Function::Partial(partial) => {
                let mut merged = Vec::with_capacity(partial.bound.len());
                let mut supplied = args.iter();
                for slot in &partial.bound {
                    match slot {
                        Some(value) => merged.push(value.clone()),
                        None => {
                            merged.push(supplied.next().cloned().ok_or(Error::XPTY0004)?);
                        }
                    }
                }
                if supplied.next().is_some() {
                    return Err(Error::XPTY0004);
                }
                self.call_function(&partial.base, &merged, ctx)
            }
            Function::Map(map) => {
                if args.len() != 1 {
                    return Err(Error::XPTY0004);
                }
                let key = args[0].atomized_one(&self.documents())?;
                Ok(map.get(&key)?.cloned().unwrap_or(Sequence::Empty))
            }
            Function::Array(array) => {
                if args.len() != 1 {
                    return Err(Error::XPTY0004);
                }
                let index = args[0].atomized_one(&self.documents())?;
                let index = atomic_to_ibig(&index)?;
                let index: usize = usize::try_from(&index - IBig::from(1u8))
                    .map_err(|_| Error::FOAY0001)?;
                array.get(index).cloned().ok_or(Error::FOAY0001)
            }
        }
    }

    fn lookup(&self, item: &Item, key: &LookupKey, ctx: &EvalContext) -> Result<Sequence> {
        let function = item.to_function()?;
        match (&function, key) {
            (_, LookupKey::Wildcard) => match &function {
                Function::Map(map) => Ok(Sequence::concat(
                    map.entries().map(|(_, v)| v.clone()).collect(),
                )),
                Function::Array(array) => {
                    Ok(Sequence::concat(array.iter().cloned().collect()))
                }
                _ => Err(Error::XPTY0004),
            },
            (_, LookupKey::Name(name)) => {
                self.call_function(&function, &[Atomic::string(name.as_str()).into()], ctx)
            }
            (_, LookupKey::Integer(i)) => {
                self.call_function(&function, &[Atomic::integer(i.clone()).into()], ctx)
            }
            (_, LookupKey::Expr(expr)) => {
                let keys = self.evaluate(expr, ctx)?;
                let mut parts = Vec::new();
                for key in keys.iter() {
                    parts.push(self.call_function(
                        &function,
                        &[Sequence::One(key.clone())],
                        ctx,
                    )?);
                }
                Ok(Sequence::concat(parts))
            }
        }
    }

    // ---- types --------------------------------------------------------------

    fn cast(&self, value: &Sequence, target: &SingleType) -> Result<Sequence> {
        let target_type = Xs::by_name(Some(target.name.namespace()), target.name.local_name())
            .ok_or(Error::XPST0080)?;
        if matches!(
            target_type,
            Xs::Notation | Xs::AnySimpleType | Xs::AnyAtomicType
        ) {
            return Err(Error::XPST0080);
        }
        let atomic = value.atomized_option(&self.documents())?;
        let atomic = match atomic {
            None => {
                return if target.optional {
                    Ok(Sequence::empty())
                } else {
                    Err(Error::XPTY0004)
                };
            }
            Some(atomic) => atomic,
        };
        // QName casts resolve prefixes against the static namespaces
        if target_type == Xs::QName {
            let lexical = atomic.string_value();
            let lexical = lexical.trim();
            if !atomic.is_string_like() && !matches!(atomic, Atomic::QName(_)) {
                return Err(Error::XPTY0004);
            }
            let name = match lexical.split_once(':') {
                Some((prefix, local)) => {
                    let uri = self
                        .dynamic
                        .namespaces
                        .by_prefix(prefix)
                        .ok_or(Error::FORG0001)?;
                    Name::prefixed(uri, local, prefix)
                }
                None => Name::new(self.dynamic.namespaces.default_element_namespace(), lexical),
            };
            return Ok(Sequence::One(Item::Atomic(Atomic::QName(Rc::new(name)))));
        }
        Ok(atomic.cast_to(target_type)?.into())
    }

    /// Sequence type matching for `instance of`, `treat as` and the
    /// XSLT `as` attributes.
    pub fn matches_sequence_type(
        &self,
        value: &Sequence,
        target: &SequenceType,
    ) -> Result<bool> {
        match target {
            SequenceType::Empty => Ok(value.is_empty()),
            SequenceType::Item(item_type, occurrence) => {
                let count_ok = match occurrence {
                    Occurrence::One => value.len() == 1,
                    Occurrence::Optional => value.len() <= 1,
                    Occurrence::Many => true,
                    Occurrence::NonEmpty => !value.is_empty(),
                };
                if !count_ok {
                    return Ok(false);
                }
                for item in value.iter() {
                    if !self.matches_item_type(item, item_type)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn matches_item_type(&self, item: &Item, target: &ItemType) -> Result<bool> {
        Ok(match target {
            ItemType::AnyItem => true,
            ItemType::Kind(kind_test) => match item {
                Item::Node(node) => {
                    self.matches_kind_test(&self.documents(), *node, kind_test)
                }
                _ => false,
            },
            ItemType::Atomic(name) => match item {
                Item::Atomic(atomic) => {
                    let expected = Xs::by_name(Some(name.namespace()), name.local_name())
                        .ok_or(Error::XPST0008)?;
                    atomic.schema_type().matches(expected)
                        || (atomic.is_untyped() && expected == Xs::UntypedAtomic)
                }
                _ => false,
            },
            ItemType::Map(constraint) => match item {
                Item::Function(Function::Map(map)) => match constraint {
                    None => true,
                    Some(boxed) => {
                        let (key_type, value_type) = boxed.as_ref();
                        let mut ok = true;
                        for (key, value) in map.entries() {
                            if !self
                                .matches_item_type(&Item::Atomic(key.clone()), key_type)?
                                || !self.matches_sequence_type(value, value_type)?
                            {
                                ok = false;
                                break;
                            }
                        }
                        ok
                    }
                },
                _ => false,
            },
            ItemType::Array(constraint) => match item {
                Item::Function(Function::Array(array)) => match constraint {
                    None => true,
                    Some(member_type) => {
                        let mut ok = true;
                        for member in array.iter() {
                            if !self.matches_sequence_type(member, member_type)? {
                                ok = false;
                                break;
                            }
                        }
                        ok
                    }
                },
                _ => false,
            },
            ItemType::Function(constraint) => match item {
                Item::Function(function) => match constraint {
                    None => true,
                    Some(signature) => function.arity() == signature.params.len(),
                },
                _ => false,
            },
        })
    }
}

fn value_op(op: BinaryOp) -> CompareOp {
    match op {
        BinaryOp::ValEq => CompareOp::Eq,
        BinaryOp::ValNe => CompareOp::Ne,
        BinaryOp::ValLt => CompareOp::Lt,
        BinaryOp::ValLe => CompareOp::Le,
        BinaryOp::ValGt => CompareOp::Gt,
        _ => CompareOp::Ge,
    }
}

fn general_op(op: BinaryOp) -> CompareOp {
    match op {
        BinaryOp::GenEq => CompareOp::Eq,
        BinaryOp::GenNe => CompareOp::Ne,
        BinaryOp::GenLt => CompareOp::Lt,
        BinaryOp::GenLe => CompareOp::Le,
        BinaryOp::GenGt => CompareOp::Gt,
        _ => CompareOp::Ge,
    }
}

// value comparisons treat untyped operands as strings
fn untyped_to_string(atomic: Atomic) -> Atomic {
    match atomic {
        Atomic::Untyped(s) => Atomic::String(crate::atomic::StringType::String, s),
        other => other,
    }
}

// general comparisons cast untyped operands toward the other side
fn general_coerce(a: &Atomic, b: &Atomic) -> Result<(Atomic, Atomic)> {
    let coerce = |untyped: &Atomic, other: &Atomic| -> Result<Atomic> {
        if other.is_numeric() {
            Ok(Atomic::Double(untyped.to_double().unwrap_or(f64::NAN)))
        } else if other.is_string_like() {
            Ok(Atomic::string(untyped.string_value().as_str()))
        } else {
            untyped
                .cast_to(other.schema_type())
                .map_err(|_| Error::FORG0001)
        }
    };
    match (a.is_untyped(), b.is_untyped()) {
        (true, true) => Ok((
            Atomic::string(a.string_value().as_str()),
            Atomic::string(b.string_value().as_str()),
        )),
        (true, false) => Ok((coerce(a, b)?, b.clone())),
        (false, true) => Ok((a.clone(), coerce(b, a)?)),
        (false, false) => Ok((a.clone(), b.clone())),
    }
}

pub(crate) fn atomic_to_ibig(atomic: &Atomic) -> Result<IBig> {
    match atomic {
        Atomic::Integer(_, i) => Ok(i.clone()),
        Atomic::Untyped(_) => {
            let d = atomic.to_double()?;
            if d.fract() != 0.0 || !d.is_finite() {
                return Err(Error::FORG0001);
            }
            Ok(IBig::from(d as i64))
        }
        Atomic::Double(d) if d.fract() == 0.0 && d.is_finite() => Ok(IBig::from(*d as i64)),
        Atomic::Decimal(d) if d.fract().is_zero() => {
            IBig::from_str_radix(&d.trunc().normalize().to_string(), 10)
                .map_err(|_| Error::FOCA0001)
        }
        _ => Err(Error::XPTY0004),
    }
}

fn node_vec(sequence: &Sequence) -> Result<Vec<NodeId>> {
    sequence
        .iter()
        .map(|item| item.to_node().map_err(|_| Error::XPTY0004))
        .collect()
}
