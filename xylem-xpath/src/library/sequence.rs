// https://www.w3.org/TR/xpath-functions-31/#sequence-functions

use ahash::{HashSet, HashSetExt};

use crate::atomic::{value_compare, Atomic, CompareOp, MapKey};
use crate::context::StaticFunctionDescription;
use crate::error::{Error, Result};
use crate::node::NodeKind;
use crate::sequence::{Item, Sequence};

use super::helpers::*;

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    vec![
        fn_desc("position", 0, |_interp, ctx, _args| {
            Ok(Atomic::integer(ctx.position as i64).into())
        }),
        fn_desc("last", 0, |_interp, ctx, _args| {
            Ok(Atomic::integer(ctx.size as i64).into())
        }),
        fn_desc("count", 1, |_interp, _ctx, args| {
            Ok(Atomic::integer(args[0].len() as i64).into())
        }),
        fn_desc("empty", 1, |_interp, _ctx, args| {
            Ok(args[0].is_empty().into())
        }),
        fn_desc("exists", 1, |_interp, _ctx, args| {
            Ok((!args[0].is_empty()).into())
        }),
        fn_desc("reverse", 1, |_interp, _ctx, args| {
            let mut items = args[0].to_vec();
            items.reverse();
            Ok(Sequence::from_vec(items))
        }),
        fn_desc("subsequence", 2, |interp, _ctx, args| {
            let start = double_arg(interp, args, 1)?;
            Ok(subsequence(&args[0], start, f64::INFINITY))
        }),
        fn_desc("subsequence", 3, |interp, _ctx, args| {
            let start = double_arg(interp, args, 1)?;
            let length = double_arg(interp, args, 2)?;
            Ok(subsequence(&args[0], start, length))
        }),
        fn_desc("insert-before", 3, |interp, _ctx, args| {
            let mut position = integer_arg(interp, args, 1)?;
            if position < 1 {
                position = 1;
            }
            let mut items = args[0].to_vec();
            let insert_at = ((position - 1) as usize).min(items.len());
            let mut result = items.split_off(insert_at);
            items.extend(args[2].to_vec());
            items.append(&mut result);
            Ok(Sequence::from_vec(items))
        }),
        fn_desc("remove", 2, |interp, _ctx, args| {
            let position = integer_arg(interp, args, 1)?;
            let items: Vec<Item> = args[0]
                .iter()
                .enumerate()
                .filter(|(i, _)| (*i + 1) as i64 != position)
                .map(|(_, item)| item.clone())
                .collect();
            Ok(Sequence::from_vec(items))
        }),
        fn_desc("distinct-values", 1, |interp, _ctx, args| {
            let atomics = atomics_arg(interp, args, 0)?;
            let mut seen: HashSet<MapKey> = HashSet::new();
            let mut out = Vec::new();
            for atomic in atomics {
                // untyped values compare as strings here
                let atomic = if atomic.is_untyped() {
                    Atomic::string(atomic.string_value().as_str())
                } else {
                    atomic
                };
                let key = MapKey::new(&atomic)?;
                if seen.insert(key) {
                    out.push(Item::Atomic(atomic));
                }
            }
            Ok(Sequence::from_vec(out))
        }),
        fn_desc("index-of", 2, |interp, _ctx, args| {
            let haystack = atomics_arg(interp, args, 0)?;
            let needle = args[1].atomized_one(&interp.documents())?;
            let mut out = Vec::new();
            for (i, atomic) in haystack.iter().enumerate() {
                let (a, b) = coerce_pair(atomic, &needle);
                if value_compare(CompareOp::Eq, &a, &b).unwrap_or(false) {
                    out.push(Item::Atomic(Atomic::integer((i + 1) as i64)));
                }
            }
            Ok(Sequence::from_vec(out))
        }),
        fn_desc("deep-equal", 2, |interp, _ctx, args| {
            Ok(deep_equal(interp, &args[0], &args[1])?.into())
        }),
        fn_desc("zero-or-one", 1, |_interp, _ctx, args| {
            if args[0].len() > 1 {
                return Err(Error::FORG0003);
            }
            Ok(args[0].clone())
        }),
        fn_desc("one-or-more", 1, |_interp, _ctx, args| {
            if args[0].is_empty() {
                return Err(Error::FORG0004);
            }
            Ok(args[0].clone())
        }),
        fn_desc("exactly-one", 1, |_interp, _ctx, args| {
            if args[0].len() != 1 {
                return Err(Error::FORG0005);
            }
            Ok(args[0].clone())
        }),
        fn_desc("id", 1, |interp, ctx, args| {
            let node = context_node(ctx)?;
            id_lookup(interp, args, node)
        }),
        fn_desc("id", 2, |interp, _ctx, args| {
            let node = args[1].exactly_one()?.to_node()?;
            id_lookup(interp, args, node)
        }),
    ]
}

fn subsequence(input: &Sequence, start: f64, length: f64) -> Sequence {
    if start.is_nan() || length.is_nan() {
        return Sequence::empty();
    }
    let start_rounded = (start + 0.5).floor();
    let end = if length.is_infinite() && length > 0.0 {
        f64::INFINITY
    } else {
        start_rounded + (length + 0.5).floor()
    };
    let items: Vec<Item> = input
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let position = (*i + 1) as f64;
            position >= start_rounded && position < end
        })
        .map(|(_, item)| item.clone())
        .collect();
    Sequence::from_vec(items)
}

fn coerce_pair(a: &Atomic, b: &Atomic) -> (Atomic, Atomic) {
    let fix = |x: &Atomic| {
        if x.is_untyped() {
            Atomic::string(x.string_value().as_str())
        } else {
            x.clone()
        }
    };
    (fix(a), fix(b))
}

fn id_lookup(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    node: crate::node::NodeId,
) -> Result<Sequence> {
    let documents = interp.documents();
    let root = documents.root(node);
    let mut out = Vec::new();
    for atomic in atomics_arg(interp, args, 0)? {
        for token in atomic.string_value().split_whitespace() {
            if let Some(element) = documents.element_by_id(root, token) {
                out.push(Item::Node(element));
            }
        }
    }
    let mut items = out;
    crate::sequence::sort_document_order(&mut items, &documents)?;
    Ok(Sequence::from_vec(items))
}

// structural equality per fn:deep-equal: atomics compare with NaN
// equal to itself, nodes compare by name, children and attributes
pub(crate) fn deep_equal(
    interp: &crate::interpreter::Interpreter,
    a: &Sequence,
    b: &Sequence,
) -> Result<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b.iter()) {
        if !deep_equal_item(interp, x, y)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn deep_equal_item(
    interp: &crate::interpreter::Interpreter,
    a: &Item,
    b: &Item,
) -> Result<bool> {
    match (a, b) {
        (Item::Atomic(x), Item::Atomic(y)) => {
            if x.is_nan() && y.is_nan() {
                return Ok(true);
            }
            let (x, y) = coerce_pair(x, y);
            Ok(value_compare(CompareOp::Eq, &x, &y).unwrap_or(false))
        }
        (Item::Node(x), Item::Node(y)) => deep_equal_node(interp, *x, *y),
        (Item::Function(crate::function::Function::Map(x)),
         Item::Function(crate::function::Function::Map(y))) => {
            if x.len() != y.len() {
                return Ok(false);
            }
            for (key, value) in x.entries() {
                match y.get(key)? {
                    Some(other) => {
                        if !deep_equal(interp, value, other)? {
                            return Ok(false);
                        }
                    }
                    None => return Ok(false),
                }
            }
            Ok(true)
        }
        (Item::Function(crate::function::Function::Array(x)),
         Item::Function(crate::function::Function::Array(y))) => {
            if x.len() != y.len() {
                return Ok(false);
            }
            for (xv, yv) in x.iter().zip(y.iter()) {
                if !deep_equal(interp, xv, yv)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn deep_equal_node(
    interp: &crate::interpreter::Interpreter,
    a: crate::node::NodeId,
    b: crate::node::NodeId,
) -> Result<bool> {
    let documents = interp.documents();
    let (ka, kb) = (documents.kind(a).clone(), documents.kind(b).clone());
    match (&ka, &kb) {
        (NodeKind::Text(x), NodeKind::Text(y)) => Ok(x == y),
        (NodeKind::Comment(x), NodeKind::Comment(y)) => Ok(x == y),
        (
            NodeKind::Pi { target: tx, data: dx },
            NodeKind::Pi { target: ty, data: dy },
        ) => Ok(tx == ty && dx == dy),
        (NodeKind::Attribute { name: nx, value: vx }, NodeKind::Attribute { name: ny, value: vy }) => {
            Ok(nx == ny && vx == vy)
        }
        (NodeKind::Element { name: nx, .. }, NodeKind::Element { name: ny, .. }) => {
            if nx != ny {
                return Ok(false);
            }
            // attributes compare as sets
            let attrs_a = documents.attributes(a);
            let attrs_b = documents.attributes(b);
            if attrs_a.len() != attrs_b.len() {
                return Ok(false);
            }
            for attr in &attrs_a {
                let (name, value) = match documents.kind(*attr) {
                    NodeKind::Attribute { name, value } => (name.clone(), value.clone()),
                    _ => continue,
                };
                let matched = attrs_b.iter().any(|other| {
                    matches!(
                        documents.kind(*other),
                        NodeKind::Attribute { name: n, value: v } if *n == name && *v == value
                    )
                });
                if !matched {
                    return Ok(false);
                }
            }
            drop(documents);
            deep_equal_children(interp, a, b)
        }
        (NodeKind::Document, NodeKind::Document) => {
            drop(documents);
            deep_equal_children(interp, a, b)
        }
        _ => Ok(false),
    }
}

fn deep_equal_children(
    interp: &crate::interpreter::Interpreter,
    a: crate::node::NodeId,
    b: crate::node::NodeId,
) -> Result<bool> {
    // comments and PIs are ignored when comparing element content
    let significant = |node: crate::node::NodeId| -> bool {
        let documents = interp.documents();
        matches!(
            documents.kind(node),
            NodeKind::Element { .. } | NodeKind::Text(_)
        )
    };
    let children_a: Vec<_> = interp
        .documents()
        .children(a)
        .into_iter()
        .filter(|n| significant(*n))
        .collect();
    let children_b: Vec<_> = interp
        .documents()
        .children(b)
        .into_iter()
        .filter(|n| significant(*n))
        .collect();
    if children_a.len() != children_b.len() {
        return Ok(false);
    }
    for (x, y) in children_a.into_iter().zip(children_b) {
        if !deep_equal_node(interp, x, y)? {
            return Ok(false);
        }
    }
    Ok(true)
}
