//! Argument plumbing shared by the library modules.

use xylem_name::{Name, FN_NAMESPACE};

use crate::atomic::Atomic;
use crate::context::{EvalContext, NativeFn, StaticFunctionDescription};
use crate::error::{Error, Result};
use crate::interpreter::Interpreter;
use crate::node::NodeId;
use crate::sequence::{Item, Sequence};

pub(crate) fn fn_desc(
    local: &str,
    arity: usize,
    func: impl Fn(&Interpreter, &EvalContext, &[Sequence]) -> Result<Sequence> + 'static,
) -> StaticFunctionDescription {
    ns_desc(FN_NAMESPACE, local, arity, func)
}

pub(crate) fn ns_desc(
    namespace: &str,
    local: &str,
    arity: usize,
    func: impl Fn(&Interpreter, &EvalContext, &[Sequence]) -> Result<Sequence> + 'static,
) -> StaticFunctionDescription {
    StaticFunctionDescription {
        name: Name::new(namespace, local),
        arity,
        func: Box::new(func) as Box<NativeFn>,
    }
}

/// A string argument: empty sequence reads as "".
pub(crate) fn string_arg(interp: &Interpreter, args: &[Sequence], i: usize) -> Result<String> {
    Ok(args[i]
        .atomized_option(&interp.documents())?
        .map(|a| a.string_value())
        .unwrap_or_default())
}

/// An optional string argument.
pub(crate) fn opt_string_arg(
    interp: &Interpreter,
    args: &[Sequence],
    i: usize,
) -> Result<Option<String>> {
    Ok(args[i]
        .atomized_option(&interp.documents())?
        .map(|a| a.string_value()))
}

/// An optional atomic argument.
pub(crate) fn opt_atomic_arg(
    interp: &Interpreter,
    args: &[Sequence],
    i: usize,
) -> Result<Option<Atomic>> {
    args[i].atomized_option(&interp.documents())
}

/// A required double argument.
pub(crate) fn double_arg(interp: &Interpreter, args: &[Sequence], i: usize) -> Result<f64> {
    args[i].atomized_one(&interp.documents())?.to_double()
}

/// A required integer argument.
pub(crate) fn integer_arg(interp: &Interpreter, args: &[Sequence], i: usize) -> Result<i64> {
    let atomic = args[i].atomized_one(&interp.documents())?;
    let big = crate::interpreter::atomic_to_ibig(&atomic)?;
    i64::try_from(&big).map_err(|_| Error::FOCA0003)
}

/// The context item as a node.
pub(crate) fn context_node(ctx: &EvalContext) -> Result<NodeId> {
    ctx.item()?.to_node().map_err(|_| Error::XPTY0020)
}

/// The whole argument as atomics.
pub(crate) fn atomics_arg(
    interp: &Interpreter,
    args: &[Sequence],
    i: usize,
) -> Result<Vec<Atomic>> {
    args[i].atomized(&interp.documents())
}

/// Wrap a list of atomics as a sequence.
pub(crate) fn atomics_to_sequence(atomics: Vec<Atomic>) -> Sequence {
    Sequence::from_vec(atomics.into_iter().map(Item::Atomic).collect())
}
