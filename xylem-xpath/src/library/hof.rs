// https://www.w3.org/TR/xpath-functions-31/#higher-order-functions

use crate::atomic::{value_compare, Atomic, CompareOp};
use crate::context::StaticFunctionDescription;
use crate::error::{Error, Result};
use crate::sequence::{Item, Sequence};

use super::helpers::*;

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    vec![
        fn_desc("for-each", 2, |interp, ctx, args| {
            let function = args[1].exactly_one()?.to_function()?;
            let mut parts = Vec::new();
            for item in args[0].iter() {
                parts.push(interp.call_function(
                    &function,
                    &[Sequence::One(item.clone())],
                    ctx,
                )?);
            }
            Ok(Sequence::concat(parts))
        }),
        fn_desc("filter", 2, |interp, ctx, args| {
            let function = args[1].exactly_one()?.to_function()?;
            let mut items = Vec::new();
            for item in args[0].iter() {
                let keep = interp
                    .call_function(&function, &[Sequence::One(item.clone())], ctx)?
                    .effective_boolean_value()?;
                if keep {
                    items.push(item.clone());
                }
            }
            Ok(Sequence::from_vec(items))
        }),
        fn_desc("fold-left", 3, |interp, ctx, args| {
            let function = args[2].exactly_one()?.to_function()?;
            let mut accumulator = args[1].clone();
            for item in args[0].iter() {
                accumulator = interp.call_function(
                    &function,
                    &[accumulator, Sequence::One(item.clone())],
                    ctx,
                )?;
            }
            Ok(accumulator)
        }),
        fn_desc("fold-right", 3, |interp, ctx, args| {
            let function = args[2].exactly_one()?.to_function()?;
            let mut accumulator = args[1].clone();
            for item in args[0].to_vec().into_iter().rev() {
                accumulator =
                    interp.call_function(&function, &[Sequence::One(item), accumulator], ctx)?;
            }
            Ok(accumulator)
        }),
        fn_desc("for-each-pair", 3, |interp, ctx, args| {
            let function = args[2].exactly_one()?.to_function()?;
            let mut parts = Vec::new();
            for (a, b) in args[0].iter().zip(args[1].iter()) {
                parts.push(interp.call_function(
                    &function,
                    &[Sequence::One(a.clone()), Sequence::One(b.clone())],
                    ctx,
                )?);
            }
            Ok(Sequence::concat(parts))
        }),
        fn_desc("sort", 1, |interp, ctx, args| {
            sort_impl(interp, &args[0], None, ctx)
        }),
        fn_desc("sort", 2, |interp, ctx, args| {
            // the collation argument is accepted and ignored (codepoint
            // collation only)
            sort_impl(interp, &args[0], None, ctx)
        }),
        fn_desc("sort", 3, |interp, ctx, args| {
            let key = args[2].exactly_one()?.to_function()?;
            sort_impl(interp, &args[0], Some(key), ctx)
        }),
        fn_desc("apply", 2, |interp, ctx, args| {
            let function = args[0].exactly_one()?.to_function()?;
            let array = args[1].exactly_one()?.to_function()?;
            let array = match array {
                crate::function::Function::Array(array) => array,
                _ => return Err(Error::XPTY0004),
            };
            if array.len() != function.arity() {
                return Err(Error::FOAP0001);
            }
            let arguments: Vec<Sequence> = array.iter().cloned().collect();
            interp.call_function(&function, &arguments, ctx)
        }),
    ]
}

fn sort_impl(
    interp: &crate::interpreter::Interpreter,
    input: &Sequence,
    key: Option<crate::function::Function>,
    ctx: &crate::context::EvalContext,
) -> Result<Sequence> {
    // precompute sort keys, then a stable sort over them
    let mut keyed: Vec<(Vec<Atomic>, Item)> = Vec::with_capacity(input.len());
    for item in input.iter() {
        let key_value = match &key {
            Some(function) => interp
                .call_function(function, &[Sequence::One(item.clone())], ctx)?
                .atomized(&interp.documents())?,
            None => Sequence::One(item.clone()).atomized(&interp.documents())?,
        };
        keyed.push((key_value, item.clone()));
    }
    let mut error: Option<Error> = None;
    keyed.sort_by(|(a, _), (b, _)| {
        for (x, y) in a.iter().zip(b.iter()) {
            match compare_keys(x, y) {
                Ok(std::cmp::Ordering::Equal) => continue,
                Ok(ordering) => return ordering,
                Err(e) => {
                    error.get_or_insert(e);
                    return std::cmp::Ordering::Equal;
                }
            }
        }
        a.len().cmp(&b.len())
    });
    if let Some(error) = error {
        return Err(error);
    }
    Ok(Sequence::from_vec(keyed.into_iter().map(|(_, item)| item).collect()))
}

fn compare_keys(a: &Atomic, b: &Atomic) -> Result<std::cmp::Ordering> {
    // NaN sorts before everything, per fn:sort
    if a.is_nan() {
        return Ok(if b.is_nan() {
            std::cmp::Ordering::Equal
        } else {
            std::cmp::Ordering::Less
        });
    }
    if b.is_nan() {
        return Ok(std::cmp::Ordering::Greater);
    }
    if value_compare(CompareOp::Lt, a, b)? {
        Ok(std::cmp::Ordering::Less)
    } else if value_compare(CompareOp::Gt, a, b)? {
        Ok(std::cmp::Ordering::Greater)
    } else {
        Ok(std::cmp::Ordering::Equal)
    }
}
