// https://www.w3.org/TR/xpath-functions-31/#numeric-functions

use ibig::IBig;

use crate::atomic::{
    arithmetic, negate, round_atomic, round_half_to_even_atomic, ArithOp, Atomic, CompareOp,
    value_compare,
};
use crate::context::StaticFunctionDescription;
use crate::error::{Error, Result};
use crate::sequence::Sequence;

use super::helpers::*;

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    vec![
        fn_desc("number", 0, |interp, ctx, _args| {
            let item = ctx.item()?.clone();
            let value = Sequence::One(item)
                .atomized_option(&interp.documents())?
                .and_then(|a| coerce_number(&a))
                .unwrap_or(f64::NAN);
            Ok(Atomic::Double(value).into())
        }),
        fn_desc("number", 1, |interp, _ctx, args| {
            let value = args[0]
                .atomized_option(&interp.documents())?
                .and_then(|a| coerce_number(&a))
                .unwrap_or(f64::NAN);
            Ok(Atomic::Double(value).into())
        }),
        fn_desc("abs", 1, |interp, _ctx, args| {
            match opt_atomic_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(atomic) => {
                    let negative = match &atomic {
                        Atomic::Integer(_, i) => *i < IBig::from(0u8),
                        Atomic::Decimal(d) => d.is_sign_negative(),
                        Atomic::Float(f) => f.is_sign_negative(),
                        Atomic::Double(d) => d.is_sign_negative(),
                        Atomic::Untyped(_) => atomic.to_double()?.is_sign_negative(),
                        _ => return Err(Error::XPTY0004),
                    };
                    if negative {
                        Ok(negate(&atomic)?.into())
                    } else if atomic.is_untyped() {
                        Ok(Atomic::Double(atomic.to_double()?).into())
                    } else {
                        Ok(atomic.into())
                    }
                }
            }
        }),
        fn_desc("floor", 1, |interp, _ctx, args| {
            match opt_atomic_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(atomic) => Ok(match atomic {
                    Atomic::Integer(_, _) => atomic,
                    Atomic::Decimal(d) => Atomic::Decimal(d.floor()),
                    Atomic::Float(f) => Atomic::Float(f.floor()),
                    Atomic::Double(d) => Atomic::Double(d.floor()),
                    other => Atomic::Double(other.to_double()?.floor()),
                }
                .into()),
            }
        }),
        fn_desc("ceiling", 1, |interp, _ctx, args| {
            match opt_atomic_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(atomic) => Ok(match atomic {
                    Atomic::Integer(_, _) => atomic,
                    Atomic::Decimal(d) => Atomic::Decimal(d.ceil()),
                    Atomic::Float(f) => Atomic::Float(f.ceil()),
                    Atomic::Double(d) => Atomic::Double(d.ceil()),
                    other => Atomic::Double(other.to_double()?.ceil()),
                }
                .into()),
            }
        }),
        fn_desc("round", 1, |interp, _ctx, args| {
            match opt_atomic_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(atomic) => Ok(round_atomic(&atomic, 0)?.into()),
            }
        }),
        fn_desc("round", 2, |interp, _ctx, args| {
            let precision = integer_arg(interp, args, 1)? as i32;
            match opt_atomic_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(atomic) => Ok(round_atomic(&atomic, precision)?.into()),
            }
        }),
        fn_desc("round-half-to-even", 1, |interp, _ctx, args| {
            match opt_atomic_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(atomic) => Ok(round_half_to_even_atomic(&atomic, 0)?.into()),
            }
        }),
        fn_desc("round-half-to-even", 2, |interp, _ctx, args| {
            let precision = integer_arg(interp, args, 1)? as i32;
            match opt_atomic_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(atomic) => Ok(round_half_to_even_atomic(&atomic, precision)?.into()),
            }
        }),
        fn_desc("sum", 1, |interp, _ctx, args| {
            sum_impl(interp, args, Some(Atomic::integer(0)))
        }),
        fn_desc("sum", 2, |interp, _ctx, args| {
            let zero = opt_atomic_arg(interp, args, 1)?;
            sum_impl(interp, args, zero)
        }),
        fn_desc("avg", 1, |interp, _ctx, args| {
            let atomics = atomics_arg(interp, args, 0)?;
            if atomics.is_empty() {
                return Ok(Sequence::empty());
            }
            let count = atomics.len();
            let mut total: Option<Atomic> = None;
            for atomic in atomics {
                total = Some(match total {
                    None => atomic,
                    Some(total) => arithmetic(ArithOp::Add, &total, &atomic)?,
                });
            }
            let total = total.unwrap();
            Ok(arithmetic(ArithOp::Div, &total, &Atomic::integer(count as i64))?.into())
        }),
        fn_desc("min", 1, |interp, _ctx, args| extreme(interp, args, CompareOp::Lt)),
        fn_desc("min", 2, |interp, _ctx, args| extreme(interp, args, CompareOp::Lt)),
        fn_desc("max", 1, |interp, _ctx, args| extreme(interp, args, CompareOp::Gt)),
        fn_desc("max", 2, |interp, _ctx, args| extreme(interp, args, CompareOp::Gt)),
    ]
}

// fn:number semantics: unparsable values are NaN, not errors
fn coerce_number(atomic: &Atomic) -> Option<f64> {
    match atomic {
        Atomic::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => atomic.to_double().ok().or(Some(f64::NAN)),
    }
}

fn sum_impl(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    zero: Option<Atomic>,
) -> Result<Sequence> {
    let atomics = atomics_arg(interp, args, 0)?;
    if atomics.is_empty() {
        return Ok(match zero {
            None => Sequence::empty(),
            Some(zero) => zero.into(),
        });
    }
    let mut total: Option<Atomic> = None;
    for atomic in atomics {
        total = Some(match total {
            None => promote_untyped(atomic)?,
            Some(total) => arithmetic(ArithOp::Add, &total, &atomic)?,
        });
    }
    Ok(total.unwrap().into())
}

fn promote_untyped(atomic: Atomic) -> Result<Atomic> {
    if atomic.is_untyped() {
        Ok(Atomic::Double(atomic.to_double().unwrap_or(f64::NAN)))
    } else {
        Ok(atomic)
    }
}

fn extreme(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    op: CompareOp,
) -> Result<Sequence> {
    let atomics = atomics_arg(interp, args, 0)?;
    if atomics.is_empty() {
        return Ok(Sequence::empty());
    }
    // NaN anywhere makes the result NaN
    if atomics.iter().any(|a| a.is_nan()) {
        return Ok(Atomic::Double(f64::NAN).into());
    }
    let mut best: Option<Atomic> = None;
    for atomic in atomics {
        let atomic = promote_untyped(atomic)?;
        best = Some(match best {
            None => atomic,
            Some(best) => {
                if value_compare(op, &atomic, &best)? {
                    atomic
                } else {
                    best
                }
            }
        });
    }
    Ok(best.unwrap().into())
}
