// https://www.w3.org/TR/xpath-functions-31/#array-functions

use xylem_name::ARRAY_NAMESPACE;

use crate::atomic::Atomic;
use crate::context::StaticFunctionDescription;
use crate::error::{Error, Result};
use crate::function::{Array, Function};
use crate::sequence::{Item, Sequence};

use super::helpers::*;

fn array_arg(args: &[Sequence], i: usize) -> Result<Array> {
    match args[i].exactly_one()?.to_function()? {
        Function::Array(array) => Ok(array),
        _ => Err(Error::XPTY0004),
    }
}

fn index_arg(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    i: usize,
) -> Result<usize> {
    let position = integer_arg(interp, args, i)?;
    if position < 1 {
        return Err(Error::FOAY0001);
    }
    Ok((position - 1) as usize)
}

fn wrap(array: Array) -> Sequence {
    Sequence::One(Item::Function(Function::Array(array)))
}

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    vec![
        ns_desc(ARRAY_NAMESPACE, "size", 1, |_interp, _ctx, args| {
            Ok(Atomic::integer(array_arg(args, 0)?.len() as i64).into())
        }),
        ns_desc(ARRAY_NAMESPACE, "get", 2, |interp, _ctx, args| {
            let array = array_arg(args, 0)?;
            let index = index_arg(interp, args, 1)?;
            array.get(index).cloned().ok_or(Error::FOAY0001)
        }),
        ns_desc(ARRAY_NAMESPACE, "put", 3, |interp, _ctx, args| {
            let array = array_arg(args, 0)?;
            let index = index_arg(interp, args, 1)?;
            Ok(wrap(array.put(index, args[2].clone())?))
        }),
        ns_desc(ARRAY_NAMESPACE, "append", 2, |_interp, _ctx, args| {
            let array = array_arg(args, 0)?;
            Ok(wrap(array.append(args[1].clone())))
        }),
        ns_desc(ARRAY_NAMESPACE, "remove", 2, |interp, _ctx, args| {
            let array = array_arg(args, 0)?;
            // positions are removed together, later positions unshifted
            let mut positions = Vec::new();
            for atomic in args[1].atomized(&interp.documents())? {
                let position = crate::interpreter::atomic_to_ibig(&atomic)?;
                let position = i64::try_from(&position).map_err(|_| Error::FOAY0001)?;
                if position < 1 || position as usize > array.len() {
                    return Err(Error::FOAY0001);
                }
                positions.push((position - 1) as usize);
            }
            positions.sort_unstable();
            positions.dedup();
            let members: Vec<Sequence> = array
                .iter()
                .enumerate()
                .filter(|(i, _)| !positions.contains(i))
                .map(|(_, member)| member.clone())
                .collect();
            Ok(wrap(Array::new(members)))
        }),
        ns_desc(ARRAY_NAMESPACE, "insert-before", 3, |interp, _ctx, args| {
            let array = array_arg(args, 0)?;
            let position = integer_arg(interp, args, 1)?;
            if position < 1 || position as usize > array.len() + 1 {
                return Err(Error::FOAY0001);
            }
            Ok(wrap(array.insert_before((position - 1) as usize, args[2].clone())?))
        }),
        ns_desc(ARRAY_NAMESPACE, "head", 1, |_interp, _ctx, args| {
            let array = array_arg(args, 0)?;
            array.get(0).cloned().ok_or(Error::FOAY0001)
        }),
        ns_desc(ARRAY_NAMESPACE, "tail", 1, |_interp, _ctx, args| {
            let array = array_arg(args, 0)?;
            if array.is_empty() {
                return Err(Error::FOAY0001);
            }
            Ok(wrap(array.remove(0)?))
        }),
        ns_desc(ARRAY_NAMESPACE, "subarray", 2, |interp, _ctx, args| {
            let array = array_arg(args, 0)?;
            let start = index_arg(interp, args, 1)?;
            let length = array.len().saturating_sub(start);
            Ok(wrap(array.subarray(start, length)?))
        }),
        ns_desc(ARRAY_NAMESPACE, "subarray", 3, |interp, _ctx, args| {
            let array = array_arg(args, 0)?;
            let start = index_arg(interp, args, 1)?;
            let length = integer_arg(interp, args, 2)?;
            if length < 0 {
                return Err(Error::FOAY0002);
            }
            Ok(wrap(array.subarray(start, length as usize)?))
        }),
        ns_desc(ARRAY_NAMESPACE, "reverse", 1, |_interp, _ctx, args| {
            Ok(wrap(array_arg(args, 0)?.reversed()))
        }),
        ns_desc(ARRAY_NAMESPACE, "join", 1, |_interp, _ctx, args| {
            let mut arrays = Vec::new();
            for item in args[0].iter() {
                match item.to_function()? {
                    Function::Array(array) => arrays.push(array),
                    _ => return Err(Error::XPTY0004),
                }
            }
            Ok(wrap(Array::join(&arrays)))
        }),
        ns_desc(ARRAY_NAMESPACE, "flatten", 1, |_interp, _ctx, args| {
            let mut out: Vec<Item> = Vec::new();
            let mut stack: Vec<Item> = args[0].to_vec();
            stack.reverse();
            while let Some(item) = stack.pop() {
                match item {
                    Item::Function(Function::Array(array)) => {
                        let mut members: Vec<Item> = Vec::new();
                        for member in array.iter() {
                            members.extend(member.to_vec());
                        }
                        members.reverse();
                        stack.extend(members);
                    }
                    other => out.push(other),
                }
            }
            Ok(Sequence::from_vec(out))
        }),
        ns_desc(ARRAY_NAMESPACE, "for-each", 2, |interp, ctx, args| {
            let array = array_arg(args, 0)?;
            let function = args[1].exactly_one()?.to_function()?;
            let mut members = Vec::with_capacity(array.len());
            for member in array.iter() {
                members.push(interp.call_function(&function, &[member.clone()], ctx)?);
            }
            Ok(wrap(Array::new(members)))
        }),
    ]
}
