// https://www.w3.org/TR/xpath-functions-31/#map-functions

use xylem_name::MAP_NAMESPACE;

use crate::atomic::Atomic;
use crate::context::StaticFunctionDescription;
use crate::error::{Error, Result};
use crate::function::{Array, Function, Map, MergeDuplicates};
use crate::sequence::{Item, Sequence};

use super::helpers::*;

fn map_arg(args: &[Sequence], i: usize) -> Result<Map> {
    match args[i].exactly_one()?.to_function()? {
        Function::Map(map) => Ok(map),
        _ => Err(Error::XPTY0004),
    }
}

fn maps_arg(args: &[Sequence]) -> Result<Vec<Map>> {
    let mut maps = Vec::with_capacity(args[0].len());
    for item in args[0].iter() {
        match item.to_function()? {
            Function::Map(map) => maps.push(map),
            _ => return Err(Error::XPTY0004),
        }
    }
    Ok(maps)
}

// the `duplicates` entry of the map:merge options map
fn duplicates_option(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
) -> Result<MergeDuplicates> {
    let options = map_arg(args, 1)?;
    match options.get(&Atomic::string("duplicates"))? {
        None => Ok(MergeDuplicates::UseFirst),
        Some(value) => {
            let choice = value
                .atomized_one(&interp.documents())
                .map_err(|_| Error::FOJS0005)?
                .string_value();
            MergeDuplicates::by_name(&choice)
        }
    }
}

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    vec![
        ns_desc(MAP_NAMESPACE, "size", 1, |_interp, _ctx, args| {
            Ok(Atomic::integer(map_arg(args, 0)?.len() as i64).into())
        }),
        ns_desc(MAP_NAMESPACE, "keys", 1, |_interp, _ctx, args| {
            let map = map_arg(args, 0)?;
            Ok(Sequence::from_vec(
                map.entries()
                    .map(|(key, _)| Item::Atomic(key.clone()))
                    .collect(),
            ))
        }),
        ns_desc(MAP_NAMESPACE, "contains", 2, |interp, _ctx, args| {
            let map = map_arg(args, 0)?;
            let key = args[1].atomized_one(&interp.documents())?;
            Ok(map.contains(&key)?.into())
        }),
        ns_desc(MAP_NAMESPACE, "get", 2, |interp, _ctx, args| {
            let map = map_arg(args, 0)?;
            let key = args[1].atomized_one(&interp.documents())?;
            Ok(map.get(&key)?.cloned().unwrap_or(Sequence::Empty))
        }),
        ns_desc(MAP_NAMESPACE, "put", 3, |interp, _ctx, args| {
            let map = map_arg(args, 0)?;
            let key = args[1].atomized_one(&interp.documents())?;
            let value = args[2].clone();
            Ok(Sequence::One(Item::Function(Function::Map(
                map.put(key, value)?,
            ))))
        }),
        ns_desc(MAP_NAMESPACE, "remove", 2, |interp, _ctx, args| {
            let map = map_arg(args, 0)?;
            let mut result = map;
            for key in args[1].atomized(&interp.documents())? {
                result = result.remove(&key)?;
            }
            Ok(Sequence::One(Item::Function(Function::Map(result))))
        }),
        ns_desc(MAP_NAMESPACE, "entry", 2, |interp, _ctx, args| {
            let key = args[0].atomized_one(&interp.documents())?;
            let value = args[1].clone();
            Ok(Sequence::One(Item::Function(Function::Map(Map::new(
                vec![(key, value)],
            )?))))
        }),
        ns_desc(MAP_NAMESPACE, "merge", 1, |_interp, _ctx, args| {
            let maps = maps_arg(args)?;
            Ok(Sequence::One(Item::Function(Function::Map(Map::merge(
                &maps,
                MergeDuplicates::UseFirst,
            )?))))
        }),
        ns_desc(MAP_NAMESPACE, "merge", 2, |interp, _ctx, args| {
            let maps = maps_arg(args)?;
            let duplicates = duplicates_option(interp, args)?;
            Ok(Sequence::One(Item::Function(Function::Map(Map::merge(
                &maps, duplicates,
            )?))))
        }),
        ns_desc(MAP_NAMESPACE, "find", 2, |interp, _ctx, args| {
            let key = args[1].atomized_one(&interp.documents())?;
            let mut found = Vec::new();
            // walk the input recursively through maps and arrays
            let mut stack: Vec<Item> = args[0].to_vec();
            stack.reverse();
            while let Some(item) = stack.pop() {
                match &item {
                    Item::Function(Function::Map(map)) => {
                        if let Some(value) = map.get(&key)? {
                            found.push(value.clone());
                        }
                        for (_, value) in map.entries() {
                            let mut items = value.to_vec();
                            items.reverse();
                            stack.extend(items);
                        }
                    }
                    Item::Function(Function::Array(array)) => {
                        for member in array.iter() {
                            let mut items = member.to_vec();
                            items.reverse();
                            stack.extend(items);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Sequence::One(Item::Function(Function::Array(Array::new(
                found,
            )))))
        }),
        ns_desc(MAP_NAMESPACE, "for-each", 2, |interp, ctx, args| {
            let map = map_arg(args, 0)?;
            let function = args[1].exactly_one()?.to_function()?;
            let mut parts = Vec::new();
            for (key, value) in map.entries() {
                parts.push(interp.call_function(
                    &function,
                    &[Sequence::One(Item::Atomic(key.clone())), value.clone()],
                    ctx,
                )?);
            }
            Ok(Sequence::concat(parts))
        }),
    ]
}
