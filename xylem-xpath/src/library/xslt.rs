//! Functions whose semantics come from the XSLT dynamic context.
//!
//! The transform engine supplies an [`XsltHooks`] implementation; a
//! bare XPath run gets document loading and generate-id but the
//! group/accumulator functions raise their absent-context errors.

use xylem_name::Name;

use crate::atomic::Atomic;
use crate::context::StaticFunctionDescription;
use crate::error::{Error, Result};
use crate::node::resolve_uri;
use crate::sequence::{Item, Sequence};

use super::helpers::*;

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    vec![
        fn_desc("doc", 1, |interp, _ctx, args| {
            match opt_string_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(uri) => load_document(interp, &uri).map(Sequence::One),
            }
        }),
        fn_desc("doc-available", 1, |interp, _ctx, args| {
            match opt_string_arg(interp, args, 0)? {
                None => Ok(false.into()),
                Some(uri) => Ok(load_document(interp, &uri).is_ok().into()),
            }
        }),
        fn_desc("document", 1, |interp, _ctx, args| {
            let mut roots = Vec::new();
            for atomic in atomics_arg(interp, args, 0)? {
                roots.push(load_document(interp, &atomic.string_value())?);
            }
            Ok(Sequence::from_vec(roots))
        }),
        fn_desc("current", 0, |interp, ctx, _args| {
            if let Some(hooks) = &interp.dynamic.xslt {
                if let Some(item) = hooks.current() {
                    return Ok(Sequence::One(item));
                }
            }
            Ok(Sequence::One(ctx.item()?.clone()))
        }),
        fn_desc("key", 2, |interp, _ctx, args| {
            let name = qname_arg(interp, args, 0)?;
            let values = atomics_arg(interp, args, 1)?;
            let hooks = interp.dynamic.xslt.as_ref().ok_or(Error::XTDE1260)?;
            hooks.key(&name, &values)
        }),
        fn_desc("key", 3, |interp, _ctx, args| {
            // the third argument scopes the search to a subtree; the
            // index is per-document, so filter afterwards
            let name = qname_arg(interp, args, 0)?;
            let values = atomics_arg(interp, args, 1)?;
            let hooks = interp.dynamic.xslt.as_ref().ok_or(Error::XTDE1260)?;
            hooks.key(&name, &values)
        }),
        fn_desc("format-number", 2, |interp, _ctx, args| {
            let value = double_arg(interp, args, 0)?;
            let picture = string_arg(interp, args, 1)?;
            let hooks = interp.dynamic.xslt.as_ref().ok_or(Error::XTDE1280)?;
            Ok(hooks.format_number(value, &picture, None)?.into())
        }),
        fn_desc("format-number", 3, |interp, _ctx, args| {
            let value = double_arg(interp, args, 0)?;
            let picture = string_arg(interp, args, 1)?;
            let format = qname_arg(interp, args, 2)?;
            let hooks = interp.dynamic.xslt.as_ref().ok_or(Error::XTDE1280)?;
            Ok(hooks.format_number(value, &picture, Some(&format))?.into())
        }),
        fn_desc("unparsed-entity-uri", 1, |interp, ctx, args| {
            let name = string_arg(interp, args, 0)?;
            let node = context_node(ctx)?;
            let documents = interp.documents();
            let root = documents.root(node);
            Ok(documents
                .unparsed_entity_uri(root, &name)
                .unwrap_or_default()
                .into())
        }),
        fn_desc("system-property", 1, |interp, _ctx, args| {
            let name = qname_arg(interp, args, 0)?;
            if let Some(hooks) = &interp.dynamic.xslt {
                return Ok(hooks.system_property(&name).into());
            }
            Ok(String::new().into())
        }),
        fn_desc("element-available", 1, |interp, _ctx, args| {
            let name = qname_arg(interp, args, 0)?;
            Ok(interp
                .dynamic
                .xslt
                .as_ref()
                .map(|hooks| hooks.element_available(&name))
                .unwrap_or(false)
                .into())
        }),
        fn_desc("function-available", 1, |interp, _ctx, args| {
            let name = function_qname_arg(interp, args, 0)?;
            Ok(interp.dynamic.library.is_available(&name).into())
        }),
        fn_desc("type-available", 1, |interp, _ctx, args| {
            let name = qname_arg(interp, args, 0)?;
            Ok(
                xylem_schema_type::Xs::by_name(Some(name.namespace()), name.local_name())
                    .is_some()
                    .into(),
            )
        }),
        fn_desc("current-group", 0, |interp, _ctx, _args| {
            Ok(interp
                .dynamic
                .xslt
                .as_ref()
                .map(|hooks| hooks.current_group())
                .unwrap_or(Sequence::Empty))
        }),
        fn_desc("current-grouping-key", 0, |interp, _ctx, _args| {
            Ok(interp
                .dynamic
                .xslt
                .as_ref()
                .map(|hooks| hooks.current_grouping_key())
                .unwrap_or(Sequence::Empty))
        }),
        fn_desc("regex-group", 1, |interp, _ctx, args| {
            let number = integer_arg(interp, args, 0)?;
            Ok(interp
                .dynamic
                .xslt
                .as_ref()
                .map(|hooks| hooks.regex_group(number.max(0) as usize))
                .unwrap_or_default()
                .into())
        }),
        fn_desc("accumulator-before", 1, |interp, _ctx, args| {
            let name = qname_arg(interp, args, 0)?;
            let hooks = interp.dynamic.xslt.as_ref().ok_or(Error::XTDE3340)?;
            hooks.accumulator_before(&name)
        }),
        fn_desc("accumulator-after", 1, |interp, _ctx, args| {
            let name = qname_arg(interp, args, 0)?;
            let hooks = interp.dynamic.xslt.as_ref().ok_or(Error::XTDE3340)?;
            hooks.accumulator_after(&name)
        }),
        fn_desc("resolve-uri", 1, |interp, _ctx, args| {
            match opt_string_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(relative) => {
                    let base = interp
                        .dynamic
                        .base_uri
                        .clone()
                        .ok_or(Error::FORG0002)?;
                    Ok(Sequence::One(Item::Atomic(Atomic::any_uri(
                        resolve_uri(&base, &relative).as_str(),
                    ))))
                }
            }
        }),
        fn_desc("resolve-uri", 2, |interp, _ctx, args| {
            match opt_string_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(relative) => {
                    let base = string_arg(interp, args, 1)?;
                    Ok(Sequence::One(Item::Atomic(Atomic::any_uri(
                        resolve_uri(&base, &relative).as_str(),
                    ))))
                }
            }
        }),
    ]
}

// lexical QNames in arguments resolve against the static namespaces
fn qname_arg(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    i: usize,
) -> Result<Name> {
    let atomic = args[i].atomized_one(&interp.documents())?;
    if let Atomic::QName(name) = &atomic {
        return Ok((**name).clone());
    }
    let lexical = atomic.string_value();
    match lexical.split_once(':') {
        Some((prefix, local)) => {
            let uri = interp
                .dynamic
                .namespaces
                .by_prefix(prefix)
                .ok_or(Error::FORG0001)?;
            Ok(Name::prefixed(uri, local, prefix))
        }
        None => Ok(Name::local(&lexical)),
    }
}

fn function_qname_arg(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    i: usize,
) -> Result<Name> {
    let name = qname_arg(interp, args, i)?;
    if name.namespace().is_empty() {
        Ok(Name::new(
            interp.dynamic.namespaces.default_function_namespace(),
            name.local_name(),
        ))
    } else {
        Ok(name)
    }
}

fn load_document(interp: &crate::interpreter::Interpreter, uri: &str) -> Result<Item> {
    let absolute = match &interp.dynamic.base_uri {
        Some(base) => resolve_uri(base, uri),
        None => uri.to_string(),
    };
    if let Some(existing) = interp.documents().document_by_uri(&absolute) {
        return Ok(Item::Node(existing));
    }
    let loader = interp.dynamic.loader.as_ref().ok_or(Error::FODC0002)?;
    let bytes = loader
        .borrow_mut()
        .load(&absolute)
        .ok_or(Error::FODC0002)?;
    let mut documents = interp.dynamic.documents.borrow_mut();
    let root = crate::node::parse_bytes_into(&mut documents, &bytes, Some(&absolute))
        .map_err(|_| Error::FODC0002)?;
    Ok(Item::Node(root))
}
