// https://www.w3.org/TR/xpath-functions-31/#accessors

use xylem_name::{Name, XML_NAMESPACE};

use crate::atomic::Atomic;
use crate::context::StaticFunctionDescription;
use crate::error::Result;
use crate::node::NodeKind;
use crate::sequence::{Item, Sequence};

use super::helpers::*;

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    vec![
        fn_desc("string", 0, |interp, ctx, _args| {
            let item = ctx.item()?;
            Ok(item.string_value(&interp.documents())?.into())
        }),
        fn_desc("string", 1, |interp, _ctx, args| {
            match args[0].zero_or_one()? {
                None => Ok(String::new().into()),
                Some(item) => Ok(item.string_value(&interp.documents())?.into()),
            }
        }),
        fn_desc("data", 0, |interp, ctx, _args| {
            let item = ctx.item()?.clone();
            Ok(atomics_to_sequence(item.atomized(&interp.documents())?))
        }),
        fn_desc("data", 1, |interp, _ctx, args| {
            Ok(atomics_to_sequence(args[0].atomized(&interp.documents())?))
        }),
        fn_desc("name", 0, |interp, ctx, _args| {
            let node = context_node(ctx)?;
            Ok(node_name(interp, Some(node)).map(|n| n.qualified()).unwrap_or_default().into())
        }),
        fn_desc("name", 1, |interp, _ctx, args| {
            let node = match args[0].zero_or_one()? {
                None => return Ok(String::new().into()),
                Some(item) => item.to_node()?,
            };
            Ok(node_name(interp, Some(node)).map(|n| n.qualified()).unwrap_or_default().into())
        }),
        fn_desc("local-name", 0, |interp, ctx, _args| {
            let node = context_node(ctx)?;
            Ok(node_name(interp, Some(node))
                .map(|n| n.local_name().to_string())
                .unwrap_or_default()
                .into())
        }),
        fn_desc("local-name", 1, |interp, _ctx, args| {
            let node = match args[0].zero_or_one()? {
                None => return Ok(String::new().into()),
                Some(item) => item.to_node()?,
            };
            Ok(node_name(interp, Some(node))
                .map(|n| n.local_name().to_string())
                .unwrap_or_default()
                .into())
        }),
        fn_desc("namespace-uri", 0, |interp, ctx, _args| {
            let node = context_node(ctx)?;
            Ok(Sequence::One(Item::Atomic(Atomic::any_uri(
                node_name(interp, Some(node))
                    .map(|n| n.namespace().to_string())
                    .unwrap_or_default()
                    .as_str(),
            ))))
        }),
        fn_desc("namespace-uri", 1, |interp, _ctx, args| {
            let node = match args[0].zero_or_one()? {
                None => return Ok(Sequence::One(Item::Atomic(Atomic::any_uri("")))),
                Some(item) => item.to_node()?,
            };
            Ok(Sequence::One(Item::Atomic(Atomic::any_uri(
                node_name(interp, Some(node))
                    .map(|n| n.namespace().to_string())
                    .unwrap_or_default()
                    .as_str(),
            ))))
        }),
        fn_desc("root", 0, |interp, ctx, _args| {
            let node = context_node(ctx)?;
            Ok(Sequence::One(Item::Node(interp.documents().root(node))))
        }),
        fn_desc("root", 1, |interp, _ctx, args| {
            match args[0].zero_or_one()? {
                None => Ok(Sequence::empty()),
                Some(item) => {
                    let node = item.to_node()?;
                    Ok(Sequence::One(Item::Node(interp.documents().root(node))))
                }
            }
        }),
        fn_desc("base-uri", 0, |interp, ctx, _args| {
            let node = context_node(ctx)?;
            Ok(uri_sequence(interp.documents().base_uri(node)))
        }),
        fn_desc("base-uri", 1, |interp, _ctx, args| {
            match args[0].zero_or_one()? {
                None => Ok(Sequence::empty()),
                Some(item) => {
                    let node = item.to_node()?;
                    Ok(uri_sequence(interp.documents().base_uri(node)))
                }
            }
        }),
        fn_desc("document-uri", 0, |interp, ctx, _args| {
            let node = context_node(ctx)?;
            Ok(uri_sequence(interp.documents().document_uri(node)))
        }),
        fn_desc("document-uri", 1, |interp, _ctx, args| {
            match args[0].zero_or_one()? {
                None => Ok(Sequence::empty()),
                Some(item) => {
                    let node = item.to_node()?;
                    Ok(uri_sequence(interp.documents().document_uri(node)))
                }
            }
        }),
        fn_desc("nilled", 1, |_interp, _ctx, args| {
            // without schema validation no element is ever nilled
            match args[0].zero_or_one()? {
                None => Ok(Sequence::empty()),
                Some(item) => {
                    item.to_node()?;
                    Ok(false.into())
                }
            }
        }),
        fn_desc("lang", 1, |interp, ctx, args| {
            let node = context_node(ctx)?;
            lang_test(interp, args, node)
        }),
        fn_desc("lang", 2, |interp, _ctx, args| {
            let node = args[1].exactly_one()?.to_node()?;
            lang_test(interp, args, node)
        }),
        fn_desc("generate-id", 0, |interp, ctx, _args| {
            let node = context_node(ctx)?;
            Ok(interp.documents().generate_id(node).into())
        }),
        fn_desc("generate-id", 1, |interp, _ctx, args| {
            match args[0].zero_or_one()? {
                None => Ok(String::new().into()),
                Some(item) => Ok(interp.documents().generate_id(item.to_node()?).into()),
            }
        }),
    ]
}

fn node_name(
    interp: &crate::interpreter::Interpreter,
    node: Option<crate::node::NodeId>,
) -> Option<Name> {
    let node = node?;
    let documents = interp.documents();
    match documents.kind(node) {
        NodeKind::Element { .. } | NodeKind::Attribute { .. } | NodeKind::Pi { .. } => {
            documents.name(node)
        }
        _ => None,
    }
}

fn uri_sequence(uri: Option<String>) -> Sequence {
    match uri {
        None => Sequence::empty(),
        Some(uri) => Sequence::One(Item::Atomic(Atomic::any_uri(uri.as_str()))),
    }
}

fn lang_test(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    node: crate::node::NodeId,
) -> Result<Sequence> {
    let wanted = opt_string_arg(interp, args, 0)?.unwrap_or_default();
    let documents = interp.documents();
    let xml_lang = Name::new(XML_NAMESPACE, "lang");
    let mut chain = vec![node];
    chain.extend(documents.ancestors(node));
    for current in chain {
        if let Some(value) = documents.attribute_value(current, &xml_lang) {
            let value = value.to_ascii_lowercase();
            let wanted = wanted.to_ascii_lowercase();
            return Ok((value == wanted
                || (value.starts_with(&wanted)
                    && value.as_bytes().get(wanted.len()) == Some(&b'-')))
            .into());
        }
    }
    Ok(false.into())
}
