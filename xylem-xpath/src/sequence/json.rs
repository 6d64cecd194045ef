//! JSON rendering of data-model values.
//!
//! The `json` output method serializes an instance of the data model
//! rather than a markup tree: maps become objects, arrays become
//! arrays, atomics become literals, and document or text nodes
//! contribute their string value. Everything else is SERE0023. The
//! `adaptive` method reuses the same rendering for its map and array
//! items.

use crate::atomic::Atomic;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::node::{Documents, NodeKind};
use crate::sequence::{Item, Sequence};

/// Serialize a sequence per the JSON output method rules.
pub fn serialize_json(sequence: &Sequence, documents: &Documents) -> Result<String> {
    match sequence.len() {
        0 => Ok("null".to_string()),
        1 => serialize_item(sequence.get(0).unwrap(), documents),
        _ => Err(Error::SERE0023),
    }
}

fn serialize_item(item: &Item, documents: &Documents) -> Result<String> {
    match item {
        Item::Atomic(atomic) => serialize_atomic(atomic),
        Item::Function(Function::Map(map)) => {
            let mut out = String::from("{");
            for (i, (key, value)) in map.entries().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&json_string(&key.string_value()));
                out.push(':');
                out.push_str(&serialize_json(value, documents)?);
            }
            out.push('}');
            Ok(out)
        }
        Item::Function(Function::Array(array)) => {
            let mut out = String::from("[");
            for (i, member) in array.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serialize_json(member, documents)?);
            }
            out.push(']');
            Ok(out)
        }
        Item::Function(_) => Err(Error::SERE0023),
        Item::Node(node) => match documents.kind(*node) {
            NodeKind::Document | NodeKind::Text(_) => {
                Ok(json_string(&documents.string_value(*node)))
            }
            _ => Err(Error::SERE0023),
        },
    }
}

fn serialize_atomic(atomic: &Atomic) -> Result<String> {
    match atomic {
        Atomic::Boolean(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Atomic::Integer(_, _) | Atomic::Decimal(_) => Ok(atomic.string_value()),
        Atomic::Float(_) | Atomic::Double(_) => {
            let value = atomic.to_double()?;
            if !value.is_finite() {
                // NaN and the infinities have no JSON representation
                return Err(Error::SERE0023);
            }
            Ok(atomic.string_value())
        }
        other => Ok(json_string(&other.string_value())),
    }
}

/// Quote and escape a string as a JSON string literal.
pub fn json_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Map;
    use crate::node::Documents;

    fn render(sequence: Sequence) -> Result<String> {
        serialize_json(&sequence, &Documents::new())
    }

    #[test]
    fn atomics_render_as_literals() {
        assert_eq!(render(Atomic::integer(7).into()).unwrap(), "7");
        assert_eq!(render(Atomic::Boolean(true).into()).unwrap(), "true");
        assert_eq!(render(Atomic::Double(0.5).into()).unwrap(), "0.5");
        assert_eq!(render(Atomic::string("a\"b").into()).unwrap(), r#""a\"b""#);
        assert_eq!(render(Sequence::empty()).unwrap(), "null");
    }

    #[test]
    fn maps_and_arrays_nest() {
        let inner = crate::function::Array::new(vec![
            Sequence::from(Atomic::integer(1)),
            Sequence::from(Atomic::integer(2)),
        ]);
        let map = Map::new(vec![(
            Atomic::string("xs"),
            Sequence::One(Item::Function(Function::Array(inner))),
        )])
        .unwrap();
        assert_eq!(
            render(Sequence::One(Item::Function(Function::Map(map)))).unwrap(),
            r#"{"xs":[1,2]}"#
        );
    }

    #[test]
    fn unrepresentable_values_are_rejected() {
        assert_eq!(
            render(Atomic::Double(f64::NAN).into()).unwrap_err(),
            Error::SERE0023
        );
        let two = Sequence::from_vec(vec![
            Item::Atomic(Atomic::integer(1)),
            Item::Atomic(Atomic::integer(2)),
        ]);
        assert_eq!(render(two).unwrap_err(), Error::SERE0023);
    }

    #[test]
    fn control_characters_escape() {
        assert_eq!(json_string("a\u{1}b"), "\"a\\u0001b\"");
        assert_eq!(json_string("line\nbreak"), r#""line\nbreak""#);
    }
}
