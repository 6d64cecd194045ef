// https://www.w3.org/TR/xpath-functions-31/#string-functions

use ibig::IBig;
use regex::Regex;

use crate::atomic::Atomic;
use crate::context::StaticFunctionDescription;
use crate::error::{Error, Result};
use crate::sequence::{Item, Sequence};

use super::helpers::*;

// concat accepts any arity from 2 up to this bound
const MAX_CONCAT_ARITY: usize = 16;

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    let mut descriptions = vec![
        fn_desc("starts-with", 2, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            let prefix = string_arg(interp, args, 1)?;
            Ok(s.starts_with(&prefix).into())
        }),
        fn_desc("ends-with", 2, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            let suffix = string_arg(interp, args, 1)?;
            Ok(s.ends_with(&suffix).into())
        }),
        fn_desc("contains", 2, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            let needle = string_arg(interp, args, 1)?;
            Ok(s.contains(&needle).into())
        }),
        fn_desc("substring-before", 2, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            let needle = string_arg(interp, args, 1)?;
            Ok(match s.find(&needle) {
                Some(pos) if !needle.is_empty() => s[..pos].to_string(),
                _ => String::new(),
            }
            .into())
        }),
        fn_desc("substring-after", 2, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            let needle = string_arg(interp, args, 1)?;
            Ok(match s.find(&needle) {
                Some(pos) => s[pos + needle.len()..].to_string(),
                None => String::new(),
            }
            .into())
        }),
        fn_desc("substring", 2, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            let start = double_arg(interp, args, 1)?;
            Ok(substring(&s, start, f64::INFINITY).into())
        }),
        fn_desc("substring", 3, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            let start = double_arg(interp, args, 1)?;
            let length = double_arg(interp, args, 2)?;
            Ok(substring(&s, start, length).into())
        }),
        fn_desc("string-length", 0, |interp, ctx, _args| {
            let item = ctx.item()?;
            let s = item.string_value(&interp.documents())?;
            Ok(Atomic::integer(s.chars().count() as i64).into())
        }),
        fn_desc("string-length", 1, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            Ok(Atomic::integer(s.chars().count() as i64).into())
        }),
        fn_desc("normalize-space", 0, |interp, ctx, _args| {
            let item = ctx.item()?;
            let s = item.string_value(&interp.documents())?;
            Ok(normalize_space(&s).into())
        }),
        fn_desc("normalize-space", 1, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            Ok(normalize_space(&s).into())
        }),
        fn_desc("translate", 3, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            let from: Vec<char> = string_arg(interp, args, 1)?.chars().collect();
            let to: Vec<char> = string_arg(interp, args, 2)?.chars().collect();
            let mut out = String::with_capacity(s.len());
            for c in s.chars() {
                match from.iter().position(|f| *f == c) {
                    None => out.push(c),
                    Some(i) => {
                        if let Some(replacement) = to.get(i) {
                            out.push(*replacement);
                        }
                        // dropped when the map string is shorter
                    }
                }
            }
            Ok(out.into())
        }),
        fn_desc("upper-case", 1, |interp, _ctx, args| {
            Ok(string_arg(interp, args, 0)?.to_uppercase().into())
        }),
        fn_desc("lower-case", 1, |interp, _ctx, args| {
            Ok(string_arg(interp, args, 0)?.to_lowercase().into())
        }),
        fn_desc("string-join", 1, |interp, _ctx, args| {
            let parts: Vec<String> = atomics_arg(interp, args, 0)?
                .iter()
                .map(|a| a.string_value())
                .collect();
            Ok(parts.concat().into())
        }),
        fn_desc("string-join", 2, |interp, _ctx, args| {
            let parts: Vec<String> = atomics_arg(interp, args, 0)?
                .iter()
                .map(|a| a.string_value())
                .collect();
            let separator = string_arg(interp, args, 1)?;
            Ok(parts.join(&separator).into())
        }),
        fn_desc("compare", 2, |interp, _ctx, args| {
            let a = opt_string_arg(interp, args, 0)?;
            let b = opt_string_arg(interp, args, 1)?;
            Ok(match (a, b) {
                (Some(a), Some(b)) => Atomic::integer(match a.cmp(&b) {
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                })
                .into(),
                _ => Sequence::empty(),
            })
        }),
        fn_desc("codepoints-to-string", 1, |interp, _ctx, args| {
            let mut out = String::new();
            for atomic in atomics_arg(interp, args, 0)? {
                let code = crate::interpreter::atomic_to_ibig(&atomic)?;
                let code: u32 = u32::try_from(&code).map_err(|_| Error::FOCH0001)?;
                let c = char::from_u32(code).ok_or(Error::FOCH0001)?;
                if !is_xml_char(c) {
                    return Err(Error::FOCH0001);
                }
                out.push(c);
            }
            Ok(out.into())
        }),
        fn_desc("string-to-codepoints", 1, |interp, _ctx, args| {
            match opt_string_arg(interp, args, 0)? {
                None => Ok(Sequence::empty()),
                Some(s) => Ok(Sequence::from_vec(
                    s.chars()
                        .map(|c| Item::Atomic(Atomic::integer(IBig::from(c as u32))))
                        .collect(),
                )),
            }
        }),
        fn_desc("matches", 2, |interp, _ctx, args| {
            matches_impl(interp, args, "")
        }),
        fn_desc("matches", 3, |interp, _ctx, args| {
            let flags = string_arg(interp, args, 2)?;
            matches_impl(interp, args, &flags)
        }),
        fn_desc("replace", 3, |interp, _ctx, args| {
            replace_impl(interp, args, "")
        }),
        fn_desc("replace", 4, |interp, _ctx, args| {
            let flags = string_arg(interp, args, 3)?;
            replace_impl(interp, args, &flags)
        }),
        fn_desc("tokenize", 1, |interp, _ctx, args| {
            let s = string_arg(interp, args, 0)?;
            Ok(Sequence::from_vec(
                normalize_space(&s)
                    .split(' ')
                    .filter(|t| !t.is_empty())
                    .map(|t| Item::Atomic(Atomic::string(t)))
                    .collect(),
            ))
        }),
        fn_desc("tokenize", 2, |interp, _ctx, args| {
            tokenize_impl(interp, args, "")
        }),
        fn_desc("tokenize", 3, |interp, _ctx, args| {
            let flags = string_arg(interp, args, 2)?;
            tokenize_impl(interp, args, &flags)
        }),
    ];
    for arity in 2..=MAX_CONCAT_ARITY {
        descriptions.push(fn_desc("concat", arity, |interp, _ctx, args| {
            let mut out = String::new();
            for i in 0..args.len() {
                out.push_str(&string_arg(interp, args, i)?);
            }
            Ok(out.into())
        }));
    }
    descriptions
}

fn normalize_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// XPath substring uses 1-based positions with IEEE rounding semantics
fn substring(s: &str, start: f64, length: f64) -> String {
    if start.is_nan() || length.is_nan() {
        return String::new();
    }
    let chars: Vec<char> = s.chars().collect();
    let start_rounded = round_half_up(start);
    let end = if length.is_infinite() && length > 0.0 {
        f64::INFINITY
    } else {
        start_rounded + round_half_up(length)
    };
    chars
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let position = (*i + 1) as f64;
            position >= start_rounded && position < end
        })
        .map(|(_, c)| *c)
        .collect()
}

fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

fn is_xml_char(c: char) -> bool {
    // Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
    matches!(c, '\t' | '\n' | '\r')
        || ('\u{20}'..='\u{D7FF}').contains(&c)
        || ('\u{E000}'..='\u{FFFD}').contains(&c)
        || ('\u{10000}'..='\u{10FFFF}').contains(&c)
}

/// Compile an XPath regular expression with XPath flags.
pub(crate) fn compile_regex(pattern: &str, flags: &str) -> Result<Regex> {
    let mut prefix = String::new();
    let mut literal = false;
    for flag in flags.chars() {
        match flag {
            'i' => prefix.push_str("(?i)"),
            's' => prefix.push_str("(?s)"),
            'm' => prefix.push_str("(?m)"),
            'x' => prefix.push_str("(?x)"),
            'q' => literal = true,
            _ => return Err(Error::FORX0002),
        }
    }
    let body = if literal {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };
    Regex::new(&format!("{prefix}{body}")).map_err(|_| Error::FORX0002)
}

fn matches_impl(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    flags: &str,
) -> Result<Sequence> {
    let s = string_arg(interp, args, 0)?;
    let pattern = string_arg(interp, args, 1)?;
    let regex = compile_regex(&pattern, flags)?;
    Ok(regex.is_match(&s).into())
}

// convert the XPath replacement syntax ($1, \$, \\) to the regex
// crate's (${1}, $$, \)
fn convert_replacement(replacement: &str) -> Result<String> {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('$') => out.push_str("$$"),
                Some('\\') => out.push('\\'),
                _ => return Err(Error::FORX0004),
            },
            '$' => match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek() {
                        if d.is_ascii_digit() {
                            digits.push(*d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    out.push_str(&format!("${{{digits}}}"));
                }
                _ => return Err(Error::FORX0004),
            },
            c => out.push(c),
        }
    }
    Ok(out)
}

fn replace_impl(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    flags: &str,
) -> Result<Sequence> {
    let s = string_arg(interp, args, 0)?;
    let pattern = string_arg(interp, args, 1)?;
    let replacement = string_arg(interp, args, 2)?;
    let regex = compile_regex(&pattern, flags)?;
    if regex.is_match("") {
        return Err(Error::FORX0003);
    }
    let replacement = convert_replacement(&replacement)?;
    Ok(regex.replace_all(&s, replacement.as_str()).into_owned().into())
}

fn tokenize_impl(
    interp: &crate::interpreter::Interpreter,
    args: &[Sequence],
    flags: &str,
) -> Result<Sequence> {
    let s = string_arg(interp, args, 0)?;
    let pattern = string_arg(interp, args, 1)?;
    let regex = compile_regex(&pattern, flags)?;
    if regex.is_match("") {
        return Err(Error::FORX0003);
    }
    if s.is_empty() {
        return Ok(Sequence::empty());
    }
    Ok(Sequence::from_vec(
        regex
            .split(&s)
            .map(|t| Item::Atomic(Atomic::string(t)))
            .collect(),
    ))
}
