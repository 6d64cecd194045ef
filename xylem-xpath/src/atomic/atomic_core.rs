use std::rc::Rc;

use ibig::IBig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use xylem_name::Name;
use xylem_schema_type::Xs;

use crate::error::{Error, Result};

use super::datetime::{
    Duration, Gregorian, NaiveDateTimeWithOffset, NaiveDateWithOffset, NaiveTimeWithOffset,
};
use super::types::{BinaryType, IntegerType, StringType};

/// An atomic value: a lexical-space value carrying its `xs:*` type.
#[derive(Debug, Clone, PartialEq)]
pub enum Atomic {
    /// `xs:untypedAtomic`: text that has not been through a cast.
    Untyped(Rc<str>),
    /// `xs:string` and its subtypes, plus `xs:anyURI`.
    String(StringType, Rc<str>),
    /// `xs:boolean`
    Boolean(bool),
    /// `xs:decimal`
    Decimal(Decimal),
    /// `xs:integer` and its subtypes.
    Integer(IntegerType, IBig),
    /// `xs:float`
    Float(f32),
    /// `xs:double`
    Double(f64),
    /// `xs:QName`
    QName(Rc<Name>),
    /// `xs:duration`; the subtype witnesses year-month or day-time.
    Duration(Xs, Duration),
    /// `xs:dateTime` (`true` witnesses `xs:dateTimeStamp`).
    DateTime(NaiveDateTimeWithOffset, bool),
    /// `xs:date`
    Date(NaiveDateWithOffset),
    /// `xs:time`
    Time(NaiveTimeWithOffset),
    /// The Gregorian partials; the `Xs` tag says which.
    Gregorian(Xs, Gregorian),
    /// `xs:hexBinary` / `xs:base64Binary`.
    Binary(BinaryType, Rc<Vec<u8>>),
}

impl Atomic {
    /// An untyped atomic from text.
    pub fn untyped(value: impl Into<Rc<str>>) -> Self {
        Atomic::Untyped(value.into())
    }

    /// A plain `xs:string`.
    pub fn string(value: impl Into<Rc<str>>) -> Self {
        Atomic::String(StringType::String, value.into())
    }

    /// A plain `xs:integer`.
    pub fn integer(value: impl Into<IBig>) -> Self {
        Atomic::Integer(IntegerType::Integer, value.into())
    }

    /// An `xs:anyURI`.
    pub fn any_uri(value: impl Into<Rc<str>>) -> Self {
        Atomic::String(StringType::AnyURI, value.into())
    }

    /// The schema type of this value.
    pub fn schema_type(&self) -> Xs {
        match self {
            Atomic::Untyped(_) => Xs::UntypedAtomic,
            Atomic::String(t, _) => t.schema_type(),
            Atomic::Boolean(_) => Xs::Boolean,
            Atomic::Decimal(_) => Xs::Decimal,
            Atomic::Integer(t, _) => t.schema_type(),
            Atomic::Float(_) => Xs::Float,
            Atomic::Double(_) => Xs::Double,
            Atomic::QName(_) => Xs::QName,
            Atomic::Duration(t, _) => *t,
            Atomic::DateTime(_, stamp) => {
                if *stamp {
                    Xs::DateTimeStamp
                } else {
                    Xs::DateTime
                }
            }
            Atomic::Date(_) => Xs::Date,
            Atomic::Time(_) => Xs::Time,
            Atomic::Gregorian(t, _) => *t,
            Atomic::Binary(t, _) => t.schema_type(),
        }
    }

    /// Whether this is one of the numeric types.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Atomic::Decimal(_) | Atomic::Integer(_, _) | Atomic::Float(_) | Atomic::Double(_)
        )
    }

    /// Whether this is an untyped atomic.
    pub fn is_untyped(&self) -> bool {
        matches!(self, Atomic::Untyped(_))
    }

    /// Whether this is a string-family value (string subtypes, anyURI,
    /// untypedAtomic).
    pub fn is_string_like(&self) -> bool {
        matches!(self, Atomic::Untyped(_) | Atomic::String(_, _))
    }

    /// NaN check across the float types.
    pub fn is_nan(&self) -> bool {
        match self {
            Atomic::Float(f) => f.is_nan(),
            Atomic::Double(d) => d.is_nan(),
            _ => false,
        }
    }

    /// The canonical string form of the value.
    pub fn string_value(&self) -> String {
        match self {
            Atomic::Untyped(s) | Atomic::String(_, s) => s.to_string(),
            Atomic::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Atomic::Decimal(d) => decimal_to_string(d),
            Atomic::Integer(_, i) => i.to_string(),
            Atomic::Float(f) => float_to_string(*f as f64, true),
            Atomic::Double(d) => float_to_string(*d, false),
            Atomic::QName(name) => name.qualified(),
            Atomic::Duration(t, d) => match t {
                Xs::YearMonthDuration => d.canonical_year_month(),
                Xs::DayTimeDuration => d.canonical_day_time(),
                _ => d.canonical(),
            },
            Atomic::DateTime(dt, _) => dt.canonical(),
            Atomic::Date(d) => d.canonical(),
            Atomic::Time(t) => t.canonical(),
            Atomic::Gregorian(_, g) => g.canonical(),
            Atomic::Binary(kind, bytes) => match kind {
                BinaryType::Hex => bytes
                    .iter()
                    .map(|b| format!("{b:02X}"))
                    .collect::<String>(),
                BinaryType::Base64 => base64_encode(bytes),
            },
        }
    }

    /// The [effective boolean value](https://www.w3.org/TR/xpath-31/#id-ebv)
    /// of a singleton atomic.
    pub fn effective_boolean_value(&self) -> Result<bool> {
        Ok(match self {
            Atomic::Boolean(b) => *b,
            Atomic::Untyped(s) | Atomic::String(_, s) => !s.is_empty(),
            Atomic::Decimal(d) => !d.is_zero(),
            Atomic::Integer(_, i) => *i != IBig::from(0u8),
            Atomic::Float(f) => !(f.is_nan() || *f == 0.0),
            Atomic::Double(d) => !(d.is_nan() || *d == 0.0),
            _ => return Err(Error::FORG0006),
        })
    }

    /// The value as a double, following the numeric promotion rules;
    /// untyped atomics parse as doubles.
    pub fn to_double(&self) -> Result<f64> {
        Ok(match self {
            Atomic::Double(d) => *d,
            Atomic::Float(f) => *f as f64,
            Atomic::Decimal(d) => d.to_f64().ok_or(Error::FOCA0001)?,
            Atomic::Integer(_, i) => ibig_to_f64(i),
            Atomic::Untyped(s) => parse_double_lexical(s)?,
            _ => return Err(Error::XPTY0004),
        })
    }

    /// The value as an integer; fails on fractional or non-numeric
    /// values.
    pub fn to_integer(&self) -> Result<IBig> {
        match self {
            Atomic::Integer(_, i) => Ok(i.clone()),
            _ => Err(Error::XPTY0004),
        }
    }
}

pub(crate) fn ibig_to_f64(value: &IBig) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(f64::NAN)
}

/// Parse the `xs:double` lexical space (INF, -INF, NaN, decimals,
/// scientific notation).
pub(crate) fn parse_double_lexical(s: &str) -> Result<f64> {
    let trimmed = s.trim();
    match trimmed {
        "INF" | "+INF" => return Ok(f64::INFINITY),
        "-INF" => return Ok(f64::NEG_INFINITY),
        "NaN" => return Ok(f64::NAN),
        _ => {}
    }
    // reject Rust-isms the XSD lexical space does not allow
    if trimmed.is_empty()
        || trimmed.contains(|c: char| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E'))
    {
        return Err(Error::FORG0001);
    }
    trimmed.parse::<f64>().map_err(|_| Error::FORG0001)
}

/// Render a double (or float) in the XPath canonical form.
pub(crate) fn float_to_string(value: f64, single: bool) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let abs = value.abs();
    let use_decimal = (1e-6..1e21).contains(&abs);
    if use_decimal {
        if single {
            format!("{}", value as f32)
        } else {
            format!("{}", value)
        }
    } else {
        // scientific form with a mantissa that always has a decimal
        // point
        let formatted = if single {
            format!("{:e}", value as f32)
        } else {
            format!("{:e}", value)
        };
        let (mantissa, exponent) = formatted.split_once('e').unwrap();
        let mantissa = if mantissa.contains('.') {
            mantissa.to_string()
        } else {
            format!("{mantissa}.0")
        };
        format!("{mantissa}E{exponent}")
    }
}

pub(crate) fn decimal_to_string(value: &Decimal) -> String {
    let normalized = value.normalize();
    normalized.to_string()
}

// standard alphabet, padded
pub(crate) fn base64_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;
        out.push(ALPHABET[(triple >> 18) as usize & 0x3F] as char);
        out.push(ALPHABET[(triple >> 12) as usize & 0x3F] as char);
        if chunk.len() > 1 {
            out.push(ALPHABET[(triple >> 6) as usize & 0x3F] as char);
        } else {
            out.push('=');
        }
        if chunk.len() > 2 {
            out.push(ALPHABET[triple as usize & 0x3F] as char);
        } else {
            out.push('=');
        }
    }
    out
}

pub(crate) fn base64_decode(s: &str) -> Result<Vec<u8>> {
    fn value_of(c: u8) -> Result<u32> {
        Ok(match c {
            b'A'..=b'Z' => (c - b'A') as u32,
            b'a'..=b'z' => (c - b'a' + 26) as u32,
            b'0'..=b'9' => (c - b'0' + 52) as u32,
            b'+' => 62,
            b'/' => 63,
            _ => return Err(Error::FORG0001),
        })
    }
    let cleaned: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if cleaned.len() % 4 != 0 {
        return Err(Error::FORG0001);
    }
    let mut out = Vec::with_capacity(cleaned.len() / 4 * 3);
    for chunk in cleaned.chunks(4) {
        let pad = chunk.iter().filter(|b| **b == b'=').count();
        if pad > 2 || (pad > 0 && (chunk[3] != b'=' || (pad == 2 && chunk[2] != b'='))) {
            return Err(Error::FORG0001);
        }
        let mut triple = 0u32;
        for (i, b) in chunk.iter().enumerate() {
            let v = if *b == b'=' { 0 } else { value_of(*b)? };
            triple |= v << (18 - 6 * i);
        }
        out.push((triple >> 16) as u8);
        if pad < 2 {
            out.push((triple >> 8) as u8);
        }
        if pad < 1 {
            out.push(triple as u8);
        }
    }
    Ok(out)
}

pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>> {
    let cleaned = s.trim();
    if cleaned.len() % 2 != 0 {
        return Err(Error::FORG0001);
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&cleaned[i..i + 2], 16).map_err(|_| Error::FORG0001))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_canonical_forms() {
        assert_eq!(float_to_string(1.0, false), "1");
        assert_eq!(float_to_string(-0.0, false), "-0");
        assert_eq!(float_to_string(0.5, false), "0.5");
        assert_eq!(float_to_string(1e21, false), "1.0E21");
        assert_eq!(float_to_string(1.5e-7, false), "1.5E-7");
        assert_eq!(float_to_string(f64::NAN, false), "NaN");
        assert_eq!(float_to_string(f64::INFINITY, false), "INF");
    }

    #[test]
    fn base64_round_trip() {
        let data = b"any carnal pleasure.";
        let encoded = base64_encode(data);
        assert_eq!(encoded, "YW55IGNhcm5hbCBwbGVhc3VyZS4=");
        assert_eq!(base64_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn hex_decoding() {
        assert_eq!(hex_decode("0aFF").unwrap(), vec![0x0A, 0xFF]);
        assert!(hex_decode("0a1").is_err());
    }

    #[test]
    fn untyped_ebv_and_numbers() {
        assert!(!Atomic::untyped("").effective_boolean_value().unwrap());
        assert!(Atomic::untyped("x").effective_boolean_value().unwrap());
        assert_eq!(Atomic::untyped(" 1.5 ").to_double().unwrap(), 1.5);
        assert!(Atomic::untyped("one").to_double().is_err());
    }
}
