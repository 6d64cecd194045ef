use ibig::IBig;
use ordered_float::OrderedFloat;
use rust_decimal::prelude::ToPrimitive;
use xylem_name::Name;

use crate::error::{Error, Result};

use super::atomic_core::Atomic;

/// The hashable identity of an atomic used as a map key.
///
/// The "same key" relation of the map specification collapses the
/// numeric types: integers of any flavor collide, and non-integral
/// numerics collide by double value. NaN is its own key, equal to
/// itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    /// String-family keys (string subtypes, anyURI, untypedAtomic).
    String(String),
    /// Boolean keys.
    Boolean(bool),
    /// Integer-valued numeric keys.
    Integer(IBig),
    /// Other numeric keys, by double value.
    Double(OrderedFloat<f64>),
    /// The NaN key.
    NaN,
    /// Date/time/duration and Gregorian keys, by canonical form plus
    /// type class.
    Temporal(&'static str, String),
    /// QName keys.
    QName(Name),
    /// Binary keys.
    Binary(Vec<u8>),
}

impl MapKey {
    /// Compute the key for an atomic; functions cannot be keys.
    pub fn new(atomic: &Atomic) -> Result<MapKey> {
        Ok(match atomic {
            Atomic::Untyped(s) | Atomic::String(_, s) => MapKey::String(s.to_string()),
            Atomic::Boolean(b) => MapKey::Boolean(*b),
            Atomic::Integer(_, i) => MapKey::Integer(i.clone()),
            Atomic::Decimal(d) => {
                if d.fract().is_zero() {
                    MapKey::Integer(
                        IBig::from_str_radix(&d.trunc().normalize().to_string(), 10)
                            .map_err(|_| Error::FOCA0001)?,
                    )
                } else {
                    MapKey::Double(OrderedFloat(d.to_f64().ok_or(Error::FOCA0001)?))
                }
            }
            Atomic::Float(f) => float_key(*f as f64)?,
            Atomic::Double(d) => float_key(*d)?,
            Atomic::QName(name) => MapKey::QName((**name).clone()),
            Atomic::Duration(_, d) => MapKey::Temporal("duration", d.canonical()),
            Atomic::DateTime(dt, _) => MapKey::Temporal("dateTime", dt.canonical()),
            Atomic::Date(d) => MapKey::Temporal("date", d.canonical()),
            Atomic::Time(t) => MapKey::Temporal("time", t.canonical()),
            Atomic::Gregorian(_, g) => MapKey::Temporal("gregorian", g.canonical()),
            Atomic::Binary(_, bytes) => MapKey::Binary(bytes.as_ref().clone()),
        })
    }
}

fn float_key(value: f64) -> Result<MapKey> {
    if value.is_nan() {
        return Ok(MapKey::NaN);
    }
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e18 {
        return Ok(MapKey::Integer(IBig::from(value as i64)));
    }
    Ok(MapKey::Double(OrderedFloat(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_keys_collide_across_types() {
        let a = MapKey::new(&Atomic::integer(1)).unwrap();
        let b = MapKey::new(&Atomic::Double(1.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nan_equals_itself_as_key() {
        let a = MapKey::new(&Atomic::Double(f64::NAN)).unwrap();
        let b = MapKey::new(&Atomic::Float(f32::NAN)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn strings_and_untyped_collide() {
        let a = MapKey::new(&Atomic::string("x")).unwrap();
        let b = MapKey::new(&Atomic::untyped("x")).unwrap();
        assert_eq!(a, b);
    }
}
