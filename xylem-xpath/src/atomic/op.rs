//! Arithmetic on atomic values.
//!
//! The numeric tower promotes integer → decimal → float → double;
//! untyped operands are cast to double first. Date/time and duration
//! arithmetic follows the operator table of XPath §4 (addition of
//! durations to dates, subtraction of dates producing durations,
//! scaling of durations by numbers).

use std::str::FromStr;

use chrono::Duration as TimeDelta;
use ibig::IBig;
use rust_decimal::Decimal;
use xylem_schema_type::Xs;

use crate::error::{Error, Result};

use super::atomic_core::Atomic;
use super::datetime::{add_duration_to_date_time, Duration};
use super::types::IntegerType;

/// The arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `div`
    Div,
    /// `idiv`
    IDiv,
    /// `mod`
    Mod,
}

// the promoted numeric representation both operands are brought to
enum NumericPair {
    Integer(IBig, IBig),
    Decimal(Decimal, Decimal),
    Float(f32, f32),
    Double(f64, f64),
}

fn promote(a: &Atomic, b: &Atomic) -> Result<NumericPair> {
    use Atomic::*;
    // untyped operands become doubles
    let a = if a.is_untyped() {
        Double(a.to_double()?)
    } else {
        a.clone()
    };
    let b = if b.is_untyped() {
        Double(b.to_double()?)
    } else {
        b.clone()
    };
    Ok(match (&a, &b) {
        (Double(_), _) | (_, Double(_)) => NumericPair::Double(a.to_double()?, b.to_double()?),
        (Float(_), _) | (_, Float(_)) => {
            NumericPair::Float(a.to_double()? as f32, b.to_double()? as f32)
        }
        (Decimal(_), _) | (_, Decimal(_)) => {
            NumericPair::Decimal(to_decimal(&a)?, to_decimal(&b)?)
        }
        (Integer(_, x), Integer(_, y)) => NumericPair::Integer(x.clone(), y.clone()),
        _ => return Err(Error::XPTY0004),
    })
}

fn to_decimal(a: &Atomic) -> Result<Decimal> {
    match a {
        Atomic::Decimal(d) => Ok(*d),
        Atomic::Integer(_, i) => {
            Decimal::from_str(&i.to_string()).map_err(|_| Error::FOCA0001)
        }
        _ => Err(Error::XPTY0004),
    }
}

/// Apply an arithmetic operator to two atomics.
pub fn arithmetic(op: ArithOp, a: &Atomic, b: &Atomic) -> Result<Atomic> {
    // non-numeric operator table first
    if let Some(result) = date_time_arithmetic(op, a, b)? {
        return Ok(result);
    }
    let pair = promote(a, b)?;
    Ok(match pair {
        NumericPair::Integer(x, y) => match op {
            ArithOp::Add => Atomic::integer(x + y),
            ArithOp::Sub => Atomic::integer(x - y),
            ArithOp::Mul => Atomic::integer(x * y),
            ArithOp::Div => {
                // integer div yields a decimal
                let dx = Decimal::from_str(&x.to_string()).map_err(|_| Error::FOCA0001)?;
                let dy = Decimal::from_str(&y.to_string()).map_err(|_| Error::FOCA0001)?;
                if dy.is_zero() {
                    return Err(Error::FOAR0001);
                }
                Atomic::Decimal(dx.checked_div(dy).ok_or(Error::FOAR0002)?)
            }
            ArithOp::IDiv => {
                if y == IBig::from(0u8) {
                    return Err(Error::FOAR0001);
                }
                // ibig division truncates toward zero, which is what
                // idiv wants
                Atomic::integer(&x / &y)
            }
            ArithOp::Mod => {
                if y == IBig::from(0u8) {
                    return Err(Error::FOAR0001);
                }
                let quotient = &x / &y;
                Atomic::integer(&x - &quotient * &y)
            }
        },
        NumericPair::Decimal(x, y) => match op {
            ArithOp::Add => Atomic::Decimal(x.checked_add(y).ok_or(Error::FOAR0002)?),
            ArithOp::Sub => Atomic::Decimal(x.checked_sub(y).ok_or(Error::FOAR0002)?),
            ArithOp::Mul => Atomic::Decimal(x.checked_mul(y).ok_or(Error::FOAR0002)?),
            ArithOp::Div => {
                if y.is_zero() {
                    return Err(Error::FOAR0001);
                }
                Atomic::Decimal(x.checked_div(y).ok_or(Error::FOAR0002)?)
            }
            ArithOp::IDiv => {
                if y.is_zero() {
                    return Err(Error::FOAR0001);
                }
                let quotient = x.checked_div(y).ok_or(Error::FOAR0002)?.trunc();
                let i = IBig::from_str(&quotient.normalize().to_string())
                    .map_err(|_| Error::FOCA0003)?;
                Atomic::integer(i)
            }
            ArithOp::Mod => {
                if y.is_zero() {
                    return Err(Error::FOAR0001);
                }
                Atomic::Decimal(x.checked_rem(y).ok_or(Error::FOAR0002)?)
            }
        },
        NumericPair::Float(x, y) => Atomic::Float(double_arith(op, x as f64, y as f64)? as f32),
        NumericPair::Double(x, y) => Atomic::Double(double_arith(op, x, y)?),
    })
}

fn double_arith(op: ArithOp, x: f64, y: f64) -> Result<f64> {
    Ok(match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::IDiv => {
            if y == 0.0 {
                return Err(Error::FOAR0001);
            }
            if x.is_nan() || y.is_nan() || x.is_infinite() {
                return Err(Error::FOAR0002);
            }
            (x / y).trunc()
        }
        ArithOp::Mod => {
            // IEEE remainder with the sign of the dividend
            x % y
        }
    })
}

// the date/time/duration operator table; Ok(None) means "not that
// kind of operation, fall through to numerics"
fn date_time_arithmetic(op: ArithOp, a: &Atomic, b: &Atomic) -> Result<Option<Atomic>> {
    use Atomic::*;
    let result = match (op, a, b) {
        // duration + duration
        (ArithOp::Add, Duration(ta, x), Duration(tb, y)) if ta == tb && *ta != Xs::Duration => {
            Some(Duration(*ta, x.checked_add(y)?))
        }
        (ArithOp::Sub, Duration(ta, x), Duration(tb, y)) if ta == tb && *ta != Xs::Duration => {
            Some(Duration(*ta, x.checked_add(&y.negate()?)?))
        }
        // dateTime/date/time ± duration
        (ArithOp::Add, DateTime(dt, stamp), Duration(_, d)) => {
            Some(DateTime(add_duration_to_date_time(dt, d)?, *stamp))
        }
        (ArithOp::Add, Duration(_, d), DateTime(dt, stamp)) => {
            Some(DateTime(add_duration_to_date_time(dt, d)?, *stamp))
        }
        (ArithOp::Sub, DateTime(dt, stamp), Duration(_, d)) => {
            Some(DateTime(add_duration_to_date_time(dt, &d.negate()?)?, *stamp))
        }
        (ArithOp::Add, Date(date), Duration(_, d)) => {
            let dt = add_duration_to_date_time(&date.at_midnight(), d)?;
            Some(Date(super::datetime::NaiveDateWithOffset {
                date: dt.date_time.date(),
                offset: date.offset,
            }))
        }
        (ArithOp::Sub, Date(date), Duration(_, d)) => {
            let dt = add_duration_to_date_time(&date.at_midnight(), &d.negate()?)?;
            Some(Date(super::datetime::NaiveDateWithOffset {
                date: dt.date_time.date(),
                offset: date.offset,
            }))
        }
        (ArithOp::Add, Time(t), Duration(_, d)) | (ArithOp::Add, Duration(_, d), Time(t)) => {
            let millis = d.delta.num_milliseconds().rem_euclid(86_400_000);
            let time = t.time + TimeDelta::try_milliseconds(millis).unwrap();
            Some(Time(super::datetime::NaiveTimeWithOffset {
                time,
                offset: t.offset,
            }))
        }
        (ArithOp::Sub, Time(t), Duration(_, d)) => {
            let millis = d.delta.num_milliseconds().rem_euclid(86_400_000);
            let time = t.time - TimeDelta::try_milliseconds(millis).unwrap();
            Some(Time(super::datetime::NaiveTimeWithOffset {
                time,
                offset: t.offset,
            }))
        }
        // dateTime - dateTime, date - date, time - time
        (ArithOp::Sub, DateTime(x, _), DateTime(y, _)) => {
            let delta = x.to_instant() - y.to_instant();
            Some(Duration(Xs::DayTimeDuration, super::datetime::Duration::from_delta(delta)))
        }
        (ArithOp::Sub, Date(x), Date(y)) => {
            let delta = x.at_midnight().to_instant() - y.at_midnight().to_instant();
            Some(Duration(Xs::DayTimeDuration, super::datetime::Duration::from_delta(delta)))
        }
        (ArithOp::Sub, Time(x), Time(y)) => {
            let delta = x.time - y.time;
            Some(Duration(Xs::DayTimeDuration, super::datetime::Duration::from_delta(delta)))
        }
        // duration × number, duration div number, duration div duration
        (ArithOp::Mul, Duration(t, d), other) if other.is_numeric() || other.is_untyped() => {
            Some(scale_duration(*t, d, other.to_double()?)?)
        }
        (ArithOp::Mul, other, Duration(t, d)) if other.is_numeric() || other.is_untyped() => {
            Some(scale_duration(*t, d, other.to_double()?)?)
        }
        (ArithOp::Div, Duration(t, d), other) if other.is_numeric() || other.is_untyped() => {
            let factor = other.to_double()?;
            if factor == 0.0 {
                return Err(Error::FODT0002);
            }
            Some(scale_duration(*t, d, 1.0 / factor)?)
        }
        (ArithOp::Div, Duration(ta, x), Duration(tb, y)) if ta == tb => match ta {
            Xs::YearMonthDuration => {
                if y.months == 0 {
                    return Err(Error::FOAR0001);
                }
                Some(Double(x.months as f64 / y.months as f64))
            }
            Xs::DayTimeDuration => {
                let denominator = y.total_seconds();
                if denominator == 0.0 {
                    return Err(Error::FOAR0001);
                }
                Some(Double(x.total_seconds() / denominator))
            }
            _ => None,
        },
        _ => None,
    };
    Ok(result)
}

fn scale_duration(t: Xs, d: &Duration, factor: f64) -> Result<Atomic> {
    if factor.is_nan() {
        return Err(Error::FOCA0002);
    }
    if factor.is_infinite() {
        return Err(Error::FODT0002);
    }
    match t {
        Xs::YearMonthDuration => {
            let months = (d.months as f64 * factor).round();
            Ok(Atomic::Duration(
                t,
                Duration::from_months(months as i64),
            ))
        }
        _ => {
            let millis = (d.delta.num_milliseconds() as f64 * factor).round();
            let delta = TimeDelta::try_milliseconds(millis as i64).ok_or(Error::FODT0002)?;
            Ok(Atomic::Duration(Xs::DayTimeDuration, Duration::from_delta(delta)))
        }
    }
}

/// Unary minus.
pub fn negate(a: &Atomic) -> Result<Atomic> {
    Ok(match a {
        Atomic::Integer(_, i) => Atomic::integer(-i.clone()),
        Atomic::Decimal(d) => Atomic::Decimal(-*d),
        Atomic::Float(f) => Atomic::Float(-f),
        Atomic::Double(d) => Atomic::Double(-d),
        Atomic::Untyped(_) => Atomic::Double(-a.to_double()?),
        Atomic::Duration(t, d) => Atomic::Duration(*t, d.negate()?),
        _ => return Err(Error::XPTY0004),
    })
}

/// Rounding used by `fn:round`: half away from zero.
pub fn round_atomic(a: &Atomic, precision: i32) -> Result<Atomic> {
    Ok(match a {
        Atomic::Integer(t, i) if precision >= 0 => Atomic::Integer(*t, i.clone()),
        Atomic::Integer(_, i) => {
            let factor = IBig::from(10u8).pow((-precision) as usize);
            let half = &factor / IBig::from(2u8);
            let negative = i < &IBig::from(0u8);
            let abs = if negative { -i.clone() } else { i.clone() };
            let rounded = (&abs + &half) / &factor * &factor;
            Atomic::integer(if negative { -rounded } else { rounded })
        }
        Atomic::Decimal(d) => {
            if precision >= 0 {
                Atomic::Decimal(
                    d.round_dp_with_strategy(
                        precision as u32,
                        rust_decimal::RoundingStrategy::MidpointAwayFromZero,
                    ),
                )
            } else {
                let factor = Decimal::from(10i64.pow((-precision) as u32));
                let scaled = d.checked_div(factor).ok_or(Error::FOAR0002)?;
                let rounded = scaled
                    .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
                Atomic::Decimal(rounded.checked_mul(factor).ok_or(Error::FOAR0002)?)
            }
        }
        Atomic::Float(f) => Atomic::Float(round_double(*f as f64, precision) as f32),
        Atomic::Double(d) => Atomic::Double(round_double(*d, precision)),
        Atomic::Untyped(_) => Atomic::Double(round_double(a.to_double()?, precision)),
        _ => return Err(Error::XPTY0004),
    })
}

fn round_double(value: f64, precision: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(precision);
    let scaled = value * factor;
    // round half toward positive infinity, per fn:round
    let rounded = if scaled.fract() == -0.5 {
        scaled.trunc()
    } else {
        (scaled + 0.5).floor()
    };
    rounded / factor
}

/// Rounding used by `fn:round-half-to-even`.
pub fn round_half_to_even_atomic(a: &Atomic, precision: i32) -> Result<Atomic> {
    Ok(match a {
        Atomic::Integer(t, i) if precision >= 0 => Atomic::Integer(*t, i.clone()),
        Atomic::Decimal(d) => {
            if precision >= 0 {
                Atomic::Decimal(d.round_dp_with_strategy(
                    precision as u32,
                    rust_decimal::RoundingStrategy::MidpointNearestEven,
                ))
            } else {
                let factor = Decimal::from(10i64.pow((-precision) as u32));
                let scaled = d.checked_div(factor).ok_or(Error::FOAR0002)?;
                let rounded = scaled
                    .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointNearestEven);
                Atomic::Decimal(rounded.checked_mul(factor).ok_or(Error::FOAR0002)?)
            }
        }
        Atomic::Float(f) => {
            Atomic::Float(round_half_even_double(*f as f64, precision) as f32)
        }
        Atomic::Double(d) => Atomic::Double(round_half_even_double(*d, precision)),
        other => round_atomic(other, precision)?,
    })
}

fn round_half_even_double(value: f64, precision: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(precision);
    let scaled = value * factor;
    let floor = scaled.floor();
    let fract = scaled - floor;
    let rounded = if (fract - 0.5).abs() < f64::EPSILON {
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        scaled.round()
    };
    rounded / factor
}

/// The integer subtype tag is dropped by arithmetic; results are plain
/// `xs:integer`.
pub fn plain_integer(i: IBig) -> Atomic {
    Atomic::Integer(IntegerType::Integer, i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn int(n: i64) -> Atomic {
        Atomic::integer(IBig::from(n))
    }

    #[test]
    fn integer_div_produces_decimal() {
        let result = arithmetic(ArithOp::Div, &int(1), &int(2)).unwrap();
        assert_eq!(result, Atomic::Decimal(dec!(0.5)));
    }

    #[test]
    fn idiv_truncates() {
        let result = arithmetic(ArithOp::IDiv, &int(7), &int(2)).unwrap();
        assert_eq!(result.string_value(), "3");
        let result = arithmetic(ArithOp::IDiv, &int(-7), &int(2)).unwrap();
        assert_eq!(result.string_value(), "-3");
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(
            arithmetic(ArithOp::Div, &int(1), &int(0)),
            Err(Error::FOAR0001)
        );
        // double division by zero is INF, not an error
        let result =
            arithmetic(ArithOp::Div, &Atomic::Double(1.0), &Atomic::Double(0.0)).unwrap();
        assert_eq!(result.string_value(), "INF");
    }

    #[test]
    fn untyped_operands_become_doubles() {
        let result = arithmetic(ArithOp::Add, &Atomic::untyped("2"), &int(3)).unwrap();
        assert_eq!(result, Atomic::Double(5.0));
    }

    #[test]
    fn date_minus_date() {
        let a = Atomic::parse_as("2023-04-07", Xs::Date).unwrap();
        let b = Atomic::parse_as("2023-04-05", Xs::Date).unwrap();
        let result = arithmetic(ArithOp::Sub, &a, &b).unwrap();
        assert_eq!(result.string_value(), "P2D");
    }

    #[test]
    fn date_plus_duration() {
        let d = Atomic::parse_as("2023-01-31", Xs::Date).unwrap();
        let dur = Atomic::parse_as("P1M", Xs::YearMonthDuration).unwrap();
        let result = arithmetic(ArithOp::Add, &d, &dur).unwrap();
        assert_eq!(result.string_value(), "2023-02-28");
    }

    #[test]
    fn duration_scaling() {
        let dur = Atomic::parse_as("PT2H", Xs::DayTimeDuration).unwrap();
        let result = arithmetic(ArithOp::Mul, &dur, &int(3)).unwrap();
        assert_eq!(result.string_value(), "PT6H");
        let ratio = arithmetic(
            ArithOp::Div,
            &Atomic::parse_as("PT6H", Xs::DayTimeDuration).unwrap(),
            &Atomic::parse_as("PT2H", Xs::DayTimeDuration).unwrap(),
        )
        .unwrap();
        assert_eq!(ratio, Atomic::Double(3.0));
    }

    #[test]
    fn rounding() {
        assert_eq!(
            round_atomic(&Atomic::Double(2.5), 0).unwrap(),
            Atomic::Double(3.0)
        );
        assert_eq!(
            round_atomic(&Atomic::Double(-2.5), 0).unwrap(),
            Atomic::Double(-2.0)
        );
        assert_eq!(
            round_half_to_even_atomic(&Atomic::Decimal(dec!(2.5)), 0).unwrap(),
            Atomic::Decimal(dec!(2))
        );
    }
}
