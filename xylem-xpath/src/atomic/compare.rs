//! Value comparison between atomics.

use std::cmp::Ordering;

use crate::error::{Error, Result};

use super::atomic_core::Atomic;
use super::datetime::compare_date_times;

/// The six value-comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn test(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Apply a value comparison. In value-comparison position untyped
/// operands are compared as strings; general comparison casts them
/// first, which the evaluator does before calling here.
pub fn value_compare(op: CompareOp, a: &Atomic, b: &Atomic) -> Result<bool> {
    // untyped operands were cast by the caller (to strings for value
    // comparison, to the other operand's type for general comparison),
    // so only genuinely numeric pairs take the numeric path; NaN makes
    // everything but ne false
    if a.is_numeric() && b.is_numeric() {
        if let (Ok(x), Ok(y)) = (a.to_double(), b.to_double()) {
            if x.is_nan() || y.is_nan() {
                return Ok(op == CompareOp::Ne);
            }
            // compare exactly when both sides are integers
            if let (Atomic::Integer(_, ix), Atomic::Integer(_, iy)) = (a, b) {
                return Ok(op.test(ix.cmp(iy)));
            }
            if let (Atomic::Decimal(dx), Atomic::Decimal(dy)) = (a, b) {
                return Ok(op.test(dx.cmp(dy)));
            }
            return Ok(op.test(x.partial_cmp(&y).unwrap()));
        }
    }
    let ordering = atomic_ordering(a, b)?;
    match ordering {
        Some(ordering) => Ok(op.test(ordering)),
        None => {
            // equality-only types
            match op {
                CompareOp::Eq => Ok(atomic_equal(a, b)?),
                CompareOp::Ne => Ok(!atomic_equal(a, b)?),
                _ => Err(Error::XPTY0004),
            }
        }
    }
}

// a total order where one is defined; None for equality-only types
fn atomic_ordering(a: &Atomic, b: &Atomic) -> Result<Option<Ordering>> {
    use Atomic::*;
    Ok(match (a, b) {
        (Untyped(x) | String(_, x), Untyped(y) | String(_, y)) => Some(x.cmp(y)),
        (Boolean(x), Boolean(y)) => Some(x.cmp(y)),
        (DateTime(x, _), DateTime(y, _)) => Some(compare_date_times(x, y)),
        (Date(x), Date(y)) => {
            Some(compare_date_times(&x.at_midnight(), &y.at_midnight()))
        }
        (Time(x), Time(y)) => Some(x.time.cmp(&y.time)),
        (Duration(tx, x), Duration(ty, y))
            if *tx == xylem_schema_type::Xs::YearMonthDuration
                && *ty == xylem_schema_type::Xs::YearMonthDuration =>
        {
            Some(x.months.cmp(&y.months))
        }
        (Duration(tx, x), Duration(ty, y))
            if *tx == xylem_schema_type::Xs::DayTimeDuration
                && *ty == xylem_schema_type::Xs::DayTimeDuration =>
        {
            Some(x.delta.cmp(&y.delta))
        }
        (Duration(_, _), Duration(_, _)) => None,
        (QName(_), QName(_)) => None,
        (Binary(_, _), Binary(_, _)) => None,
        (Gregorian(tx, _), Gregorian(ty, _)) if tx == ty => None,
        _ => return Err(Error::XPTY0004),
    })
}

fn atomic_equal(a: &Atomic, b: &Atomic) -> Result<bool> {
    use Atomic::*;
    Ok(match (a, b) {
        (Duration(_, x), Duration(_, y)) => x == y,
        (QName(x), QName(y)) => x == y,
        (Binary(_, x), Binary(_, y)) => x == y,
        (Gregorian(tx, x), Gregorian(ty, y)) if tx == ty => {
            x.year == y.year && x.month == y.month && x.day == y.day
        }
        _ => return Err(Error::XPTY0004),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xylem_schema_type::Xs;

    #[test]
    fn numeric_and_string_comparisons() {
        assert!(value_compare(CompareOp::Lt, &Atomic::integer(2), &Atomic::Double(2.5)).unwrap());
        assert!(value_compare(CompareOp::Eq, &Atomic::string("a"), &Atomic::string("a")).unwrap());
        assert!(value_compare(CompareOp::Gt, &Atomic::string("b"), &Atomic::string("a")).unwrap());
    }

    #[test]
    fn nan_is_unordered() {
        let nan = Atomic::Double(f64::NAN);
        assert!(!value_compare(CompareOp::Eq, &nan, &nan).unwrap());
        assert!(value_compare(CompareOp::Ne, &nan, &nan).unwrap());
        assert!(!value_compare(CompareOp::Lt, &nan, &Atomic::Double(1.0)).unwrap());
    }

    #[test]
    fn date_time_comparison() {
        let a = Atomic::parse_as("2023-04-05T12:00:00+02:00", Xs::DateTime).unwrap();
        let b = Atomic::parse_as("2023-04-05T10:00:00Z", Xs::DateTime).unwrap();
        assert!(value_compare(CompareOp::Eq, &a, &b).unwrap());
    }

    #[test]
    fn incomparable_types_error() {
        let date = Atomic::parse_as("2023-04-05", Xs::Date).unwrap();
        assert!(value_compare(CompareOp::Eq, &date, &Atomic::Boolean(true)).is_err());
    }
}
