//! Atomic values.
//!
//! XPath defines a host of atomic value types, and rules for how to do
//! arithmetic on them, compare them, and cast them to other types.

mod cast;
mod compare;
mod atomic_core;
mod datetime;
mod map_key;
mod op;
mod types;

pub use compare::{value_compare, CompareOp};
pub use atomic_core::Atomic;
pub use datetime::{
    Duration, Gregorian, NaiveDateTimeWithOffset, NaiveDateWithOffset, NaiveTimeWithOffset,
};
pub use map_key::MapKey;
pub use op::{arithmetic, negate, plain_integer, round_atomic, round_half_to_even_atomic, ArithOp};
pub use types::{BinaryType, IntegerType, StringType};
