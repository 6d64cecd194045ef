//! Constructor functions: `xs:integer(...)`, `xs:date(...)`, ….
//!
//! Each built-in atomic type doubles as an arity-1 function performing
//! the corresponding cast.

use xylem_schema_type::{Xs, XS_NAMESPACE};

use crate::context::StaticFunctionDescription;
use crate::sequence::Sequence;

use super::helpers::ns_desc;

const CONSTRUCTIBLE: &[Xs] = &[
    Xs::String,
    Xs::Boolean,
    Xs::Decimal,
    Xs::Integer,
    Xs::NonPositiveInteger,
    Xs::NegativeInteger,
    Xs::NonNegativeInteger,
    Xs::PositiveInteger,
    Xs::Long,
    Xs::Int,
    Xs::Short,
    Xs::Byte,
    Xs::UnsignedLong,
    Xs::UnsignedInt,
    Xs::UnsignedShort,
    Xs::UnsignedByte,
    Xs::Float,
    Xs::Double,
    Xs::Duration,
    Xs::YearMonthDuration,
    Xs::DayTimeDuration,
    Xs::DateTime,
    Xs::DateTimeStamp,
    Xs::Date,
    Xs::Time,
    Xs::GYearMonth,
    Xs::GYear,
    Xs::GMonthDay,
    Xs::GMonth,
    Xs::GDay,
    Xs::HexBinary,
    Xs::Base64Binary,
    Xs::AnyURI,
    Xs::UntypedAtomic,
    Xs::NormalizedString,
    Xs::Token,
    Xs::Language,
    Xs::NMTOKEN,
    Xs::Name,
    Xs::NCName,
    Xs::ID,
    Xs::IDREF,
    Xs::ENTITY,
];

pub(crate) fn descriptions() -> Vec<StaticFunctionDescription> {
    CONSTRUCTIBLE
        .iter()
        .map(|target| {
            let target = *target;
            ns_desc(
                XS_NAMESPACE,
                target.local_name(),
                1,
                move |interp, _ctx, args: &[Sequence]| {
                    match args[0].atomized_option(&interp.documents())? {
                        None => Ok(Sequence::empty()),
                        Some(atomic) => Ok(atomic.cast_to(target)?.into()),
                    }
                },
            )
        })
        .collect()
}
