use ibig::IBig;
use xylem_schema_type::Xs;

/// The `xs:integer` subtype an integer atomic witnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum IntegerType {
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    NonNegativeInteger,
    PositiveInteger,
    Long,
    Int,
    Short,
    Byte,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
}

impl IntegerType {
    pub(crate) fn schema_type(&self) -> Xs {
        match self {
            IntegerType::Integer => Xs::Integer,
            IntegerType::NonPositiveInteger => Xs::NonPositiveInteger,
            IntegerType::NegativeInteger => Xs::NegativeInteger,
            IntegerType::NonNegativeInteger => Xs::NonNegativeInteger,
            IntegerType::PositiveInteger => Xs::PositiveInteger,
            IntegerType::Long => Xs::Long,
            IntegerType::Int => Xs::Int,
            IntegerType::Short => Xs::Short,
            IntegerType::Byte => Xs::Byte,
            IntegerType::UnsignedLong => Xs::UnsignedLong,
            IntegerType::UnsignedInt => Xs::UnsignedInt,
            IntegerType::UnsignedShort => Xs::UnsignedShort,
            IntegerType::UnsignedByte => Xs::UnsignedByte,
        }
    }

    pub(crate) fn from_schema_type(xs: Xs) -> Option<Self> {
        Some(match xs {
            Xs::Integer => IntegerType::Integer,
            Xs::NonPositiveInteger => IntegerType::NonPositiveInteger,
            Xs::NegativeInteger => IntegerType::NegativeInteger,
            Xs::NonNegativeInteger => IntegerType::NonNegativeInteger,
            Xs::PositiveInteger => IntegerType::PositiveInteger,
            Xs::Long => IntegerType::Long,
            Xs::Int => IntegerType::Int,
            Xs::Short => IntegerType::Short,
            Xs::Byte => IntegerType::Byte,
            Xs::UnsignedLong => IntegerType::UnsignedLong,
            Xs::UnsignedInt => IntegerType::UnsignedInt,
            Xs::UnsignedShort => IntegerType::UnsignedShort,
            Xs::UnsignedByte => IntegerType::UnsignedByte,
            _ => return None,
        })
    }

    // the value-range facet; None means unbounded on that side
    pub(crate) fn bounds(&self) -> (Option<IBig>, Option<IBig>) {
        match self {
            IntegerType::Integer => (None, None),
            IntegerType::NonPositiveInteger => (None, Some(IBig::from(0u8))),
            IntegerType::NegativeInteger => (None, Some(IBig::from(-1))),
            IntegerType::NonNegativeInteger => (Some(IBig::from(0u8)), None),
            IntegerType::PositiveInteger => (Some(IBig::from(1u8)), None),
            IntegerType::Long => (Some(IBig::from(i64::MIN)), Some(IBig::from(i64::MAX))),
            IntegerType::Int => (Some(IBig::from(i32::MIN)), Some(IBig::from(i32::MAX))),
            IntegerType::Short => (Some(IBig::from(i16::MIN)), Some(IBig::from(i16::MAX))),
            IntegerType::Byte => (Some(IBig::from(i8::MIN)), Some(IBig::from(i8::MAX))),
            IntegerType::UnsignedLong => (Some(IBig::from(0u8)), Some(IBig::from(u64::MAX))),
            IntegerType::UnsignedInt => (Some(IBig::from(0u8)), Some(IBig::from(u32::MAX))),
            IntegerType::UnsignedShort => (Some(IBig::from(0u8)), Some(IBig::from(u16::MAX))),
            IntegerType::UnsignedByte => (Some(IBig::from(0u8)), Some(IBig::from(u8::MAX))),
        }
    }

    pub(crate) fn contains(&self, value: &IBig) -> bool {
        let (low, high) = self.bounds();
        if let Some(low) = low {
            if value < &low {
                return false;
            }
        }
        if let Some(high) = high {
            if value > &high {
                return false;
            }
        }
        true
    }
}

/// The `xs:string` subtype (plus `xs:anyURI`) a string atomic
/// witnesses.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum StringType {
    String,
    NormalizedString,
    Token,
    Language,
    NMTOKEN,
    Name,
    NCName,
    ID,
    IDREF,
    ENTITY,
    AnyURI,
}

impl StringType {
    pub(crate) fn schema_type(&self) -> Xs {
        match self {
            StringType::String => Xs::String,
            StringType::NormalizedString => Xs::NormalizedString,
            StringType::Token => Xs::Token,
            StringType::Language => Xs::Language,
            StringType::NMTOKEN => Xs::NMTOKEN,
            StringType::Name => Xs::Name,
            StringType::NCName => Xs::NCName,
            StringType::ID => Xs::ID,
            StringType::IDREF => Xs::IDREF,
            StringType::ENTITY => Xs::ENTITY,
            StringType::AnyURI => Xs::AnyURI,
        }
    }

    pub(crate) fn from_schema_type(xs: Xs) -> Option<Self> {
        Some(match xs {
            Xs::String => StringType::String,
            Xs::NormalizedString => StringType::NormalizedString,
            Xs::Token => StringType::Token,
            Xs::Language => StringType::Language,
            Xs::NMTOKEN => StringType::NMTOKEN,
            Xs::Name => StringType::Name,
            Xs::NCName => StringType::NCName,
            Xs::ID => StringType::ID,
            Xs::IDREF => StringType::IDREF,
            Xs::ENTITY => StringType::ENTITY,
            Xs::AnyURI => StringType::AnyURI,
            _ => return None,
        })
    }
}

/// The binary subtype a binary atomic witnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryType {
    /// xs:hexBinary
    Hex,
    /// xs:base64Binary
    Base64,
}

impl BinaryType {
    pub(crate) fn schema_type(&self) -> Xs {
        match self {
            BinaryType::Hex => Xs::HexBinary,
            BinaryType::Base64 => Xs::Base64Binary,
        }
    }
}
