/// The XML Schema namespace.
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// A built-in XSD schema type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Xs {
    AnyType,
    AnySimpleType,
    Untyped,
    AnyAtomicType,
    Numeric,
    String,
    UntypedAtomic,
    Boolean,
    Decimal,
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
    Float,
    Double,
    QName,
    Notation,
    Duration,
    YearMonthDuration,
    DayTimeDuration,
    DateTime,
    DateTimeStamp,
    Date,
    Time,
    GYearMonth,
    GYear,
    GMonthDay,
    GMonth,
    GDay,
    Base64Binary,
    HexBinary,
    AnyURI,
    NormalizedString,
    Token,
    Language,
    NMTOKEN,
    Name,
    NCName,
    ID,
    IDREF,
    ENTITY,
}

/// The whitespace facet of a built-in type, used when normalizing
/// lexical forms before validation or casting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whitespace {
    /// Keep the value as written.
    Preserve,
    /// Map tab, CR and LF to spaces.
    Replace,
    /// Replace, then collapse runs of spaces and trim.
    Collapse,
}

// one row per type: variant, lexical local name
const NAMES: &[(Xs, &str)] = &[
    (Xs::AnyType, "anyType"),
    (Xs::AnySimpleType, "anySimpleType"),
    (Xs::Untyped, "untyped"),
    (Xs::AnyAtomicType, "anyAtomicType"),
    (Xs::Numeric, "numeric"),
    (Xs::String, "string"),
    (Xs::UntypedAtomic, "untypedAtomic"),
    (Xs::Boolean, "boolean"),
    (Xs::Decimal, "decimal"),
    (Xs::Integer, "integer"),
    (Xs::NonPositiveInteger, "nonPositiveInteger"),
    (Xs::NegativeInteger, "negativeInteger"),
    (Xs::NonNegativeInteger, "nonNegativeInteger"),
    (Xs::PositiveInteger, "positiveInteger"),
    (Xs::Long, "long"),
    (Xs::Int, "int"),
    (Xs::Short, "short"),
    (Xs::Byte, "byte"),
    (Xs::UnsignedLong, "unsignedLong"),
    (Xs::UnsignedInt, "unsignedInt"),
    (Xs::UnsignedShort, "unsignedShort"),
    (Xs::UnsignedByte, "unsignedByte"),
    (Xs::Float, "float"),
    (Xs::Double, "double"),
    (Xs::QName, "QName"),
    (Xs::Notation, "NOTATION"),
    (Xs::Duration, "duration"),
    (Xs::YearMonthDuration, "yearMonthDuration"),
    (Xs::DayTimeDuration, "dayTimeDuration"),
    (Xs::DateTime, "dateTime"),
    (Xs::DateTimeStamp, "dateTimeStamp"),
    (Xs::Date, "date"),
    (Xs::Time, "time"),
    (Xs::GYearMonth, "gYearMonth"),
    (Xs::GYear, "gYear"),
    (Xs::GMonthDay, "gMonthDay"),
    (Xs::GMonth, "gMonth"),
    (Xs::GDay, "gDay"),
    (Xs::Base64Binary, "base64Binary"),
    (Xs::HexBinary, "hexBinary"),
    (Xs::AnyURI, "anyURI"),
    (Xs::NormalizedString, "normalizedString"),
    (Xs::Token, "token"),
    (Xs::Language, "language"),
    (Xs::NMTOKEN, "NMTOKEN"),
    (Xs::Name, "Name"),
    (Xs::NCName, "NCName"),
    (Xs::ID, "ID"),
    (Xs::IDREF, "IDREF"),
    (Xs::ENTITY, "ENTITY"),
];

impl Xs {
    /// Look up a built-in type by expanded name.
    pub fn by_name(namespace: Option<&str>, local_name: &str) -> Option<Self> {
        if namespace == Some(XS_NAMESPACE) {
            Xs::by_local_name(local_name)
        } else {
            None
        }
    }

    /// Look up a built-in type by its local name in the `xs` namespace.
    pub fn by_local_name(local_name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(_, name)| *name == local_name)
            .map(|(xs, _)| *xs)
    }

    /// The namespace all built-in types live in.
    pub fn namespace() -> &'static str {
        XS_NAMESPACE
    }

    /// The lexical local name, e.g. `unsignedLong`.
    pub fn local_name(&self) -> &'static str {
        NAMES
            .iter()
            .find(|(xs, _)| xs == self)
            .map(|(_, name)| *name)
            .unwrap()
    }

    /// The prefixed display form, e.g. `xs:integer`.
    pub fn display_name(&self) -> String {
        format!("xs:{}", self.local_name())
    }

    /// The base type in the built-in hierarchy; `None` only for
    /// `xs:anyType`.
    pub fn parent(&self) -> Option<Xs> {
        use Xs::*;
        let parent = match self {
            AnyType => return None,
            AnySimpleType | Untyped => AnyType,
            AnyAtomicType | Numeric => AnySimpleType,
            UntypedAtomic | String | Boolean | Float | Double | Decimal | QName | Notation
            | Duration | Time | Date | DateTime | GYearMonth | GYear | GMonthDay | GMonth
            | GDay | Base64Binary | HexBinary | AnyURI => AnyAtomicType,
            Integer => Decimal,
            NonPositiveInteger | NonNegativeInteger | Long => Integer,
            NegativeInteger => NonPositiveInteger,
            PositiveInteger | UnsignedLong => NonNegativeInteger,
            Int => Long,
            Short => Int,
            Byte => Short,
            UnsignedInt => UnsignedLong,
            UnsignedShort => UnsignedInt,
            UnsignedByte => UnsignedShort,
            YearMonthDuration | DayTimeDuration => Duration,
            DateTimeStamp => DateTime,
            NormalizedString => String,
            Token => NormalizedString,
            Language | NMTOKEN | Name => Token,
            NCName => Name,
            ID | IDREF | ENTITY => NCName,
        };
        Some(parent)
    }

    /// Whether `self` is `other` or derives from it by restriction.
    pub fn derives_from(&self, other: Xs) -> bool {
        let mut current = *self;
        loop {
            if current == other {
                return true;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Type matching for sequence types; `xs:numeric` matches the three
    /// numeric primitives and their subtypes.
    pub fn matches(&self, other: Xs) -> bool {
        if other == Xs::Numeric {
            return self.derives_from(Xs::Double)
                || self.derives_from(Xs::Float)
                || self.derives_from(Xs::Decimal);
        }
        self.derives_from(other)
    }

    /// The whitespace facet applied to lexical forms of this type.
    pub fn whitespace(&self) -> Whitespace {
        use Xs::*;
        match self {
            String | AnyType | AnySimpleType | Untyped | UntypedAtomic => Whitespace::Preserve,
            NormalizedString => Whitespace::Replace,
            _ => Whitespace::Collapse,
        }
    }

    /// Apply this type's whitespace facet to a lexical form.
    pub fn normalize_whitespace<'a>(&self, value: &'a str) -> std::borrow::Cow<'a, str> {
        match self.whitespace() {
            Whitespace::Preserve => std::borrow::Cow::Borrowed(value),
            Whitespace::Replace => {
                if value.contains(['\t', '\r', '\n']) {
                    std::borrow::Cow::Owned(value.replace(['\t', '\r', '\n'], " "))
                } else {
                    std::borrow::Cow::Borrowed(value)
                }
            }
            Whitespace::Collapse => {
                let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
                if collapsed == value {
                    std::borrow::Cow::Borrowed(value)
                } else {
                    std::borrow::Cow::Owned(collapsed)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_walks_the_hierarchy() {
        assert!(Xs::Byte.derives_from(Xs::Decimal));
        assert!(Xs::ID.derives_from(Xs::String));
        assert!(Xs::DayTimeDuration.derives_from(Xs::Duration));
        assert!(!Xs::Double.derives_from(Xs::Decimal));
    }

    #[test]
    fn numeric_matches_all_numeric_primitives() {
        assert!(Xs::Integer.matches(Xs::Numeric));
        assert!(Xs::Float.matches(Xs::Numeric));
        assert!(Xs::Double.matches(Xs::Numeric));
        assert!(!Xs::String.matches(Xs::Numeric));
    }

    #[test]
    fn name_round_trip() {
        assert_eq!(Xs::by_local_name("unsignedShort"), Some(Xs::UnsignedShort));
        assert_eq!(Xs::UnsignedShort.local_name(), "unsignedShort");
        assert_eq!(Xs::by_name(Some(XS_NAMESPACE), "integer"), Some(Xs::Integer));
        assert_eq!(Xs::by_name(None, "integer"), None);
    }

    #[test]
    fn whitespace_facets() {
        assert_eq!(
            Xs::Token.normalize_whitespace("  a \n b  "),
            std::borrow::Cow::<str>::Owned("a b".to_string())
        );
        assert_eq!(Xs::String.normalize_whitespace(" a  b "), " a  b ");
    }
}
