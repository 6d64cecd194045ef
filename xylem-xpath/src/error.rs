use strum_macros::{Display, EnumMessage};

/// XPath/XSLT error code.
///
/// The W3C specifications assign a code to every static, dynamic and
/// type error; the variants carry their description in the doc comment,
/// retrievable through [`strum::EnumMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumMessage)]
#[allow(clippy::upper_case_acronyms)]
pub enum Error {
    /// A feature this engine does not implement.
    Unsupported,
    /// A reverse axis was evaluated in pure streaming mode.
    StreamingViolation,

    /// Parse error: the expression is not a valid instance of the
    /// grammar.
    XPST0003,
    /// A name used in the expression is not defined in the static
    /// context.
    XPST0008,
    /// Function name and arity match no signature in the static
    /// context.
    XPST0017,
    /// Invalid target type for cast or castable.
    XPST0080,
    /// A QName prefix cannot be expanded using the statically known
    /// namespaces.
    XPST0081,
    /// Evaluation relies on a part of the dynamic context that is
    /// absent.
    XPDY0002,
    /// A path step's root is not in a tree rooted at a document node.
    XPDY0050,
    /// The dynamic type of a value does not match a required type.
    XPTY0004,
    /// The result of a path operator contains both nodes and
    /// non-nodes.
    XPTY0018,
    /// E1 of E1/E2 does not evaluate to a sequence of nodes.
    XPTY0019,
    /// The context item of an axis step is not a node.
    XPTY0020,
    /// Duplicate key values in a map constructor.
    XQDY0137,

    /// Wrong number of arguments to fn:apply.
    FOAP0001,
    /// Division by zero.
    FOAR0001,
    /// Numeric operation overflow or underflow.
    FOAR0002,
    /// Array index out of bounds.
    FOAY0001,
    /// Negative array length.
    FOAY0002,
    /// Input value too large for decimal.
    FOCA0001,
    /// Invalid lexical value.
    FOCA0002,
    /// Input too large for an integer subtype.
    FOCA0003,
    /// Codepoint not valid.
    FOCH0001,
    /// Unsupported collation.
    FOCH0002,
    /// No context document.
    FODC0001,
    /// Error retrieving resource.
    FODC0002,
    /// Invalid argument to fn:doc.
    FODC0005,
    /// Overflow or underflow in date/time operation.
    FODT0001,
    /// Overflow or underflow in duration operation.
    FODT0002,
    /// Invalid timezone value.
    FODT0003,
    /// Unidentified error.
    FOER0000,
    /// Invalid decimal format picture string.
    FODF1310,
    /// Invalid fn:format-integer picture.
    FODF1280,
    /// Invalid value for cast or constructor.
    FORG0001,
    /// Invalid argument to fn:resolve-uri.
    FORG0002,
    /// zero-or-one called with a sequence of more than one item.
    FORG0003,
    /// one-or-more called with an empty sequence.
    FORG0004,
    /// exactly-one called with a bad cardinality.
    FORG0005,
    /// Invalid argument type.
    FORG0006,
    /// The two arguments of fn:dateTime have inconsistent timezones.
    FORG0008,
    /// Argument to fn:data contains a node without a typed value.
    FOTY0012,
    /// The argument to fn:data is a function item.
    FOTY0013,
    /// The argument to fn:string is a function item.
    FOTY0014,
    /// Error parsing a regular expression.
    FORX0002,
    /// The regular expression matches the zero-length string.
    FORX0003,
    /// Invalid replacement string.
    FORX0004,
    /// Duplicate keys in map:merge under the reject policy.
    FOJS0003,
    /// Invalid options for a map or JSON function.
    FOJS0005,
    /// An item unsupported by the JSON output method.
    SERE0023,

    /// It is a static error if a stylesheet construct is invalid.
    XTSE0010,
    /// Duplicate or conflicting declarations in a stylesheet.
    XTSE0080,
    /// An xsl:call-template names no template.
    XTSE0650,
    /// A required parameter has no value.
    XTDE0050,
    /// The initial match selection is absent.
    XTDE0044,
    /// Two template rules match with the same import precedence and
    /// priority.
    XTDE0540,
    /// xsl:apply-templates selects an absent mode.
    XTDE0555,
    /// An attribute set reference cannot be resolved.
    XTDE0710,
    /// A key with the given name is not defined.
    XTDE1260,
    /// A named decimal format is not defined.
    XTDE1280,
    /// format-number picture string is invalid.
    XTDE1310,
    /// The accumulator name is not defined.
    XTDE3340,
    /// accumulator-before called from a non-streamable context.
    XTDE3382,
    /// xsl:message with terminate="yes".
    XTMM9000,
    /// A value does not match a required (`as`) type.
    XTTE0570,
    /// The result of a template does not match its declared type.
    XTTE0505,
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, Error>;
