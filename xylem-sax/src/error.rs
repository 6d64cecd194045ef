use std::fmt;

use thiserror::Error;

/// Position and message for a parse-time diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Human-readable description.
    pub message: String,
    /// 1-based line of the offending construct.
    pub line: u64,
    /// 1-based column of the offending construct.
    pub column: u64,
    /// The system identifier of the entity being parsed, if known.
    pub system_id: Option<String>,
}

impl Diagnostic {
    pub(crate) fn new(message: impl Into<String>, line: u64, column: u64) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            system_id: None,
        }
    }

    pub(crate) fn with_system_id(mut self, system_id: Option<&str>) -> Self {
        self.system_id = system_id.map(|s| s.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.system_id {
            Some(id) => write!(f, "{}:{}:{}: {}", id, self.line, self.column, self.message),
            None => write!(f, "{}:{}: {}", self.line, self.column, self.message),
        }
    }
}

/// Errors surfaced by the parser and serializer.
///
/// Lexical, well-formedness and namespace errors are fatal: they unwind
/// the current `feed` call and poison the parser. Validity and entity
/// errors are recoverable and normally reported through the error
/// handler instead of being returned.
#[derive(Debug, Error)]
pub enum SaxError {
    /// Malformed bytes, characters or tokens.
    #[error("lexical error: {0}")]
    Lexical(Diagnostic),
    /// Input violates the XML grammar.
    #[error("well-formedness error: {0}")]
    WellFormedness(Diagnostic),
    /// Undeclared prefix or conflicting namespace binding.
    #[error("namespace error: {0}")]
    Namespace(Diagnostic),
    /// A DTD validity constraint was violated and validation is enforced.
    #[error("validity error: {0}")]
    Validity(Diagnostic),
    /// An entity could not be resolved and resolution was required.
    #[error("entity error: {0}")]
    Entity(Diagnostic),
    /// Bytes that cannot be decoded in the active encoding.
    #[error("malformed input at byte {offset}")]
    MalformedInput {
        /// Byte offset into the overall input.
        offset: u64,
    },
    /// A declared encoding the decoder does not support.
    #[error("unsupported encoding {0:?}")]
    UnsupportedEncoding(String),
    /// An unrecognized feature or property name.
    #[error("unrecognized option {0:?}")]
    UnrecognizedOption(String),
    /// A handler aborted processing.
    #[error("handler error: {0}")]
    Handler(String),
    /// An I/O error from the serializer's sink.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SaxError {
    /// Whether this error poisons the parse (everything except validity
    /// and entity-resolution failures).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SaxError::Validity(_) | SaxError::Entity(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SaxError>;
