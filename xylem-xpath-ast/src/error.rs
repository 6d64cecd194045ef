use std::ops::Range;

use thiserror::Error;

/// A static error from the XPath parser.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at {}..{}", span.start, span.end)]
pub struct ParserError {
    /// What went wrong.
    pub message: String,
    /// Byte span in the source expression.
    pub span: Range<usize>,
}

impl ParserError {
    pub(crate) fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}
