//! Parse errors.

use pdl_ast::Span;
use std::fmt;

/// A syntax failure with the expected-token set.
///
/// The message renders the set as "expected A or B or C"; the driver wraps
/// this into a `SyntaxError` diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

impl ParseError {
    /// Build an "expected ... found ..." error from the expected-token set.
    pub fn expected(expected: &[&str], found: Option<String>, span: Span) -> Self {
        let set = expected.join(" or ");
        let message = match found {
            Some(found) => format!("expected {}, found {}", set, found),
            None => format!("expected {}, found end of input", set),
        };
        Self { span, message }
    }

    pub fn other(message: impl Into<String>, span: Span) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}
