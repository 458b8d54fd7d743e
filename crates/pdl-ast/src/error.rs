//! Diagnostics.
//!
//! Every failure in the driver goes through one shape: a [`Diagnostic`] with
//! an [`ErrorKind`], the offending span, and a message. The kind's
//! discriminant is the stable numeric error code printed in the `Error E<NN>`
//! header; messages are free text and not part of the contract.

use crate::span::{Span, SourceMap};
use serde::{Deserialize, Serialize};

/// Stable error codes.
///
/// `#[repr(u8)]` with explicit discriminants: the numbers are printed in
/// diagnostics and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorKind {
    SyntaxError = 0,
    UsingFileNotFound = 1,
    RecurringUsing = 2,
    EmptyEntry = 3,
    TypeNotSpecifiedInFirstVariableUse = 4,
    VariableAlreadyDeclared = 5,
    TypeNotResolved = 6,
    AliasWithoutRegistration = 7,
    AliasWithNoneRegistration = 8,
    MissingReference = 9,
    NoUsableRegisterInterface = 10,
    AmbiguousRegistrationPointType = 11,
    AmbiguousRegistree = 12,
    NoCtorForRegistrationPoint = 13,
    AmbiguousCtorForRegistrationPoint = 14,
    NoCtor = 15,
    AmbiguousCtor = 16,
    CtorAttributesInNonCreatingEntry = 17,
    PropertyDoesNotExist = 18,
    PropertyNotWritable = 19,
    TypeMismatch = 20,
    EnumMismatch = 21,
    PropertyOrCtorNameUsedMoreThanOnce = 22,
    MoreThanOneInitAttribute = 23,
    InitSectionValidationError = 24,
    CreationOrderCycle = 25,
    RegistrationOrderCycle = 26,
    IrqDestinationDoesNotExist = 27,
    NotLocalGpioReceiver = 28,
    IrqSourceDoesNotExist = 29,
    AmbiguousDefaultIrqSource = 30,
    IrqSourceIsNotNumberedGpioOutput = 31,
    IrqDestinationIsNotIrqReceiver = 32,
    WrongIrqArity = 33,
    IrqSourceUsedMoreThanOnce = 34,
    IrqDestinationUsedMoreThanOnce = 35,
    UninitializedSourceIrqObject = 36,
    IrqSourcePinDoesNotExist = 37,
    ConstructionException = 38,
    PropertySettingException = 39,
    RegistrationException = 40,
    CastException = 41,
    NameSettingException = 42,
    InternalError = 43,
}

impl ErrorKind {
    /// The numeric code printed in the diagnostic header.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    /// Underline the whole offending element, or just mark its start.
    pub wide_underline: bool,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
            wide_underline: true,
        }
    }

    /// Mark only the start of the element instead of underlining all of it.
    pub fn short_underline(mut self) -> Self {
        self.wide_underline = false;
        self
    }

    /// A violated internal invariant, with the calling site embedded.
    #[track_caller]
    pub fn internal(span: Span, message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self::new(
            ErrorKind::InternalError,
            span,
            format!(
                "should not reach here ({}:{}): {}",
                location.file(),
                location.line(),
                message.into()
            ),
        )
    }

    /// Render against the pass's sources: header, message, position, the
    /// offending source line, and a caret run under the element.
    pub fn render(&self, sources: &SourceMap) -> String {
        let mut out = format!("Error E{:02}: {}\n", self.kind.code(), self.message);
        if sources.file_count() == 0 || self.span.file_id as usize >= sources.file_count() {
            return out;
        }
        let (line, col) = sources.line_col(self.span);
        out.push_str(&format!(
            "At {}:{}:{}:\n",
            sources.file_name(self.span),
            line,
            col
        ));
        let file = sources.file(self.span.file_id);
        if let Some(text) = file.line_text(line) {
            out.push_str(text);
            out.push('\n');
            let width = if self.wide_underline {
                let available = (text.len() as u32).saturating_sub(col - 1).max(1);
                self.span.len().clamp(1, available)
            } else {
                1
            };
            out.push_str(&" ".repeat((col - 1) as usize));
            out.push_str(&"^".repeat(width as usize));
            out.push('\n');
        }
        out
    }
}
