//! Host-side errors.

use thiserror::Error;

/// Failure reported by host code invoked through the catalog (constructors,
/// property setters, register methods, local-name setting).
///
/// `Recoverable` and `Cast` are converted by the driver into the
/// corresponding diagnostic kinds, preserving the text. `Fatal` passes
/// through the driver untouched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    #[error("{0}")]
    Recoverable(String),

    #[error("invalid cast: {0}")]
    Cast(String),

    #[error("{0}")]
    Fatal(String),
}

impl HostError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable(message.into())
    }

    pub fn cast(message: impl Into<String>) -> Self {
        Self::Cast(message.into())
    }
}
