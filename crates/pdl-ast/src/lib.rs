// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Syntax tree, source spans, and diagnostics for the platform description
//! driver.
//!
//! This crate is the shared vocabulary of the pipeline: the parser produces
//! [`ast::Description`]s, the resolve and build crates consume them, and every
//! failure anywhere is an [`error::Diagnostic`] rendered against the pass's
//! [`span::SourceMap`].

pub mod ast;
pub mod error;
pub mod span;

pub use ast::*;
pub use error::{Diagnostic, ErrorKind};
pub use span::{SourceFile, SourceMap, Span};
