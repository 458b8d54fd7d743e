// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Parser for the platform description language.
//!
//! [`parse`] turns one source file into a [`pdl_ast::Description`]. Syntax
//! failures are immediate and fatal; the [`error::ParseError`] carries the
//! expected-token set for the diagnostic.

pub mod error;
pub mod parser;
pub mod stream;

pub use error::ParseError;
pub use parser::parse;
