//! External collaborators: init-script handling and include resolution.

use crate::value::ObjectHandle;
use std::path::{Path, PathBuf};

/// Validates and executes the free-form script lines of `init:` attributes.
pub trait InitHandler {
    /// Syntax-check the lines of one init attribute. The error text ends up
    /// in the `InitSectionValidationError` diagnostic.
    fn validate(&self, lines: &[String]) -> Result<(), String>;

    /// Run the lines against a built object.
    fn execute(&self, target: &ObjectHandle, lines: &[String]) -> Result<(), String>;
}

/// Maps a `using` path plus the including file's path to a filesystem path.
///
/// Whether the resolved file exists is checked by the driver when it reads
/// it; resolution itself is pure.
pub trait UsingResolver {
    fn resolve(&self, path: &str, including_file: Option<&Path>) -> PathBuf;
}

/// Resolver that interprets paths relative to the including file.
pub struct RelativeResolver;

impl UsingResolver for RelativeResolver {
    fn resolve(&self, path: &str, including_file: Option<&Path>) -> PathBuf {
        match including_file.and_then(|f| f.parent()) {
            Some(parent) => parent.join(path),
            None => PathBuf::from(path),
        }
    }
}
