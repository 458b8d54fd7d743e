//! Include processing: `using` directives, prefixing, cycle detection.
//!
//! Usings are pulled in depth-first before the including file's own entries
//! are declared, so include order is declaration order. A path re-entered
//! while still on the in-progress stack is a cycle; a (path, prefix) pair
//! already processed is a diamond and is skipped.

use crate::store::VariableStore;
use pdl_ast::{
    Attribute, Description, Diagnostic, ErrorKind, IrqDestination, RegistrationInfo, SourceMap,
    Value,
};
use pdl_host::UsingResolver;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Recursive include walker. Owns the usings-in-progress stack and the
/// processed set for the lifetime of one driver pass.
pub struct Includer<'a> {
    resolver: &'a dyn UsingResolver,
    sources: &'a mut SourceMap,
    store: &'a mut VariableStore,
    stack: Vec<PathBuf>,
    processed: HashSet<(PathBuf, String)>,
}

impl<'a> Includer<'a> {
    pub fn new(
        resolver: &'a dyn UsingResolver,
        sources: &'a mut SourceMap,
        store: &'a mut VariableStore,
    ) -> Self {
        Self {
            resolver,
            sources,
            store,
            stack: Vec::new(),
            processed: HashSet::new(),
        }
    }

    /// Process a root description given as text under a synthetic name.
    pub fn process_text(&mut self, name: &str, text: String) -> Result<(), Diagnostic> {
        let file_id = self.sources.add_file(name, text);
        let description = self.parse(file_id)?;
        self.process_description(description, None, "")
    }

    /// Process a root description from a file.
    pub fn process_file(&mut self, path: &Path) -> Result<(), Diagnostic> {
        let canonical = canonicalize(path);
        let text = std::fs::read_to_string(path).map_err(|err| {
            Diagnostic::new(
                ErrorKind::UsingFileNotFound,
                pdl_ast::Span::zero(0),
                format!("cannot read '{}': {}", path.display(), err),
            )
        })?;
        let file_id = self.sources.add_file(path.display().to_string(), text);
        let description = self.parse(file_id)?;
        self.stack.push(canonical);
        let result = self.process_description(description, Some(path.to_path_buf()), "");
        self.stack.pop();
        result
    }

    fn parse(&mut self, file_id: u16) -> Result<Description, Diagnostic> {
        let source = self.sources.file(file_id).source.clone();
        pdl_parser::parse(&source, file_id)
            .map_err(|err| Diagnostic::new(ErrorKind::SyntaxError, err.span, err.message))
    }

    fn process_description(
        &mut self,
        mut description: Description,
        file_path: Option<PathBuf>,
        prefix: &str,
    ) -> Result<(), Diagnostic> {
        for using in &description.usings {
            let resolved = self
                .resolver
                .resolve(&using.path.item, file_path.as_deref());
            let canonical = canonicalize(&resolved);

            if let Some(position) = self.stack.iter().position(|p| p == &canonical) {
                let mut ladder: Vec<String> = self.stack[position..]
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                ladder.push(canonical.display().to_string());
                return Err(Diagnostic::new(
                    ErrorKind::RecurringUsing,
                    using.path.span,
                    format!("recurring include:\n  {}", ladder.join("\n  -> ")),
                ));
            }

            let child_prefix = match &using.prefix {
                Some(p) => format!("{}{}", prefix, p.item),
                None => prefix.to_string(),
            };
            if !self
                .processed
                .insert((canonical.clone(), child_prefix.clone()))
            {
                debug!(path = %canonical.display(), "include already processed, skipping");
                continue;
            }

            let text = std::fs::read_to_string(&resolved).map_err(|err| {
                Diagnostic::new(
                    ErrorKind::UsingFileNotFound,
                    using.path.span,
                    format!("cannot read '{}': {}", resolved.display(), err),
                )
            })?;
            let file_id = self.sources.add_file(resolved.display().to_string(), text);
            let child = self.parse(file_id)?;

            self.stack.push(canonical);
            let result = self.process_description(child, Some(resolved), &child_prefix);
            self.stack.pop();
            result?;
        }

        if !prefix.is_empty() {
            apply_prefix(&mut description, prefix, self.store);
        }
        for entry in description.entries {
            self.store.add_entry(entry)?;
        }
        Ok(())
    }
}

fn canonicalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Prefix every declared variable name and every reference in a description.
///
/// References naming a builtin are left alone: an included file must still
/// be able to say `@ sysbus` whatever prefix it is included under.
fn apply_prefix(description: &mut Description, prefix: &str, store: &VariableStore) {
    for entry in &mut description.entries {
        entry.variable.name = format!("{}{}", prefix, entry.variable.name);
        if let Some(registrations) = &mut entry.registrations {
            for registration in registrations {
                prefix_registration(registration, prefix, store);
            }
        }
        prefix_attributes(&mut entry.attributes, prefix, store);
    }
}

fn prefix_registration(registration: &mut RegistrationInfo, prefix: &str, store: &VariableStore) {
    if let Some(register) = &mut registration.register {
        if !store.is_builtin(&register.name) {
            register.name = format!("{}{}", prefix, register.name);
        }
    }
    if let Some(point) = &mut registration.point {
        prefix_value(point, prefix, store);
    }
}

fn prefix_attributes(attributes: &mut [Attribute], prefix: &str, store: &VariableStore) {
    for attribute in attributes {
        match attribute {
            Attribute::Param(param) => {
                if let Some(value) = &mut param.value {
                    prefix_value(value, prefix, store);
                }
            }
            Attribute::Irq(irq) => {
                for destination in &mut irq.destinations {
                    if let IrqDestination::Target(target) = destination {
                        if !store.is_builtin(&target.peripheral.name) {
                            target.peripheral.name =
                                format!("{}{}", prefix, target.peripheral.name);
                        }
                    }
                }
            }
            Attribute::Init(_) => {}
        }
    }
}

fn prefix_value(value: &mut Value, prefix: &str, store: &VariableStore) {
    match value {
        Value::Reference(reference) => {
            if !store.is_builtin(&reference.name) {
                reference.name = format!("{}{}", prefix, reference.name);
            }
        }
        Value::Object(object) => prefix_attributes(&mut object.attributes, prefix, store),
        _ => {}
    }
}
