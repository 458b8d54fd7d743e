//! The variable store.
//!
//! Variables live in two layers: a global scope and one local scope per file
//! (`local` entries). Reference lookup tries the referencing file's local
//! scope first and falls back to the global scope. Builtins — the machine
//! keyword and every peripheral registered on the machine at driver start —
//! sit in the global scope and are not redeclarable.

use indexmap::IndexMap;
use pdl_ast::{Attribute, Diagnostic, Entry, ErrorKind, Span};
use pdl_host::{ObjectHandle, TypeId};
use std::fmt;
use tracing::debug;

/// Scope half of a variable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    File(u16),
}

/// Stable identity of a variable: scope plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarKey {
    pub scope: Scope,
    pub name: String,
}

impl VarKey {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::Global,
            name: name.into(),
        }
    }

    pub fn local(file: u16, name: impl Into<String>) -> Self {
        Self {
            scope: Scope::File(file),
            name: name.into(),
        }
    }
}

impl fmt::Display for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Where a variable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationPlace {
    /// Machine keyword or a peripheral already registered at driver start.
    Builtin,
    /// First creating entry, at this position.
    UserEntry(Span),
}

/// One variable with its contributing entries and value slot.
pub struct Variable {
    pub key: VarKey,
    pub place: DeclarationPlace,
    /// Static type, resolved from the first creating entry (or pre-set for
    /// builtins). Fixed for the variable's lifetime.
    pub type_id: Option<TypeId>,
    /// All entries contributing to this variable, in declaration order.
    pub entries: Vec<Entry>,
    /// Filled by the builder (pre-filled for builtins).
    pub value: Option<ObjectHandle>,
}

impl Variable {
    pub fn is_builtin(&self) -> bool {
        matches!(self.place, DeclarationPlace::Builtin)
    }

    /// The single logical entry for this variable: attributes concatenated
    /// with last-wins for like-named param attributes (`x: none` cancelling),
    /// the last non-null registration chain, and the last alias.
    pub fn merged_entry(&self) -> Entry {
        let first = &self.entries[0];
        let mut merged = Entry {
            variable: first.variable.clone(),
            local: first.local,
            type_name: first.type_name.clone(),
            alias: None,
            registrations: None,
            attributes: Vec::new(),
            span: first.span,
        };
        for entry in &self.entries {
            for attribute in &entry.attributes {
                match attribute {
                    Attribute::Param(param) => {
                        merged.attributes.retain(|existing| {
                            !matches!(existing, Attribute::Param(p) if p.name.name == param.name.name)
                        });
                        if param.value.is_some() {
                            merged.attributes.push(attribute.clone());
                        }
                    }
                    Attribute::Irq(_) => merged.attributes.push(attribute.clone()),
                    Attribute::Init(_) => {
                        merged
                            .attributes
                            .retain(|existing| !matches!(existing, Attribute::Init(_)));
                        merged.attributes.push(attribute.clone());
                    }
                }
            }
            if entry.registrations.is_some() {
                merged.registrations = entry.registrations.clone();
            }
            if entry.alias.is_some() {
                merged.alias = entry.alias.clone();
            }
        }
        merged
    }
}

/// A variable's merged view, as handed to post-merge validation.
pub struct MergedEntry {
    pub key: VarKey,
    pub entry: Entry,
}

/// Two-layer scoped variable mapping.
///
/// Iteration order is declaration order (builtins first), which downstream
/// passes rely on for deterministic output.
#[derive(Default)]
pub struct VariableStore {
    variables: IndexMap<VarKey, Variable>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a builtin with its type and live object.
    pub fn register_builtin(&mut self, name: &str, type_id: TypeId, handle: ObjectHandle) {
        let key = VarKey::global(name);
        self.variables.insert(
            key.clone(),
            Variable {
                key,
                place: DeclarationPlace::Builtin,
                type_id: Some(type_id),
                entries: Vec::new(),
                value: Some(handle),
            },
        );
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.variables
            .get(&VarKey::global(name))
            .is_some_and(|v| v.is_builtin())
    }

    /// Declare (creating entry) or extend (updating entry) a variable.
    pub fn add_entry(&mut self, entry: Entry) -> Result<(), Diagnostic> {
        if entry.type_name.is_none()
            && entry.attributes.is_empty()
            && entry.registrations.is_none()
            && entry.alias.is_none()
        {
            return Err(Diagnostic::new(
                ErrorKind::EmptyEntry,
                entry.span,
                format!("entry '{}' declares nothing", entry.variable.name),
            )
            .short_underline());
        }

        let file = entry.span.file_id;
        if entry.is_creating() {
            let key = if entry.local {
                VarKey::local(file, entry.variable.name.clone())
            } else {
                VarKey::global(entry.variable.name.clone())
            };
            if self.variables.contains_key(&key) {
                return Err(Diagnostic::new(
                    ErrorKind::VariableAlreadyDeclared,
                    entry.variable.span,
                    format!("variable '{}' is already declared", key),
                ));
            }
            let variable = Variable {
                key: key.clone(),
                place: DeclarationPlace::UserEntry(entry.variable.span),
                type_id: None,
                entries: vec![entry],
                value: None,
            };
            self.variables.insert(key, variable);
            Ok(())
        } else {
            let key = match self.find(&entry.variable.name, file) {
                Some(variable) => variable.key.clone(),
                None => {
                    return Err(Diagnostic::new(
                        ErrorKind::TypeNotSpecifiedInFirstVariableUse,
                        entry.variable.span,
                        format!(
                            "variable '{}' must specify a type in its first use",
                            entry.variable.name
                        ),
                    ));
                }
            };
            let variable = &mut self.variables[&key];
            if variable.is_builtin() {
                debug!(variable = %key, "extending builtin variable");
            }
            variable.entries.push(entry);
            Ok(())
        }
    }

    /// Reference lookup: the referencing file's local scope, then global.
    pub fn find(&self, name: &str, file: u16) -> Option<&Variable> {
        self.variables
            .get(&VarKey::local(file, name))
            .or_else(|| self.variables.get(&VarKey::global(name)))
    }

    pub fn get(&self, key: &VarKey) -> Option<&Variable> {
        self.variables.get(key)
    }

    pub fn get_mut(&mut self, key: &VarKey) -> Option<&mut Variable> {
        self.variables.get_mut(key)
    }

    pub fn set_value(&mut self, key: &VarKey, value: ObjectHandle) {
        if let Some(variable) = self.variables.get_mut(key) {
            variable.value = Some(value);
        }
    }

    /// All variables, in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    pub fn variables_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        self.variables.values_mut()
    }

    /// One merged entry per user-declared or extended variable.
    pub fn merged_entries(&self) -> Vec<MergedEntry> {
        self.variables
            .values()
            .filter(|variable| !variable.entries.is_empty())
            .map(|variable| MergedEntry {
                key: variable.key.clone(),
                entry: variable.merged_entry(),
            })
            .collect()
    }
}
