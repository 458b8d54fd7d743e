//! Syntax tree for platform descriptions.
//!
//! A [`Description`] is what the parser produces for one source file: a list
//! of `using` directives followed by a list of entries. Nothing in here is
//! resolved — type names are strings, references are names. The resolve
//! crates attach meaning through side tables keyed by variable and by span.

use crate::span::Span;

/// A value paired with the span it was written at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub item: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(item: T, span: Span) -> Self {
        Self { item, span }
    }
}

/// An identifier (variable name, attribute name, or dotted type name).
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// One parsed source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Description {
    pub usings: Vec<Using>,
    pub entries: Vec<Entry>,
}

/// `using "path" [prefix "pfx_"]`
#[derive(Debug, Clone, PartialEq)]
pub struct Using {
    pub path: Spanned<String>,
    pub prefix: Option<Spanned<String>>,
    pub span: Span,
}

/// One declaration/extension unit.
///
/// A *creating* entry carries a type name; an *updating* entry does not and
/// must refer to an already-declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub variable: Ident,
    /// `local` entries are visible only within their own file.
    pub local: bool,
    pub type_name: Option<Ident>,
    /// Display name used when the entry registers.
    pub alias: Option<Spanned<String>>,
    /// `None` = no `@` clause; `Some` with a single register-less info = `@ none`.
    pub registrations: Option<Vec<RegistrationInfo>>,
    pub attributes: Vec<Attribute>,
    pub span: Span,
}

impl Entry {
    pub fn is_creating(&self) -> bool {
        self.type_name.is_some()
    }

    /// `@ none` — registration explicitly cancelled.
    pub fn cancels_registration(&self) -> bool {
        matches!(
            self.registrations.as_deref(),
            Some([info]) if info.register.is_none()
        )
    }

    pub fn param_attributes(&self) -> impl Iterator<Item = &ParamAttribute> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Param(p) => Some(p),
            _ => None,
        })
    }

    pub fn irq_attributes(&self) -> impl Iterator<Item = &IrqAttribute> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Irq(i) => Some(i),
            _ => None,
        })
    }

    pub fn init_attributes(&self) -> impl Iterator<Item = &InitAttribute> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Init(i) => Some(i),
            _ => None,
        })
    }
}

/// `@ register [regpoint]`. A missing `register` cancels registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationInfo {
    pub register: Option<Ident>,
    pub point: Option<Value>,
    pub span: Span,
}

/// One attribute of an entry or inline object.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Param(ParamAttribute),
    Irq(IrqAttribute),
    Init(InitAttribute),
}

impl Attribute {
    pub fn span(&self) -> Span {
        match self {
            Attribute::Param(p) => p.span,
            Attribute::Irq(i) => i.span,
            Attribute::Init(i) => i.span,
        }
    }
}

/// `name: value` — a constructor parameter or a property, decided during
/// validation. `name: none` (value `None`) cancels an earlier-merged value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamAttribute {
    pub name: Ident,
    pub value: Option<Value>,
    pub span: Span,
}

/// `src -> dest@pin` and its extended forms.
///
/// `sources: None` means the source list was omitted and the driver imputes
/// the default GPIO property of the entry's type.
#[derive(Debug, Clone, PartialEq)]
pub struct IrqAttribute {
    pub sources: Option<Vec<IrqEnd>>,
    pub destinations: Vec<IrqDestination>,
    pub span: Span,
}

/// One source end: a numbered GPIO output or a named GPIO property.
#[derive(Debug, Clone, PartialEq)]
pub enum IrqEnd {
    Numbered(Spanned<u32>),
    Named(Ident),
}

impl IrqEnd {
    pub fn span(&self) -> Span {
        match self {
            IrqEnd::Numbered(n) => n.span,
            IrqEnd::Named(i) => i.span,
        }
    }
}

/// One destination: `none` cancels earlier wiring of the same source ends.
#[derive(Debug, Clone, PartialEq)]
pub enum IrqDestination {
    None(Span),
    Target(IrqTarget),
}

/// `peripheral[:localIndex]@pin` or `peripheral[:localIndex]@[p1, p2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct IrqTarget {
    pub peripheral: Ident,
    pub local_index: Option<Spanned<u32>>,
    pub ends: Vec<Spanned<u32>>,
    pub span: Span,
}

/// `init: { line; line }` — raw script lines for the host init handler.
#[derive(Debug, Clone, PartialEq)]
pub struct InitAttribute {
    pub lines: Vec<Spanned<String>>,
    pub span: Span,
}

/// A literal, reference, or inline object in value position.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(Spanned<String>),
    Bool(Spanned<bool>),
    Number(NumberLiteral),
    Range(Box<RangeLiteral>),
    Enum(EnumLiteral),
    Empty(Span),
    Reference(Reference),
    Object(Box<ObjectValue>),
}

impl Value {
    pub fn span(&self) -> Span {
        match self {
            Value::Str(s) => s.span,
            Value::Bool(b) => b.span,
            Value::Number(n) => n.span,
            Value::Range(r) => r.span,
            Value::Enum(e) => e.span,
            Value::Empty(span) => *span,
            Value::Reference(r) => r.span,
            Value::Object(o) => o.span,
        }
    }

    /// Short noun for type-mismatch messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Range(_) => "range",
            Value::Enum(_) => "enum literal",
            Value::Empty(_) => "empty",
            Value::Reference(_) => "reference",
            Value::Object(_) => "inline object",
        }
    }
}

/// Numeric literal with its raw text; parsed when the target type is known.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberLiteral {
    pub text: String,
    pub span: Span,
}

/// `<begin, end>` or the size form `<begin, +size>`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeLiteral {
    pub begin: NumberLiteral,
    pub end: NumberLiteral,
    pub size_form: bool,
    pub span: Span,
}

/// `[Namespace.]TypeName.Member`, segments in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumLiteral {
    /// Namespace and type segments, outermost first; at least one element.
    pub path: Vec<String>,
    pub member: String,
    pub span: Span,
}

/// A bare identifier naming another variable. Its lookup scope is the file
/// it was written in (`span.file_id`).
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub span: Span,
}

/// `TypeName { attribute-list }` — an inline constructor invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    pub type_name: Ident,
    pub attributes: Vec<Attribute>,
    pub span: Span,
}

impl ObjectValue {
    pub fn param_attributes(&self) -> impl Iterator<Item = &ParamAttribute> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Param(p) => Some(p),
            _ => None,
        })
    }

    pub fn init_attributes(&self) -> impl Iterator<Item = &InitAttribute> {
        self.attributes.iter().filter_map(|a| match a {
            Attribute::Init(i) => Some(i),
            _ => None,
        })
    }
}
