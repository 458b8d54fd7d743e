//! Runtime values exchanged with host code.

use crate::catalog::TypeId;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A live host object. The driver is single-threaded; objects are shared by
/// reference counting and identity is pointer identity.
pub type ObjectHandle = Rc<dyn Any>;

/// Are two handles the same object?
pub fn same_object(a: &ObjectHandle, b: &ObjectHandle) -> bool {
    Rc::ptr_eq(a, b)
}

/// A byte range on a system bus, `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRange {
    pub begin: u64,
    pub end: u64,
}

impl MemoryRange {
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    pub fn from_size(begin: u64, size: u64) -> Self {
        Self {
            begin,
            end: begin.saturating_add(size),
        }
    }
}

/// A converted value handed to a constructor, setter, or register method.
#[derive(Clone)]
pub enum RuntimeValue {
    Str(String),
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Range(MemoryRange),
    EnumMember { ty: TypeId, value: i64 },
    Object(ObjectHandle),
    /// Null reference / default-initialized value.
    None,
}

impl fmt::Debug for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Str(s) => write!(f, "Str({:?})", s),
            RuntimeValue::Bool(b) => write!(f, "Bool({})", b),
            RuntimeValue::Unsigned(v) => write!(f, "Unsigned({})", v),
            RuntimeValue::Signed(v) => write!(f, "Signed({})", v),
            RuntimeValue::Float(v) => write!(f, "Float({})", v),
            RuntimeValue::Range(r) => write!(f, "Range({:#x}..{:#x})", r.begin, r.end),
            RuntimeValue::EnumMember { ty, value } => write!(f, "Enum({:?}, {})", ty, value),
            RuntimeValue::Object(_) => write!(f, "Object(..)"),
            RuntimeValue::None => write!(f, "None"),
        }
    }
}
