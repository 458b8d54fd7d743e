//! The host type catalog.
//!
//! The driver never touches the host language's reflection directly; it
//! works against this registry of descriptors. The host (or a test harness)
//! populates a [`TypeCatalog`] with one [`TypeDescriptor`] per reflectable
//! type: constructors with named parameters, settable properties, GPIO
//! capabilities, and the register slots a register type offers
//! (`IPeripheralRegister<TPeripheral, TRegistrationPoint>` in the original
//! object model becomes one [`RegisterSlot`] per implementation).

use crate::error::HostError;
use crate::gpio::{GpioLine, GpioReceiver, PinLookup};
use crate::value::{ObjectHandle, RuntimeValue};
use indexmap::IndexMap;
use std::rc::Rc;

/// Interned type identity within one catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

/// Constructor invocation: arguments arrive converted, in declared
/// parameter order, with defaults already filled in by the driver.
pub type CtorFn = Box<dyn Fn(&[RuntimeValue]) -> Result<ObjectHandle, HostError>>;

/// Property setter.
pub type SetterFn = Box<dyn Fn(&ObjectHandle, &RuntimeValue) -> Result<(), HostError>>;

/// Getter for a GPIO-typed property. `None` means the host object never
/// initialized the line.
pub type GpioGetterFn = Box<dyn Fn(&ObjectHandle) -> Option<GpioLine>>;

/// Lookup of a numbered GPIO output.
pub type NumberedOutputFn = Box<dyn Fn(&ObjectHandle, u32) -> PinLookup>;

/// Downcast of an object to its GPIO receiver surface.
pub type ReceiverFn = Box<dyn Fn(&ObjectHandle) -> Option<Rc<dyn GpioReceiver>>>;

/// Lookup of a local GPIO receiver by index.
pub type LocalReceiverFn = Box<dyn Fn(&ObjectHandle, u32) -> Option<Rc<dyn GpioReceiver>>>;

/// Registration: `(register, peripheral, registration point)`.
pub type RegisterFn =
    Box<dyn Fn(&ObjectHandle, &ObjectHandle, &ObjectHandle) -> Result<(), HostError>>;

/// What a constructor parameter or property accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Str,
    Bool,
    /// The host machine type; absent arguments default to the ambient machine.
    Machine,
    Range,
    Numeric { kind: NumKind, nullable: bool },
    Enum(TypeId),
    Object(TypeId),
}

/// Numeric parameter kinds with their accepted ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl NumKind {
    pub fn is_float(self) -> bool {
        matches!(self, NumKind::F32 | NumKind::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, NumKind::I8 | NumKind::I16 | NumKind::I32 | NumKind::I64)
    }

    /// Does an integer literal fit this kind?
    pub fn contains_int(self, value: i128) -> bool {
        match self {
            NumKind::U8 => u8::try_from(value).is_ok(),
            NumKind::U16 => u16::try_from(value).is_ok(),
            NumKind::U32 => u32::try_from(value).is_ok(),
            NumKind::U64 => u64::try_from(value).is_ok(),
            NumKind::I8 => i8::try_from(value).is_ok(),
            NumKind::I16 => i16::try_from(value).is_ok(),
            NumKind::I32 => i32::try_from(value).is_ok(),
            NumKind::I64 => i64::try_from(value).is_ok(),
            NumKind::F32 | NumKind::F64 => true,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumKind::U8 => "u8",
            NumKind::U16 => "u16",
            NumKind::U32 => "u32",
            NumKind::U64 => "u64",
            NumKind::I8 => "i8",
            NumKind::I16 => "i16",
            NumKind::I32 => "i32",
            NumKind::I64 => "i64",
            NumKind::F32 => "f32",
            NumKind::F64 => "f64",
        }
    }
}

/// One constructor parameter.
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    /// Language-level default; accepted when the attribute is absent.
    pub default: Option<RuntimeValue>,
}

/// One public constructor.
pub struct Constructor {
    pub params: Vec<Param>,
    pub invoke: CtorFn,
}

/// A GPIO-typed instance property usable as an interrupt source.
pub struct GpioProperty {
    /// Marked as the type's default interrupt.
    pub default_interrupt: bool,
    pub get: GpioGetterFn,
}

/// One instance property.
pub struct Property {
    pub name: String,
    pub ty: TypeRef,
    pub writable: bool,
    pub set: Option<SetterFn>,
    pub gpio: Option<GpioProperty>,
}

/// GPIO capabilities of a class. A `None` field means the capability is not
/// implemented by the type.
#[derive(Default)]
pub struct Capabilities {
    pub numbered_outputs: Option<NumberedOutputFn>,
    pub gpio_receiver: Option<ReceiverFn>,
    pub local_receivers: Option<LocalReceiverFn>,
}

/// One `IPeripheralRegister<TPeripheral, TRegistrationPoint>` implementation
/// on a register type.
pub struct RegisterSlot {
    pub peripheral: TypeId,
    pub point: TypeId,
    pub register: RegisterFn,
}

/// Reflectable shape of a class.
#[derive(Default)]
pub struct ClassShape {
    pub constructors: Vec<Constructor>,
    pub properties: Vec<Property>,
    pub capabilities: Capabilities,
    pub register_slots: Vec<RegisterSlot>,
}

/// Reflectable shape of an enum. The enum's namespace path is the dotted
/// catalog name of the type itself.
pub struct EnumShape {
    pub members: Vec<(String, i64)>,
    /// The enum advertises that any numeric value is acceptable.
    pub accepts_any_numeric: bool,
}

pub enum TypeKind {
    Class(ClassShape),
    Enum(EnumShape),
    /// Pure capability marker (interface); carries no shape of its own.
    Interface,
}

/// One registered type.
pub struct TypeDescriptor {
    /// Fully-qualified dotted name.
    pub name: String,
    pub base: Option<TypeId>,
    pub interfaces: Vec<TypeId>,
    pub kind: TypeKind,
}

impl TypeDescriptor {
    pub fn class(name: impl Into<String>, shape: ClassShape) -> Self {
        Self {
            name: name.into(),
            base: None,
            interfaces: Vec::new(),
            kind: TypeKind::Class(shape),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            interfaces: Vec::new(),
            kind: TypeKind::Interface,
        }
    }

    pub fn enumeration(name: impl Into<String>, shape: EnumShape) -> Self {
        Self {
            name: name.into(),
            base: None,
            interfaces: Vec::new(),
            kind: TypeKind::Enum(shape),
        }
    }

    pub fn with_base(mut self, base: TypeId) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_interface(mut self, interface: TypeId) -> Self {
        self.interfaces.push(interface);
        self
    }
}

/// Well-known types the registration rules need to recognize.
#[derive(Debug, Clone, Copy, Default)]
pub struct WellKnown {
    /// Placeholder registration point accepted when no point value is given.
    pub null_registration_point: Option<TypeId>,
    /// Marker interface of bus peripherals.
    pub bus_peripheral: Option<TypeId>,
    /// Base type of bus registration points.
    pub bus_registration_point: Option<TypeId>,
}

/// The registry of all reflectable host types.
pub struct TypeCatalog {
    types: Vec<TypeDescriptor>,
    by_name: IndexMap<String, TypeId>,
    default_namespace: String,
    well_known: WellKnown,
    null_point_instance: Option<ObjectHandle>,
}

impl TypeCatalog {
    pub fn new(default_namespace: impl Into<String>) -> Self {
        Self {
            types: Vec::new(),
            by_name: IndexMap::new(),
            default_namespace: default_namespace.into(),
            well_known: WellKnown::default(),
            null_point_instance: None,
        }
    }

    /// Register a descriptor under its fully-qualified name.
    ///
    /// # Panics
    /// Panics if the name is already taken; catalogs are built once by the
    /// host, not mutated concurrently with a driver pass.
    pub fn add(&mut self, descriptor: TypeDescriptor) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        let previous = self.by_name.insert(descriptor.name.clone(), id);
        assert!(
            previous.is_none(),
            "type {} registered twice",
            descriptor.name
        );
        self.types.push(descriptor);
        id
    }

    /// Find a type by name: first as given, then under the default
    /// peripherals namespace.
    pub fn resolve(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied().or_else(|| {
            self.by_name
                .get(&format!("{}.{}", self.default_namespace, name))
                .copied()
        })
    }

    pub fn get(&self, id: TypeId) -> &TypeDescriptor {
        &self.types[id.0 as usize]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.get(id).name
    }

    /// Class shape of a type, if it is a class.
    pub fn class(&self, id: TypeId) -> Option<&ClassShape> {
        match &self.get(id).kind {
            TypeKind::Class(shape) => Some(shape),
            _ => None,
        }
    }

    pub fn enum_shape(&self, id: TypeId) -> Option<&EnumShape> {
        match &self.get(id).kind {
            TypeKind::Enum(shape) => Some(shape),
            _ => None,
        }
    }

    /// Is `source` usable where `target` is expected (identity, base-chain,
    /// or interface implementation, transitively)?
    pub fn is_assignable(&self, target: TypeId, source: TypeId) -> bool {
        if target == source {
            return true;
        }
        let descriptor = self.get(source);
        if let Some(base) = descriptor.base {
            if self.is_assignable(target, base) {
                return true;
            }
        }
        descriptor
            .interfaces
            .iter()
            .any(|&interface| self.is_assignable(target, interface))
    }

    /// Is `a` strictly more derived than `b`?
    pub fn strictly_derives(&self, a: TypeId, b: TypeId) -> bool {
        a != b && self.is_assignable(b, a)
    }

    pub fn well_known(&self) -> WellKnown {
        self.well_known
    }

    pub fn set_well_known(&mut self, well_known: WellKnown) {
        self.well_known = well_known;
    }

    /// The shared null-registration-point instance.
    pub fn null_point_instance(&self) -> Option<ObjectHandle> {
        self.null_point_instance.clone()
    }

    pub fn set_null_point_instance(&mut self, instance: ObjectHandle) {
        self.null_point_instance = Some(instance);
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }
}
