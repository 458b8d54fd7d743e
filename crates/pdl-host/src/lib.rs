// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Host capability catalog for the platform description driver.
//!
//! The driver validates descriptions against, and builds objects through,
//! the interfaces in this crate: a [`catalog::TypeCatalog`] of reflectable
//! type descriptors, the [`machine::Machine`] trait, GPIO wiring primitives,
//! and the init-script and include-resolution collaborators. The driver is
//! single-threaded; objects are `Rc<dyn Any>` handles and all capability
//! closures run on the driver's thread.

pub mod catalog;
pub mod error;
pub mod gpio;
pub mod handlers;
pub mod machine;
pub mod value;

pub use catalog::{
    Capabilities, ClassShape, Constructor, EnumShape, GpioProperty, NumKind, Param, Property,
    RegisterSlot, TypeCatalog, TypeDescriptor, TypeId, TypeKind, TypeRef, WellKnown,
};
pub use error::HostError;
pub use gpio::{GpioLine, GpioReceiver, IrqCombiner, PinLookup};
pub use handlers::{InitHandler, RelativeResolver, UsingResolver};
pub use machine::{Machine, RegisteredPeripheral, MACHINE_KEYWORD};
pub use value::{same_object, MemoryRange, ObjectHandle, RuntimeValue};
