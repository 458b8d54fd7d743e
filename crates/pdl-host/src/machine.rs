//! The host machine, as the driver sees it.

use crate::catalog::TypeId;
use crate::error::HostError;
use crate::value::ObjectHandle;

/// The fixed variable name under which the machine itself is available.
pub const MACHINE_KEYWORD: &str = "machine";

/// A peripheral already registered on the machine at driver start.
pub struct RegisteredPeripheral {
    pub name: String,
    pub ty: TypeId,
    pub handle: ObjectHandle,
}

/// The driver's view of the host machine.
///
/// Registration itself goes through the register slots of the catalog; the
/// machine only answers registration status, names peripherals, and receives
/// the post-creation notification.
pub trait Machine {
    /// The machine itself as a referenceable object.
    fn machine_object(&self) -> ObjectHandle;

    fn machine_type(&self) -> TypeId;

    /// Peripherals registered right now, in registration order.
    fn registered_peripherals(&self) -> Vec<RegisteredPeripheral>;

    fn is_registered(&self, peripheral: &ObjectHandle) -> bool;

    fn set_local_name(&mut self, peripheral: &ObjectHandle, name: &str) -> Result<(), HostError>;

    /// Invoked once after a successful pass.
    fn post_creation(&mut self);
}
