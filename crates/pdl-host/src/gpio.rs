//! GPIO wiring primitives.
//!
//! A [`GpioLine`] is a connectable output end; a [`GpioReceiver`] accepts
//! level changes on numbered pins. The [`IrqCombiner`] is the fan-in node the
//! driver inserts when several sources target the same destination pin: it
//! ORs its inputs onto one output line.

use std::cell::RefCell;
use std::rc::Rc;

/// Receiving side of a GPIO connection.
pub trait GpioReceiver {
    fn on_gpio(&self, pin: u32, state: bool);
}

/// Output end of a GPIO connection. Cloning shares the endpoint slot.
#[derive(Clone, Default)]
pub struct GpioLine {
    endpoint: Rc<RefCell<Option<(Rc<dyn GpioReceiver>, u32)>>>,
}

impl GpioLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect this line to a receiver pin, replacing any earlier connection.
    pub fn connect(&self, receiver: Rc<dyn GpioReceiver>, pin: u32) {
        *self.endpoint.borrow_mut() = Some((receiver, pin));
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.borrow().is_some()
    }

    /// Drive the line; forwarded to the connected receiver, if any.
    pub fn set(&self, state: bool) {
        let endpoint = self.endpoint.borrow().clone();
        if let Some((receiver, pin)) = endpoint {
            receiver.on_gpio(pin, state);
        }
    }

    /// The connected (receiver, pin), if any.
    pub fn endpoint(&self) -> Option<(Rc<dyn GpioReceiver>, u32)> {
        self.endpoint.borrow().clone()
    }
}

/// Result of looking up a numbered GPIO output on a source object.
pub enum PinLookup {
    /// The source has no such output number.
    Missing,
    /// The output exists but was never initialized by the host object.
    Unset,
    Line(GpioLine),
}

/// OR fan-in of a fixed number of input pins onto one output line.
pub struct IrqCombiner {
    inputs: RefCell<Vec<bool>>,
    output: GpioLine,
}

impl IrqCombiner {
    pub fn new(arity: usize) -> Rc<Self> {
        Rc::new(Self {
            inputs: RefCell::new(vec![false; arity]),
            output: GpioLine::new(),
        })
    }

    pub fn arity(&self) -> usize {
        self.inputs.borrow().len()
    }

    /// The combiner's single output line.
    pub fn output(&self) -> GpioLine {
        self.output.clone()
    }
}

impl GpioReceiver for IrqCombiner {
    fn on_gpio(&self, pin: u32, state: bool) {
        {
            let mut inputs = self.inputs.borrow_mut();
            if let Some(slot) = inputs.get_mut(pin as usize) {
                *slot = state;
            }
        }
        let any = self.inputs.borrow().iter().any(|&s| s);
        self.output.set(any);
    }
}
