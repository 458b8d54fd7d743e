// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::new_without_default)]

//! Test harness for the platform description driver.
//!
//! Builds a fixture catalog of reflectable peripheral types (CPU, mapped
//! memory, timers, GPIO port, interrupt controller), a fake machine with a
//! pre-registered system bus, and a recording init handler, then drives full
//! passes through [`pdl_driver::Driver`].

use pdl_driver::{Driver, DriverError};
use pdl_host::{
    same_object, Capabilities, ClassShape, Constructor, EnumShape, GpioLine, GpioProperty,
    GpioReceiver, HostError, InitHandler, Machine, MemoryRange, NumKind, ObjectHandle, Param,
    PinLookup, Property, RegisterSlot, RegisteredPeripheral, RelativeResolver, RuntimeValue,
    TypeCatalog, TypeDescriptor, TypeId, TypeRef, WellKnown,
};
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

fn downcast<T: 'static>(handle: &ObjectHandle) -> Option<Rc<T>> {
    handle.clone().downcast::<T>().ok()
}

// === Fixture host objects ===

pub struct MachineMarker;

pub struct SysBusObj;

pub struct NullPointObj;

pub struct BusRangeObj {
    pub range: MemoryRange,
    pub offset: u64,
}

pub struct CpuObj {
    pub cpu_type: String,
    pub cpu_id: u64,
    pub has_machine: bool,
    pub performance: Cell<u32>,
    pub received: RefCell<Vec<(u32, bool)>>,
}

impl GpioReceiver for CpuObj {
    fn on_gpio(&self, pin: u32, state: bool) {
        self.received.borrow_mut().push((pin, state));
    }
}

pub struct MemObj {
    pub size: Option<u64>,
}

pub struct TimerObj {
    pub irq: GpioLine,
    pub compare_irq: GpioLine,
    pub frequency: Cell<u64>,
    pub mode: Cell<i64>,
}

pub struct FooObj {
    pub other: Option<ObjectHandle>,
}

pub struct GpioPortObj {
    /// Index -> line; `None` entries are declared-but-uninitialized pins.
    pub lines: RefCell<Vec<Option<GpioLine>>>,
}

pub struct GicObj {
    /// (local receiver index, pin, state)
    pub received: RefCell<Vec<(u32, u32, bool)>>,
}

struct GicLocal {
    gic: Rc<GicObj>,
    index: u32,
}

impl GpioReceiver for GicLocal {
    fn on_gpio(&self, pin: u32, state: bool) {
        self.gic.received.borrow_mut().push((self.index, pin, state));
    }
}

// === Fake machine ===

/// Registration observed through the sysbus register slots.
pub struct Registration {
    pub peripheral: ObjectHandle,
    pub point: String,
}

#[derive(Default)]
pub struct MachineState {
    pub registered: Vec<ObjectHandle>,
    pub registrations: Vec<Registration>,
    pub names: Vec<(ObjectHandle, String)>,
    pub post_creation_calls: usize,
}

pub struct TestMachine {
    object: ObjectHandle,
    machine_type: TypeId,
    sysbus: ObjectHandle,
    sysbus_type: TypeId,
    state: Rc<RefCell<MachineState>>,
}

impl Machine for TestMachine {
    fn machine_object(&self) -> ObjectHandle {
        self.object.clone()
    }

    fn machine_type(&self) -> TypeId {
        self.machine_type
    }

    fn registered_peripherals(&self) -> Vec<RegisteredPeripheral> {
        vec![RegisteredPeripheral {
            name: "sysbus".to_string(),
            ty: self.sysbus_type,
            handle: self.sysbus.clone(),
        }]
    }

    fn is_registered(&self, peripheral: &ObjectHandle) -> bool {
        same_object(peripheral, &self.sysbus)
            || self
                .state
                .borrow()
                .registered
                .iter()
                .any(|handle| same_object(handle, peripheral))
    }

    fn set_local_name(&mut self, peripheral: &ObjectHandle, name: &str) -> Result<(), HostError> {
        if name == "forbidden" {
            return Err(HostError::recoverable("name is reserved"));
        }
        self.state
            .borrow_mut()
            .names
            .push((peripheral.clone(), name.to_string()));
        Ok(())
    }

    fn post_creation(&mut self) {
        self.state.borrow_mut().post_creation_calls += 1;
    }
}

// === Init handler ===

pub struct TestInitHandler {
    pub executed: Rc<RefCell<Vec<String>>>,
}

impl InitHandler for TestInitHandler {
    fn validate(&self, lines: &[String]) -> Result<(), String> {
        match lines.iter().find(|line| line.contains("invalid")) {
            Some(line) => Err(format!("unknown command: {}", line)),
            None => Ok(()),
        }
    }

    fn execute(&self, _target: &ObjectHandle, lines: &[String]) -> Result<(), String> {
        for line in lines {
            if line.contains("failing") {
                return Err(format!("command failed: {}", line));
            }
            self.executed.borrow_mut().push(line.clone());
        }
        Ok(())
    }
}

// === Harness ===

pub struct TestHarness {
    pub catalog: TypeCatalog,
    pub machine: TestMachine,
    pub state: Rc<RefCell<MachineState>>,
    /// Every object built through a fixture constructor: (type tag, handle).
    pub constructed: Rc<RefCell<Vec<(&'static str, ObjectHandle)>>>,
    pub executed_inits: Rc<RefCell<Vec<String>>>,
}

impl TestHarness {
    pub fn new() -> Self {
        let state = Rc::new(RefCell::new(MachineState::default()));
        let constructed: Constructed = Rc::new(RefCell::new(Vec::new()));
        let (catalog, machine_type, sysbus_type) = build_catalog(&state, &constructed);
        let machine = TestMachine {
            object: Rc::new(MachineMarker),
            machine_type,
            sysbus: Rc::new(SysBusObj),
            sysbus_type,
            state: state.clone(),
        };
        Self {
            catalog,
            machine,
            state,
            constructed,
            executed_inits: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Run one full pass over description text.
    pub fn apply(&mut self, source: &str) -> Result<(), DriverError> {
        let resolver = RelativeResolver;
        let handler = TestInitHandler {
            executed: self.executed_inits.clone(),
        };
        Driver::new(&self.catalog, &mut self.machine, &resolver, &handler)
            .process_description(source)
    }

    /// Run one full pass over a description file.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), DriverError> {
        let resolver = RelativeResolver;
        let handler = TestInitHandler {
            executed: self.executed_inits.clone(),
        };
        Driver::new(&self.catalog, &mut self.machine, &resolver, &handler).process_file(path)
    }

    /// Registered peripheral by local name.
    pub fn named(&self, name: &str) -> Option<ObjectHandle> {
        self.state
            .borrow()
            .names
            .iter()
            .find(|(_, n)| n == name)
            .map(|(handle, _)| handle.clone())
    }

    /// All constructed objects of one fixture tag, in construction order.
    pub fn constructed_of<T: 'static>(&self, tag: &str) -> Vec<Rc<T>> {
        self.constructed
            .borrow()
            .iter()
            .filter(|(t, _)| *t == tag)
            .filter_map(|(_, handle)| downcast::<T>(handle))
            .collect()
    }
}

/// Error kind of a failed pass, for assertions.
pub fn error_kind(result: Result<(), DriverError>) -> pdl_ast::ErrorKind {
    match result {
        Err(DriverError::Parsing { kind, .. }) => kind,
        Err(DriverError::Host(err)) => panic!("expected diagnostic, got host error: {}", err),
        Ok(()) => panic!("expected failure, pass succeeded"),
    }
}

/// Rendered diagnostic of a failed pass.
pub fn rendered(result: Result<(), DriverError>) -> String {
    match result {
        Err(DriverError::Parsing { rendered, .. }) => rendered,
        Err(DriverError::Host(err)) => panic!("expected diagnostic, got host error: {}", err),
        Ok(()) => panic!("expected failure, pass succeeded"),
    }
}

// === Catalog assembly ===

type Constructed = Rc<RefCell<Vec<(&'static str, ObjectHandle)>>>;

fn u64_type() -> TypeRef {
    TypeRef::Numeric {
        kind: NumKind::U64,
        nullable: false,
    }
}

fn build_catalog(
    state: &Rc<RefCell<MachineState>>,
    constructed: &Constructed,
) -> (TypeCatalog, TypeId, TypeId) {
    let mut catalog = TypeCatalog::new("Peripherals");

    let i_peripheral = catalog.add(TypeDescriptor::interface("IPeripheral"));
    let i_bus_peripheral = catalog.add(TypeDescriptor::interface("IBusPeripheral"));
    let i_cpu = catalog.add(TypeDescriptor::interface("ICpu"));

    let machine_type = catalog.add(TypeDescriptor::class(
        "Peripherals.Machine",
        ClassShape::default(),
    ));

    let null_point = catalog.add(TypeDescriptor::class(
        "Peripherals.NullRegistrationPoint",
        ClassShape::default(),
    ));

    let bus_range = catalog.add(TypeDescriptor::class(
        "Peripherals.BusRangeRegistration",
        ClassShape {
            constructors: vec![Constructor {
                params: vec![
                    Param {
                        name: "range".to_string(),
                        ty: TypeRef::Range,
                        default: None,
                    },
                    Param {
                        name: "offset".to_string(),
                        ty: u64_type(),
                        default: Some(RuntimeValue::Unsigned(0)),
                    },
                ],
                invoke: Box::new(|args| {
                    let range = match &args[0] {
                        RuntimeValue::Range(range) => *range,
                        other => return Err(HostError::cast(format!("range: {:?}", other))),
                    };
                    let offset = match &args[1] {
                        RuntimeValue::Unsigned(offset) => *offset,
                        other => return Err(HostError::cast(format!("offset: {:?}", other))),
                    };
                    Ok(Rc::new(BusRangeObj { range, offset }) as ObjectHandle)
                }),
            }],
            ..ClassShape::default()
        },
    ));

    let mode_enum = catalog.add(TypeDescriptor::enumeration(
        "Peripherals.Timers.Mode",
        EnumShape {
            members: vec![("OneShot".to_string(), 0), ("Periodic".to_string(), 1)],
            accepts_any_numeric: false,
        },
    ));

    // System bus: registers bus peripherals by range and CPUs without a
    // registration point.
    let range_state = state.clone();
    let cpu_state = state.clone();
    let sysbus = catalog.add(
        TypeDescriptor::class(
            "Peripherals.SystemBus",
            ClassShape {
                register_slots: vec![
                    RegisterSlot {
                        peripheral: i_bus_peripheral,
                        point: bus_range,
                        register: Box::new(move |_register, peripheral, point| {
                            let range = downcast::<BusRangeObj>(point)
                                .ok_or_else(|| HostError::cast("expected a bus range registration"))?;
                            let mut state = range_state.borrow_mut();
                            state.registered.push(peripheral.clone());
                            state.registrations.push(Registration {
                                peripheral: peripheral.clone(),
                                point: format!(
                                    "range {:#x}..{:#x}+{}",
                                    range.range.begin, range.range.end, range.offset
                                ),
                            });
                            Ok(())
                        }),
                    },
                    RegisterSlot {
                        peripheral: i_cpu,
                        point: null_point,
                        register: Box::new(move |_register, peripheral, point| {
                            if downcast::<NullPointObj>(point).is_none() {
                                return Err(HostError::cast("expected the null registration point"));
                            }
                            let mut state = cpu_state.borrow_mut();
                            state.registered.push(peripheral.clone());
                            state.registrations.push(Registration {
                                peripheral: peripheral.clone(),
                                point: "null".to_string(),
                            });
                            Ok(())
                        }),
                    },
                ],
                ..ClassShape::default()
            },
        )
        .with_interface(i_peripheral),
    );

    // CPU: constructed with a type string, an optional id, and the ambient
    // machine; receives interrupts.
    let cpu_log = constructed.clone();
    catalog.add(
        TypeDescriptor::class(
            "Peripherals.CPU.ARMv7A",
            ClassShape {
                constructors: vec![Constructor {
                    params: vec![
                        Param {
                            name: "cpuType".to_string(),
                            ty: TypeRef::Str,
                            default: None,
                        },
                        Param {
                            name: "cpuId".to_string(),
                            ty: u64_type(),
                            default: Some(RuntimeValue::Unsigned(0)),
                        },
                        Param {
                            name: "machine".to_string(),
                            ty: TypeRef::Machine,
                            default: None,
                        },
                    ],
                    invoke: Box::new(move |args| {
                        let cpu_type = match &args[0] {
                            RuntimeValue::Str(s) => s.clone(),
                            other => return Err(HostError::cast(format!("cpuType: {:?}", other))),
                        };
                        let cpu_id = match &args[1] {
                            RuntimeValue::Unsigned(id) => *id,
                            other => return Err(HostError::cast(format!("cpuId: {:?}", other))),
                        };
                        if cpu_type.is_empty() {
                            return Err(HostError::recoverable("cpuType must not be empty"));
                        }
                        let has_machine = matches!(&args[2], RuntimeValue::Object(_));
                        let obj = Rc::new(CpuObj {
                            cpu_type,
                            cpu_id,
                            has_machine,
                            performance: Cell::new(0),
                            received: RefCell::new(Vec::new()),
                        });
                        cpu_log.borrow_mut().push(("cpu", obj.clone() as ObjectHandle));
                        Ok(obj as ObjectHandle)
                    }),
                }],
                properties: vec![Property {
                    name: "PerformanceInMips".to_string(),
                    ty: TypeRef::Numeric {
                        kind: NumKind::U32,
                        nullable: false,
                    },
                    writable: true,
                    set: Some(Box::new(|handle, value| {
                        let cpu =
                            downcast::<CpuObj>(handle).ok_or_else(|| HostError::cast("not a CPU"))?;
                        match value {
                            RuntimeValue::Unsigned(v) => {
                                cpu.performance.set(*v as u32);
                                Ok(())
                            }
                            other => Err(HostError::cast(format!("PerformanceInMips: {:?}", other))),
                        }
                    })),
                    gpio: None,
                }],
                capabilities: Capabilities {
                    gpio_receiver: Some(Box::new(|handle| {
                        downcast::<CpuObj>(handle).map(|cpu| cpu as Rc<dyn GpioReceiver>)
                    })),
                    ..Capabilities::default()
                },
                ..ClassShape::default()
            },
        )
        .with_interface(i_cpu)
        .with_interface(i_peripheral),
    );

    // Mapped memory: two constructors so that cancelling `size` across a
    // merge flips the selected overload.
    let mem_sized_log = constructed.clone();
    let mem_plain_log = constructed.clone();
    catalog.add(
        TypeDescriptor::class(
            "Peripherals.Memory.MappedMemory",
            ClassShape {
                constructors: vec![
                    Constructor {
                        params: vec![Param {
                            name: "size".to_string(),
                            ty: u64_type(),
                            default: None,
                        }],
                        invoke: Box::new(move |args| {
                            let size = match &args[0] {
                                RuntimeValue::Unsigned(size) => *size,
                                other => return Err(HostError::cast(format!("size: {:?}", other))),
                            };
                            let obj = Rc::new(MemObj { size: Some(size) });
                            mem_sized_log
                                .borrow_mut()
                                .push(("memory", obj.clone() as ObjectHandle));
                            Ok(obj as ObjectHandle)
                        }),
                    },
                    Constructor {
                        params: vec![],
                        invoke: Box::new(move |_args| {
                            let obj = Rc::new(MemObj { size: None });
                            mem_plain_log
                                .borrow_mut()
                                .push(("memory", obj.clone() as ObjectHandle));
                            Ok(obj as ObjectHandle)
                        }),
                    },
                ],
                ..ClassShape::default()
            },
        )
        .with_interface(i_bus_peripheral)
        .with_interface(i_peripheral),
    );

    // Timer: GPIO sources (IRQ is the default interrupt), an enum property,
    // and bus registration so it can sit on the system bus.
    let timer_log = constructed.clone();
    catalog.add(
        TypeDescriptor::class(
            "Peripherals.Timers.Timer",
            ClassShape {
                constructors: vec![Constructor {
                    params: vec![],
                    invoke: Box::new(move |_args| {
                        let obj = Rc::new(TimerObj {
                            irq: GpioLine::new(),
                            compare_irq: GpioLine::new(),
                            frequency: Cell::new(0),
                            mode: Cell::new(0),
                        });
                        timer_log
                            .borrow_mut()
                            .push(("timer", obj.clone() as ObjectHandle));
                        Ok(obj as ObjectHandle)
                    }),
                }],
                properties: vec![
                    Property {
                        name: "IRQ".to_string(),
                        ty: TypeRef::Object(i_peripheral),
                        writable: false,
                        set: None,
                        gpio: Some(GpioProperty {
                            default_interrupt: true,
                            get: Box::new(|handle| {
                                downcast::<TimerObj>(handle).map(|timer| timer.irq.clone())
                            }),
                        }),
                    },
                    Property {
                        name: "CompareIRQ".to_string(),
                        ty: TypeRef::Object(i_peripheral),
                        writable: false,
                        set: None,
                        gpio: Some(GpioProperty {
                            default_interrupt: false,
                            get: Box::new(|handle| {
                                downcast::<TimerObj>(handle).map(|timer| timer.compare_irq.clone())
                            }),
                        }),
                    },
                    Property {
                        name: "frequency".to_string(),
                        ty: u64_type(),
                        writable: true,
                        set: Some(Box::new(|handle, value| {
                            let timer = downcast::<TimerObj>(handle)
                                .ok_or_else(|| HostError::cast("not a timer"))?;
                            match value {
                                RuntimeValue::Unsigned(v) => {
                                    timer.frequency.set(*v);
                                    Ok(())
                                }
                                other => Err(HostError::cast(format!("frequency: {:?}", other))),
                            }
                        })),
                        gpio: None,
                    },
                    Property {
                        name: "mode".to_string(),
                        ty: TypeRef::Enum(mode_enum),
                        writable: true,
                        set: Some(Box::new(|handle, value| {
                            let timer = downcast::<TimerObj>(handle)
                                .ok_or_else(|| HostError::cast("not a timer"))?;
                            match value {
                                RuntimeValue::EnumMember { value, .. } => {
                                    timer.mode.set(*value);
                                    Ok(())
                                }
                                other => Err(HostError::cast(format!("mode: {:?}", other))),
                            }
                        })),
                        gpio: None,
                    },
                ],
                ..ClassShape::default()
            },
        )
        .with_interface(i_bus_peripheral)
        .with_interface(i_peripheral),
    );

    // Foo: takes another peripheral, for dependency and cycle scenarios.
    let foo_other_log = constructed.clone();
    let foo_plain_log = constructed.clone();
    catalog.add(
        TypeDescriptor::class(
            "Peripherals.Foo",
            ClassShape {
                constructors: vec![
                    Constructor {
                        params: vec![Param {
                            name: "other".to_string(),
                            ty: TypeRef::Object(i_peripheral),
                            default: None,
                        }],
                        invoke: Box::new(move |args| {
                            let other = match &args[0] {
                                RuntimeValue::Object(handle) => Some(handle.clone()),
                                RuntimeValue::None => None,
                                other => {
                                    return Err(HostError::cast(format!("other: {:?}", other)));
                                }
                            };
                            let obj = Rc::new(FooObj { other });
                            foo_other_log
                                .borrow_mut()
                                .push(("foo", obj.clone() as ObjectHandle));
                            Ok(obj as ObjectHandle)
                        }),
                    },
                    Constructor {
                        params: vec![],
                        invoke: Box::new(move |_args| {
                            let obj = Rc::new(FooObj { other: None });
                            foo_plain_log
                                .borrow_mut()
                                .push(("foo", obj.clone() as ObjectHandle));
                            Ok(obj as ObjectHandle)
                        }),
                    },
                ],
                ..ClassShape::default()
            },
        )
        .with_interface(i_peripheral),
    );

    // GPIO port: numbered outputs 0 and 1 are live, 2 exists but is never
    // initialized, anything else is missing.
    let port_log = constructed.clone();
    catalog.add(
        TypeDescriptor::class(
            "Peripherals.GpioPort",
            ClassShape {
                constructors: vec![Constructor {
                    params: vec![],
                    invoke: Box::new(move |_args| {
                        let obj = Rc::new(GpioPortObj {
                            lines: RefCell::new(vec![
                                Some(GpioLine::new()),
                                Some(GpioLine::new()),
                                None,
                            ]),
                        });
                        port_log
                            .borrow_mut()
                            .push(("port", obj.clone() as ObjectHandle));
                        Ok(obj as ObjectHandle)
                    }),
                }],
                capabilities: Capabilities {
                    numbered_outputs: Some(Box::new(|handle, number| {
                        match downcast::<GpioPortObj>(handle) {
                            Some(port) => {
                                let lines = port.lines.borrow();
                                match lines.get(number as usize) {
                                    None => PinLookup::Missing,
                                    Some(None) => PinLookup::Unset,
                                    Some(Some(line)) => PinLookup::Line(line.clone()),
                                }
                            }
                            None => PinLookup::Missing,
                        }
                    })),
                    ..Capabilities::default()
                },
                ..ClassShape::default()
            },
        )
        .with_interface(i_peripheral),
    );

    // Interrupt controller with local receivers 0 and 1.
    let gic_log = constructed.clone();
    catalog.add(
        TypeDescriptor::class(
            "Peripherals.Gic",
            ClassShape {
                constructors: vec![Constructor {
                    params: vec![],
                    invoke: Box::new(move |_args| {
                        let obj = Rc::new(GicObj {
                            received: RefCell::new(Vec::new()),
                        });
                        gic_log
                            .borrow_mut()
                            .push(("gic", obj.clone() as ObjectHandle));
                        Ok(obj as ObjectHandle)
                    }),
                }],
                capabilities: Capabilities {
                    gpio_receiver: Some(Box::new(|handle| {
                        downcast::<GicObj>(handle)
                            .map(|gic| Rc::new(GicLocal { gic, index: 0 }) as Rc<dyn GpioReceiver>)
                    })),
                    local_receivers: Some(Box::new(|handle, index| {
                        if index >= 2 {
                            return None;
                        }
                        downcast::<GicObj>(handle)
                            .map(|gic| Rc::new(GicLocal { gic, index }) as Rc<dyn GpioReceiver>)
                    })),
                    ..Capabilities::default()
                },
                ..ClassShape::default()
            },
        )
        .with_interface(i_peripheral),
    );

    catalog.set_well_known(WellKnown {
        null_registration_point: Some(null_point),
        bus_peripheral: Some(i_bus_peripheral),
        bus_registration_point: Some(bus_range),
    });
    catalog.set_null_point_instance(Rc::new(NullPointObj));

    (catalog, machine_type, sysbus)
}
