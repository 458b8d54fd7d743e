// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! The builder: executes validated plans against the host machine.
//!
//! Phases run in a fixed order: create objects in creation order (nested
//! object values constructed on demand and queued for deferred property
//! setting and init), pre-build IRQ combiners from fan-in counts, set
//! properties and wire interrupts, drain the object-value property queue,
//! register peripherals in registration order with a fixpoint loop, run the
//! init phase, and finally notify the machine.

use indexmap::IndexMap;
use pdl_ast::{Diagnostic, ErrorKind, Span, Value};
use pdl_host::{
    GpioReceiver, HostError, InitHandler, IrqCombiner, Machine, ObjectHandle, PinLookup,
    RuntimeValue, TypeId,
};
use pdl_resolve::convert::{convert_simple, ConvFail};
use pdl_resolve::ctors::{ArgPlan, CtorPlan};
use pdl_resolve::irq::{DestKey, SourceEnd, Wire};
use pdl_resolve::registration::PointPlan;
use pdl_resolve::store::{VarKey, VariableStore};
use pdl_resolve::validate::{Plans, PropertyAssignment};
use pdl_resolve::Ctx;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;

/// A build failure: a reportable diagnostic, or a fatal host error that
/// passes through untouched.
#[derive(Debug)]
pub enum BuildError {
    Diagnostic(Diagnostic),
    Host(HostError),
}

impl From<Diagnostic> for BuildError {
    fn from(diagnostic: Diagnostic) -> Self {
        BuildError::Diagnostic(diagnostic)
    }
}

/// One combiner with its input cursor.
struct CombinerConnection {
    combiner: Rc<IrqCombiner>,
    next_input: u32,
    output_connected: bool,
}

/// Executes the plans of one driver pass.
pub struct Builder<'a> {
    ctx: &'a Ctx<'a>,
    machine: &'a mut dyn Machine,
    init_handler: &'a dyn InitHandler,
    store: &'a mut VariableStore,
    plans: &'a Plans,
    creation_order: &'a [VarKey],
    registration_order: &'a [VarKey],

    combiners: IndexMap<DestKey, CombinerConnection>,
    /// Constructed object values, by the object value's span.
    objects: IndexMap<Span, ObjectHandle>,
    /// Object values awaiting deferred property setting (FIFO).
    property_queue: VecDeque<Span>,
    /// Object values awaiting init execution (FIFO).
    init_queue: VecDeque<(ObjectHandle, Vec<String>, Span)>,
}

impl<'a> Builder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &'a Ctx<'a>,
        machine: &'a mut dyn Machine,
        init_handler: &'a dyn InitHandler,
        store: &'a mut VariableStore,
        plans: &'a Plans,
        creation_order: &'a [VarKey],
        registration_order: &'a [VarKey],
    ) -> Self {
        Self {
            ctx,
            machine,
            init_handler,
            store,
            plans,
            creation_order,
            registration_order,
            combiners: IndexMap::new(),
            objects: IndexMap::new(),
            property_queue: VecDeque::new(),
            init_queue: VecDeque::new(),
        }
    }

    pub fn build(mut self) -> Result<(), BuildError> {
        self.create_all()?;
        debug!("objects created");
        self.prepare_combiners();
        self.apply_all()?;
        debug!("properties set, interrupts wired");
        self.register_all()?;
        debug!("peripherals registered");
        self.run_init_phase()?;
        self.machine.post_creation();
        Ok(())
    }

    fn create_all(&mut self) -> Result<(), BuildError> {
        for key in self.creation_order {
            let plan = &self.plans.entries[key];
            let Some(ctor) = &plan.ctor else {
                continue;
            };
            let args = self.resolve_args(ctor)?;
            let handle = self
                .invoke_ctor(ctor.type_id, ctor.ctor_index, &args)
                .map_err(|err| self.host_to_diag(err, ErrorKind::ConstructionException, plan.variable_span))?;
            self.store.set_value(key, handle);
        }
        Ok(())
    }

    /// Pre-construct one combiner per destination pin targeted by more than
    /// one wire. Input arity equals the fan-in count; insertion order is the
    /// declaration order of the first wire per destination.
    fn prepare_combiners(&mut self) {
        let mut counts: IndexMap<DestKey, usize> = IndexMap::new();
        for plan in self.plans.entries.values() {
            for wire in &plan.wires {
                if let Some(dest) = &wire.dest {
                    *counts.entry(dest.key()).or_insert(0) += 1;
                }
            }
        }
        for (key, count) in counts {
            if count > 1 {
                debug!(dest = ?key, inputs = count, "building interrupt combiner");
                self.combiners.insert(
                    key,
                    CombinerConnection {
                        combiner: IrqCombiner::new(count),
                        next_input: 0,
                        output_connected: false,
                    },
                );
            }
        }
    }

    fn apply_all(&mut self) -> Result<(), BuildError> {
        for key in self.creation_order {
            let plan = &self.plans.entries[key];
            let handle = self.entry_handle(key, plan.span)?;
            let properties = plan.properties.clone();
            self.set_properties(&handle, plan.type_id, &properties)?;
            for wire in plan.wires.clone() {
                self.connect_wire(&handle, plan.type_id, &wire)?;
            }
        }
        self.drain_property_queue()
    }

    fn drain_property_queue(&mut self) -> Result<(), BuildError> {
        while let Some(span) = self.property_queue.pop_front() {
            let plan = self
                .plans
                .objects
                .get(&span)
                .ok_or_else(|| Diagnostic::internal(span, "queued object without plan"))?;
            let handle = self
                .objects
                .get(&span)
                .cloned()
                .ok_or_else(|| Diagnostic::internal(span, "queued object without instance"))?;
            let properties = plan.properties.clone();
            self.set_properties(&handle, plan.type_id, &properties)?;
        }
        Ok(())
    }

    fn set_properties(
        &mut self,
        handle: &ObjectHandle,
        type_id: TypeId,
        properties: &[PropertyAssignment],
    ) -> Result<(), BuildError> {
        for assignment in properties {
            let value = self.assignment_value(assignment)?;
            let class = self
                .ctx
                .catalog
                .class(type_id)
                .ok_or_else(|| Diagnostic::internal(assignment.span, "property on non-class"))?;
            let property = class
                .properties
                .iter()
                .find(|p| p.name == assignment.name)
                .ok_or_else(|| Diagnostic::internal(assignment.span, "planned property vanished"))?;
            let setter = property
                .set
                .as_ref()
                .ok_or_else(|| Diagnostic::internal(assignment.span, "writable property without setter"))?;
            setter(handle, &value).map_err(|err| {
                self.host_to_diag(err, ErrorKind::PropertySettingException, assignment.span)
            })?;
        }
        Ok(())
    }

    fn connect_wire(
        &mut self,
        source_handle: &ObjectHandle,
        source_type: TypeId,
        wire: &Wire,
    ) -> Result<(), BuildError> {
        let Some(dest) = &wire.dest else {
            return Err(Diagnostic::internal(wire.span, "cancelled wire survived merge").into());
        };
        let class = self
            .ctx
            .catalog
            .class(source_type)
            .ok_or_else(|| Diagnostic::internal(wire.source_span, "wire from non-class"))?;

        let line = match &wire.source {
            SourceEnd::Named(name) => {
                let gpio = class
                    .properties
                    .iter()
                    .find(|p| p.name == *name)
                    .and_then(|p| p.gpio.as_ref())
                    .ok_or_else(|| Diagnostic::internal(wire.source_span, "planned GPIO property vanished"))?;
                (gpio.get)(source_handle).ok_or_else(|| {
                    Diagnostic::new(
                        ErrorKind::UninitializedSourceIrqObject,
                        wire.source_span,
                        format!("GPIO property '{}' is not initialized", name),
                    )
                })?
            }
            SourceEnd::Numbered(number) => {
                let outputs = class.capabilities.numbered_outputs.as_ref().ok_or_else(|| {
                    Diagnostic::internal(wire.source_span, "planned numbered output vanished")
                })?;
                match outputs(source_handle, *number) {
                    PinLookup::Missing => {
                        return Err(Diagnostic::new(
                            ErrorKind::IrqSourcePinDoesNotExist,
                            wire.source_span,
                            format!("source has no output pin {}", number),
                        )
                        .into());
                    }
                    PinLookup::Unset => {
                        return Err(Diagnostic::new(
                            ErrorKind::UninitializedSourceIrqObject,
                            wire.source_span,
                            format!("output pin {} is not initialized", number),
                        )
                        .into());
                    }
                    PinLookup::Line(line) => line,
                }
            }
        };

        let dest_variable = self
            .store
            .get(&dest.peripheral)
            .ok_or_else(|| Diagnostic::internal(dest.peripheral_span, "wire to unknown variable"))?;
        let dest_handle = dest_variable.value.clone().ok_or_else(|| {
            Diagnostic::internal(dest.peripheral_span, "wire to uncreated destination")
        })?;
        let dest_type = dest_variable
            .type_id
            .ok_or_else(|| Diagnostic::internal(dest.peripheral_span, "wire to untyped variable"))?;
        let dest_class = self
            .ctx
            .catalog
            .class(dest_type)
            .ok_or_else(|| Diagnostic::internal(dest.peripheral_span, "wire to non-class"))?;

        let receiver: Rc<dyn GpioReceiver> = match dest.local_index {
            Some(index) => {
                let lookup = dest_class.capabilities.local_receivers.as_ref().ok_or_else(
                    || Diagnostic::internal(dest.peripheral_span, "planned local receiver vanished"),
                )?;
                lookup(&dest_handle, index).ok_or_else(|| {
                    Diagnostic::new(
                        ErrorKind::NotLocalGpioReceiver,
                        dest.peripheral_span,
                        format!("destination has no local receiver {}", index),
                    )
                })?
            }
            None => {
                let downcast = dest_class.capabilities.gpio_receiver.as_ref().ok_or_else(
                    || Diagnostic::internal(dest.peripheral_span, "planned receiver vanished"),
                )?;
                downcast(&dest_handle).ok_or_else(|| {
                    Diagnostic::internal(dest.peripheral_span, "receiver downcast failed")
                })?
            }
        };

        match self.combiners.get_mut(&dest.key()) {
            Some(connection) => {
                if !connection.output_connected {
                    connection.combiner.output().connect(receiver, dest.pin);
                    connection.output_connected = true;
                }
                let input = connection.next_input;
                connection.next_input += 1;
                let combiner: Rc<dyn GpioReceiver> = connection.combiner.clone();
                line.connect(combiner, input);
            }
            None => line.connect(receiver, dest.pin),
        }
        Ok(())
    }

    /// Registration fixpoint: per pass, register every entry whose registers
    /// are all themselves registered, until stable.
    fn register_all(&mut self) -> Result<(), BuildError> {
        let mut pending: Vec<&VarKey> = self
            .registration_order
            .iter()
            .filter(|key| !self.plans.entries[*key].registrations.is_empty())
            .collect();

        while !pending.is_empty() {
            let mut progressed = false;
            let mut still_pending = Vec::new();
            for key in pending {
                if self.registers_ready(key) {
                    self.register_entry(key)?;
                    progressed = true;
                } else {
                    still_pending.push(key);
                }
            }
            pending = still_pending;
            if !progressed && !pending.is_empty() {
                let plan = &self.plans.entries[pending[0]];
                let register = &plan.registrations[0];
                return Err(Diagnostic::new(
                    ErrorKind::RegistrationException,
                    register.register_span,
                    format!(
                        "'{}' cannot be registered: its register never became registered",
                        plan.key
                    ),
                )
                .into());
            }
        }
        Ok(())
    }

    fn registers_ready(&self, key: &VarKey) -> bool {
        self.plans.entries[key].registrations.iter().all(|r| {
            self.store
                .get(&r.register)
                .and_then(|variable| variable.value.as_ref())
                .is_some_and(|handle| self.machine.is_registered(handle))
        })
    }

    fn register_entry(&mut self, key: &VarKey) -> Result<(), BuildError> {
        let plan = &self.plans.entries[key];
        let peripheral = self.entry_handle(key, plan.span)?;
        for registration in plan.registrations.clone() {
            let register_variable = self.store.get(&registration.register).ok_or_else(|| {
                Diagnostic::internal(registration.register_span, "register variable vanished")
            })?;
            let register_handle = register_variable.value.clone().ok_or_else(|| {
                Diagnostic::internal(registration.register_span, "register without instance")
            })?;
            let register_type = register_variable.type_id.ok_or_else(|| {
                Diagnostic::internal(registration.register_span, "register without type")
            })?;

            let point = self.point_instance(&registration.point, registration.register_span)?;

            let class = self.ctx.catalog.class(register_type).ok_or_else(|| {
                Diagnostic::internal(registration.register_span, "register type is not a class")
            })?;
            let slot = class.register_slots.get(registration.slot_index).ok_or_else(|| {
                Diagnostic::internal(registration.register_span, "register slot vanished")
            })?;
            (slot.register)(&register_handle, &peripheral, &point).map_err(|err| {
                self.host_to_diag(err, ErrorKind::RegistrationException, registration.register_span)
            })?;
            debug!(entry = %key, register = %registration.register, "registered");
        }

        let local_name = plan.alias.clone().unwrap_or_else(|| key.name.clone());
        self.machine
            .set_local_name(&peripheral, &local_name)
            .map_err(|err| self.host_to_diag(err, ErrorKind::NameSettingException, plan.variable_span))?;
        Ok(())
    }

    fn point_instance(
        &mut self,
        point: &PointPlan,
        span: Span,
    ) -> Result<ObjectHandle, BuildError> {
        match point {
            PointPlan::Null => self
                .ctx
                .catalog
                .null_point_instance()
                .ok_or_else(|| Diagnostic::internal(span, "no null registration point instance").into()),
            PointPlan::Reference { key, span } => self
                .store
                .get(key)
                .and_then(|variable| variable.value.clone())
                .ok_or_else(|| Diagnostic::internal(*span, "registration point not created").into()),
            PointPlan::Object(object_span) => {
                let handle = self.construct_object(*object_span, false)?;
                let plan = &self.plans.objects[object_span];
                let properties = plan.properties.clone();
                let type_id = plan.type_id;
                self.set_properties(&handle, type_id, &properties)?;
                Ok(handle)
            }
            PointPlan::Constructed {
                point_type,
                ctor_index,
                first_arg,
            } => {
                let class = self
                    .ctx
                    .catalog
                    .class(*point_type)
                    .ok_or_else(|| Diagnostic::internal(span, "point type is not a class"))?;
                let ctor = class
                    .constructors
                    .get(*ctor_index)
                    .ok_or_else(|| Diagnostic::internal(span, "point constructor vanished"))?;
                let mut args = vec![first_arg.clone()];
                for param in &ctor.params[1..] {
                    match &param.default {
                        Some(default) => args.push(default.clone()),
                        None => args.push(RuntimeValue::Object(self.machine.machine_object())),
                    }
                }
                self.invoke_ctor(*point_type, *ctor_index, &args)
                    .map_err(|err| self.host_to_diag(err, ErrorKind::ConstructionException, span))
            }
        }
    }

    fn run_init_phase(&mut self) -> Result<(), BuildError> {
        while let Some((handle, lines, span)) = self.init_queue.pop_front() {
            self.init_handler.execute(&handle, &lines).map_err(|message| {
                Diagnostic::new(ErrorKind::InitSectionValidationError, span, message)
            })?;
        }
        for key in self.registration_order {
            let plan = &self.plans.entries[key];
            let Some(lines) = &plan.init else {
                continue;
            };
            let handle = self.entry_handle(key, plan.span)?;
            self.init_handler.execute(&handle, lines).map_err(|message| {
                Diagnostic::new(ErrorKind::InitSectionValidationError, plan.span, message)
            })?;
        }
        Ok(())
    }

    /// Construct a nested object value (idempotent per span).
    fn construct_object(
        &mut self,
        span: Span,
        defer_properties: bool,
    ) -> Result<ObjectHandle, BuildError> {
        if let Some(handle) = self.objects.get(&span) {
            return Ok(handle.clone());
        }
        let plan = self
            .plans
            .objects
            .get(&span)
            .ok_or_else(|| Diagnostic::internal(span, "object value without plan"))?;
        let ctor = plan.ctor.clone();
        let init = plan.init.clone();
        let args = self.resolve_args(&ctor)?;
        let handle = self
            .invoke_ctor(ctor.type_id, ctor.ctor_index, &args)
            .map_err(|err| self.host_to_diag(err, ErrorKind::ConstructionException, span))?;
        self.objects.insert(span, handle.clone());
        if defer_properties {
            self.property_queue.push_back(span);
        }
        if let Some(lines) = init {
            self.init_queue.push_back((handle.clone(), lines, span));
        }
        Ok(handle)
    }

    fn resolve_args(&mut self, ctor: &CtorPlan) -> Result<Vec<RuntimeValue>, BuildError> {
        let mut args = Vec::with_capacity(ctor.args.len());
        for arg in &ctor.args {
            args.push(match arg {
                ArgPlan::Value(value) => value.clone(),
                ArgPlan::Machine => RuntimeValue::Object(self.machine.machine_object()),
                ArgPlan::Reference { key, span } => {
                    let handle = self
                        .store
                        .get(key)
                        .and_then(|variable| variable.value.clone())
                        .ok_or_else(|| Diagnostic::internal(*span, "reference to uncreated variable"))?;
                    RuntimeValue::Object(handle)
                }
                ArgPlan::Object(span) => {
                    RuntimeValue::Object(self.construct_object(*span, true)?)
                }
            });
        }
        Ok(args)
    }

    fn assignment_value(
        &mut self,
        assignment: &PropertyAssignment,
    ) -> Result<RuntimeValue, BuildError> {
        match convert_simple(self.ctx.catalog, &assignment.value, assignment.ty) {
            Ok(value) => return Ok(value),
            Err(ConvFail::Mismatch { .. }) => {
                return Err(
                    Diagnostic::internal(assignment.span, "validated property stopped converting")
                        .into(),
                );
            }
            Err(ConvFail::NotApplicable) => {}
        }
        match &assignment.value {
            Value::Reference(reference) => {
                let handle = self
                    .store
                    .find(&reference.name, reference.span.file_id)
                    .and_then(|variable| variable.value.clone())
                    .ok_or_else(|| {
                        Diagnostic::internal(reference.span, "reference to uncreated variable")
                    })?;
                Ok(RuntimeValue::Object(handle))
            }
            Value::Object(object) => Ok(RuntimeValue::Object(
                self.construct_object(object.span, true)?,
            )),
            other => Err(Diagnostic::internal(
                other.span(),
                "unconvertible property value survived validation",
            )
            .into()),
        }
    }

    fn invoke_ctor(
        &self,
        type_id: TypeId,
        ctor_index: usize,
        args: &[RuntimeValue],
    ) -> Result<ObjectHandle, HostError> {
        let class = self
            .ctx
            .catalog
            .class(type_id)
            .ok_or_else(|| HostError::Fatal("constructing a non-class type".to_string()))?;
        let ctor = class
            .constructors
            .get(ctor_index)
            .ok_or_else(|| HostError::Fatal("selected constructor vanished".to_string()))?;
        (ctor.invoke)(args)
    }

    fn entry_handle(&self, key: &VarKey, span: Span) -> Result<ObjectHandle, BuildError> {
        self.store
            .get(key)
            .and_then(|variable| variable.value.clone())
            .ok_or_else(|| Diagnostic::internal(span, "entry was never assigned a value").into())
    }

    /// Convert a host error per the exception taxonomy: recoverable errors
    /// become the given diagnostic kind, cast errors become `CastException`,
    /// fatal errors pass through.
    fn host_to_diag(&self, err: HostError, kind: ErrorKind, span: Span) -> BuildError {
        match err {
            HostError::Recoverable(message) => {
                BuildError::Diagnostic(Diagnostic::new(kind, span, message))
            }
            HostError::Cast(message) => BuildError::Diagnostic(Diagnostic::new(
                ErrorKind::CastException,
                span,
                format!("invalid cast: {}", message),
            )),
            HostError::Fatal(_) => BuildError::Host(err),
        }
    }
}
