//! End-to-end tests for the platform description driver.
//!
//! Each test runs a full pass: parse → includes → validate → sort → build,
//! against the fixture catalog and fake machine of the harness.

use pdl_ast::ErrorKind;
use pdl_tests::{
    error_kind, rendered, CpuObj, FooObj, GicObj, GpioPortObj, MemObj, TestHarness, TimerObj,
};
use std::rc::Rc;

/// Two contributing entries merge into one created object with its property
/// set afterwards.
#[test]
fn test_two_entry_update() {
    let mut harness = TestHarness::new();
    harness
        .apply("cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\ncpu: PerformanceInMips: 1")
        .expect("pass failed");

    let cpus = harness.constructed_of::<CpuObj>("cpu");
    assert_eq!(cpus.len(), 1);
    assert_eq!(cpus[0].cpu_type, "cortex-a9");
    assert_eq!(cpus[0].performance.get(), 1);
    // The machine parameter was filled implicitly.
    assert!(cpus[0].has_machine);
    // The CPU registered under its variable name via the null point.
    assert!(harness.named("cpu").is_some());
    assert_eq!(harness.state.borrow().registrations[0].point, "null");
    assert_eq!(harness.state.borrow().post_creation_calls, 1);
}

/// An alias demands a registration in the same entry.
#[test]
fn test_alias_without_registration() {
    let mut harness = TestHarness::new();
    let result = harness.apply("mem: Memory.MappedMemory as \"m1\" { size: 0x1000 }");
    assert_eq!(error_kind(result), ErrorKind::AliasWithoutRegistration);
}

#[test]
fn test_alias_with_none_registration() {
    let mut harness = TestHarness::new();
    let result = harness.apply("mem: Memory.MappedMemory @ none as \"m1\" { size: 0x1000 }");
    assert_eq!(error_kind(result), ErrorKind::AliasWithNoneRegistration);
}

/// Three sources on one destination pin fan in through a single combiner
/// with input arity 3, connected in declaration order.
#[test]
fn test_irq_fan_in_combiner() {
    let mut harness = TestHarness::new();
    harness
        .apply(
            "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\n\
             t1: Timers.Timer { IRQ -> cpu@0 }\n\
             t2: Timers.Timer { IRQ -> cpu@0 }\n\
             t3: Timers.Timer { IRQ -> cpu@0 }",
        )
        .expect("pass failed");

    let timers = harness.constructed_of::<TimerObj>("timer");
    assert_eq!(timers.len(), 3);

    // All three lines end at the same receiver (the combiner), on inputs
    // 0, 1, 2 in declaration order.
    let endpoints: Vec<_> = timers
        .iter()
        .map(|t| t.irq.endpoint().expect("line not connected"))
        .collect();
    assert_eq!(
        endpoints.iter().map(|(_, pin)| *pin).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(std::ptr::addr_eq(
        Rc::as_ptr(&endpoints[0].0),
        Rc::as_ptr(&endpoints[1].0)
    ));
    assert!(std::ptr::addr_eq(
        Rc::as_ptr(&endpoints[0].0),
        Rc::as_ptr(&endpoints[2].0)
    ));

    // Driving any source reaches the CPU at pin 0 through the combiner.
    let cpus = harness.constructed_of::<CpuObj>("cpu");
    timers[1].irq.set(true);
    assert_eq!(cpus[0].received.borrow().as_slice(), &[(0, true)]);
}

/// A single source connects straight to the destination, no combiner.
#[test]
fn test_single_irq_has_no_combiner() {
    let mut harness = TestHarness::new();
    harness
        .apply(
            "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\n\
             t1: Timers.Timer { IRQ -> cpu@4 }",
        )
        .expect("pass failed");

    let timers = harness.constructed_of::<TimerObj>("timer");
    let cpus = harness.constructed_of::<CpuObj>("cpu");
    let (_, pin) = timers[0].irq.endpoint().expect("line not connected");
    assert_eq!(pin, 4);
    timers[0].irq.set(true);
    timers[0].irq.set(false);
    assert_eq!(
        cpus[0].received.borrow().as_slice(),
        &[(4, true), (4, false)]
    );
}

/// Creation cycle diagnostics list every step with positions.
#[test]
fn test_creation_cycle() {
    let mut harness = TestHarness::new();
    let result = harness.apply("a: Foo { other: b }\nb: Foo { other: a }");
    let text = rendered(result);
    assert!(text.starts_with("Error E25"), "{}", text);
    assert!(text.contains("a -> b"), "{}", text);
    assert!(text.contains("b -> a"), "{}", text);
    assert!(text.contains("<description>:1:"), "{}", text);
}

/// References in constructor attributes order creation.
#[test]
fn test_creation_follows_dependencies() {
    let mut harness = TestHarness::new();
    harness
        .apply("a: Foo { other: b }\nb: Foo")
        .expect("pass failed");
    let foos = harness.constructed_of::<FooObj>("foo");
    assert_eq!(foos.len(), 2);
    // b was created first (a depends on it) and a holds it.
    assert!(foos[0].other.is_none());
    let held = foos[1].other.clone().expect("dependency not injected");
    let held: Rc<FooObj> = held
        .downcast()
        .unwrap_or_else(|_| panic!("held object is not a Foo"));
    assert!(Rc::ptr_eq(&foos[0], &held));
}

/// `x: none` in a later file cancels an earlier constructor attribute, so
/// the parameterless overload is selected.
#[test]
fn test_none_cancellation_across_include() {
    let dir = std::env::temp_dir().join("pdl-none-cancel");
    std::fs::create_dir_all(&dir).expect("temp dir");
    std::fs::write(
        dir.join("part.pdl"),
        "mem: Memory.MappedMemory @ sysbus <0x0, 0x1000> { size: 0x100 }\n",
    )
    .expect("write include");
    std::fs::write(
        dir.join("board.pdl"),
        "using \"part.pdl\"\nmem: size: none\n",
    )
    .expect("write board");

    let mut harness = TestHarness::new();
    harness
        .apply_file(&dir.join("board.pdl"))
        .expect("pass failed");

    let memories = harness.constructed_of::<MemObj>("memory");
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].size, None);
}

/// Enum literal with a wrong namespace segment.
#[test]
fn test_enum_mismatch() {
    let mut harness = TestHarness::new();
    let result = harness.apply("t: Timers.Timer { mode: Other.OneShot }");
    assert_eq!(error_kind(result), ErrorKind::EnumMismatch);
}

#[test]
fn test_enum_property_is_set() {
    let mut harness = TestHarness::new();
    harness
        .apply("t: Timers.Timer { mode: Timers.Mode.Periodic; frequency: 1000 }")
        .expect("pass failed");
    let timers = harness.constructed_of::<TimerObj>("timer");
    assert_eq!(timers[0].mode.get(), 1);
    assert_eq!(timers[0].frequency.get(), 1000);
}

/// Memory registers by range; the registration point constructor fills its
/// optional offset parameter.
#[test]
fn test_range_registration() {
    let mut harness = TestHarness::new();
    harness
        .apply("mem: Memory.MappedMemory @ sysbus <0x80000000, +0x1000> { size: 0x1000 }")
        .expect("pass failed");
    let state = harness.state.borrow();
    assert_eq!(state.registrations.len(), 1);
    assert_eq!(state.registrations[0].point, "range 0x80000000..0x80001000+0");
    assert_eq!(state.names[0].1, "mem");
}

#[test]
fn test_alias_becomes_local_name() {
    let mut harness = TestHarness::new();
    harness
        .apply("mem: Memory.MappedMemory @ sysbus <0x0, 0x100> as \"ram\" { size: 0x100 }")
        .expect("pass failed");
    assert!(harness.named("ram").is_some());
    assert!(harness.named("mem").is_none());
}

/// Numbered GPIO outputs: missing pin vs uninitialized pin.
#[test]
fn test_numbered_irq_sources() {
    let mut harness = TestHarness::new();
    harness
        .apply(
            "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\n\
             port: GpioPort { [0, 1] -> cpu@[2, 3] }",
        )
        .expect("pass failed");
    let ports = harness.constructed_of::<GpioPortObj>("port");
    let lines = ports[0].lines.borrow();
    assert!(lines[0].as_ref().expect("pin 0").is_connected());
    assert!(lines[1].as_ref().expect("pin 1").is_connected());

    let mut harness = TestHarness::new();
    let result = harness.apply(
        "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\nport: GpioPort { 7 -> cpu@0 }",
    );
    assert_eq!(error_kind(result), ErrorKind::IrqSourcePinDoesNotExist);

    let mut harness = TestHarness::new();
    let result = harness.apply(
        "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\nport: GpioPort { 2 -> cpu@0 }",
    );
    assert_eq!(error_kind(result), ErrorKind::UninitializedSourceIrqObject);
}

/// Local receiver indices go through the destination's local surface.
#[test]
fn test_local_receiver_wiring() {
    let mut harness = TestHarness::new();
    harness
        .apply("gic: Gic\nt: Timers.Timer { IRQ -> gic:1@3 }")
        .expect("pass failed");
    let timers = harness.constructed_of::<TimerObj>("timer");
    let gics = harness.constructed_of::<GicObj>("gic");
    timers[0].irq.set(true);
    assert_eq!(gics[0].received.borrow().as_slice(), &[(1, 3, true)]);
}

#[test]
fn test_local_receiver_on_incapable_type() {
    let mut harness = TestHarness::new();
    let result = harness.apply(
        "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\nt: Timers.Timer { IRQ -> cpu:1@0 }",
    );
    assert_eq!(error_kind(result), ErrorKind::NotLocalGpioReceiver);
}

/// The default interrupt source is imputed when the arrow has no left side.
#[test]
fn test_imputed_default_irq_source() {
    let mut harness = TestHarness::new();
    harness
        .apply("cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\nt: Timers.Timer { -> cpu@5 }")
        .expect("pass failed");
    let timers = harness.constructed_of::<TimerObj>("timer");
    assert!(timers[0].irq.endpoint().is_some());
    assert!(timers[0].compare_irq.endpoint().is_none());
}

#[test]
fn test_irq_source_used_twice() {
    let mut harness = TestHarness::new();
    let result = harness.apply(
        "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\n\
         t: Timers.Timer { IRQ -> cpu@0; IRQ -> cpu@1 }",
    );
    assert_eq!(error_kind(result), ErrorKind::IrqSourceUsedMoreThanOnce);
}

/// `-> none` in a later entry unwires what an earlier entry wired.
#[test]
fn test_irq_none_cancels_earlier_wiring() {
    let mut harness = TestHarness::new();
    harness
        .apply(
            "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\n\
             t: Timers.Timer { IRQ -> cpu@0 }\n\
             t: IRQ -> none\n\
             t: IRQ -> cpu@1",
        )
        .expect("pass failed");
    let timers = harness.constructed_of::<TimerObj>("timer");
    let (_, pin) = timers[0].irq.endpoint().expect("line not connected");
    assert_eq!(pin, 1);
}

/// Init lines run after the graph is built, entry inits in registration
/// order after queued object-value inits.
#[test]
fn test_init_lines_execute() {
    let mut harness = TestHarness::new();
    harness
        .apply(
            "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\"; init: { reset; start } }",
        )
        .expect("pass failed");
    assert_eq!(
        harness.executed_inits.borrow().as_slice(),
        &["reset".to_string(), "start".to_string()]
    );
}

#[test]
fn test_init_validation_failure() {
    let mut harness = TestHarness::new();
    let result =
        harness.apply("cpu: CPU.ARMv7A @ sysbus { cpuType: \"x\"; init: { invalid op } }");
    assert_eq!(error_kind(result), ErrorKind::InitSectionValidationError);
}

/// Constructor rejection trace is appended to the NoCtor diagnostic.
#[test]
fn test_no_ctor_reports_rejections() {
    let mut harness = TestHarness::new();
    let result = harness.apply("cpu: CPU.ARMv7A @ sysbus { wrongArg: 1 }");
    let text = rendered(result);
    assert!(text.starts_with("Error E15"), "{}", text);
    assert!(text.contains("rejected candidates"), "{}", text);
    assert!(text.contains("cpuType"), "{}", text);
}

/// Recoverable host failures in constructors surface as
/// ConstructionException with the host text preserved.
#[test]
fn test_construction_exception() {
    let mut harness = TestHarness::new();
    let result = harness.apply("cpu: CPU.ARMv7A @ sysbus { cpuType: \"\" }");
    let text = rendered(result);
    assert!(text.starts_with("Error E38"), "{}", text);
    assert!(text.contains("cpuType must not be empty"), "{}", text);
}

#[test]
fn test_name_setting_exception() {
    let mut harness = TestHarness::new();
    let result = harness.apply(
        "mem: Memory.MappedMemory @ sysbus <0x0, 0x100> as \"forbidden\" { size: 0x100 }",
    );
    assert_eq!(error_kind(result), ErrorKind::NameSettingException);
}

/// Includes: cycle reporting preserves the stack order at detection.
#[test]
fn test_recurring_using() {
    let dir = std::env::temp_dir().join("pdl-using-cycle");
    std::fs::create_dir_all(&dir).expect("temp dir");
    std::fs::write(dir.join("a.pdl"), "using \"b.pdl\"\nx: Timers.Timer\n").expect("write a");
    std::fs::write(dir.join("b.pdl"), "using \"a.pdl\"\ny: Timers.Timer\n").expect("write b");

    let mut harness = TestHarness::new();
    let result = harness.apply_file(&dir.join("a.pdl"));
    let text = rendered(result);
    assert!(text.starts_with("Error E02"), "{}", text);
    let a_pos = text.find("a.pdl").expect("a.pdl in ladder");
    let b_pos = text.find("b.pdl").expect("b.pdl in ladder");
    assert!(a_pos < b_pos, "{}", text);
}

/// Prefixed includes rename variables but keep builtin references intact.
#[test]
fn test_prefixed_include() {
    let dir = std::env::temp_dir().join("pdl-prefix");
    std::fs::create_dir_all(&dir).expect("temp dir");
    std::fs::write(
        dir.join("cluster.pdl"),
        "mem: Memory.MappedMemory @ sysbus <0x0, 0x100> { size: 0x100 }\n",
    )
    .expect("write include");
    std::fs::write(
        dir.join("board.pdl"),
        "using \"cluster.pdl\" prefix \"ext_\"\next_mem: size: none\n",
    )
    .expect("write board");

    let mut harness = TestHarness::new();
    harness
        .apply_file(&dir.join("board.pdl"))
        .expect("pass failed");
    assert!(harness.named("ext_mem").is_some());
    let memories = harness.constructed_of::<MemObj>("memory");
    assert_eq!(memories[0].size, None);
}

#[test]
fn test_using_file_not_found() {
    let mut harness = TestHarness::new();
    let dir = std::env::temp_dir().join("pdl-missing-include");
    std::fs::create_dir_all(&dir).expect("temp dir");
    std::fs::write(dir.join("board.pdl"), "using \"nope.pdl\"\n").expect("write board");
    let result = harness.apply_file(&dir.join("board.pdl"));
    assert_eq!(error_kind(result), ErrorKind::UsingFileNotFound);
}

/// Applying the same description to two fresh machines produces identical
/// graphs.
#[test]
fn test_double_apply_is_idempotent() {
    let source = "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\n\
                  mem: Memory.MappedMemory @ sysbus <0x0, 0x1000> { size: 0x1000 }\n\
                  t: Timers.Timer { IRQ -> cpu@0 }";
    let run = || {
        let mut harness = TestHarness::new();
        harness.apply(source).expect("pass failed");
        let state = harness.state.borrow();
        (
            state.names.iter().map(|(_, n)| n.clone()).collect::<Vec<_>>(),
            state
                .registrations
                .iter()
                .map(|r| r.point.clone())
                .collect::<Vec<_>>(),
        )
    };
    assert_eq!(run(), run());
}

/// Bare and namespaced type names resolve to the same type.
#[test]
fn test_default_namespace_resolution() {
    let mut harness = TestHarness::new();
    harness
        .apply("a: Peripherals.Timers.Timer\nb: Timers.Timer")
        .expect("pass failed");
    assert_eq!(harness.constructed_of::<TimerObj>("timer").len(), 2);
}

#[test]
fn test_unknown_type() {
    let mut harness = TestHarness::new();
    let result = harness.apply("x: No.Such.Type");
    assert_eq!(error_kind(result), ErrorKind::TypeNotResolved);
}

#[test]
fn test_variable_already_declared() {
    let mut harness = TestHarness::new();
    let result = harness.apply("t: Timers.Timer\nt: Timers.Timer");
    assert_eq!(error_kind(result), ErrorKind::VariableAlreadyDeclared);
}

#[test]
fn test_builtin_update_sets_property() {
    // Extending a builtin is an updating entry on a pre-registered variable.
    let mut harness = TestHarness::new();
    let result = harness.apply("sysbus: init: { probe }");
    result.expect("pass failed");
    assert_eq!(harness.executed_inits.borrow().as_slice(), &["probe".to_string()]);
}

/// Inline object values are constructed during creation and updated through
/// the deferred queue.
#[test]
fn test_inline_object_value() {
    let mut harness = TestHarness::new();
    harness
        .apply("a: Foo { other: Foo { } }")
        .expect("pass failed");
    let foos = harness.constructed_of::<FooObj>("foo");
    assert_eq!(foos.len(), 2);
    // The nested object is built first and handed to the outer constructor.
    assert!(foos[0].other.is_none());
    assert!(foos[1].other.is_some());
}

#[test]
fn test_ctor_attribute_in_updating_entry() {
    let mut harness = TestHarness::new();
    let result = harness.apply(
        "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\ncpu: cpuType: \"cortex-a5\"",
    );
    assert_eq!(error_kind(result), ErrorKind::CtorAttributesInNonCreatingEntry);
}

#[test]
fn test_property_does_not_exist_in_updating_entry() {
    let mut harness = TestHarness::new();
    let result = harness.apply(
        "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\ncpu: NoSuchProp: 1",
    );
    assert_eq!(error_kind(result), ErrorKind::PropertyDoesNotExist);
}

#[test]
fn test_wrong_irq_arity() {
    let mut harness = TestHarness::new();
    let result = harness.apply(
        "cpu: CPU.ARMv7A @ sysbus { cpuType: \"cortex-a9\" }\n\
         port: GpioPort { [0, 1] -> cpu@[2] }",
    );
    assert_eq!(error_kind(result), ErrorKind::WrongIrqArity);
}

#[test]
fn test_empty_entry() {
    let mut harness = TestHarness::new();
    let result = harness.apply("x:");
    assert_eq!(error_kind(result), ErrorKind::EmptyEntry);
}

#[test]
fn test_syntax_error_expected_set() {
    let mut harness = TestHarness::new();
    let result = harness.apply("cpu: Timers.Timer {");
    let text = rendered(result);
    assert!(text.starts_with("Error E00"), "{}", text);
    assert!(text.contains(" or "), "{}", text);
}
