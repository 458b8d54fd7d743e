//! Interrupt attribute resolution.
//!
//! Each IRQ attribute is resolved against the entry's type (sources) and the
//! destination variables, arity-checked, and flattened to one wire per
//! source-end/destination-end pair. The merged, concatenated wire list then
//! has `-> none` cancellation applied, and the surviving wires are checked
//! for source and destination overlap.

use crate::store::{VarKey, VariableStore};
use crate::Ctx;
use pdl_ast::{Diagnostic, Entry, ErrorKind, IrqAttribute, IrqDestination, IrqEnd, Span};
use pdl_host::TypeId;

/// One source end of a wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceEnd {
    /// Named GPIO property of the source peripheral.
    Named(String),
    /// Numbered GPIO output.
    Numbered(u32),
}

impl std::fmt::Display for SourceEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceEnd::Named(name) => write!(f, "{}", name),
            SourceEnd::Numbered(number) => write!(f, "{}", number),
        }
    }
}

/// Destination of a wire.
#[derive(Debug, Clone)]
pub struct WireDest {
    pub peripheral: VarKey,
    pub peripheral_span: Span,
    pub local_index: Option<u32>,
    pub pin: u32,
}

/// Identity of a destination pin, for overlap checks and combiner keying.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestKey {
    pub peripheral: VarKey,
    pub local_index: Option<u32>,
    pub pin: u32,
}

impl WireDest {
    pub fn key(&self) -> DestKey {
        DestKey {
            peripheral: self.peripheral.clone(),
            local_index: self.local_index,
            pin: self.pin,
        }
    }
}

/// One flattened wire. `dest: None` is a cancellation marker.
#[derive(Debug, Clone)]
pub struct Wire {
    pub source: SourceEnd,
    pub source_span: Span,
    pub dest: Option<WireDest>,
    pub span: Span,
}

/// Resolve and flatten every IRQ attribute of an entry.
pub fn resolve_entry_irqs(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    entry_type: TypeId,
    entry: &Entry,
) -> Result<Vec<Wire>, Diagnostic> {
    let mut wires = Vec::new();
    for irq in entry.irq_attributes() {
        resolve_irq_attribute(ctx, store, entry_type, irq, &mut wires)?;
    }
    Ok(wires)
}

fn resolve_irq_attribute(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    entry_type: TypeId,
    irq: &IrqAttribute,
    wires: &mut Vec<Wire>,
) -> Result<(), Diagnostic> {
    let sources: Vec<(SourceEnd, Span)> = match &irq.sources {
        Some(ends) => {
            let mut sources = Vec::with_capacity(ends.len());
            for end in ends {
                sources.push((resolve_source_end(ctx, entry_type, end)?, end.span()));
            }
            sources
        }
        None => vec![(impute_default_source(ctx, entry_type, irq.span)?, irq.span)],
    };

    for destination in &irq.destinations {
        match destination {
            IrqDestination::None(span) => {
                for (source, source_span) in &sources {
                    wires.push(Wire {
                        source: source.clone(),
                        source_span: *source_span,
                        dest: None,
                        span: *span,
                    });
                }
            }
            IrqDestination::Target(target) => {
                let variable = store
                    .find(&target.peripheral.name, target.peripheral.span.file_id)
                    .ok_or_else(|| {
                        Diagnostic::new(
                            ErrorKind::IrqDestinationDoesNotExist,
                            target.peripheral.span,
                            format!("unknown interrupt destination '{}'", target.peripheral.name),
                        )
                    })?;
                let dest_type = variable.type_id.ok_or_else(|| {
                    Diagnostic::new(
                        ErrorKind::IrqDestinationDoesNotExist,
                        target.peripheral.span,
                        format!(
                            "interrupt destination '{}' has no resolved type",
                            target.peripheral.name
                        ),
                    )
                })?;
                let capabilities = ctx
                    .catalog
                    .class(dest_type)
                    .map(|class| &class.capabilities);
                if !capabilities.is_some_and(|c| c.gpio_receiver.is_some()) {
                    return Err(Diagnostic::new(
                        ErrorKind::IrqDestinationIsNotIrqReceiver,
                        target.peripheral.span,
                        format!(
                            "{} does not receive interrupts",
                            ctx.catalog.name(dest_type)
                        ),
                    ));
                }
                if target.local_index.is_some()
                    && !capabilities.is_some_and(|c| c.local_receivers.is_some())
                {
                    return Err(Diagnostic::new(
                        ErrorKind::NotLocalGpioReceiver,
                        target.peripheral.span,
                        format!(
                            "{} has no local interrupt receivers",
                            ctx.catalog.name(dest_type)
                        ),
                    ));
                }
                if target.ends.len() != sources.len() {
                    return Err(Diagnostic::new(
                        ErrorKind::WrongIrqArity,
                        target.span,
                        format!(
                            "{} source end(s) wired to {} destination end(s)",
                            sources.len(),
                            target.ends.len()
                        ),
                    ));
                }
                for ((source, source_span), end) in sources.iter().zip(&target.ends) {
                    wires.push(Wire {
                        source: source.clone(),
                        source_span: *source_span,
                        dest: Some(WireDest {
                            peripheral: variable.key.clone(),
                            peripheral_span: target.peripheral.span,
                            local_index: target.local_index.as_ref().map(|i| i.item),
                            pin: end.item,
                        }),
                        span: target.span,
                    });
                }
            }
        }
    }
    Ok(())
}

fn resolve_source_end(
    ctx: &Ctx<'_>,
    entry_type: TypeId,
    end: &IrqEnd,
) -> Result<SourceEnd, Diagnostic> {
    match end {
        IrqEnd::Named(name) => {
            let is_gpio = ctx.catalog.class(entry_type).is_some_and(|class| {
                class
                    .properties
                    .iter()
                    .any(|p| p.name == name.name && p.gpio.is_some())
            });
            if is_gpio {
                Ok(SourceEnd::Named(name.name.clone()))
            } else {
                Err(Diagnostic::new(
                    ErrorKind::IrqSourceDoesNotExist,
                    name.span,
                    format!(
                        "'{}' is not a GPIO property of {}",
                        name.name,
                        ctx.catalog.name(entry_type)
                    ),
                ))
            }
        }
        IrqEnd::Numbered(number) => {
            let has_outputs = ctx
                .catalog
                .class(entry_type)
                .is_some_and(|class| class.capabilities.numbered_outputs.is_some());
            if has_outputs {
                Ok(SourceEnd::Numbered(number.item))
            } else {
                Err(Diagnostic::new(
                    ErrorKind::IrqSourceIsNotNumberedGpioOutput,
                    number.span,
                    format!(
                        "{} has no numbered GPIO outputs",
                        ctx.catalog.name(entry_type)
                    ),
                ))
            }
        }
    }
}

/// Source list omitted: impute the type's single GPIO property, preferring
/// the one marked as the default interrupt.
fn impute_default_source(
    ctx: &Ctx<'_>,
    entry_type: TypeId,
    span: Span,
) -> Result<SourceEnd, Diagnostic> {
    let gpio_properties: Vec<(&str, bool)> = ctx
        .catalog
        .class(entry_type)
        .map(|class| {
            class
                .properties
                .iter()
                .filter_map(|p| {
                    p.gpio
                        .as_ref()
                        .map(|gpio| (p.name.as_str(), gpio.default_interrupt))
                })
                .collect()
        })
        .unwrap_or_default();

    if gpio_properties.is_empty() {
        return Err(Diagnostic::new(
            ErrorKind::IrqSourceDoesNotExist,
            span,
            format!(
                "{} has no GPIO properties to use as an interrupt source",
                ctx.catalog.name(entry_type)
            ),
        ));
    }
    if gpio_properties.len() == 1 {
        return Ok(SourceEnd::Named(gpio_properties[0].0.to_string()));
    }
    let defaults: Vec<&str> = gpio_properties
        .iter()
        .filter(|(_, is_default)| *is_default)
        .map(|(name, _)| *name)
        .collect();
    if defaults.len() == 1 {
        Ok(SourceEnd::Named(defaults[0].to_string()))
    } else {
        Err(Diagnostic::new(
            ErrorKind::AmbiguousDefaultIrqSource,
            span,
            format!(
                "{} has several GPIO properties and no single default interrupt",
                ctx.catalog.name(entry_type)
            ),
        ))
    }
}

/// Apply `-> none` cancellation over a wire list (declaration order) and
/// check the survivors for overlap.
pub fn effective_wires(wires: Vec<Wire>) -> Result<Vec<Wire>, Diagnostic> {
    let mut effective: Vec<Wire> = Vec::new();
    for wire in wires {
        match wire.dest {
            None => effective.retain(|existing| existing.source != wire.source),
            Some(_) => effective.push(wire),
        }
    }
    for (index, wire) in effective.iter().enumerate() {
        if effective[..index].iter().any(|w| w.source == wire.source) {
            return Err(Diagnostic::new(
                ErrorKind::IrqSourceUsedMoreThanOnce,
                wire.source_span,
                format!("interrupt source '{}' is wired more than once", wire.source),
            ));
        }
        let key = wire.dest.as_ref().map(|d| d.key());
        if effective[..index]
            .iter()
            .any(|w| w.dest.as_ref().map(|d| d.key()) == key)
        {
            return Err(Diagnostic::new(
                ErrorKind::IrqDestinationUsedMoreThanOnce,
                wire.span,
                "interrupt destination pin is wired more than once".to_string(),
            ));
        }
    }
    Ok(effective)
}
