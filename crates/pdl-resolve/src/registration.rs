//! Registration-point resolution.
//!
//! For every `@ register [point]` the validator finds the register slots of
//! the register's type whose peripheral constraint covers the entry, checks
//! the point value against the candidate point types, and settles ties by
//! derivation: most-derived point type first, then most-derived peripheral
//! constraint.

use crate::convert::{convert_simple, ConvFail};
use crate::store::{VarKey, VariableStore};
use crate::Ctx;
use pdl_ast::{Diagnostic, ErrorKind, RegistrationInfo, Span, Value};
use pdl_host::{RuntimeValue, TypeId, TypeRef};

/// How the registration point instance is produced at build time.
#[derive(Debug, Clone)]
pub enum PointPlan {
    /// The shared null-registration-point instance.
    Null,
    Reference {
        key: VarKey,
        span: Span,
    },
    /// Inline object point, identified by its span.
    Object(Span),
    /// Point built from a simple value via the selected constructor; the
    /// remaining optional parameters are filled at build time.
    Constructed {
        point_type: TypeId,
        ctor_index: usize,
        first_arg: RuntimeValue,
    },
}

/// A fully resolved `@ register [point]`.
#[derive(Debug, Clone)]
pub struct RegistrationPlan {
    pub register: VarKey,
    pub register_span: Span,
    /// Index into the register type's register slots.
    pub slot_index: usize,
    pub point: PointPlan,
}

struct Candidate {
    slot_index: usize,
    peripheral: TypeId,
    point: TypeId,
}

/// Resolve one registration info of an entry with static type `entry_type`.
pub fn resolve_registration(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    entry_type: TypeId,
    info: &RegistrationInfo,
) -> Result<RegistrationPlan, Diagnostic> {
    let register = info
        .register
        .as_ref()
        .ok_or_else(|| Diagnostic::internal(info.span, "cancelled registration resolved"))?;

    let variable = store
        .find(&register.name, register.span.file_id)
        .ok_or_else(|| {
            Diagnostic::new(
                ErrorKind::MissingReference,
                register.span,
                format!("unknown register '{}'", register.name),
            )
        })?;
    let register_type = variable.type_id.ok_or_else(|| {
        Diagnostic::new(
            ErrorKind::MissingReference,
            register.span,
            format!("register '{}' has no resolved type", register.name),
        )
    })?;

    let candidates: Vec<Candidate> = ctx
        .catalog
        .class(register_type)
        .map(|class| {
            class
                .register_slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| ctx.catalog.is_assignable(slot.peripheral, entry_type))
                .map(|(slot_index, slot)| Candidate {
                    slot_index,
                    peripheral: slot.peripheral,
                    point: slot.point,
                })
                .collect()
        })
        .unwrap_or_default();

    if candidates.is_empty() {
        return Err(Diagnostic::new(
            ErrorKind::NoUsableRegisterInterface,
            register.span,
            format!(
                "'{}' offers no register interface accepting {}",
                register.name,
                ctx.catalog.name(entry_type)
            ),
        ));
    }

    let (candidate, point) = match &info.point {
        None => resolve_absent_point(ctx, entry_type, candidates, info.span)?,
        Some(Value::Reference(reference)) => {
            let point_var = store
                .find(&reference.name, reference.span.file_id)
                .ok_or_else(|| {
                    Diagnostic::new(
                        ErrorKind::MissingReference,
                        reference.span,
                        format!("unknown variable '{}'", reference.name),
                    )
                })?;
            let point_type = point_var.type_id.ok_or_else(|| {
                Diagnostic::new(
                    ErrorKind::MissingReference,
                    reference.span,
                    format!("variable '{}' has no resolved type", reference.name),
                )
            })?;
            let surviving = filter_by_point_type(ctx, candidates, point_type, reference.span)?;
            let candidate = pick_candidate(ctx, surviving, info.span)?;
            (
                candidate,
                PointPlan::Reference {
                    key: point_var.key.clone(),
                    span: reference.span,
                },
            )
        }
        Some(Value::Object(object)) => {
            let point_type = ctx.catalog.resolve(&object.type_name.name).ok_or_else(|| {
                Diagnostic::new(
                    ErrorKind::TypeNotResolved,
                    object.type_name.span,
                    format!("unknown type '{}'", object.type_name.name),
                )
            })?;
            let surviving = filter_by_point_type(ctx, candidates, point_type, object.span)?;
            let candidate = pick_candidate(ctx, surviving, info.span)?;
            (candidate, PointPlan::Object(object.span))
        }
        Some(simple) => resolve_simple_point(ctx, candidates, simple)?,
    };

    Ok(RegistrationPlan {
        register: variable.key.clone(),
        register_span: register.span,
        slot_index: candidate.slot_index,
        point,
    })
}

/// No point value: accept the null registration point unless the entry is a
/// bus peripheral that also has a bus registration candidate.
fn resolve_absent_point(
    ctx: &Ctx<'_>,
    entry_type: TypeId,
    candidates: Vec<Candidate>,
    span: Span,
) -> Result<(Candidate, PointPlan), Diagnostic> {
    let well_known = ctx.catalog.well_known();
    let null_point = well_known.null_registration_point;

    let is_bus_peripheral = well_known
        .bus_peripheral
        .is_some_and(|bus| ctx.catalog.is_assignable(bus, entry_type));
    let has_bus_candidate = well_known.bus_registration_point.is_some_and(|bus_point| {
        candidates
            .iter()
            .any(|c| ctx.catalog.is_assignable(bus_point, c.point))
    });

    let null_candidates: Vec<Candidate> = match null_point {
        Some(null_point) => candidates
            .into_iter()
            .filter(|c| c.point == null_point)
            .collect(),
        None => Vec::new(),
    };

    if null_candidates.is_empty() || (is_bus_peripheral && has_bus_candidate) {
        return Err(Diagnostic::new(
            ErrorKind::NoCtorForRegistrationPoint,
            span,
            "a registration point is required here".to_string(),
        ));
    }
    let candidate = pick_candidate(ctx, null_candidates, span)?;
    Ok((candidate, PointPlan::Null))
}

/// Simple point value: per candidate, find point-type constructors whose
/// first parameter accepts the value and whose remaining parameters are
/// optional.
fn resolve_simple_point(
    ctx: &Ctx<'_>,
    candidates: Vec<Candidate>,
    value: &Value,
) -> Result<(Candidate, PointPlan), Diagnostic> {
    let span = value.span();
    let mut usable: Vec<(Candidate, Vec<(usize, RuntimeValue)>)> = Vec::new();
    for candidate in candidates {
        let Some(class) = ctx.catalog.class(candidate.point) else {
            continue;
        };
        let mut ctors = Vec::new();
        for (ctor_index, ctor) in class.constructors.iter().enumerate() {
            let Some(first) = ctor.params.first() else {
                continue;
            };
            let rest_optional = ctor.params[1..]
                .iter()
                .all(|p| p.default.is_some() || p.ty == TypeRef::Machine);
            if !rest_optional {
                continue;
            }
            match convert_simple(ctx.catalog, value, first.ty) {
                Ok(converted) => ctors.push((ctor_index, converted)),
                Err(ConvFail::Mismatch { .. }) | Err(ConvFail::NotApplicable) => {}
            }
        }
        if !ctors.is_empty() {
            usable.push((candidate, ctors));
        }
    }

    if usable.is_empty() {
        return Err(Diagnostic::new(
            ErrorKind::NoCtorForRegistrationPoint,
            span,
            format!("no registration point accepts this {}", value.describe()),
        ));
    }

    let point_types: Vec<TypeId> = usable.iter().map(|(c, _)| c.point).collect();
    let best_point = most_derived(ctx, &point_types).ok_or_else(|| {
        Diagnostic::new(
            ErrorKind::AmbiguousRegistrationPointType,
            span,
            ambiguous_types_message(ctx, "registration point type is ambiguous", &point_types),
        )
    })?;
    usable.retain(|(c, _)| c.point == best_point);

    let peripherals: Vec<TypeId> = usable.iter().map(|(c, _)| c.peripheral).collect();
    let best_peripheral = most_derived(ctx, &peripherals).ok_or_else(|| {
        Diagnostic::new(
            ErrorKind::AmbiguousRegistree,
            span,
            ambiguous_types_message(ctx, "registree type is ambiguous", &peripherals),
        )
    })?;
    usable.retain(|(c, _)| c.peripheral == best_peripheral);

    let (candidate, mut ctors) = usable.remove(0);
    if ctors.len() > 1 {
        return Err(Diagnostic::new(
            ErrorKind::AmbiguousCtorForRegistrationPoint,
            span,
            format!(
                "more than one constructor of {} accepts this value",
                ctx.catalog.name(candidate.point)
            ),
        ));
    }
    let (ctor_index, first_arg) = ctors.remove(0);
    let point_type = candidate.point;
    Ok((
        candidate,
        PointPlan::Constructed {
            point_type,
            ctor_index,
            first_arg,
        },
    ))
}

fn filter_by_point_type(
    ctx: &Ctx<'_>,
    candidates: Vec<Candidate>,
    point_type: TypeId,
    span: Span,
) -> Result<Vec<Candidate>, Diagnostic> {
    let surviving: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| ctx.catalog.is_assignable(c.point, point_type))
        .collect();
    if surviving.is_empty() {
        Err(Diagnostic::new(
            ErrorKind::TypeMismatch,
            span,
            format!(
                "{} is not accepted as a registration point here",
                ctx.catalog.name(point_type)
            ),
        ))
    } else {
        Ok(surviving)
    }
}

/// Tie-break among surviving candidates: most-derived point type, then
/// most-derived peripheral constraint.
fn pick_candidate(
    ctx: &Ctx<'_>,
    mut candidates: Vec<Candidate>,
    span: Span,
) -> Result<Candidate, Diagnostic> {
    let point_types: Vec<TypeId> = candidates.iter().map(|c| c.point).collect();
    let best_point = most_derived(ctx, &point_types).ok_or_else(|| {
        Diagnostic::new(
            ErrorKind::AmbiguousRegistrationPointType,
            span,
            ambiguous_types_message(ctx, "registration point type is ambiguous", &point_types),
        )
    })?;
    candidates.retain(|c| c.point == best_point);

    let peripherals: Vec<TypeId> = candidates.iter().map(|c| c.peripheral).collect();
    let best_peripheral = most_derived(ctx, &peripherals).ok_or_else(|| {
        Diagnostic::new(
            ErrorKind::AmbiguousRegistree,
            span,
            ambiguous_types_message(ctx, "registree type is ambiguous", &peripherals),
        )
    })?;
    candidates.retain(|c| c.peripheral == best_peripheral);

    Ok(candidates.remove(0))
}

/// The type assignable to every other in the list, if one dominates.
fn most_derived(ctx: &Ctx<'_>, types: &[TypeId]) -> Option<TypeId> {
    types
        .iter()
        .copied()
        .find(|&candidate| {
            types
                .iter()
                .all(|&other| ctx.catalog.is_assignable(other, candidate))
        })
}

fn ambiguous_types_message(ctx: &Ctx<'_>, prefix: &str, types: &[TypeId]) -> String {
    let mut names: Vec<&str> = types.iter().map(|&t| ctx.catalog.name(t)).collect();
    names.dedup();
    format!("{}: {}", prefix, names.join(", "))
}
