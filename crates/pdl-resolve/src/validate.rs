//! Validation passes.
//!
//! Pre-merge validation runs per contributing entry: type resolution,
//! attribute classification and type checks, registration-interface
//! resolution, IRQ resolution, alias rules. Post-merge validation runs on
//! each variable's merged entry and produces the [`Plans`] the builder
//! executes: chosen constructors (entries and nested object values),
//! property assignments, effective wires, resolved registrations, and
//! validated init lines.

use crate::convert::{convert_simple, type_ref_name, ConvFail};
use crate::ctors::{select_constructor, CtorPlan};
use crate::irq::{effective_wires, resolve_entry_irqs, Wire};
use crate::registration::{resolve_registration, RegistrationPlan};
use crate::store::{VarKey, VariableStore};
use crate::Ctx;
use indexmap::IndexMap;
use pdl_ast::{
    Diagnostic, Entry, ErrorKind, InitAttribute, ObjectValue, ParamAttribute, Span, Value,
};
use pdl_host::{InitHandler, Property, TypeId, TypeRef};
use tracing::debug;

/// One property to set on a built object.
#[derive(Debug, Clone)]
pub struct PropertyAssignment {
    pub name: String,
    pub ty: TypeRef,
    pub value: Value,
    pub span: Span,
}

/// Build plan for a nested object value, keyed by the object's span.
pub struct ObjectPlan {
    pub type_id: TypeId,
    pub ctor: CtorPlan,
    pub properties: Vec<PropertyAssignment>,
    pub init: Option<Vec<String>>,
}

/// Build plan for one merged entry.
pub struct EntryPlan {
    pub key: VarKey,
    pub type_id: TypeId,
    /// Present for creating entries only.
    pub ctor: Option<CtorPlan>,
    pub properties: Vec<PropertyAssignment>,
    /// Effective wires after `-> none` cancellation, in declaration order.
    pub wires: Vec<Wire>,
    /// Empty when the entry does not register (or cancelled with `@ none`).
    pub registrations: Vec<RegistrationPlan>,
    pub init: Option<Vec<String>>,
    pub alias: Option<String>,
    pub variable_span: Span,
    pub span: Span,
}

/// Everything the builder needs, produced by validation.
pub struct Plans {
    pub entries: IndexMap<VarKey, EntryPlan>,
    pub objects: IndexMap<Span, ObjectPlan>,
}

/// Run both validation passes over the declared store.
pub fn validate(
    ctx: &Ctx<'_>,
    store: &mut VariableStore,
    init_handler: &dyn InitHandler,
) -> Result<Plans, Diagnostic> {
    resolve_static_types(ctx, store)?;
    debug!("static types resolved");

    // Types are fixed now; the rest of validation only reads the store.
    let store: &VariableStore = store;

    for variable in store.variables() {
        let Some(type_id) = variable.type_id else {
            continue;
        };
        for entry in &variable.entries {
            validate_entry(ctx, store, type_id, entry)?;
        }
    }
    debug!("pre-merge validation done");

    let mut plans = Plans {
        entries: IndexMap::new(),
        objects: IndexMap::new(),
    };
    for merged in store.merged_entries() {
        let plan = plan_entry(ctx, store, init_handler, &merged.key, &merged.entry, &mut plans)?;
        plans.entries.insert(merged.key, plan);
    }
    debug!(entries = plans.entries.len(), "post-merge validation done");
    Ok(plans)
}

/// Resolve every variable's static type from its first creating entry.
fn resolve_static_types(ctx: &Ctx<'_>, store: &mut VariableStore) -> Result<(), Diagnostic> {
    let mut failures = Vec::new();
    for variable in store.variables_mut() {
        if variable.type_id.is_some() || variable.entries.is_empty() {
            continue;
        }
        let Some(type_name) = variable.entries[0].type_name.clone() else {
            // First contributing entry without a type: tolerated here, the
            // declaration pass already decided this variable exists.
            debug!(variable = %variable.key, "variable has no creating entry");
            continue;
        };
        match ctx.catalog.resolve(&type_name.name) {
            Some(type_id) => variable.type_id = Some(type_id),
            None => failures.push(Diagnostic::new(
                ErrorKind::TypeNotResolved,
                type_name.span,
                format!("unknown type '{}'", type_name.name),
            )),
        }
    }
    match failures.into_iter().next() {
        Some(diagnostic) => Err(diagnostic),
        None => Ok(()),
    }
}

/// Pre-merge checks for one contributing entry.
fn validate_entry(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    entry_type: TypeId,
    entry: &Entry,
) -> Result<(), Diagnostic> {
    check_duplicate_param_names(entry)?;
    check_single_init(entry)?;

    for attribute in entry.param_attributes() {
        validate_param_attribute(ctx, store, entry_type, entry, attribute)?;
    }

    if let Some(alias) = &entry.alias {
        if entry.registrations.is_none() {
            return Err(Diagnostic::new(
                ErrorKind::AliasWithoutRegistration,
                alias.span,
                "an alias requires a registration in the same entry".to_string(),
            ));
        }
        if entry.cancels_registration() {
            return Err(Diagnostic::new(
                ErrorKind::AliasWithNoneRegistration,
                alias.span,
                "an alias cannot accompany a cancelled registration".to_string(),
            ));
        }
    }

    if let Some(registrations) = &entry.registrations {
        for info in registrations {
            if info.register.is_some() {
                resolve_registration(ctx, store, entry_type, info)?;
            }
        }
    }

    let wires = resolve_entry_irqs(ctx, store, entry_type, entry)?;
    effective_wires(wires)?;
    Ok(())
}

fn check_duplicate_param_names(entry: &Entry) -> Result<(), Diagnostic> {
    let mut seen: Vec<&str> = Vec::new();
    for attribute in entry.param_attributes() {
        if seen.contains(&attribute.name.name.as_str()) {
            return Err(Diagnostic::new(
                ErrorKind::PropertyOrCtorNameUsedMoreThanOnce,
                attribute.name.span,
                format!("'{}' is given more than once", attribute.name.name),
            ));
        }
        seen.push(&attribute.name.name);
    }
    Ok(())
}

fn check_single_init(entry: &Entry) -> Result<(), Diagnostic> {
    let inits: Vec<&InitAttribute> = entry.init_attributes().collect();
    if inits.len() > 1 {
        return Err(Diagnostic::new(
            ErrorKind::MoreThanOneInitAttribute,
            inits[1].span,
            "only one init attribute is allowed per entry".to_string(),
        ));
    }
    Ok(())
}

/// Classify a `name: value` attribute and check it against the entry's type.
fn validate_param_attribute(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    entry_type: TypeId,
    entry: &Entry,
    attribute: &ParamAttribute,
) -> Result<(), Diagnostic> {
    // `x: none` only cancels; nothing to check.
    let Some(value) = &attribute.value else {
        return Ok(());
    };

    match find_property(ctx, entry_type, &attribute.name.name) {
        Some(property) => {
            if !property.writable {
                return Err(Diagnostic::new(
                    ErrorKind::PropertyNotWritable,
                    attribute.name.span,
                    format!(
                        "property '{}' of {} is read-only",
                        attribute.name.name,
                        ctx.catalog.name(entry_type)
                    ),
                ));
            }
            check_value(ctx, store, value, property.ty)
        }
        None if entry.is_creating() => sanity_check_value(ctx, store, value),
        None => {
            let is_ctor_param = ctx.catalog.class(entry_type).is_some_and(|class| {
                class
                    .constructors
                    .iter()
                    .any(|ctor| ctor.params.iter().any(|p| p.name == attribute.name.name))
            });
            if is_ctor_param {
                Err(Diagnostic::new(
                    ErrorKind::CtorAttributesInNonCreatingEntry,
                    attribute.name.span,
                    format!(
                        "'{}' is a constructor parameter; it can only be set where '{}' is created",
                        attribute.name.name, entry.variable.name
                    ),
                ))
            } else {
                Err(Diagnostic::new(
                    ErrorKind::PropertyDoesNotExist,
                    attribute.name.span,
                    format!(
                        "{} has no property '{}'",
                        ctx.catalog.name(entry_type),
                        attribute.name.name
                    ),
                ))
            }
        }
    }
}

fn find_property<'c>(ctx: &Ctx<'c>, type_id: TypeId, name: &str) -> Option<&'c Property> {
    ctx.catalog
        .class(type_id)
        .and_then(|class| class.properties.iter().find(|p| p.name == name))
}

/// Full type check of a value against a target type.
fn check_value(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    value: &Value,
    target: TypeRef,
) -> Result<(), Diagnostic> {
    match convert_simple(ctx.catalog, value, target) {
        Ok(_) => return Ok(()),
        Err(ConvFail::Mismatch { kind, message }) => {
            return Err(Diagnostic::new(kind, value.span(), message));
        }
        Err(ConvFail::NotApplicable) => {}
    }
    match value {
        Value::Reference(reference) => {
            let variable = store
                .find(&reference.name, reference.span.file_id)
                .ok_or_else(|| {
                    Diagnostic::new(
                        ErrorKind::MissingReference,
                        reference.span,
                        format!("unknown variable '{}'", reference.name),
                    )
                })?;
            let var_type = variable.type_id.ok_or_else(|| {
                Diagnostic::new(
                    ErrorKind::MissingReference,
                    reference.span,
                    format!("variable '{}' has no resolved type", reference.name),
                )
            })?;
            let accepted = match target {
                TypeRef::Object(expected) => ctx.catalog.is_assignable(expected, var_type),
                TypeRef::Machine => var_type == ctx.machine_type,
                _ => false,
            };
            if accepted {
                Ok(())
            } else {
                Err(Diagnostic::new(
                    ErrorKind::TypeMismatch,
                    reference.span,
                    format!(
                        "variable '{}' of type {} is not assignable to {}",
                        reference.name,
                        ctx.catalog.name(var_type),
                        type_ref_name(ctx.catalog, target)
                    ),
                ))
            }
        }
        Value::Object(object) => {
            let object_type = resolve_object_type(ctx, object)?;
            match target {
                TypeRef::Object(expected) if ctx.catalog.is_assignable(expected, object_type) => {
                    sanity_check_object(ctx, store, object)
                }
                _ => Err(Diagnostic::new(
                    ErrorKind::TypeMismatch,
                    object.span,
                    format!(
                        "inline {} is not assignable to {}",
                        ctx.catalog.name(object_type),
                        type_ref_name(ctx.catalog, target)
                    ),
                )),
            }
        }
        other => Err(Diagnostic::new(
            ErrorKind::TypeMismatch,
            other.span(),
            format!(
                "{} is not accepted by {}",
                other.describe(),
                type_ref_name(ctx.catalog, target)
            ),
        )),
    }
}

/// Constructor attributes are only sanity-checked before merge: references
/// must exist, nested object values recurse.
fn sanity_check_value(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    value: &Value,
) -> Result<(), Diagnostic> {
    match value {
        Value::Reference(reference) => {
            if store.find(&reference.name, reference.span.file_id).is_none() {
                return Err(Diagnostic::new(
                    ErrorKind::MissingReference,
                    reference.span,
                    format!("unknown variable '{}'", reference.name),
                ));
            }
            Ok(())
        }
        Value::Object(object) => sanity_check_object(ctx, store, object),
        _ => Ok(()),
    }
}

fn resolve_object_type(ctx: &Ctx<'_>, object: &ObjectValue) -> Result<TypeId, Diagnostic> {
    ctx.catalog.resolve(&object.type_name.name).ok_or_else(|| {
        Diagnostic::new(
            ErrorKind::TypeNotResolved,
            object.type_name.span,
            format!("unknown type '{}'", object.type_name.name),
        )
    })
}

fn sanity_check_object(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    object: &ObjectValue,
) -> Result<(), Diagnostic> {
    let object_type = resolve_object_type(ctx, object)?;

    let mut seen: Vec<&str> = Vec::new();
    for attribute in object.param_attributes() {
        if seen.contains(&attribute.name.name.as_str()) {
            return Err(Diagnostic::new(
                ErrorKind::PropertyOrCtorNameUsedMoreThanOnce,
                attribute.name.span,
                format!("'{}' is given more than once", attribute.name.name),
            ));
        }
        seen.push(&attribute.name.name);
    }
    let inits: Vec<&InitAttribute> = object.init_attributes().collect();
    if inits.len() > 1 {
        return Err(Diagnostic::new(
            ErrorKind::MoreThanOneInitAttribute,
            inits[1].span,
            "only one init attribute is allowed per object".to_string(),
        ));
    }

    for attribute in object.param_attributes() {
        let Some(value) = &attribute.value else {
            continue;
        };
        match find_property(ctx, object_type, &attribute.name.name) {
            Some(property) => {
                if !property.writable {
                    return Err(Diagnostic::new(
                        ErrorKind::PropertyNotWritable,
                        attribute.name.span,
                        format!(
                            "property '{}' of {} is read-only",
                            attribute.name.name,
                            ctx.catalog.name(object_type)
                        ),
                    ));
                }
                check_value(ctx, store, value, property.ty)?;
            }
            None => sanity_check_value(ctx, store, value)?,
        }
    }
    Ok(())
}

/// Post-merge planning of one merged entry.
fn plan_entry(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    init_handler: &dyn InitHandler,
    key: &VarKey,
    entry: &Entry,
    plans: &mut Plans,
) -> Result<EntryPlan, Diagnostic> {
    let variable = store
        .get(key)
        .ok_or_else(|| Diagnostic::internal(entry.span, "merged entry without variable"))?;
    let type_id = variable
        .type_id
        .ok_or_else(|| Diagnostic::internal(entry.span, "merged entry without type"))?;

    // Split merged attributes into property assignments and constructor
    // attributes; plan every nested object value along the way.
    let mut properties = Vec::new();
    let mut ctor_attrs: Vec<&ParamAttribute> = Vec::new();
    for attribute in entry.param_attributes() {
        let Some(value) = &attribute.value else {
            continue;
        };
        plan_nested_objects(ctx, store, init_handler, value, plans)?;
        match find_property(ctx, type_id, &attribute.name.name) {
            Some(property) => properties.push(PropertyAssignment {
                name: attribute.name.name.clone(),
                ty: property.ty,
                value: value.clone(),
                span: attribute.span,
            }),
            None => ctor_attrs.push(attribute),
        }
    }

    let ctor = if entry.is_creating() {
        Some(select_constructor(
            ctx,
            store,
            type_id,
            &ctor_attrs,
            entry.variable.span,
        )?)
    } else {
        None
    };

    let wires = effective_wires(resolve_entry_irqs(ctx, store, type_id, entry)?)?;

    let mut registrations = Vec::new();
    if let Some(infos) = &entry.registrations {
        for info in infos {
            if info.register.is_some() {
                if let Some(point) = &info.point {
                    plan_nested_objects(ctx, store, init_handler, point, plans)?;
                }
                registrations.push(resolve_registration(ctx, store, type_id, info)?);
            }
        }
    }

    let init = match entry.init_attributes().next() {
        Some(init_attribute) => Some(validate_init(init_handler, init_attribute)?),
        None => None,
    };

    Ok(EntryPlan {
        key: key.clone(),
        type_id,
        ctor,
        properties,
        wires,
        registrations,
        init,
        alias: entry.alias.as_ref().map(|a| a.item.clone()),
        variable_span: entry.variable.span,
        span: entry.span,
    })
}

/// Plan every object value reachable from a value.
fn plan_nested_objects(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    init_handler: &dyn InitHandler,
    value: &Value,
    plans: &mut Plans,
) -> Result<(), Diagnostic> {
    let Value::Object(object) = value else {
        return Ok(());
    };
    if plans.objects.contains_key(&object.span) {
        return Ok(());
    }
    let type_id = resolve_object_type(ctx, object)?;

    let mut properties = Vec::new();
    let mut ctor_attrs: Vec<&ParamAttribute> = Vec::new();
    for attribute in object.param_attributes() {
        let Some(inner) = &attribute.value else {
            continue;
        };
        plan_nested_objects(ctx, store, init_handler, inner, plans)?;
        match find_property(ctx, type_id, &attribute.name.name) {
            Some(property) => properties.push(PropertyAssignment {
                name: attribute.name.name.clone(),
                ty: property.ty,
                value: inner.clone(),
                span: attribute.span,
            }),
            None => ctor_attrs.push(attribute),
        }
    }

    let ctor = select_constructor(ctx, store, type_id, &ctor_attrs, object.span)?;
    let init = match object.init_attributes().next() {
        Some(init_attribute) => Some(validate_init(init_handler, init_attribute)?),
        None => None,
    };

    plans.objects.insert(
        object.span,
        ObjectPlan {
            type_id,
            ctor,
            properties,
            init,
        },
    );
    Ok(())
}

fn validate_init(
    init_handler: &dyn InitHandler,
    init_attribute: &InitAttribute,
) -> Result<Vec<String>, Diagnostic> {
    let lines: Vec<String> = init_attribute
        .lines
        .iter()
        .map(|line| line.item.clone())
        .collect();
    init_handler.validate(&lines).map_err(|message| {
        Diagnostic::new(
            ErrorKind::InitSectionValidationError,
            init_attribute.span,
            message,
        )
    })?;
    Ok(lines)
}
