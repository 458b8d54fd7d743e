//! Constructor overload resolution.
//!
//! For each public constructor of the target type, every formal parameter is
//! matched against the like-named attribute; rejected candidates leave a
//! reason in the selection report, which is appended verbatim to the `NoCtor`
//! and `AmbiguousCtor` diagnostics so the user can see why each overload was
//! turned down.

use crate::convert::{convert_simple, type_ref_name, ConvFail};
use crate::store::{VarKey, VariableStore};
use crate::Ctx;
use pdl_ast::{Diagnostic, ErrorKind, ParamAttribute, Span, Value};
use pdl_host::{Constructor, RuntimeValue, TypeId, TypeRef};

/// How one constructor argument is produced at build time.
#[derive(Debug, Clone)]
pub enum ArgPlan {
    /// Already-converted simple value or parameter default.
    Value(RuntimeValue),
    /// The ambient machine instance.
    Machine,
    /// Value slot of another variable.
    Reference { key: VarKey, span: Span },
    /// A nested object value, identified by its span.
    Object(Span),
}

/// The selected constructor with its argument plan, in parameter order.
#[derive(Debug, Clone)]
pub struct CtorPlan {
    pub type_id: TypeId,
    pub ctor_index: usize,
    pub args: Vec<ArgPlan>,
}

/// Human-readable trace of rejected overloads.
#[derive(Default)]
pub struct SelectionReport {
    lines: Vec<String>,
}

impl SelectionReport {
    fn reject(&mut self, signature: &str, reason: String) {
        self.lines.push(format!("  {}: {}", signature, reason));
    }

    fn render(&self) -> String {
        if self.lines.is_empty() {
            String::new()
        } else {
            format!("\nrejected candidates:\n{}", self.lines.join("\n"))
        }
    }
}

/// Render `Type(name: ty, ...)` for diagnostics.
pub fn ctor_signature(ctx: &Ctx<'_>, type_id: TypeId, ctor: &Constructor) -> String {
    let params: Vec<String> = ctor
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, type_ref_name(ctx.catalog, p.ty)))
        .collect();
    format!("{}({})", ctx.catalog.name(type_id), params.join(", "))
}

/// Pick the single constructor of `type_id` matching the given constructor
/// attributes. `site` anchors the diagnostic.
pub fn select_constructor(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    type_id: TypeId,
    attrs: &[&ParamAttribute],
    site: Span,
) -> Result<CtorPlan, Diagnostic> {
    let class = ctx.catalog.class(type_id).ok_or_else(|| {
        Diagnostic::new(
            ErrorKind::NoCtor,
            site,
            format!("type {} is not constructible", ctx.catalog.name(type_id)),
        )
    })?;

    let mut report = SelectionReport::default();
    let mut accepted: Vec<(usize, Vec<ArgPlan>)> = Vec::new();

    'ctors: for (ctor_index, ctor) in class.constructors.iter().enumerate() {
        let signature = ctor_signature(ctx, type_id, ctor);
        let mut args = Vec::with_capacity(ctor.params.len());
        let mut consumed = vec![false; attrs.len()];

        for param in &ctor.params {
            let position = attrs.iter().position(|a| a.name.name == param.name);
            match position {
                None => {
                    if let Some(default) = &param.default {
                        args.push(ArgPlan::Value(default.clone()));
                    } else if param.ty == TypeRef::Machine {
                        args.push(ArgPlan::Machine);
                    } else {
                        report.reject(
                            &signature,
                            format!("no value for parameter '{}'", param.name),
                        );
                        continue 'ctors;
                    }
                }
                Some(position) => {
                    consumed[position] = true;
                    let attr = attrs[position];
                    let value = match &attr.value {
                        Some(value) => value,
                        None => {
                            // `x: none` placeholders are discarded before
                            // selection; seeing one here is a caller bug.
                            return Err(Diagnostic::internal(
                                attr.span,
                                "cancelled attribute reached constructor selection",
                            ));
                        }
                    };
                    match plan_argument(ctx, store, value, param.ty) {
                        Ok(plan) => args.push(plan),
                        Err(reason) => {
                            report.reject(
                                &signature,
                                format!("parameter '{}': {}", param.name, reason),
                            );
                            continue 'ctors;
                        }
                    }
                }
            }
        }

        let unconsumed: Vec<&str> = attrs
            .iter()
            .zip(&consumed)
            .filter(|(_, used)| !**used)
            .map(|(a, _)| a.name.name.as_str())
            .collect();
        if !unconsumed.is_empty() {
            report.reject(
                &signature,
                format!("unmatched attributes: {}", unconsumed.join(", ")),
            );
            continue;
        }

        accepted.push((ctor_index, args));
    }

    match accepted.len() {
        0 => Err(Diagnostic::new(
            ErrorKind::NoCtor,
            site,
            format!(
                "no usable constructor for {}{}",
                ctx.catalog.name(type_id),
                report.render()
            ),
        )),
        1 => {
            let (ctor_index, args) = accepted.remove(0);
            Ok(CtorPlan {
                type_id,
                ctor_index,
                args,
            })
        }
        _ => {
            let signatures: Vec<String> = accepted
                .iter()
                .map(|(index, _)| {
                    format!(
                        "  {}",
                        ctor_signature(ctx, type_id, &class.constructors[*index])
                    )
                })
                .collect();
            Err(Diagnostic::new(
                ErrorKind::AmbiguousCtor,
                site,
                format!(
                    "ambiguous constructor for {}; candidates:\n{}{}",
                    ctx.catalog.name(type_id),
                    signatures.join("\n"),
                    report.render()
                ),
            ))
        }
    }
}

/// Decide how a single attribute value fills a parameter of type `ty`, or
/// explain why it cannot.
fn plan_argument(
    ctx: &Ctx<'_>,
    store: &VariableStore,
    value: &Value,
    ty: TypeRef,
) -> Result<ArgPlan, String> {
    match convert_simple(ctx.catalog, value, ty) {
        Ok(converted) => return Ok(ArgPlan::Value(converted)),
        Err(ConvFail::Mismatch { message, .. }) => return Err(message),
        Err(ConvFail::NotApplicable) => {}
    }
    match value {
        Value::Reference(reference) => {
            let variable = store
                .find(&reference.name, reference.span.file_id)
                .ok_or_else(|| format!("unknown variable '{}'", reference.name))?;
            let var_type = variable
                .type_id
                .ok_or_else(|| format!("variable '{}' has no resolved type", reference.name))?;
            let accepted = match ty {
                TypeRef::Object(target) => ctx.catalog.is_assignable(target, var_type),
                TypeRef::Machine => var_type == ctx.machine_type,
                _ => false,
            };
            if accepted {
                Ok(ArgPlan::Reference {
                    key: variable.key.clone(),
                    span: reference.span,
                })
            } else {
                Err(format!(
                    "variable '{}' of type {} is not assignable to {}",
                    reference.name,
                    ctx.catalog.name(var_type),
                    type_ref_name(ctx.catalog, ty)
                ))
            }
        }
        Value::Object(object) => {
            let object_type = ctx
                .catalog
                .resolve(&object.type_name.name)
                .ok_or_else(|| format!("unknown type '{}'", object.type_name.name))?;
            match ty {
                TypeRef::Object(target) if ctx.catalog.is_assignable(target, object_type) => {
                    Ok(ArgPlan::Object(object.span))
                }
                _ => Err(format!(
                    "inline {} is not assignable to {}",
                    ctx.catalog.name(object_type),
                    type_ref_name(ctx.catalog, ty)
                )),
            }
        }
        other => Err(format!(
            "{} is not accepted by {}",
            other.describe(),
            type_ref_name(ctx.catalog, ty)
        )),
    }
}
