//! Simple-value conversion.
//!
//! One shared conversion table decides whether a literal fits a target
//! [`TypeRef`]; it is used identically by constructor overload resolution,
//! property setting, and registration-point constructor matching. References
//! and inline objects are not simple values — they come back as
//! [`ConvFail::NotApplicable`] and the caller tries its own rules.

use pdl_ast::{ErrorKind, Value};
use pdl_host::{MemoryRange, NumKind, RuntimeValue, TypeCatalog, TypeId, TypeRef};

/// A numeric literal after the shared smart parser ran.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedNumber {
    Int(i128),
    Float(f64),
}

/// Parse a numeric literal: optional sign, hex (`0x..`) or decimal integer,
/// or float (with exponent).
pub fn parse_number(text: &str) -> Option<ParsedNumber> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let value = i128::from_str_radix(hex, 16).ok()?;
        return Some(ParsedNumber::Int(if negative { -value } else { value }));
    }
    if digits.contains(['.', 'e', 'E']) {
        return text.parse::<f64>().ok().map(ParsedNumber::Float);
    }
    text.parse::<i128>().ok().map(ParsedNumber::Int)
}

/// Why a simple conversion did not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvFail {
    /// The value is a reference or inline object; not this table's business.
    NotApplicable,
    /// The value is simple but does not fit the target.
    Mismatch { kind: ErrorKind, message: String },
}

impl ConvFail {
    fn mismatch(message: impl Into<String>) -> Self {
        ConvFail::Mismatch {
            kind: ErrorKind::TypeMismatch,
            message: message.into(),
        }
    }

    fn enum_mismatch(message: impl Into<String>) -> Self {
        ConvFail::Mismatch {
            kind: ErrorKind::EnumMismatch,
            message: message.into(),
        }
    }
}

/// Human-readable name of a target type, for mismatch messages.
pub fn type_ref_name(catalog: &TypeCatalog, ty: TypeRef) -> String {
    match ty {
        TypeRef::Str => "string".to_string(),
        TypeRef::Bool => "bool".to_string(),
        TypeRef::Machine => "machine".to_string(),
        TypeRef::Range => "range".to_string(),
        TypeRef::Numeric { kind, nullable } => {
            if nullable {
                format!("{}?", kind.name())
            } else {
                kind.name().to_string()
            }
        }
        TypeRef::Enum(id) | TypeRef::Object(id) => catalog.name(id).to_string(),
    }
}

/// Convert a simple value to a target type.
pub fn convert_simple(
    catalog: &TypeCatalog,
    value: &Value,
    target: TypeRef,
) -> Result<RuntimeValue, ConvFail> {
    match value {
        Value::Reference(_) | Value::Object(_) => Err(ConvFail::NotApplicable),
        Value::Empty(_) => Ok(zero_value(target)),
        Value::Str(s) => match target {
            TypeRef::Str => Ok(RuntimeValue::Str(s.item.clone())),
            _ => Err(ConvFail::mismatch(format!(
                "string value is not accepted by {}",
                type_ref_name(catalog, target)
            ))),
        },
        Value::Bool(b) => match target {
            TypeRef::Bool => Ok(RuntimeValue::Bool(b.item)),
            _ => Err(ConvFail::mismatch(format!(
                "boolean value is not accepted by {}",
                type_ref_name(catalog, target)
            ))),
        },
        Value::Range(range) => match target {
            TypeRef::Range => {
                let begin = parse_unsigned(&range.begin.text)
                    .ok_or_else(|| ConvFail::mismatch("range bound is not a valid address"))?;
                let second = parse_unsigned(&range.end.text)
                    .ok_or_else(|| ConvFail::mismatch("range bound is not a valid address"))?;
                Ok(RuntimeValue::Range(if range.size_form {
                    MemoryRange::from_size(begin, second)
                } else {
                    MemoryRange::new(begin, second)
                }))
            }
            _ => Err(ConvFail::mismatch(format!(
                "range value is not accepted by {}",
                type_ref_name(catalog, target)
            ))),
        },
        Value::Number(number) => convert_number(catalog, &number.text, target),
        Value::Enum(literal) => match target {
            TypeRef::Enum(enum_id) => {
                let shape = catalog
                    .enum_shape(enum_id)
                    .ok_or_else(|| ConvFail::mismatch("target type is not an enum"))?;
                let target_path: Vec<&str> = catalog.name(enum_id).split('.').collect();
                // The written path is compared tail-first against the enum's
                // namespace, so partial qualification is accepted.
                let written: Vec<&str> = literal.path.iter().map(|s| s.as_str()).collect();
                let mut target_rev = target_path.iter().rev();
                for segment in written.iter().rev() {
                    match target_rev.next() {
                        Some(expected) if expected == segment => {}
                        Some(expected) => {
                            return Err(ConvFail::enum_mismatch(format!(
                                "enum path mismatch: expected '{}', found '{}' (target enum is {})",
                                expected,
                                segment,
                                catalog.name(enum_id)
                            )));
                        }
                        None => {
                            return Err(ConvFail::enum_mismatch(format!(
                                "enum path segment '{}' does not belong to {}",
                                segment,
                                catalog.name(enum_id)
                            )));
                        }
                    }
                }
                match shape
                    .members
                    .iter()
                    .find(|(name, _)| name == &literal.member)
                {
                    Some((_, value)) => Ok(RuntimeValue::EnumMember {
                        ty: enum_id,
                        value: *value,
                    }),
                    None => {
                        let members: Vec<&str> =
                            shape.members.iter().map(|(n, _)| n.as_str()).collect();
                        Err(ConvFail::enum_mismatch(format!(
                            "no member '{}' in {}; valid members: {}",
                            literal.member,
                            catalog.name(enum_id),
                            members.join(", ")
                        )))
                    }
                }
            }
            _ => Err(ConvFail::mismatch(format!(
                "enum literal is not accepted by {}",
                type_ref_name(catalog, target)
            ))),
        },
    }
}

fn convert_number(
    catalog: &TypeCatalog,
    text: &str,
    target: TypeRef,
) -> Result<RuntimeValue, ConvFail> {
    let parsed =
        parse_number(text).ok_or_else(|| ConvFail::mismatch(format!("invalid number '{}'", text)))?;
    match target {
        TypeRef::Numeric { kind, .. } => match parsed {
            ParsedNumber::Int(value) => {
                if kind.is_float() {
                    Ok(RuntimeValue::Float(value as f64))
                } else if !kind.contains_int(value) {
                    Err(ConvFail::mismatch(format!(
                        "value {} is out of range for {}",
                        value,
                        kind.name()
                    )))
                } else if kind.is_signed() {
                    Ok(RuntimeValue::Signed(value as i64))
                } else {
                    Ok(RuntimeValue::Unsigned(value as u64))
                }
            }
            ParsedNumber::Float(value) => {
                if kind.is_float() {
                    Ok(RuntimeValue::Float(value))
                } else {
                    Err(ConvFail::mismatch(format!(
                        "fractional value {} is not accepted by {}",
                        value,
                        kind.name()
                    )))
                }
            }
        },
        // A number is accepted by an enum when it names a defined member, or
        // when the enum accepts arbitrary numeric values.
        TypeRef::Enum(enum_id) => {
            let shape = catalog
                .enum_shape(enum_id)
                .ok_or_else(|| ConvFail::mismatch("target type is not an enum"))?;
            let value = match parsed {
                ParsedNumber::Int(v) => v,
                ParsedNumber::Float(_) => {
                    return Err(ConvFail::enum_mismatch(format!(
                        "fractional value is not a member of {}",
                        catalog.name(enum_id)
                    )));
                }
            };
            let defined = shape.members.iter().any(|(_, v)| i128::from(*v) == value);
            if defined || shape.accepts_any_numeric {
                Ok(RuntimeValue::EnumMember {
                    ty: enum_id,
                    value: value as i64,
                })
            } else {
                Err(ConvFail::enum_mismatch(format!(
                    "value {} is not a defined member of {}",
                    value,
                    catalog.name(enum_id)
                )))
            }
        }
        _ => Err(ConvFail::mismatch(format!(
            "numeric value is not accepted by {}",
            type_ref_name(catalog, target)
        ))),
    }
}

fn parse_unsigned(text: &str) -> Option<u64> {
    match parse_number(text)? {
        ParsedNumber::Int(value) => u64::try_from(value).ok(),
        ParsedNumber::Float(_) => None,
    }
}

/// Zero value of a target type: default-initialized value type, or a null
/// reference.
fn zero_value(target: TypeRef) -> RuntimeValue {
    match target {
        TypeRef::Str => RuntimeValue::Str(String::new()),
        TypeRef::Bool => RuntimeValue::Bool(false),
        TypeRef::Range => RuntimeValue::Range(MemoryRange::new(0, 0)),
        TypeRef::Numeric { kind, nullable } => {
            if nullable {
                RuntimeValue::None
            } else if kind.is_float() {
                RuntimeValue::Float(0.0)
            } else if kind.is_signed() {
                RuntimeValue::Signed(0)
            } else {
                RuntimeValue::Unsigned(0)
            }
        }
        TypeRef::Enum(ty) => RuntimeValue::EnumMember { ty, value: 0 },
        TypeRef::Machine | TypeRef::Object(_) => RuntimeValue::None,
    }
}
