//! Conversion of loosely-typed YAML values into template expressions.
//!
//! Specification fields that accept "a value or a pointer" go through
//! [`value_expr`]/[`scalar_expr`]; expected-response fields additionally
//! accept the `!regex` tag and go through [`expected`]. Everything is decided
//! here, once, at parse time; the rest of the system never probes runtime
//! types again.

use crate::error::SpecError;
use attest_core::{Expected, Pointer, ValueExpr};
use regex::Regex;
use serde_yaml::value::TaggedValue;
use serde_yaml::Value as Yaml;

const POINTER_TAG: &str = "pointer";
const REGEX_TAG: &str = "regex";

/// Human-readable kind of a YAML value, for error messages.
pub(crate) fn kind(yaml: &Yaml) -> String {
    match yaml {
        Yaml::Null => "null".to_string(),
        Yaml::Bool(_) => "boolean".to_string(),
        Yaml::Number(_) => "number".to_string(),
        Yaml::String(_) => "string".to_string(),
        Yaml::Sequence(_) => "sequence".to_string(),
        Yaml::Mapping(_) => "mapping".to_string(),
        Yaml::Tagged(tagged) => format!("tag `{}`", tagged.tag),
    }
}

fn tag_name(tagged: &TaggedValue) -> String {
    tagged.tag.to_string().trim_start_matches('!').to_string()
}

pub(crate) fn field_type(field: &str, allowed: &'static str, yaml: &Yaml) -> SpecError {
    SpecError::FieldType {
        field: field.to_string(),
        allowed,
        found: kind(yaml),
    }
}

pub(crate) fn expect_bool(field: &str, yaml: &Yaml) -> Result<bool, SpecError> {
    yaml.as_bool().ok_or_else(|| field_type(field, "a boolean", yaml))
}

pub(crate) fn expect_str<'y>(field: &str, yaml: &'y Yaml) -> Result<&'y str, SpecError> {
    yaml.as_str().ok_or_else(|| field_type(field, "a string", yaml))
}

/// Parse a field that must be a `!pointer` target (extraction destinations).
pub(crate) fn pointer(field: &str, yaml: &Yaml) -> Result<Pointer, SpecError> {
    match yaml {
        Yaml::Tagged(tagged) if tag_name(tagged) == POINTER_TAG => pointer_from(field, tagged),
        _ => Err(field_type(field, "a `!pointer` target", yaml)),
    }
}

fn pointer_from(field: &str, tagged: &TaggedValue) -> Result<Pointer, SpecError> {
    let path = tagged
        .value
        .as_str()
        .ok_or_else(|| field_type(field, "a pointer path string", &tagged.value))?;
    Pointer::new(path).map_err(|source| SpecError::Pointer {
        field: field.to_string(),
        source,
    })
}

/// Parse a field that accepts any JSON-like value, with `!pointer` scalars
/// allowed anywhere inside. `!regex` is rejected: a pattern can never be sent
/// over the wire or written into the store.
pub(crate) fn value_expr(field: &str, yaml: &Yaml) -> Result<ValueExpr, SpecError> {
    match yaml {
        Yaml::Null => Ok(ValueExpr::Null),
        Yaml::Bool(b) => Ok(ValueExpr::Bool(*b)),
        Yaml::Number(n) => Ok(ValueExpr::Number(number_to_json(n)?)),
        Yaml::String(s) => Ok(ValueExpr::String(s.clone())),
        Yaml::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(value_expr(&format!("{}[{}]", field, i), item)?);
            }
            Ok(ValueExpr::Sequence(out))
        }
        Yaml::Mapping(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, value) in map {
                let key = key
                    .as_str()
                    .ok_or_else(|| field_type(field, "string keys", key))?;
                out.push((
                    key.to_string(),
                    value_expr(&format!("{}.{}", field, key), value)?,
                ));
            }
            Ok(ValueExpr::Mapping(out))
        }
        Yaml::Tagged(tagged) => match tag_name(tagged).as_str() {
            POINTER_TAG => Ok(ValueExpr::Pointer(pointer_from(field, tagged)?)),
            REGEX_TAG => Err(field_type(
                field,
                "a value or `!pointer` (patterns are only valid in expected-response positions)",
                yaml,
            )),
            _ => Err(field_type(field, "a value or `!pointer`", yaml)),
        },
    }
}

/// Parse a field restricted to scalars: string, number, or `!pointer`.
/// Used for headers, query/uri parameters, and form fields.
pub(crate) fn scalar_expr(field: &str, yaml: &Yaml) -> Result<ValueExpr, SpecError> {
    match yaml {
        Yaml::Number(n) => Ok(ValueExpr::Number(number_to_json(n)?)),
        Yaml::String(s) => Ok(ValueExpr::String(s.clone())),
        Yaml::Tagged(tagged) if tag_name(tagged) == POINTER_TAG => {
            Ok(ValueExpr::Pointer(pointer_from(field, tagged)?))
        }
        _ => Err(field_type(field, "a string, number, or `!pointer`", yaml)),
    }
}

/// Parse an expected-response value: `!regex` becomes a compiled pattern,
/// everything else a literal template.
pub(crate) fn expected(field: &str, yaml: &Yaml) -> Result<Expected, SpecError> {
    if let Yaml::Tagged(tagged) = yaml {
        if tag_name(tagged) == REGEX_TAG {
            let pattern = tagged
                .value
                .as_str()
                .ok_or_else(|| field_type(field, "a pattern string", &tagged.value))?;
            let regex = Regex::new(pattern).map_err(|source| SpecError::Pattern {
                field: field.to_string(),
                source,
            })?;
            return Ok(Expected::Pattern(regex));
        }
    }
    Ok(Expected::Literal(value_expr(field, yaml)?))
}

/// Convert plain YAML into plain JSON. Tags are rejected: declared variables
/// and schemas live in the store as inert data, so a `!pointer` here would be
/// an unresolvable reference.
pub(crate) fn yaml_to_json(field: &str, yaml: &Yaml) -> Result<serde_json::Value, SpecError> {
    match yaml {
        Yaml::Null => Ok(serde_json::Value::Null),
        Yaml::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Yaml::Number(n) => Ok(serde_json::Value::Number(number_to_json(n)?)),
        Yaml::String(s) => Ok(serde_json::Value::String(s.clone())),
        Yaml::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(yaml_to_json(&format!("{}[{}]", field, i), item)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        Yaml::Mapping(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                let key = key
                    .as_str()
                    .ok_or_else(|| field_type(field, "string keys", key))?;
                out.insert(
                    key.to_string(),
                    yaml_to_json(&format!("{}.{}", field, key), value)?,
                );
            }
            Ok(serde_json::Value::Object(out))
        }
        Yaml::Tagged(_) => Err(field_type(field, "plain data without tags", yaml)),
    }
}

fn number_to_json(n: &serde_yaml::Number) -> Result<serde_json::Number, SpecError> {
    if let Some(i) = n.as_i64() {
        Ok(serde_json::Number::from(i))
    } else if let Some(u) = n.as_u64() {
        Ok(serde_json::Number::from(u))
    } else if let Some(f) = n.as_f64() {
        serde_json::Number::from_f64(f).ok_or_else(|| SpecError::NonFiniteNumber(n.to_string()))
    } else {
        Err(SpecError::NonFiniteNumber(n.to_string()))
    }
}
