//! Template values and their resolution against the variable store.
//!
//! Request fragments and expected values in a specification document may be
//! partly dynamic: any scalar position can hold a [`Pointer`] instead of a
//! literal. The parser turns such fragments into a [`ValueExpr`] tree, and
//! [`resolve`] rebuilds that tree into plain JSON immediately before it is
//! compared or sent, dereferencing every pointer against the supplied store.
//!
//! Resolution always produces freshly-owned data: assertions and outgoing
//! requests never observe unresolved references, and never receive aliased
//! mutable state reaching back into the store.

use crate::error::ResolveError;
use crate::pointer::Pointer;
use serde_json::Value;

/// A JSON-shaped value in which any position may be a deferred pointer read.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Sequence(Vec<ValueExpr>),
    Mapping(Vec<(String, ValueExpr)>),
    Pointer(Pointer),
}

impl ValueExpr {
    /// Lift plain JSON into a template. The result contains no pointers.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ValueExpr::Null,
            Value::Bool(b) => ValueExpr::Bool(*b),
            Value::Number(n) => ValueExpr::Number(n.clone()),
            Value::String(s) => ValueExpr::String(s.clone()),
            Value::Array(items) => {
                ValueExpr::Sequence(items.iter().map(ValueExpr::from_json).collect())
            }
            Value::Object(map) => ValueExpr::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), ValueExpr::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Whether any position in this template is a pointer.
    pub fn contains_pointer(&self) -> bool {
        match self {
            ValueExpr::Pointer(_) => true,
            ValueExpr::Sequence(items) => items.iter().any(ValueExpr::contains_pointer),
            ValueExpr::Mapping(entries) => {
                entries.iter().any(|(_, value)| value.contains_pointer())
            }
            _ => false,
        }
    }
}

impl From<&str> for ValueExpr {
    fn from(value: &str) -> Self {
        ValueExpr::String(value.to_string())
    }
}

/// Resolve a template into plain JSON against `store`.
///
/// Pointers are dereferenced exactly once: the store holds plain JSON, so a
/// value read through a pointer is deep-cloned as-is and never re-resolved.
pub fn resolve(value: &ValueExpr, store: &Value) -> Result<Value, ResolveError> {
    match value {
        ValueExpr::Null => Ok(Value::Null),
        ValueExpr::Bool(b) => Ok(Value::Bool(*b)),
        ValueExpr::Number(n) => Ok(Value::Number(n.clone())),
        ValueExpr::String(s) => Ok(Value::String(s.clone())),
        ValueExpr::Sequence(items) => items
            .iter()
            .map(|item| resolve(item, store))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ValueExpr::Mapping(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (key, item) in entries {
                map.insert(key.clone(), resolve(item, store)?);
            }
            Ok(Value::Object(map))
        }
        ValueExpr::Pointer(pointer) => pointer.get(store),
    }
}
