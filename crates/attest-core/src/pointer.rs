//! Named path references into the shared variable store.
//!
//! A [`Pointer`] is the deferred-value primitive of the specification format:
//! wherever a field accepts "a value or a pointer", the pointer names a
//! dotted/bracketed path (`session.user.id`, `items[2].name`) that is read
//! from (or written into) the variable store at use time. Pointers never
//! own the store; they are resolved against whatever store the caller
//! supplies.

use crate::error::ResolveError;
use serde_json::Value;
use std::fmt;

/// One step of a parsed pointer path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{}", k),
            Segment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A named path reference into a mutable variable store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    path: String,
    segments: Vec<Segment>,
}

impl Pointer {
    /// Parse a pointer path. Paths are dot-separated keys with optional
    /// bracket indices: `a.b[2].c`. Empty paths and empty segments are
    /// rejected.
    pub fn new(path: impl Into<String>) -> Result<Self, ResolveError> {
        let path = path.into();
        let segments = parse_segments(&path)?;
        Ok(Self { path, segments })
    }

    /// The raw path as written in the specification document.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Structural read. Returns an owned clone of the addressed value;
    /// a missing path or a traversal through a scalar fails with
    /// [`ResolveError::UnresolvedPointer`].
    pub fn get(&self, store: &Value) -> Result<Value, ResolveError> {
        let mut current = store;
        for segment in &self.segments {
            let next = match (segment, current) {
                (Segment::Key(k), Value::Object(map)) => map.get(k),
                (Segment::Index(i), Value::Array(items)) => items.get(*i),
                _ => None,
            };
            current = next.ok_or_else(|| ResolveError::UnresolvedPointer {
                path: self.path.clone(),
            })?;
        }
        Ok(current.clone())
    }

    /// Structural write, creating intermediate containers as needed: missing
    /// keys become objects, index segments grow arrays with nulls. Fails with
    /// [`ResolveError::NotAContainer`] when an existing intermediate is a
    /// scalar that cannot be descended into.
    pub fn set(&self, store: &mut Value, value: Value) -> Result<(), ResolveError> {
        let mut current = store;
        let (last, intermediate) = self
            .segments
            .split_last()
            .expect("pointer paths always have at least one segment");

        for segment in intermediate {
            current = self.descend(current, segment)?;
        }

        match (last, current) {
            (Segment::Key(k), Value::Object(map)) => {
                map.insert(k.clone(), value);
                Ok(())
            }
            (Segment::Key(k), slot @ Value::Null) => {
                let mut map = serde_json::Map::new();
                map.insert(k.clone(), value);
                *slot = Value::Object(map);
                Ok(())
            }
            (Segment::Index(i), Value::Array(items)) => {
                while items.len() <= *i {
                    items.push(Value::Null);
                }
                items[*i] = value;
                Ok(())
            }
            (Segment::Index(i), slot @ Value::Null) => {
                let mut items = vec![Value::Null; *i + 1];
                items[*i] = value;
                *slot = Value::Array(items);
                Ok(())
            }
            (segment, _) => Err(ResolveError::NotAContainer {
                path: self.path.clone(),
                segment: segment.to_string(),
            }),
        }
    }

    /// Descend one segment for writing, materializing the container the
    /// segment implies when the slot is currently null or absent.
    fn descend<'a>(
        &self,
        current: &'a mut Value,
        segment: &Segment,
    ) -> Result<&'a mut Value, ResolveError> {
        if current.is_null() {
            *current = match segment {
                Segment::Key(_) => Value::Object(serde_json::Map::new()),
                Segment::Index(_) => Value::Array(Vec::new()),
            };
        }
        match (segment, current) {
            (Segment::Key(k), Value::Object(map)) => {
                Ok(map.entry(k.clone()).or_insert(Value::Null))
            }
            (Segment::Index(i), Value::Array(items)) => {
                while items.len() <= *i {
                    items.push(Value::Null);
                }
                Ok(&mut items[*i])
            }
            (segment, _) => Err(ResolveError::NotAContainer {
                path: self.path.clone(),
                segment: segment.to_string(),
            }),
        }
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

fn parse_segments(path: &str) -> Result<Vec<Segment>, ResolveError> {
    let invalid = || ResolveError::InvalidPath {
        path: path.to_string(),
    };

    if path.is_empty() {
        return Err(invalid());
    }

    let mut segments = Vec::new();
    for piece in path.split('.') {
        let bracket = piece.find('[');
        let (head, mut rest) = match bracket {
            Some(0) => ("", piece),
            Some(at) => (&piece[..at], &piece[at..]),
            None => (piece, ""),
        };

        if bracket != Some(0) {
            if head.is_empty() {
                return Err(invalid());
            }
            segments.push(Segment::Key(head.to_string()));
        }

        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(invalid());
            }
            let close = rest.find(']').ok_or_else(invalid)?;
            let index: usize = rest[1..close].parse().map_err(|_| invalid())?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }

    if segments.is_empty() {
        return Err(invalid());
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn get_reads_nested_paths() {
        let store = json!({ "session": { "user": { "id": 42 } }, "items": [1, 2, 3] });

        let ptr = Pointer::new("session.user.id").unwrap();
        assert_eq!(ptr.get(&store).unwrap(), json!(42));

        let ptr = Pointer::new("items[1]").unwrap();
        assert_eq!(ptr.get(&store).unwrap(), json!(2));
    }

    #[test]
    fn get_missing_path_is_an_error() {
        let store = json!({ "a": 1 });
        let ptr = Pointer::new("a.b.c").unwrap();
        assert_eq!(
            ptr.get(&store),
            Err(ResolveError::UnresolvedPointer {
                path: "a.b.c".into()
            })
        );
    }

    #[test]
    fn set_creates_intermediate_containers() {
        let mut store = json!({});
        let ptr = Pointer::new("session.tokens[1].value").unwrap();
        ptr.set(&mut store, json!("abc")).unwrap();

        assert_eq!(
            store,
            json!({ "session": { "tokens": [null, { "value": "abc" }] } })
        );
    }

    #[test]
    fn set_overwrites_existing_values() {
        let mut store = json!({ "counter": 1 });
        let ptr = Pointer::new("counter").unwrap();
        ptr.set(&mut store, json!(2)).unwrap();
        assert_eq!(store, json!({ "counter": 2 }));
    }

    #[test]
    fn set_refuses_to_descend_into_scalars() {
        let mut store = json!({ "name": "alice" });
        let ptr = Pointer::new("name.first").unwrap();
        let err = ptr.set(&mut store, json!("a")).unwrap_err();
        assert!(matches!(err, ResolveError::NotAContainer { .. }));
    }

    #[test]
    fn invalid_paths_are_rejected() {
        for path in ["", "a..b", "a[", "a[x]", "a[1"] {
            assert!(Pointer::new(path).is_err(), "path {:?} should fail", path);
        }
    }
}
