//! The per-specification variable store.

use serde_json::Value;
use tracing::debug;

/// Reserved store key under which process environment values are exposed.
pub const ENV_KEY: &str = "ENV";

/// A single mutable nested mapping shared by every test of one loaded
/// specification.
///
/// Created once when the document is loaded, seeded from its `variables`
/// block plus the process environment under [`ENV_KEY`], and destroyed when
/// the run completes. The only writers after load are value-extraction
/// assertions going through [`Pointer::set`](crate::Pointer::set).
#[derive(Debug, Clone, Default)]
pub struct Context {
    store: Value,
}

impl Context {
    /// An empty store (`{}`).
    pub fn new() -> Self {
        Self {
            store: Value::Object(serde_json::Map::new()),
        }
    }

    /// Seed the store from a declared `variables` mapping. Anything other
    /// than a JSON object is ignored in favor of an empty store; the parser
    /// validates the shape before this is reached.
    pub fn with_variables(variables: Value) -> Self {
        match variables {
            Value::Object(_) => Self { store: variables },
            _ => Self::new(),
        }
    }

    /// Merge name/value pairs under the reserved `ENV` key. Later entries win
    /// over declared `variables.ENV` values of the same name.
    pub fn merge_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let root = match self.store.as_object_mut() {
            Some(map) => map,
            None => return,
        };
        let env = root
            .entry(ENV_KEY.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !env.is_object() {
            debug!("declared variables.ENV is not a mapping; replacing it");
            *env = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(env) = env {
            for (name, value) in vars {
                env.insert(name, Value::String(value));
            }
        }
    }

    pub fn store(&self) -> &Value {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Value {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn env_merges_under_reserved_key() {
        let mut ctx = Context::with_variables(json!({ "ENV": { "KEEP": "yes" }, "a": 1 }));
        ctx.merge_env(vec![("HOME".to_string(), "/root".to_string())]);

        assert_eq!(
            ctx.store(),
            &json!({ "ENV": { "KEEP": "yes", "HOME": "/root" }, "a": 1 })
        );
    }

    #[test]
    fn env_values_win_over_declared_ones() {
        let mut ctx = Context::with_variables(json!({ "ENV": { "MODE": "declared" } }));
        ctx.merge_env(vec![("MODE".to_string(), "process".to_string())]);
        assert_eq!(ctx.store()["ENV"]["MODE"], json!("process"));
    }
}
