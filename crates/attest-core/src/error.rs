use thiserror::Error;

/// Failures raised while dereferencing pointers or resolving template values
/// against the variable store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("pointer `{path}` does not resolve to a value in the variable store")]
    UnresolvedPointer { path: String },

    #[error("pointer `{path}`: `{segment}` is not a container and cannot be descended into")]
    NotAContainer { path: String, segment: String },

    #[error("invalid pointer path `{path}`")]
    InvalidPath { path: String },
}
