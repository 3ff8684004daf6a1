use thiserror::Error;

/// Errors raised while turning a specification document into a Suite tree.
///
/// Every variant is fatal to the document load: a malformed specification is
/// never partially executed.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("field `{field}`: expected {allowed}, found {found}")]
    FieldType {
        field: String,
        allowed: &'static str,
        found: String,
    },

    #[error("test key `{key}`: {reason}")]
    InvalidTestKey { key: String, reason: String },

    #[error("field `{field}`: {source}")]
    Pointer {
        field: String,
        source: attest_core::ResolveError,
    },

    #[error("field `{field}`: invalid pattern: {source}")]
    Pattern {
        field: String,
        source: regex::Error,
    },

    #[error("`content-type` conflict: {0}")]
    ContentTypeConflict(String),

    #[error("request declares more than one body format: `{0}` and `{1}`")]
    ConflictingBodyFormats(&'static str, &'static str),

    #[error("`timeout` must be a positive number of milliseconds, found {0}")]
    InvalidTimeout(String),

    #[error("number `{0}` has no JSON representation")]
    NonFiniteNumber(String),

    #[error("schema `{name}`: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("RAML document `{file}`: {reason}")]
    Raml { file: String, reason: String },

    #[error("unknown resourceType `{0}`")]
    UnknownResourceType(String),

    #[error("unknown trait `{0}`")]
    UnknownTrait(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
