//! Specification and RAML document parsing for attest.
//!
//! [`SpecDocument`] is the entry point: it turns a YAML specification into a
//! validated Suite/Test tree with its assertions synthesized, the seeded
//! variable-store context, the schema table, and, when the document names
//! one, the loaded RAML description for coverage.

pub mod document;
pub mod error;
pub mod raml;

mod suite;
mod value;

pub use document::{Options, RamlOptions, SchemaTable, SpecDocument};
pub use error::SpecError;
pub use raml::{
    RamlBody, RamlDocument, RamlHeader, RamlMethod, RamlQueryParameter, RamlResource,
    RamlResponse, SourceSpan,
};
