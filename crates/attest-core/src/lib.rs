//! Core data model and variable resolution for attest

pub mod context;
pub mod error;
pub mod model;
pub mod pointer;
pub mod resolve;

pub use context::Context;
pub use error::ResolveError;
pub use model::{
    Assertion, BodySource, Expected, Method, RequestBody, RequestSpec, ResponseBodySpec,
    ResponseSpec, SchemaRef, Suite, Test, TestPath,
};
pub use pointer::Pointer;
pub use resolve::{resolve, ValueExpr};
