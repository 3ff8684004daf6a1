//! Typed RAML document model.
//!
//! Only the parts the coverage engine consumes: the resource tree, method
//! declarations with query parameters, and per-status responses with their
//! content-types, headers, and schemas. Every node carries the source span
//! it was declared at, for line-level coverage reporting.

use attest_core::{Method, SchemaRef};

/// Position of a declaration in its source file, 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    pub file: String,
    pub line: u32,
    pub line_end: u32,
}

#[derive(Debug, Clone)]
pub struct RamlDocument {
    pub title: Option<String>,
    pub base_uri: Option<String>,
    /// Inline schemas declared at the top of the document.
    pub schemas: Vec<(String, serde_json::Value)>,
    pub resources: Vec<RamlResource>,
}

impl RamlDocument {
    /// Every resource in the tree, parents before children.
    pub fn all_resources(&self) -> Vec<&RamlResource> {
        fn walk<'a>(resource: &'a RamlResource, out: &mut Vec<&'a RamlResource>) {
            out.push(resource);
            for child in &resource.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for resource in &self.resources {
            walk(resource, &mut out);
        }
        out
    }
}

/// One resource node; `path` is the full templated path joined from the
/// nesting (`/users/{id}`).
#[derive(Debug, Clone)]
pub struct RamlResource {
    pub path: String,
    pub methods: Vec<RamlMethod>,
    pub children: Vec<RamlResource>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct RamlMethod {
    pub verb: Method,
    pub query_parameters: Vec<RamlQueryParameter>,
    pub responses: Vec<RamlResponse>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct RamlQueryParameter {
    pub name: String,
    pub required: bool,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct RamlResponse {
    pub status: u16,
    pub headers: Vec<RamlHeader>,
    pub bodies: Vec<RamlBody>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct RamlHeader {
    pub name: String,
    pub required: bool,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct RamlBody {
    pub content_type: String,
    pub schema: Option<SchemaRef>,
    pub span: SourceSpan,
}
