//! The typed Suite/Test tree a specification document parses into.
//!
//! The parser owns construction; everything here is plain data plus small
//! accessors. A [`Suite`] is either an internal grouping node or a leaf
//! wrapping exactly one [`Test`], never both. Children are held as an
//! explicit ordered sequence, so sequential-by-default chaining does not
//! depend on map iteration order.

use crate::pointer::Pointer;
use crate::resolve::ValueExpr;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default per-test exchange timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// The fixed HTTP verb set recognized in suite keys and RAML methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Patch,
        Method::Head,
        Method::Options,
    ];

    /// Case-insensitive verb lookup.
    pub fn parse(verb: &str) -> Option<Method> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(verb))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
            Method::Patch => "patch",
            Method::Head => "head",
            Method::Options => "options",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a suite within the tree, as an ordered list of suite names
/// from the root down to (and including) the leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TestPath(pub Vec<String>);

impl TestPath {
    pub fn child(&self, name: impl Into<String>) -> TestPath {
        let mut segments = self.0.clone();
        segments.push(name.into());
        TestPath(segments)
    }
}

impl fmt::Display for TestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" / "))
    }
}

/// A named node in the test tree.
#[derive(Debug, Clone, Default)]
pub struct Suite {
    pub name: String,
    pub children: Vec<Suite>,
    pub test: Option<Test>,
    pub skip: bool,
}

impl Suite {
    /// An internal grouping node.
    pub fn internal(name: impl Into<String>, children: Vec<Suite>, skip: bool) -> Suite {
        Suite {
            name: name.into(),
            children,
            test: None,
            skip,
        }
    }

    /// A leaf node wrapping one test.
    pub fn leaf(name: impl Into<String>, test: Test) -> Suite {
        Suite {
            name: name.into(),
            children: Vec::new(),
            test: Some(test),
            skip: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.test.is_some()
    }

    /// Depth-first walk over every leaf, in declaration order, yielding each
    /// leaf's path and test.
    pub fn for_each_leaf<'a>(&'a self, mut visit: impl FnMut(&TestPath, &'a Suite)) {
        fn walk<'a>(
            suite: &'a Suite,
            path: &TestPath,
            visit: &mut impl FnMut(&TestPath, &'a Suite),
        ) {
            let here = path.child(&suite.name);
            if suite.is_leaf() {
                visit(&here, suite);
            }
            for child in &suite.children {
                walk(child, &here, visit);
            }
        }
        for child in &self.children {
            walk(child, &TestPath::default(), &mut visit);
        }
        if self.is_leaf() {
            visit(&TestPath(vec![self.name.clone()]), self);
        }
    }
}

/// One declared HTTP exchange plus its expected-response assertions.
#[derive(Debug, Clone)]
pub struct Test {
    /// The leaf name, e.g. `GET /users/{id}`.
    pub name: String,
    pub method: Method,
    pub uri_template: String,
    pub uri_parameters: Vec<(String, ValueExpr)>,
    pub request: RequestSpec,
    pub response: ResponseSpec,
    pub timeout_ms: u64,
    /// Paths of suites whose tests must settle before this one runs.
    pub depends_on: Vec<TestPath>,
    pub assertions: Vec<Assertion>,
}

impl Test {
    pub fn new(method: Method, uri_template: impl Into<String>) -> Test {
        let uri_template = uri_template.into();
        Test {
            name: format!("{} {}", method.as_str().to_uppercase(), uri_template),
            method,
            uri_template,
            uri_parameters: Vec::new(),
            request: RequestSpec::default(),
            response: ResponseSpec::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            depends_on: Vec::new(),
            assertions: Vec::new(),
        }
    }
}

/// Declared request shape.
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    pub headers: Vec<(String, ValueExpr)>,
    pub query_parameters: Vec<(String, ValueExpr)>,
    pub body: Option<RequestBody>,
    /// Multipart file attachments: field name → file path.
    pub attach: Vec<(String, String)>,
}

impl RequestSpec {
    /// The explicitly declared `content-type` header template, if any.
    pub fn content_type(&self) -> Option<&ValueExpr> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value)
    }
}

/// Request body, as declared through one of the format shortcuts.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(ValueExpr),
    Form(Vec<(String, ValueExpr)>),
    UrlEncoded(Vec<(String, ValueExpr)>),
}

/// Declared response expectations.
#[derive(Debug, Clone)]
pub struct ResponseSpec {
    pub status: u16,
    pub headers: Vec<(String, Expected)>,
    pub body: ResponseBodySpec,
}

impl Default for ResponseSpec {
    fn default() -> Self {
        ResponseSpec {
            status: 200,
            headers: Vec::new(),
            body: ResponseBodySpec::default(),
        }
    }
}

/// The `body` block of a response declaration.
#[derive(Debug, Clone, Default)]
pub struct ResponseBodySpec {
    /// Whole-body equality (or pattern match against the raw text).
    pub is: Option<Expected>,
    /// Field-path → expected value pairs.
    pub matches: Vec<(String, Expected)>,
    pub schema: Option<SchemaRef>,
    /// Extractions into the variable store.
    pub take: Vec<(BodySource, Pointer)>,
    /// Debugging aid: log the received body.
    pub print: bool,
}

/// What part of the response body an extraction reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySource {
    WholeBody,
    Field(String),
}

impl fmt::Display for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::WholeBody => f.write_str("*"),
            BodySource::Field(field) => f.write_str(field),
        }
    }
}

/// A JSON Schema reference: either a named entry of the document's schema
/// table or an inline schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaRef {
    Named(String),
    Inline(serde_json::Value),
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaRef::Named(name) => write!(f, "{}", name),
            SchemaRef::Inline(_) => f.write_str("(inline)"),
        }
    }
}

/// An expected value, decided once at parse time.
#[derive(Debug, Clone)]
pub enum Expected {
    /// Compare structurally after resolving pointers.
    Literal(ValueExpr),
    /// Test against a regular expression.
    Pattern(Regex),
}

impl PartialEq for Expected {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expected::Literal(a), Expected::Literal(b)) => a == b,
            (Expected::Pattern(a), Expected::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Literal(value) => write!(f, "{:?}", value),
            Expected::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// One executable check against a test's eventual HTTP response.
///
/// The parser emits these deterministically from the declarative response
/// block; emission order defines report order.
#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    StatusCode {
        expected: u16,
    },
    BodyEquals {
        expected: Expected,
    },
    BodyFieldMatches {
        field: String,
        expected: Expected,
    },
    HeaderMatches {
        header: String,
        expected: Expected,
    },
    /// Extraction into the variable store; the only variant with a side
    /// effect beyond reporting.
    CopyValue {
        source: BodySource,
        target: Pointer,
    },
    ValidateSchema {
        schema: SchemaRef,
    },
}

impl Assertion {
    /// Human-readable label used in reports.
    pub fn name(&self) -> String {
        match self {
            Assertion::StatusCode { expected } => format!("status code is {}", expected),
            Assertion::BodyEquals { .. } => "body equals the expected value".to_string(),
            Assertion::BodyFieldMatches { field, .. } => {
                format!("body field `{}` matches", field)
            }
            Assertion::HeaderMatches { header, .. } => format!("header `{}` matches", header),
            Assertion::CopyValue { source, target } => {
                format!("copy `{}` into `{}`", source, target)
            }
            Assertion::ValidateSchema { schema } => {
                format!("body conforms to schema `{}`", schema)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn method_parsing_covers_the_fixed_verb_set() {
        assert_eq!(Method::parse("GET"), Some(Method::Get));
        assert_eq!(Method::parse("options"), Some(Method::Options));
        assert_eq!(Method::parse("SARASA"), None);
    }

    #[test]
    fn leaves_are_visited_in_declaration_order() {
        let mut root = Suite::default();
        root.children.push(Suite::internal(
            "Users",
            vec![
                Suite::leaf("POST /users", Test::new(Method::Post, "/users")),
                Suite::leaf("GET /users", Test::new(Method::Get, "/users")),
            ],
            false,
        ));

        let mut seen = Vec::new();
        root.for_each_leaf(|path, _| seen.push(path.to_string()));
        assert_eq!(
            seen,
            vec!["Users / POST /users".to_string(), "Users / GET /users".to_string()]
        );
    }

    #[test]
    fn assertion_names_are_self_describing() {
        let assertion = Assertion::CopyValue {
            source: BodySource::Field("id".into()),
            target: Pointer::new("session.userId").unwrap(),
        };
        assert_eq!(assertion.name(), "copy `id` into `session.userId`");
    }
}
