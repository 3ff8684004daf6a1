//! RAML-driven coverage: which declared behaviors the run exercised.
//!
//! Each declared resource expands into a tree of obligations derived
//! purely from the RAML (never from the test suite). Observations are
//! routed to resources by URL-template shape, and each obligation is
//! judged against every matching observation once the run has settled.
//! States separate hard violations (`Errored`) from behavior that was
//! simply never exercised (`NotCovered`), and per-declaration source
//! spans roll up into a per-line hit map for LCOV output.

use crate::error::CoverageError;
use crate::http::Response;
use crate::scheduler::Observation;
use attest_core::{Method, SchemaRef};
use attest_parser::{RamlDocument, RamlResource, SchemaTable, SourceSpan};
use std::collections::BTreeMap;
use tracing::debug;

/// Lifecycle state of one coverage node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageState {
    /// Not yet judged; only seen before `validate`.
    Pending,
    /// Every matching observation satisfied the obligation.
    Valid,
    /// A matching observation violated the obligation, or a required
    /// element never appeared.
    Errored,
    /// Nothing in the run exercised this obligation.
    NotCovered,
}

impl CoverageState {
    fn severity(self) -> u8 {
        match self {
            CoverageState::Valid => 0,
            CoverageState::Pending => 1,
            CoverageState::NotCovered => 2,
            CoverageState::Errored => 3,
        }
    }
}

fn merge(a: CoverageState, b: CoverageState) -> CoverageState {
    if b.severity() > a.severity() {
        b
    } else {
        a
    }
}

/// A single declared behavior to check against the observations. The
/// filter always starts from the observing test's declared shape
/// (method and expected status), so a test that expected 404 never
/// pollutes the 200 obligations of the same resource.
#[derive(Debug, Clone)]
enum Obligation {
    /// The method has no declared responses; any call at all covers it.
    MethodCalled { verb: Method },
    QueryParamSent {
        verb: Method,
        name: String,
        required: bool,
    },
    QueryParamOmitted { verb: Method, name: String },
    StatusReturned { verb: Method, status: u16 },
    ContentTypeReturned {
        verb: Method,
        status: u16,
        content_type: String,
    },
    BodyConforms {
        verb: Method,
        status: u16,
        content_type: String,
        schema: SchemaRef,
    },
    HeaderReturned {
        verb: Method,
        status: u16,
        name: String,
        required: bool,
    },
}

impl Obligation {
    fn evaluate(
        &self,
        observations: &[Observation],
        schemas: &SchemaTable,
    ) -> Result<(), CoverageError> {
        match self {
            Obligation::MethodCalled { verb } => {
                if observations.iter().any(|o| o.test.method == *verb) {
                    Ok(())
                } else {
                    Err(CoverageError::NoMatchingResults)
                }
            }

            Obligation::QueryParamSent {
                verb,
                name,
                required,
            } => {
                let calls: Vec<&Observation> = by_method(observations, *verb);
                if calls.is_empty() {
                    return Err(CoverageError::NoMatchingResults);
                }
                if calls.iter().any(|o| o.request.has_query(name)) {
                    Ok(())
                } else if *required {
                    Err(CoverageError::Check(format!(
                        "required query parameter `{name}` was never sent"
                    )))
                } else {
                    Err(CoverageError::NoMatchingResults)
                }
            }

            Obligation::QueryParamOmitted { verb, name } => {
                let calls = by_method(observations, *verb);
                if calls.is_empty() {
                    return Err(CoverageError::NoMatchingResults);
                }
                if calls.iter().any(|o| !o.request.has_query(name)) {
                    Ok(())
                } else {
                    Err(CoverageError::NoMatchingResults)
                }
            }

            Obligation::StatusReturned { verb, status } => {
                let calls = by_status(observations, *verb, *status);
                if calls.is_empty() {
                    return Err(CoverageError::NoMatchingResults);
                }
                for observation in calls {
                    if observation.response.status != *status {
                        return Err(CoverageError::Check(format!(
                            "expected status {status}, got {}",
                            observation.response.status
                        )));
                    }
                }
                Ok(())
            }

            Obligation::ContentTypeReturned {
                verb,
                status,
                content_type,
            } => {
                let calls = by_status(observations, *verb, *status);
                if calls.is_empty() {
                    return Err(CoverageError::NoMatchingResults);
                }
                for observation in calls {
                    match observation.response.get("content-type") {
                        Some(actual) if actual.eq_ignore_ascii_case(content_type) => {}
                        Some(actual) => {
                            return Err(CoverageError::Check(format!(
                                "expected content-type `{content_type}`, got `{actual}`"
                            )))
                        }
                        None => {
                            return Err(CoverageError::Check(
                                "response carried no content-type header".to_string(),
                            ))
                        }
                    }
                }
                Ok(())
            }

            Obligation::BodyConforms {
                verb,
                status,
                content_type,
                schema,
            } => {
                let calls: Vec<&Observation> = by_status(observations, *verb, *status)
                    .into_iter()
                    .filter(|o| content_type_is(&o.response, content_type))
                    .collect();
                if calls.is_empty() {
                    return Err(CoverageError::NoMatchingResults);
                }
                let schema = match schema {
                    SchemaRef::Inline(value) => value,
                    SchemaRef::Named(name) => schemas.get(name).ok_or_else(|| {
                        CoverageError::Check(format!("schema `{name}` is not defined"))
                    })?,
                };
                let validator = jsonschema::draft202012::new(schema).map_err(|error| {
                    CoverageError::Check(format!("schema failed to compile: {error}"))
                })?;
                for observation in calls {
                    let body = observation.response.body().map_err(|error| {
                        CoverageError::Check(format!("body is not valid JSON: {error}"))
                    })?;
                    let failures: Vec<String> = validator
                        .iter_errors(&body)
                        .map(|error| error.to_string())
                        .collect();
                    if !failures.is_empty() {
                        return Err(CoverageError::Check(failures.join("; ")));
                    }
                }
                Ok(())
            }

            Obligation::HeaderReturned {
                verb,
                status,
                name,
                required,
            } => {
                let calls = by_status(observations, *verb, *status);
                if calls.is_empty() {
                    return Err(CoverageError::NoMatchingResults);
                }
                let missing = calls.iter().any(|o| o.response.get(name).is_none());
                if !missing {
                    Ok(())
                } else if *required {
                    Err(CoverageError::Check(format!(
                        "required header `{name}` was missing from a matching response"
                    )))
                } else {
                    Err(CoverageError::NoMatchingResults)
                }
            }
        }
    }
}

fn by_method(observations: &[Observation], verb: Method) -> Vec<&Observation> {
    observations
        .iter()
        .filter(|o| o.test.method == verb)
        .collect()
}

fn by_status(observations: &[Observation], verb: Method, status: u16) -> Vec<&Observation> {
    observations
        .iter()
        .filter(|o| o.test.method == verb && o.test.expected_status == status)
        .collect()
}

fn content_type_is(response: &Response, content_type: &str) -> bool {
    response
        .get("content-type")
        .is_some_and(|actual| actual.eq_ignore_ascii_case(content_type))
}

/// One node of a resource's obligation tree.
#[derive(Debug, Clone)]
pub struct CoverageAssertion {
    pub name: String,
    pub source: Option<SourceSpan>,
    pub state: CoverageState,
    /// Failure message when the state is `Errored`.
    pub detail: Option<String>,
    pub children: Vec<CoverageAssertion>,
    obligation: Option<Obligation>,
}

impl CoverageAssertion {
    fn structural(name: String, source: SourceSpan) -> CoverageAssertion {
        CoverageAssertion {
            name,
            source: Some(source),
            state: CoverageState::Pending,
            detail: None,
            children: Vec::new(),
            obligation: None,
        }
    }

    fn checked(name: String, source: SourceSpan, obligation: Obligation) -> CoverageAssertion {
        CoverageAssertion {
            obligation: Some(obligation),
            ..CoverageAssertion::structural(name, source)
        }
    }

    /// Whether this node carries an obligation of its own, as opposed
    /// to only grouping children.
    pub fn is_obligation(&self) -> bool {
        self.obligation.is_some()
    }

    fn judge(&mut self, observations: &[Observation], schemas: &SchemaTable) {
        let own = match &self.obligation {
            None => CoverageState::Valid,
            Some(obligation) => match obligation.evaluate(observations, schemas) {
                Ok(()) => CoverageState::Valid,
                Err(CoverageError::NoMatchingResults) => CoverageState::NotCovered,
                Err(CoverageError::Check(message)) => {
                    self.detail = Some(message);
                    CoverageState::Errored
                }
            },
        };
        let mut state = own;
        for child in &mut self.children {
            child.judge(observations, schemas);
            state = merge(state, child.state);
        }
        self.state = state;
    }

    /// Depth-first walk over this node and everything under it.
    pub fn for_each<'a>(&'a self, visit: &mut impl FnMut(&'a CoverageAssertion)) {
        visit(self);
        for child in &self.children {
            child.for_each(visit);
        }
    }
}

/// The obligation tree for one declared resource, plus the
/// observations routed to it.
#[derive(Debug, Clone)]
pub struct CoverageResource {
    /// The declared templated path, e.g. `/users/{id}`.
    pub path: String,
    /// Shape key used for routing: querystring stripped, `{param}`
    /// segments erased.
    key: String,
    pub root: CoverageAssertion,
    observations: Vec<Observation>,
}

impl CoverageResource {
    fn generate(resource: &RamlResource) -> CoverageResource {
        let mut root =
            CoverageAssertion::structural(resource.path.clone(), resource.span.clone());
        for method in &resource.methods {
            let verb = method.verb;
            let mut method_node = CoverageAssertion::structural(
                format!("{} {}", verb.as_str().to_uppercase(), resource.path),
                method.span.clone(),
            );
            for parameter in &method.query_parameters {
                method_node.children.push(CoverageAssertion::checked(
                    format!("query parameter `{}` is sent", parameter.name),
                    parameter.span.clone(),
                    Obligation::QueryParamSent {
                        verb,
                        name: parameter.name.clone(),
                        required: parameter.required,
                    },
                ));
                method_node.children.push(CoverageAssertion::checked(
                    format!("query parameter `{}` is omitted in some call", parameter.name),
                    parameter.span.clone(),
                    Obligation::QueryParamOmitted {
                        verb,
                        name: parameter.name.clone(),
                    },
                ));
            }
            if method.responses.is_empty() {
                method_node.children.push(CoverageAssertion::checked(
                    "is called".to_string(),
                    method.span.clone(),
                    Obligation::MethodCalled { verb },
                ));
            }
            for response in &method.responses {
                let mut status_node = CoverageAssertion::checked(
                    format!("responds {}", response.status),
                    response.span.clone(),
                    Obligation::StatusReturned {
                        verb,
                        status: response.status,
                    },
                );
                for body in &response.bodies {
                    let mut content_node = CoverageAssertion::checked(
                        format!("returns `{}`", body.content_type),
                        body.span.clone(),
                        Obligation::ContentTypeReturned {
                            verb,
                            status: response.status,
                            content_type: body.content_type.clone(),
                        },
                    );
                    if let Some(schema) = &body.schema {
                        content_node.children.push(CoverageAssertion::checked(
                            format!("body conforms to schema `{schema}`"),
                            body.span.clone(),
                            Obligation::BodyConforms {
                                verb,
                                status: response.status,
                                content_type: body.content_type.clone(),
                                schema: schema.clone(),
                            },
                        ));
                    }
                    status_node.children.push(content_node);
                }
                for header in &response.headers {
                    status_node.children.push(CoverageAssertion::checked(
                        format!("sends header `{}`", header.name),
                        header.span.clone(),
                        Obligation::HeaderReturned {
                            verb,
                            status: response.status,
                            name: header.name.clone(),
                            required: header.required,
                        },
                    ));
                }
                method_node.children.push(status_node);
            }
            root.children.push(method_node);
        }
        CoverageResource {
            path: resource.path.clone(),
            key: normalize_template(&resource.path),
            root,
            observations: Vec::new(),
        }
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }
}

/// Aggregate coverage numbers plus the per-file, per-line hit map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    /// Number of obligation-carrying nodes.
    pub total: usize,
    pub valid: usize,
    pub errored: usize,
    pub not_covered: usize,
    /// file -> line -> hit count. Lines of unexercised declarations
    /// appear with zero hits.
    pub lines: BTreeMap<String, BTreeMap<u32, u32>>,
}

impl Coverage {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.valid as f64 * 100.0 / self.total as f64
        }
    }
}

/// Expands a RAML document into obligation trees, collects
/// observations, and judges everything exactly once.
#[derive(Debug)]
pub struct CoverageEngine {
    resources: Vec<CoverageResource>,
    unrouted: usize,
    finalized: bool,
}

impl CoverageEngine {
    /// Expand every resource of the document, parents before children.
    pub fn new(raml: &RamlDocument) -> CoverageEngine {
        CoverageEngine {
            resources: raml
                .all_resources()
                .into_iter()
                .map(CoverageResource::generate)
                .collect(),
            unrouted: 0,
            finalized: false,
        }
    }

    /// Route one observation to the resource whose template matches the
    /// observing test's uri template. Observations of undeclared
    /// endpoints are counted but otherwise ignored.
    pub fn record(&mut self, observation: Observation) {
        let key = normalize_template(&observation.test.uri_template);
        match self
            .resources
            .iter_mut()
            .find(|resource| resource.key == key)
        {
            Some(resource) => resource.observations.push(observation),
            None => {
                debug!(
                    template = %observation.test.uri_template,
                    "observation matches no declared resource"
                );
                self.unrouted += 1;
            }
        }
    }

    pub fn record_all(&mut self, observations: impl IntoIterator<Item = Observation>) {
        for observation in observations {
            self.record(observation);
        }
    }

    /// Judge every obligation against the routed observations. Runs
    /// once; later calls change nothing.
    pub fn validate(&mut self, schemas: &SchemaTable) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        for resource in &mut self.resources {
            resource.root.judge(&resource.observations, schemas);
        }
    }

    pub fn resources(&self) -> &[CoverageResource] {
        &self.resources
    }

    /// Observations that matched no declared resource.
    pub fn unrouted(&self) -> usize {
        self.unrouted
    }

    /// Tally obligation states and build the line hit map.
    pub fn coverage(&self) -> Coverage {
        let mut coverage = Coverage::default();
        for resource in &self.resources {
            resource.root.for_each(&mut |node| {
                if !node.is_obligation() {
                    return;
                }
                coverage.total += 1;
                match node.state {
                    CoverageState::Valid => coverage.valid += 1,
                    CoverageState::Errored => coverage.errored += 1,
                    CoverageState::NotCovered | CoverageState::Pending => {
                        coverage.not_covered += 1
                    }
                }
                if let Some(span) = &node.source {
                    let file = coverage.lines.entry(span.file.clone()).or_default();
                    for line in span.line..=span.line_end {
                        let hits = file.entry(line).or_insert(0);
                        if node.state == CoverageState::Valid {
                            *hits += 1;
                        }
                    }
                }
            });
        }
        coverage
    }
}

/// Reduce a templated path to its routing shape: querystring dropped,
/// `{param}` segments erased. `/users/{id}` and `/users/{userId}`
/// reduce to the same key.
fn normalize_template(template: &str) -> String {
    let path = template.split('?').next().unwrap_or("");
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') {
                "*"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::PreparedRequest;
    use crate::scheduler::TestDigest;
    use attest_parser::{RamlBody, RamlHeader, RamlMethod, RamlQueryParameter, RamlResponse};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn span(line: u32) -> SourceSpan {
        SourceSpan {
            file: "api.raml".to_string(),
            line,
            line_end: line,
        }
    }

    fn users_resource() -> RamlResource {
        RamlResource {
            path: "/users".to_string(),
            methods: vec![RamlMethod {
                verb: Method::Get,
                query_parameters: vec![RamlQueryParameter {
                    name: "page".to_string(),
                    required: false,
                    span: span(4),
                }],
                responses: vec![RamlResponse {
                    status: 200,
                    headers: vec![RamlHeader {
                        name: "x-total".to_string(),
                        required: true,
                        span: span(8),
                    }],
                    bodies: vec![RamlBody {
                        content_type: "application/json".to_string(),
                        schema: Some(SchemaRef::Inline(json!({ "type": "array" }))),
                        span: span(7),
                    }],
                    span: span(6),
                }],
                span: span(3),
            }],
            children: Vec::new(),
            span: span(2),
        }
    }

    fn document(resources: Vec<RamlResource>) -> RamlDocument {
        RamlDocument {
            title: None,
            base_uri: None,
            schemas: Vec::new(),
            resources,
        }
    }

    fn observe(
        method: Method,
        template: &str,
        expected_status: u16,
        query: &[(&str, &str)],
        response: Response,
    ) -> Observation {
        Observation {
            test: TestDigest {
                method,
                uri_template: template.to_string(),
                expected_status,
            },
            request: PreparedRequest {
                method,
                url: format!("http://127.0.0.1{}", template.split('?').next().unwrap_or("")),
                query: query
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                headers: Vec::new(),
                body: None,
            },
            response,
        }
    }

    fn json_response(status: u16, extra_headers: &[(&str, &str)], body: &str) -> Response {
        let mut headers = vec![(
            "content-type".to_string(),
            "application/json".to_string(),
        )];
        headers.extend(
            extra_headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string())),
        );
        Response {
            status,
            headers,
            text: body.to_string(),
        }
    }

    #[test]
    fn template_shapes_erase_parameter_names() {
        assert_eq!(normalize_template("/users/{id}"), "users/*");
        assert_eq!(normalize_template("/users/{userId}"), "users/*");
        assert_eq!(normalize_template("/users/{id}?full=1"), "users/*");
        assert_eq!(normalize_template("?page=2"), "");
        assert_eq!(normalize_template("/"), "");
    }

    #[test]
    fn untouched_document_is_not_covered_but_never_errored() {
        let mut engine = CoverageEngine::new(&document(vec![users_resource()]));
        engine.validate(&SchemaTable::default());

        let coverage = engine.coverage();
        assert_eq!(coverage.errored, 0);
        assert_eq!(coverage.valid, 0);
        assert!(coverage.not_covered >= 2);
        assert_eq!(coverage.total, coverage.not_covered);
        // Every declared line shows up with zero hits.
        let lines = &coverage.lines["api.raml"];
        assert!(lines.values().all(|hits| *hits == 0));
    }

    #[test]
    fn one_good_exchange_validates_the_status_chain() {
        let mut engine = CoverageEngine::new(&document(vec![users_resource()]));
        engine.record(observe(
            Method::Get,
            "/users",
            200,
            &[("page", "2")],
            json_response(200, &[("x-total", "1")], r#"[{"id":1}]"#),
        ));
        engine.validate(&SchemaTable::default());

        let resource = &engine.resources()[0];
        let mut states = Vec::new();
        resource.root.for_each(&mut |node| {
            if node.is_obligation() {
                states.push((node.name.clone(), node.state));
            }
        });
        assert_eq!(
            states,
            vec![
                (
                    "query parameter `page` is sent".to_string(),
                    CoverageState::Valid
                ),
                (
                    "query parameter `page` is omitted in some call".to_string(),
                    CoverageState::NotCovered
                ),
                ("responds 200".to_string(), CoverageState::Valid),
                (
                    "returns `application/json`".to_string(),
                    CoverageState::Valid
                ),
                (
                    "body conforms to schema `(inline)`".to_string(),
                    CoverageState::Valid
                ),
                ("sends header `x-total`".to_string(), CoverageState::Valid),
            ]
        );
    }

    #[test]
    fn wrong_actual_status_is_a_hard_error() {
        let mut engine = CoverageEngine::new(&document(vec![users_resource()]));
        engine.record(observe(
            Method::Get,
            "/users",
            200,
            &[],
            json_response(500, &[], "{}"),
        ));
        engine.validate(&SchemaTable::default());

        let coverage = engine.coverage();
        assert!(coverage.errored >= 1);
        let mut errored = Vec::new();
        engine.resources()[0].root.for_each(&mut |node| {
            if node.state == CoverageState::Errored && node.is_obligation() {
                errored.push(node.name.clone());
            }
        });
        assert!(errored.contains(&"responds 200".to_string()));
    }

    #[test]
    fn required_query_parameter_never_sent_is_errored() {
        let mut resource = users_resource();
        resource.methods[0].query_parameters[0].required = true;
        let mut engine = CoverageEngine::new(&document(vec![resource]));
        engine.record(observe(
            Method::Get,
            "/users",
            200,
            &[],
            json_response(200, &[("x-total", "0")], "[]"),
        ));
        engine.validate(&SchemaTable::default());

        let mut found = None;
        engine.resources()[0].root.for_each(&mut |node| {
            if node.name == "query parameter `page` is sent" {
                found = Some((node.state, node.detail.clone()));
            }
        });
        let (state, detail) = found.unwrap();
        assert_eq!(state, CoverageState::Errored);
        assert!(detail.unwrap().contains("never sent"));
    }

    #[test]
    fn observations_route_by_template_shape_not_parameter_name() {
        let by_id = RamlResource {
            path: "/users/{id}".to_string(),
            methods: vec![RamlMethod {
                verb: Method::Get,
                query_parameters: Vec::new(),
                responses: Vec::new(),
                span: span(11),
            }],
            children: Vec::new(),
            span: span(10),
        };
        let mut engine = CoverageEngine::new(&document(vec![users_resource(), by_id]));
        engine.record(observe(
            Method::Get,
            "/users/{userId}",
            200,
            &[],
            json_response(200, &[], "{}"),
        ));

        assert_eq!(engine.resources()[0].observation_count(), 0);
        assert_eq!(engine.resources()[1].observation_count(), 1);
        assert_eq!(engine.unrouted(), 0);
    }

    #[test]
    fn observations_of_undeclared_endpoints_are_counted_apart() {
        let mut engine = CoverageEngine::new(&document(vec![users_resource()]));
        engine.record(observe(
            Method::Get,
            "/sessions",
            200,
            &[],
            json_response(200, &[], "{}"),
        ));
        assert_eq!(engine.unrouted(), 1);
        assert_eq!(engine.resources()[0].observation_count(), 0);
    }

    #[test]
    fn validation_runs_exactly_once() {
        let mut engine = CoverageEngine::new(&document(vec![users_resource()]));
        engine.validate(&SchemaTable::default());
        let before = engine.coverage();

        engine.record(observe(
            Method::Get,
            "/users",
            200,
            &[("page", "1")],
            json_response(200, &[("x-total", "9")], "[]"),
        ));
        engine.validate(&SchemaTable::default());
        assert_eq!(engine.coverage(), before);
    }

    #[test]
    fn zero_response_method_is_covered_by_any_call() {
        let ping = RamlResource {
            path: "/ping".to_string(),
            methods: vec![RamlMethod {
                verb: Method::Get,
                query_parameters: Vec::new(),
                responses: Vec::new(),
                span: span(3),
            }],
            children: Vec::new(),
            span: span(2),
        };
        let mut engine = CoverageEngine::new(&document(vec![ping]));
        engine.record(observe(
            Method::Get,
            "/ping",
            200,
            &[],
            json_response(200, &[], "pong"),
        ));
        engine.validate(&SchemaTable::default());

        let coverage = engine.coverage();
        assert_eq!(coverage.total, 1);
        assert_eq!(coverage.valid, 1);
    }

    #[test]
    fn line_hits_accumulate_for_valid_obligations() {
        let mut engine = CoverageEngine::new(&document(vec![users_resource()]));
        engine.record(observe(
            Method::Get,
            "/users",
            200,
            &[("page", "1")],
            json_response(200, &[("x-total", "3")], "[]"),
        ));
        engine.validate(&SchemaTable::default());

        let coverage = engine.coverage();
        let lines = &coverage.lines["api.raml"];
        // The body declaration line carries both the content-type and
        // the schema obligation.
        assert_eq!(lines[&7], 2);
        // The omitted-in-some-call obligation leaves its line with the
        // hits of its sent counterpart only.
        assert_eq!(lines[&4], 1);
        assert_eq!(lines[&8], 1);
    }
}
