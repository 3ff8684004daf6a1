//! End-to-end runs of parsed documents against a mock server.

use attest_parser::SpecDocument;
use attest_runner::{
    HttpRequester, RunOutcome, RunPlan, Scheduler, SkipReason, Target, TestFailure, TestStatus,
    TransportError,
};
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn run(document: &SpecDocument) -> RunOutcome {
    let requester = Arc::new(HttpRequester::new(document.options.self_signed_cert).unwrap());
    let scheduler = Scheduler::new(
        requester,
        Target::from_document(document),
        document.schemas.clone(),
    );
    scheduler
        .execute(RunPlan::from_suite(&document.root), document.context.clone())
        .await
}

fn parse(yaml: &str) -> SpecDocument {
    SpecDocument::from_str(yaml, Path::new(".")).unwrap()
}

#[tokio::test]
async fn minimal_document_passes_against_a_live_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    let document = parse(&attest_test_fixtures::ping_document(&server.uri()));
    let outcome = run(&document).await;

    assert_eq!(outcome.report.totals().passed, 1);
    assert_eq!(outcome.observations.len(), 1);
    assert_eq!(outcome.observations[0].response.status, 200);
    assert_eq!(outcome.observations[0].response.text, "pong");
}

#[tokio::test]
async fn extracted_values_flow_into_later_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(attest_test_fixtures::session_token_body()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/session"))
        .and(header("authorization", "t-123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "active": true })),
        )
        .mount(&server)
        .await;

    let document = parse(&attest_test_fixtures::session_document(&server.uri()));
    let outcome = run(&document).await;

    let totals = outcome.report.totals();
    assert_eq!((totals.passed, totals.failed, totals.skipped), (2, 0, 0));
    assert_eq!(
        outcome.context.store()["session"]["token"],
        serde_json::json!("t-123")
    );
}

#[tokio::test]
async fn dependent_test_sends_nothing_when_its_dependency_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    // The follow-up endpoint must never be hit.
    Mock::given(method("GET"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let document = parse(&format!(
        r#"baseUri: {}
tests:
  Session:
    POST /session:
      response:
        status: 201
    GET /session:
      request:
        headers:
          authorization: !pointer session.token
"#,
        server.uri()
    ));
    let outcome = run(&document).await;

    let results = &outcome.report.results;
    assert!(matches!(
        results[0].status,
        TestStatus::Failed(TestFailure::Assertions(_))
    ));
    match &results[1].status {
        TestStatus::Skipped(SkipReason::DependencyFailed { dependency }) => {
            assert_eq!(dependency, "Session / POST /session");
        }
        other => panic!("expected a dependency skip, got {other:?}"),
    }
    // Only the failing POST produced an observation.
    assert_eq!(outcome.observations.len(), 1);
    server.verify().await;
}

#[tokio::test]
async fn skipped_suites_send_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wip"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let document = parse(&format!(
        "baseUri: {}\ntests:\n  WorkInProgress:\n    skip: true\n    GET /wip:\n",
        server.uri()
    ));
    let outcome = run(&document).await;

    assert_eq!(outcome.report.totals().skipped, 1);
    assert!(matches!(
        outcome.report.results[0].status,
        TestStatus::Skipped(SkipReason::Marked)
    ));
    assert!(outcome.observations.is_empty());
    server.verify().await;
}

#[tokio::test]
async fn declared_query_and_body_reach_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(query_param("limit", "10"))
        .and(query_param("q", "alice"))
        .and(body_json(serde_json::json!({ "exact": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let document = parse(&format!(
        r#"baseUri: {}
variables:
  page:
    limit: 10
tests:
  Search:
    POST /search?q=alice:
      request:
        queryParameters:
          limit: !pointer page.limit
        json:
          exact: false
"#,
        server.uri()
    ));
    let outcome = run(&document).await;
    assert_eq!(outcome.report.totals().passed, 1);
}

#[tokio::test]
async fn uri_template_parameters_expand_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 42 })),
        )
        .mount(&server)
        .await;

    let document = parse(&format!(
        r#"baseUri: {}
variables:
  known:
    user: 42
tests:
  Users:
    GET /users/{{id}}:
      uriParameters:
        id: !pointer known.user
      response:
        body:
          matches:
            id: 42
"#,
        server.uri()
    ));
    let outcome = run(&document).await;
    assert_eq!(outcome.report.totals().passed, 1);
    assert_eq!(
        outcome.observations[0].request.url,
        format!("{}/users/42", server.uri())
    );
    // Coverage still sees the declared template, not the expanded url.
    assert_eq!(outcome.observations[0].test.uri_template, "/users/{id}");
}

#[tokio::test]
async fn slow_endpoint_times_out_as_a_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)))
        .mount(&server)
        .await;

    let document = parse(&format!(
        "baseUri: {}\ntests:\n  Slow:\n    GET /slow:\n      timeout: 100\n",
        server.uri()
    ));
    let outcome = run(&document).await;

    match &outcome.report.results[0].status {
        TestStatus::Failed(TestFailure::Transport(TransportError::Timeout(ms))) => {
            assert_eq!(*ms, 100);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    // A request that never settled leaves no observation.
    assert!(outcome.observations.is_empty());
}

#[tokio::test]
async fn failed_assertions_are_collected_not_short_circuited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({ "name": "bob" })),
        )
        .mount(&server)
        .await;

    let document = parse(&format!(
        r#"baseUri: {}
tests:
  Users:
    GET /user:
      response:
        body:
          matches:
            name: alice
"#,
        server.uri()
    ));
    let outcome = run(&document).await;

    match &outcome.report.results[0].status {
        TestStatus::Failed(TestFailure::Assertions(errors)) => {
            let names: Vec<&str> = errors.iter().map(|error| error.name.as_str()).collect();
            assert_eq!(names, vec!["status code is 200", "body field `name` matches"]);
        }
        other => panic!("expected assertion failures, got {other:?}"),
    }
}

#[tokio::test]
async fn independent_suites_run_even_when_another_suite_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let document = parse(&format!(
        "baseUri: {}\ntests:\n  Down:\n    GET /down:\n  Up:\n    GET /up:\n",
        server.uri()
    ));
    let outcome = run(&document).await;

    let totals = outcome.report.totals();
    assert_eq!((totals.passed, totals.failed), (1, 1));
    assert!(outcome.report.failed());
}
