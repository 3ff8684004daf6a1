//! End-to-end tests driving the subcommand handlers through the
//! library interface, against a mock HTTP server.

use attest::{check_document, run_document};
use attest_test_fixtures::TestFixtures;
use serde_json::json;
use std::fs;
use std::path::Path;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn run_reports_passing_totals() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut fixtures = TestFixtures::new();
    let spec = fixtures.write_document(&attest_test_fixtures::ping_document(&server.uri()));

    let summary = run_document(&spec, None).await.unwrap();
    assert_eq!(summary.totals.passed, 1);
    assert_eq!(summary.totals.failed, 0);
    assert!(summary.coverage.is_none());
    assert!(!summary.failed());
}

#[tokio::test]
async fn run_counts_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut fixtures = TestFixtures::new();
    let spec = fixtures.write_document(&attest_test_fixtures::ping_document(&server.uri()));

    let summary = run_document(&spec, None).await.unwrap();
    assert_eq!(summary.totals.failed, 1);
    assert!(summary.failed());
}

#[tokio::test]
async fn coverage_errors_fail_the_run_even_when_every_test_passes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "not-a-number" })))
        .mount(&server)
        .await;

    let mut fixtures = TestFixtures::new();
    let spec = fixtures.users_document(&server.uri(), "tests:\n  Users:\n    GET /users:\n");

    let summary = run_document(&spec, None).await.unwrap();
    assert_eq!(summary.totals.failed, 0);
    let coverage = summary.coverage.as_ref().unwrap();
    assert!(coverage.errored >= 1);
    assert!(summary.failed());
}

#[tokio::test]
async fn run_appends_lcov_records_when_asked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7 })))
        .mount(&server)
        .await;

    let mut fixtures = TestFixtures::new();
    let spec = fixtures.users_document(&server.uri(), "tests:\n  Users:\n    GET /users:\n");
    let out = tempfile::tempdir().unwrap();
    let lcov_path = out.path().join("coverage.lcov");

    let summary = run_document(&spec, Some(&lcov_path)).await.unwrap();
    assert!(summary.coverage.is_some());

    let written = fs::read_to_string(&lcov_path).unwrap();
    assert!(written.starts_with("SF:"));
    assert!(written.contains("end_of_record"));
}

#[tokio::test]
async fn run_without_raml_skips_coverage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let document = format!(
        "baseUri: {}\noptions:\n  raml:\n    coverage: true\ntests:\n  Health:\n    GET /ping:\n",
        server.uri()
    );
    let mut fixtures = TestFixtures::new();
    let spec = fixtures.write_document(&document);

    let summary = run_document(&spec, None).await.unwrap();
    assert_eq!(summary.totals.passed, 1);
    assert!(summary.coverage.is_none());
}

#[tokio::test]
async fn check_sends_no_traffic() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut fixtures = TestFixtures::new();
    let spec = fixtures.users_document(&server.uri(), "tests:\n  Users:\n    GET /users:\n");

    check_document(&spec).unwrap();
    server.verify().await;
}

#[tokio::test]
async fn missing_document_is_reported_with_its_path() {
    let error = run_document(Path::new("/no/such/spec.yml"), None)
        .await
        .unwrap_err();
    assert!(error.to_string().contains("/no/such/spec.yml"));
}
