//! Shared fixtures for integration tests: small specification
//! documents and a RAML API, with helpers to materialize them on disk.
//!
//! Documents take the target base URL as an argument so tests can point
//! them at a freshly started mock server.

use serde_json::json;
use std::fs;
use std::path::PathBuf;

/// A small users API with a named schema, a query parameter and a
/// parameterized child resource.
pub const USERS_RAML: &str = r#"#%RAML 0.8
title: Users API
baseUri: http://api.example.com
schemas:
  - user: |
      { "type": "object", "required": ["id"], "properties": { "id": { "type": "integer" } } }
/users:
  get:
    queryParameters:
      page:
    responses:
      200:
        body:
          application/json:
            schema: user
  /{id}:
    get:
      responses:
        200:
          body:
            application/json:
"#;

/// Smallest useful document: one suite, one test, all defaults.
pub fn ping_document(base_uri: &str) -> String {
    format!("baseUri: {base_uri}\ntests:\n  Health:\n    GET /ping:\n")
}

/// Two chained tests: the first extracts a token, the second sends it
/// back as a header and asserts the body.
pub fn session_document(base_uri: &str) -> String {
    format!(
        r#"baseUri: {base_uri}
tests:
  Session:
    POST /session:
      response:
        status: 201
        body:
          take:
            token.value: !pointer session.token
    GET /session:
      request:
        headers:
          authorization: !pointer session.token
      response:
        body:
          is:
            active: true
"#
    )
}

/// The response body the session fixture's first test extracts from.
pub fn session_token_body() -> serde_json::Value {
    json!({ "token": { "value": "t-123" } })
}

/// A document wired to [`USERS_RAML`] with coverage enabled. `tests`
/// is the complete `tests:` block, or `"tests: {}\n"` for none.
pub fn users_document(base_uri: &str, tests: &str) -> String {
    format!("baseUri: {base_uri}\nraml: api.raml\noptions:\n  raml:\n    coverage: true\n{tests}")
}

/// Materializes fixture files into temporary directories that live as
/// long as the provider itself.
#[derive(Default)]
pub struct TestFixtures {
    temp_dirs: Vec<tempfile::TempDir>,
}

impl TestFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a document (`spec.yml`) into a fresh directory and return
    /// the document path.
    pub fn write_document(&mut self, text: &str) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.yml");
        fs::write(&path, text).unwrap();
        self.temp_dirs.push(dir);
        path
    }

    /// Write [`USERS_RAML`] as `api.raml` into a fresh directory and
    /// return that directory.
    pub fn users_api(&mut self) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        fs::write(path.join("api.raml"), USERS_RAML).unwrap();
        self.temp_dirs.push(dir);
        path
    }

    /// Write a full users document (`spec.yml`) with its RAML next to
    /// it and return the document path.
    pub fn users_document(&mut self, base_uri: &str, tests: &str) -> PathBuf {
        let dir = self.users_api();
        let path = dir.join("spec.yml");
        fs::write(&path, users_document(base_uri, tests)).unwrap();
        path
    }
}
