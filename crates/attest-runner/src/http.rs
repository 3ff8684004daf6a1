//! HTTP transport: the prepared-request shape, the settled-response
//! shape, and the pluggable [`Requester`] seam the scheduler sends
//! traffic through.

use crate::error::TransportError;
use attest_core::Method;
use futures::future::BoxFuture;
use std::path::Path;
use std::time::Duration;

/// Body payload of a fully prepared request. All pointers are already
/// resolved; every field is a concrete string or JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedBody {
    /// JSON document sent as `application/json`.
    Json(serde_json::Value),
    /// Pairs sent as `application/x-www-form-urlencoded`.
    UrlEncoded(Vec<(String, String)>),
    /// `multipart/form-data` with text fields and file attachments.
    /// Attachments are `(field name, local file path)` pairs read at
    /// send time.
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<(String, String)>,
    },
}

/// A request with every template and pointer substituted away. This is
/// what crosses the [`Requester`] seam and what coverage later inspects.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    /// Absolute URL without a querystring.
    pub url: String,
    /// Query pairs, including any that were inlined in the uri template.
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<PreparedBody>,
}

impl PreparedRequest {
    /// True when some query pair with this name was sent.
    pub fn has_query(&self, name: &str) -> bool {
        self.query.iter().any(|(key, _)| key == name)
    }
}

/// A settled exchange: status, headers and the full body text.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub text: String,
}

impl Response {
    /// Case-insensitive header lookup. `content-type` values are
    /// normalized by dropping any `;`-delimited parameter suffix, so
    /// `application/json; charset=utf-8` reads as `application/json`.
    pub fn get(&self, name: &str) -> Option<String> {
        let value = self
            .headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())?;
        if name.eq_ignore_ascii_case("content-type") {
            Some(value.split(';').next().unwrap_or(value).trim().to_string())
        } else {
            Some(value.to_string())
        }
    }

    /// Parse the body text as JSON.
    pub fn body(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.text)
    }
}

/// Seam between the scheduler and the wire. The default implementation
/// is [`HttpRequester`]; tests substitute scripted ones.
pub trait Requester: Send + Sync {
    fn run(
        &self,
        request: PreparedRequest,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Response, TransportError>>;
}

/// [`Requester`] backed by a shared [`reqwest::Client`].
pub struct HttpRequester {
    client: reqwest::Client,
}

impl HttpRequester {
    /// Build the client. `accept_invalid_certs` honors the document's
    /// `selfSignedCert` option for local HTTPS targets.
    pub fn new(accept_invalid_certs: bool) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|error| TransportError::Client(error.to_string()))?;
        Ok(Self { client })
    }
}

impl Requester for HttpRequester {
    fn run(
        &self,
        request: PreparedRequest,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Response, TransportError>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(reqwest_method(request.method), &request.url)
                .timeout(timeout);
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            builder = match request.body {
                None => builder,
                Some(PreparedBody::Json(value)) => builder.json(&value),
                Some(PreparedBody::UrlEncoded(pairs)) => builder.form(&pairs),
                Some(PreparedBody::Multipart { fields, files }) => {
                    builder.multipart(multipart_form(fields, files).await?)
                }
            };
            // Explicit headers land after the body so a declared
            // content-type wins over the one the body implies.
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            let response = builder
                .send()
                .await
                .map_err(|error| classify(error, timeout))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let text = response
                .text()
                .await
                .map_err(|error| classify(error, timeout))?;
            Ok(Response {
                status,
                headers,
                text,
            })
        })
    }
}

async fn multipart_form(
    fields: Vec<(String, String)>,
    files: Vec<(String, String)>,
) -> Result<reqwest::multipart::Form, TransportError> {
    let mut form = reqwest::multipart::Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for (field, path) in files {
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|error| TransportError::Other(format!("attachment `{path}`: {error}")))?;
        let file_name = Path::new(&path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        form = form.part(field, reqwest::multipart::Part::bytes(bytes).file_name(file_name));
    }
    Ok(form)
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout.as_millis() as u64)
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}
