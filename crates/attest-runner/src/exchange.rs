//! Turning a parsed test into a concrete [`PreparedRequest`]: uri
//! template substitution, pointer resolution and body assembly.

use crate::error::PrepareError;
use crate::http::{PreparedBody, PreparedRequest};
use attest_core::{resolve, RequestBody, Test, ValueExpr};
use attest_parser::SpecDocument;
use serde_json::Value;

/// Where exchanges are sent: the document's `baseUri` together with the
/// parameters that fill its template holes.
#[derive(Debug, Clone, Default)]
pub struct Target {
    /// Base URL without a trailing slash. Empty when the document
    /// declares none, in which case uri templates must be absolute.
    pub base_uri: String,
    pub base_uri_parameters: Vec<(String, ValueExpr)>,
}

impl Target {
    pub fn from_document(document: &SpecDocument) -> Target {
        Target {
            base_uri: document.base_uri.clone().unwrap_or_default(),
            base_uri_parameters: document.base_uri_parameters.clone(),
        }
    }
}

/// Build the request a test describes, resolving every pointer against
/// `store`. Fails without sending anything when a pointer dangles, a
/// template hole has no value, or a resolved fragment is not a scalar
/// where a scalar is required.
pub fn prepare(test: &Test, target: &Target, store: &Value) -> Result<PreparedRequest, PrepareError> {
    let base = substitute(&target.base_uri, |name| {
        parameter(name, &target.base_uri_parameters, &[], store)
    })?;
    let path = substitute(&test.uri_template, |name| {
        parameter(name, &test.uri_parameters, &target.base_uri_parameters, store)
    })?;
    let (path, mut query) = split_query(&path);

    for (name, expr) in &test.request.query_parameters {
        let value = resolve(expr, store)?;
        let value =
            scalar_string(&value).ok_or_else(|| PrepareError::NonScalarQuery(name.clone()))?;
        query.push((name.clone(), value));
    }

    let mut headers = Vec::with_capacity(test.request.headers.len());
    for (name, expr) in &test.request.headers {
        let value = resolve(expr, store)?;
        let value =
            scalar_string(&value).ok_or_else(|| PrepareError::NonScalarHeader(name.clone()))?;
        headers.push((name.clone(), value));
    }

    Ok(PreparedRequest {
        method: test.method,
        url: format!("{base}{path}"),
        query,
        headers,
        body: prepare_body(test, store)?,
    })
}

/// Replace `{name}` holes in a template. A `{` with no closing brace is
/// sent verbatim.
fn substitute<F>(template: &str, mut value_of: F) -> Result<String, PrepareError>
where
    F: FnMut(&str) -> Result<Option<String>, PrepareError>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let name = &after[..close];
        match value_of(name)? {
            Some(value) => out.push_str(&value),
            None => return Err(PrepareError::MissingUriParameter(name.to_string())),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Look a template parameter up in `primary`, falling back to
/// `fallback`, and resolve it to a scalar string.
fn parameter(
    name: &str,
    primary: &[(String, ValueExpr)],
    fallback: &[(String, ValueExpr)],
    store: &Value,
) -> Result<Option<String>, PrepareError> {
    let Some(expr) = primary
        .iter()
        .chain(fallback)
        .find(|(key, _)| key == name)
        .map(|(_, expr)| expr)
    else {
        return Ok(None);
    };
    let value = resolve(expr, store)?;
    scalar_string(&value)
        .map(Some)
        .ok_or_else(|| PrepareError::NonScalarUriParameter(name.to_string()))
}

/// Separate a querystring inlined in the uri template into pairs, so
/// the transport and coverage both see a uniform query list.
fn split_query(path: &str) -> (String, Vec<(String, String)>) {
    let Some((path_part, query_part)) = path.split_once('?') else {
        return (path.to_string(), Vec::new());
    };
    let pairs = query_part
        .split('&')
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| match chunk.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (chunk.to_string(), String::new()),
        })
        .collect();
    (path_part.to_string(), pairs)
}

fn prepare_body(test: &Test, store: &Value) -> Result<Option<PreparedBody>, PrepareError> {
    let attach = &test.request.attach;
    match (&test.request.body, attach.is_empty()) {
        (None, true) => Ok(None),
        (None, false) => Ok(Some(PreparedBody::Multipart {
            fields: Vec::new(),
            files: attach.clone(),
        })),
        (Some(RequestBody::Json(template)), true) => {
            Ok(Some(PreparedBody::Json(resolve(template, store)?)))
        }
        (Some(RequestBody::Form(fields)), _) => Ok(Some(PreparedBody::Multipart {
            fields: scalar_pairs(fields, store)?,
            files: attach.clone(),
        })),
        (Some(RequestBody::UrlEncoded(fields)), true) => Ok(Some(PreparedBody::UrlEncoded(
            scalar_pairs(fields, store)?,
        ))),
        (Some(_), false) => Err(PrepareError::AttachConflict),
    }
}

fn scalar_pairs(
    fields: &[(String, ValueExpr)],
    store: &Value,
) -> Result<Vec<(String, String)>, PrepareError> {
    fields
        .iter()
        .map(|(name, expr)| {
            let value = resolve(expr, store)?;
            let value =
                scalar_string(&value).ok_or_else(|| PrepareError::NonScalarField(name.clone()))?;
            Ok((name.clone(), value))
        })
        .collect()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::{Method, Pointer};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pointer(path: &str) -> ValueExpr {
        ValueExpr::Pointer(Pointer::new(path).unwrap())
    }

    fn target() -> Target {
        Target {
            base_uri: "http://api.test/v1".to_string(),
            base_uri_parameters: vec![("region".to_string(), ValueExpr::from("eu"))],
        }
    }

    #[test]
    fn uri_parameters_fill_template_holes() {
        let mut test = Test::new(Method::Get, "/users/{id}/in/{region}");
        test.uri_parameters
            .push(("id".to_string(), pointer("session.user")));

        let prepared = prepare(
            &test,
            &target(),
            &json!({ "session": { "user": 42 } }),
        )
        .unwrap();
        assert_eq!(prepared.url, "http://api.test/v1/users/42/in/eu");
        assert!(prepared.query.is_empty());
    }

    #[test]
    fn missing_template_parameter_is_an_error() {
        let test = Test::new(Method::Get, "/users/{id}");
        let err = prepare(&test, &target(), &json!({})).unwrap_err();
        assert_eq!(err, PrepareError::MissingUriParameter("id".to_string()));
    }

    #[test]
    fn inline_querystring_becomes_query_pairs() {
        let mut test = Test::new(Method::Get, "/search?q=abc&page=2");
        test.request
            .query_parameters
            .push(("limit".to_string(), pointer("page.size")));

        let prepared = prepare(&test, &target(), &json!({ "page": { "size": 10 } })).unwrap();
        assert_eq!(prepared.url, "http://api.test/v1/search");
        assert_eq!(
            prepared.query,
            vec![
                ("q".to_string(), "abc".to_string()),
                ("page".to_string(), "2".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn querystring_only_template_targets_the_base() {
        let test = Test::new(Method::Get, "?pretty=1");
        let prepared = prepare(&test, &target(), &json!({})).unwrap();
        assert_eq!(prepared.url, "http://api.test/v1");
        assert_eq!(
            prepared.query,
            vec![("pretty".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn json_body_resolves_nested_pointers() {
        let mut test = Test::new(Method::Post, "/login");
        test.request.body = Some(RequestBody::Json(ValueExpr::Mapping(vec![
            ("user".to_string(), ValueExpr::from("alice")),
            ("token".to_string(), pointer("auth.token")),
        ])));

        let prepared = prepare(&test, &target(), &json!({ "auth": { "token": "t0" } })).unwrap();
        assert_eq!(
            prepared.body,
            Some(PreparedBody::Json(json!({ "user": "alice", "token": "t0" })))
        );
    }

    #[test]
    fn form_and_attach_combine_into_multipart() {
        let mut test = Test::new(Method::Post, "/upload");
        test.request.body = Some(RequestBody::Form(vec![(
            "note".to_string(),
            ValueExpr::from("hello"),
        )]));
        test.request
            .attach
            .push(("avatar".to_string(), "avatar.png".to_string()));

        let prepared = prepare(&test, &target(), &json!({})).unwrap();
        assert_eq!(
            prepared.body,
            Some(PreparedBody::Multipart {
                fields: vec![("note".to_string(), "hello".to_string())],
                files: vec![("avatar".to_string(), "avatar.png".to_string())],
            })
        );
    }

    #[test]
    fn attach_next_to_a_json_body_is_rejected() {
        let mut test = Test::new(Method::Post, "/upload");
        test.request.body = Some(RequestBody::Json(ValueExpr::Null));
        test.request
            .attach
            .push(("avatar".to_string(), "avatar.png".to_string()));

        let err = prepare(&test, &target(), &json!({})).unwrap_err();
        assert_eq!(err, PrepareError::AttachConflict);
    }

    #[test]
    fn dangling_pointer_fails_before_any_traffic() {
        let mut test = Test::new(Method::Get, "/users");
        test.request
            .headers
            .push(("authorization".to_string(), pointer("auth.token")));

        let err = prepare(&test, &target(), &json!({})).unwrap_err();
        assert!(matches!(err, PrepareError::Resolve(_)));
    }
}
