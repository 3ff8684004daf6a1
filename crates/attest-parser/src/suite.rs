//! Suite and test grammar.
//!
//! A suite body is a mapping whose keys are either `"<METHOD> <path>"` test
//! declarations, the suite option `skip`, or unknown keys (warned, never
//! fatal). Consecutive test declarations within one suite are implicitly
//! chained: each new leaf depends on the previous one, so a suite reads
//! top-to-bottom as a scenario. Distinct named suites are independent.

use crate::error::SpecError;
use crate::value;
use attest_core::{
    Assertion, BodySource, Method, RequestBody, SchemaRef, Suite, Test, TestPath,
};
use serde_yaml::Value as Yaml;

pub(crate) fn parse_suite(
    name: &str,
    body: &Yaml,
    warnings: &mut Vec<String>,
) -> Result<Suite, SpecError> {
    let map = body
        .as_mapping()
        .ok_or_else(|| value::field_type(name, "a mapping of test declarations", body))?;

    let mut suite = Suite::internal(name, Vec::new(), false);
    let mut previous_leaf: Option<String> = None;

    for (key, val) in map {
        let key = value::expect_str(name, key)?;
        if key == "skip" {
            suite.skip = value::expect_bool(&format!("{}.skip", name), val)?;
            continue;
        }
        match test_key(key)? {
            Some((method, path)) => {
                let mut test = parse_test(key, method, &path, val, warnings)?;
                if let Some(previous) = &previous_leaf {
                    test.depends_on
                        .push(TestPath(vec![name.to_string(), previous.clone()]));
                }
                previous_leaf = Some(key.to_string());
                suite.children.push(Suite::leaf(key, test));
            }
            None => warnings.push(format!("unknown key `{}` in suite `{}`", key, name)),
        }
    }

    Ok(suite)
}

/// Recognize a `"<METHOD> <path>"` key.
///
/// A key is a test-key *candidate* when it splits into an all-uppercase word
/// and a path starting with `/` or `?`; candidates with an unknown method or
/// a trailing slash are hard errors, anything else falls through as an
/// unknown key.
fn test_key(key: &str) -> Result<Option<(Method, String)>, SpecError> {
    let Some((verb, path)) = key.split_once(' ') else {
        return Ok(None);
    };
    if verb.is_empty() || !verb.chars().all(|c| c.is_ascii_uppercase()) {
        return Ok(None);
    }
    if !(path.starts_with('/') || path.starts_with('?')) {
        return Ok(None);
    }
    let method = Method::parse(verb).ok_or_else(|| SpecError::InvalidTestKey {
        key: key.to_string(),
        reason: format!("unknown method `{}`", verb),
    })?;
    if path.len() > 1 && path.ends_with('/') {
        return Err(SpecError::InvalidTestKey {
            key: key.to_string(),
            reason: "path must not end with `/`".to_string(),
        });
    }
    Ok(Some((method, path.to_string())))
}

fn parse_test(
    name: &str,
    method: Method,
    path: &str,
    body: &Yaml,
    warnings: &mut Vec<String>,
) -> Result<Test, SpecError> {
    let mut test = Test::new(method, path);
    test.name = name.to_string();

    match body {
        Yaml::Null => {}
        Yaml::Mapping(map) => {
            for (key, val) in map {
                let key = value::expect_str(name, key)?;
                match key {
                    "uriParameters" => {
                        let params = val.as_mapping().ok_or_else(|| {
                            value::field_type(&field(name, "uriParameters"), "a mapping", val)
                        })?;
                        for (param, v) in params {
                            let param = value::expect_str(&field(name, "uriParameters"), param)?;
                            let at = format!("{}.uriParameters.{}", name, param);
                            test.uri_parameters
                                .push((param.to_string(), value::scalar_expr(&at, v)?));
                        }
                    }
                    "request" => parse_request(name, &mut test, val, warnings)?,
                    "response" => parse_response(name, &mut test, val, warnings)?,
                    "timeout" => test.timeout_ms = parse_timeout(name, val)?,
                    other => {
                        warnings.push(format!("unknown key `{}` in test `{}`", other, name))
                    }
                }
            }
        }
        other => return Err(value::field_type(name, "a mapping", other)),
    }

    // One declaration site for content-type: either side, not both.
    if test.request.content_type().is_some()
        && test
            .response
            .headers
            .iter()
            .any(|(h, _)| h.eq_ignore_ascii_case("content-type"))
    {
        return Err(SpecError::ContentTypeConflict(format!(
            "test `{}` declares `content-type` under both `request` and `response`",
            name
        )));
    }

    generate_assertions(&mut test);
    Ok(test)
}

fn field(name: &str, key: &str) -> String {
    format!("{}.{}", name, key)
}

fn parse_timeout(name: &str, yaml: &Yaml) -> Result<u64, SpecError> {
    let timeout = match yaml {
        Yaml::Number(n) => n.as_u64().filter(|ms| *ms > 0),
        _ => None,
    };
    timeout.ok_or_else(|| SpecError::InvalidTimeout(value::kind(yaml)))
}

fn parse_request(
    name: &str,
    test: &mut Test,
    yaml: &Yaml,
    warnings: &mut Vec<String>,
) -> Result<(), SpecError> {
    let map = yaml
        .as_mapping()
        .ok_or_else(|| value::field_type(&field(name, "request"), "a mapping", yaml))?;
    let mut body_format: Option<&'static str> = None;

    let mut set_body = |test: &mut Test,
                        format: &'static str,
                        body: RequestBody|
     -> Result<(), SpecError> {
        if let Some(first) = body_format {
            return Err(SpecError::ConflictingBodyFormats(first, format));
        }
        body_format = Some(format);
        test.request.body = Some(body);
        Ok(())
    };

    for (key, val) in map {
        let key = value::expect_str(&field(name, "request"), key)?;
        match key {
            "headers" => {
                test.request.headers =
                    scalar_pairs(&format!("{}.request.headers", name), val)?;
            }
            "queryParameters" => {
                test.request.query_parameters =
                    scalar_pairs(&format!("{}.request.queryParameters", name), val)?;
            }
            "json" => {
                let expr = value::value_expr(&format!("{}.request.json", name), val)?;
                set_body(test, "json", RequestBody::Json(expr))?;
            }
            "form" => {
                let fields = scalar_pairs(&format!("{}.request.form", name), val)?;
                set_body(test, "form", RequestBody::Form(fields))?;
            }
            "urlencoded" => {
                let fields = scalar_pairs(&format!("{}.request.urlencoded", name), val)?;
                set_body(test, "urlencoded", RequestBody::UrlEncoded(fields))?;
            }
            "attach" => {
                let at = format!("{}.request.attach", name);
                let attachments = val
                    .as_mapping()
                    .ok_or_else(|| value::field_type(&at, "a mapping", val))?;
                for (fld, path) in attachments {
                    let fld = value::expect_str(&at, fld)?;
                    let path = value::expect_str(&format!("{}.{}", at, fld), path)?;
                    test.request.attach.push((fld.to_string(), path.to_string()));
                }
            }
            other => warnings.push(format!(
                "unknown key `{}` in `{}.request`",
                other, name
            )),
        }
    }

    // form/urlencoded imply their own content-type; an explicit header that
    // disagrees has no well-defined meaning.
    if matches!(body_format, Some("form") | Some("urlencoded"))
        && test.request.content_type().is_some()
    {
        return Err(SpecError::ContentTypeConflict(format!(
            "test `{}` declares a `content-type` header together with a `{}` body",
            name,
            body_format.unwrap_or_default()
        )));
    }

    Ok(())
}

fn scalar_pairs(
    field: &str,
    yaml: &Yaml,
) -> Result<Vec<(String, attest_core::ValueExpr)>, SpecError> {
    let map = yaml
        .as_mapping()
        .ok_or_else(|| value::field_type(field, "a mapping", yaml))?;
    let mut out = Vec::with_capacity(map.len());
    for (key, val) in map {
        let key = value::expect_str(field, key)?;
        let at = format!("{}.{}", field, key);
        out.push((key.to_string(), value::scalar_expr(&at, val)?));
    }
    Ok(out)
}

fn parse_response(
    name: &str,
    test: &mut Test,
    yaml: &Yaml,
    warnings: &mut Vec<String>,
) -> Result<(), SpecError> {
    let map = yaml
        .as_mapping()
        .ok_or_else(|| value::field_type(&field(name, "response"), "a mapping", yaml))?;

    for (key, val) in map {
        let key = value::expect_str(&field(name, "response"), key)?;
        match key {
            "status" => {
                let at = format!("{}.response.status", name);
                let status = val
                    .as_u64()
                    .and_then(|s| u16::try_from(s).ok())
                    .ok_or_else(|| value::field_type(&at, "a status code number", val))?;
                test.response.status = status;
            }
            "headers" => {
                let at = format!("{}.response.headers", name);
                let headers = val
                    .as_mapping()
                    .ok_or_else(|| value::field_type(&at, "a mapping", val))?;
                for (header, v) in headers {
                    let header = value::expect_str(&at, header)?;
                    let expected = value::expected(&format!("{}.{}", at, header), v)?;
                    test.response.headers.push((header.to_string(), expected));
                }
            }
            "body" => parse_response_body(name, test, val, warnings)?,
            other => warnings.push(format!(
                "unknown key `{}` in `{}.response`",
                other, name
            )),
        }
    }

    Ok(())
}

fn parse_response_body(
    name: &str,
    test: &mut Test,
    yaml: &Yaml,
    warnings: &mut Vec<String>,
) -> Result<(), SpecError> {
    let at = format!("{}.response.body", name);
    let map = yaml
        .as_mapping()
        .ok_or_else(|| value::field_type(&at, "a mapping", yaml))?;

    for (key, val) in map {
        let key = value::expect_str(&at, key)?;
        match key {
            "is" => {
                test.response.body.is = Some(value::expected(&format!("{}.is", at), val)?);
            }
            "matches" => {
                let matches = val
                    .as_mapping()
                    .ok_or_else(|| value::field_type(&format!("{}.matches", at), "a mapping", val))?;
                for (path, v) in matches {
                    let path = value::expect_str(&format!("{}.matches", at), path)?;
                    let expected = value::expected(&format!("{}.matches.{}", at, path), v)?;
                    test.response.body.matches.push((path.to_string(), expected));
                }
            }
            "schema" => {
                test.response.body.schema = Some(match val {
                    Yaml::String(schema) => SchemaRef::Named(schema.clone()),
                    Yaml::Mapping(_) => {
                        SchemaRef::Inline(value::yaml_to_json(&format!("{}.schema", at), val)?)
                    }
                    other => {
                        return Err(value::field_type(
                            &format!("{}.schema", at),
                            "a schema name or inline schema",
                            other,
                        ))
                    }
                });
            }
            "take" => {
                let takes = val
                    .as_mapping()
                    .ok_or_else(|| value::field_type(&format!("{}.take", at), "a mapping", val))?;
                for (source, target) in takes {
                    let source = value::expect_str(&format!("{}.take", at), source)?;
                    let target =
                        value::pointer(&format!("{}.take.{}", at, source), target)?;
                    let source = if source == "*" {
                        BodySource::WholeBody
                    } else {
                        BodySource::Field(source.to_string())
                    };
                    test.response.body.take.push((source, target));
                }
            }
            "copyTo" => {
                let target = value::pointer(&format!("{}.copyTo", at), val)?;
                test.response.body.take.push((BodySource::WholeBody, target));
            }
            "print" => {
                test.response.body.print = value::expect_bool(&format!("{}.print", at), val)?;
            }
            other => warnings.push(format!("unknown key `{}` in `{}`", other, at)),
        }
    }

    Ok(())
}

/// Emit the assertion list for a parsed test.
///
/// Order is fixed: status, whole-body equality, each `matches` pair, each
/// expected header, the schema check, each extraction. This order defines
/// report order; every assertion is evaluated against the settled exchange.
fn generate_assertions(test: &mut Test) {
    let mut assertions = vec![Assertion::StatusCode {
        expected: test.response.status,
    }];
    if let Some(expected) = test.response.body.is.clone() {
        assertions.push(Assertion::BodyEquals { expected });
    }
    for (field, expected) in &test.response.body.matches {
        assertions.push(Assertion::BodyFieldMatches {
            field: field.clone(),
            expected: expected.clone(),
        });
    }
    for (header, expected) in &test.response.headers {
        assertions.push(Assertion::HeaderMatches {
            header: header.clone(),
            expected: expected.clone(),
        });
    }
    if let Some(schema) = test.response.body.schema.clone() {
        assertions.push(Assertion::ValidateSchema { schema });
    }
    for (source, target) in &test.response.body.take {
        assertions.push(Assertion::CopyValue {
            source: source.clone(),
            target: target.clone(),
        });
    }
    test.assertions = assertions;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_key_candidates_require_uppercase_verbs() {
        assert_eq!(
            test_key("GET /users").unwrap(),
            Some((Method::Get, "/users".to_string()))
        );
        // lowercase verbs and non-path suffixes are not candidates
        assert_eq!(test_key("get /users").unwrap(), None);
        assert_eq!(test_key("GET users").unwrap(), None);
        assert_eq!(test_key("skip").unwrap(), None);
    }

    #[test]
    fn unknown_methods_on_candidates_are_fatal() {
        let err = test_key("SARASA /").unwrap_err();
        assert!(err.to_string().contains("unknown method `SARASA`"));
    }

    #[test]
    fn trailing_slashes_are_fatal_except_for_the_root_path() {
        assert!(test_key("GET /").unwrap().is_some());
        let err = test_key("GET /x/").unwrap_err();
        assert!(err.to_string().contains("must not end with `/`"));
    }

    #[test]
    fn querystring_only_paths_are_accepted() {
        assert_eq!(
            test_key("GET ?page=2").unwrap(),
            Some((Method::Get, "?page=2".to_string()))
        );
    }
}
