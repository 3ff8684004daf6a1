//! Judging a settled response against one assertion at a time.
//!
//! Every check returns a self-describing [`AssertionError`] instead of
//! panicking, so the scheduler can collect all failures for a test in
//! one pass. [`Assertion::CopyValue`] is the only variant that writes
//! to the store; everything else only reads it.

use crate::error::AssertionError;
use crate::http::Response;
use attest_core::{resolve, Assertion, BodySource, Expected, Pointer, SchemaRef, ValueExpr};
use attest_parser::SchemaTable;
use serde_json::Value;

/// Check one assertion. `store` is read for pointer resolution and
/// written by `CopyValue`.
pub fn check(
    assertion: &Assertion,
    response: &Response,
    store: &mut Value,
    schemas: &SchemaTable,
) -> Result<(), AssertionError> {
    let name = assertion.name();
    match assertion {
        Assertion::StatusCode { expected } => {
            if response.status == *expected {
                Ok(())
            } else {
                Err(AssertionError::new(name, "unexpected status code")
                    .with_expected(expected.to_string())
                    .with_actual(response.status.to_string()))
            }
        }

        Assertion::BodyEquals { expected } => match expected {
            Expected::Pattern(pattern) => {
                if pattern.is_match(&response.text) {
                    Ok(())
                } else {
                    Err(AssertionError::new(name, "body does not match the pattern")
                        .with_expected(format!("/{}/", pattern.as_str()))
                        .with_actual(preview(&response.text)))
                }
            }
            Expected::Literal(template) => {
                let wanted = resolve_or_fail(&name, template, store)?;
                if let Value::String(text) = &wanted {
                    // A string literal compares against the raw body
                    // text, so plain-text endpoints can be asserted
                    // without a JSON detour.
                    if response.text == *text {
                        Ok(())
                    } else {
                        Err(AssertionError::new(name, "body differs from the expected text")
                            .with_expected(render(&wanted))
                            .with_actual(preview(&response.text)))
                    }
                } else {
                    let body = parse_body(&name, response)?;
                    if body == wanted {
                        Ok(())
                    } else {
                        Err(AssertionError::new(name, "body differs from the expected value")
                            .with_expected(render(&wanted))
                            .with_actual(render(&body)))
                    }
                }
            }
        },

        Assertion::BodyFieldMatches { field, expected } => {
            let body = parse_body(&name, response)?;
            let actual = field_value(&name, field, &body)?;
            match expected {
                Expected::Pattern(pattern) => {
                    let text = value_text(&actual);
                    if pattern.is_match(&text) {
                        Ok(())
                    } else {
                        Err(AssertionError::new(name, "value does not match the pattern")
                            .with_expected(format!("/{}/", pattern.as_str()))
                            .with_actual(text))
                    }
                }
                Expected::Literal(template) => {
                    let wanted = resolve_or_fail(&name, template, store)?;
                    if actual == wanted {
                        Ok(())
                    } else {
                        Err(AssertionError::new(name, "value differs from the expected one")
                            .with_expected(render(&wanted))
                            .with_actual(render(&actual)))
                    }
                }
            }
        }

        Assertion::HeaderMatches { header, expected } => {
            let actual = response.get(header);
            // A literal null asserts the header is absent.
            if matches!(expected, Expected::Literal(ValueExpr::Null)) {
                return match actual {
                    None => Ok(()),
                    Some(value) => {
                        Err(AssertionError::new(name, "expected the header to be absent")
                            .with_actual(value))
                    }
                };
            }
            let Some(actual) = actual else {
                return Err(AssertionError::new(name, "header is not present"));
            };
            match expected {
                Expected::Pattern(pattern) => {
                    if pattern.is_match(&actual) {
                        Ok(())
                    } else {
                        Err(AssertionError::new(name, "value does not match the pattern")
                            .with_expected(format!("/{}/", pattern.as_str()))
                            .with_actual(actual))
                    }
                }
                Expected::Literal(template) => {
                    let wanted = resolve_or_fail(&name, template, store)?;
                    let matched = match &wanted {
                        Value::String(text) => *text == actual,
                        // Headers arrive as text; a numeric literal
                        // compares by value so `42` matches "42".
                        Value::Number(number) => actual.parse::<f64>().ok() == number.as_f64(),
                        Value::Bool(flag) => actual == flag.to_string(),
                        other => render(other) == actual,
                    };
                    if matched {
                        Ok(())
                    } else {
                        Err(AssertionError::new(name, "header value differs")
                            .with_expected(render(&wanted))
                            .with_actual(actual))
                    }
                }
            }
        }

        Assertion::CopyValue { source, target } => {
            let value = match source {
                BodySource::WholeBody => match response.body() {
                    Ok(body) => body,
                    // Non-JSON bodies are copied as raw text.
                    Err(_) => Value::String(response.text.clone()),
                },
                BodySource::Field(field) => {
                    let body = parse_body(&name, response)?;
                    field_value(&name, field, &body)?
                }
            };
            target
                .set(store, value)
                .map_err(|error| AssertionError::new(name, error.to_string()))
        }

        Assertion::ValidateSchema { schema } => {
            let schema = match schema {
                SchemaRef::Inline(value) => value,
                SchemaRef::Named(schema_name) => schemas.get(schema_name).ok_or_else(|| {
                    AssertionError::new(&name, format!("schema `{schema_name}` is not defined"))
                })?,
            };
            let body = parse_body(&name, response)?;
            let validator = jsonschema::draft202012::new(schema).map_err(|error| {
                AssertionError::new(&name, format!("schema failed to compile: {error}"))
            })?;
            let failures: Vec<String> = validator
                .iter_errors(&body)
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{error} (at {path})")
                    }
                })
                .collect();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(AssertionError::new(name, failures.join("; ")))
            }
        }
    }
}

fn resolve_or_fail(
    name: &str,
    template: &ValueExpr,
    store: &Value,
) -> Result<Value, AssertionError> {
    resolve(template, store).map_err(|error| AssertionError::new(name, error.to_string()))
}

fn parse_body(name: &str, response: &Response) -> Result<Value, AssertionError> {
    response
        .body()
        .map_err(|error| AssertionError::new(name, format!("body is not valid JSON: {error}")))
}

fn field_value(name: &str, field: &str, body: &Value) -> Result<Value, AssertionError> {
    let pointer =
        Pointer::new(field).map_err(|error| AssertionError::new(name, error.to_string()))?;
    pointer.get(body).map_err(|_| {
        AssertionError::new(name, format!("field `{field}` is not present in the body"))
    })
}

/// Stringify a JSON value the way a header or pattern subject reads.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render(value: &Value) -> String {
    value.to_string()
}

/// Clip long body text for error output.
fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let clipped: String = text.chars().take(LIMIT).collect();
        format!("{clipped}...")
    }
}
