//! Top-level specification document parsing.
//!
//! A document is a YAML mapping with the recognized keys `variables`,
//! `baseUri`, `baseUriParameters`, `options`, `tests`, `schemas`, and `raml`.
//! Unrecognized keys are collected as warnings so newer documents keep
//! loading on older binaries; malformed values of recognized keys abort the
//! load.

use crate::error::SpecError;
use crate::raml::{self, RamlDocument};
use crate::suite;
use crate::value;
use attest_core::{Context, Suite, ValueExpr};
use serde_yaml::Value as Yaml;
use std::path::Path;
use tracing::debug;

/// Runtime options declared under the document's `options` key.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Accept invalid TLS certificates on the transport.
    pub self_signed_cert: bool,
    pub raml: RamlOptions,
}

/// RAML-specific toggles under `options.raml`.
#[derive(Debug, Clone, Default)]
pub struct RamlOptions {
    /// Build and report the coverage tree.
    pub coverage: bool,
    /// Flatten `type:` references through the declared resourceTypes.
    pub resource_types: bool,
    /// Merge `is:` trait query parameters into their methods.
    pub traits: bool,
}

/// Named JSON Schema table.
///
/// Document-declared entries shadow RAML-loaded ones of the same name.
#[derive(Debug, Clone, Default)]
pub struct SchemaTable {
    entries: Vec<(String, serde_json::Value)>,
}

impl SchemaTable {
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, schema)| schema)
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: serde_json::Value) {
        self.entries.push((name.into(), schema));
    }

    pub fn insert_if_absent(&mut self, name: &str, schema: &serde_json::Value) {
        if self.get(name).is_none() {
            self.entries.push((name.to_string(), schema.clone()));
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fully parsed and validated specification document.
#[derive(Debug)]
pub struct SpecDocument {
    /// Anonymous root; its children are the named suites in declaration
    /// order.
    pub root: Suite,
    /// Variable store seeded from `variables` plus the process environment
    /// under `ENV`.
    pub context: Context,
    pub base_uri: Option<String>,
    pub base_uri_parameters: Vec<(String, ValueExpr)>,
    pub options: Options,
    pub schemas: SchemaTable,
    pub raml: Option<RamlDocument>,
    /// Non-fatal parse warnings (unknown keys), for the caller to log.
    pub warnings: Vec<String>,
}

impl SpecDocument {
    /// Load a document from disk. Relative `raml` paths resolve against the
    /// document's directory.
    pub fn from_path(path: &Path) -> Result<SpecDocument, SpecError> {
        let text = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base_dir, std::env::vars())
    }

    pub fn from_str(text: &str, base_dir: &Path) -> Result<SpecDocument, SpecError> {
        Self::parse(text, base_dir, std::env::vars())
    }

    /// Parse with an explicit environment, the injection point for tests.
    pub fn parse(
        text: &str,
        base_dir: &Path,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<SpecDocument, SpecError> {
        let yaml: Yaml = serde_yaml::from_str(text)?;
        let map = yaml
            .as_mapping()
            .ok_or_else(|| value::field_type("document", "a mapping", &yaml))?;

        let mut warnings = Vec::new();
        let mut variables = serde_json::Value::Object(Default::default());
        let mut base_uri = None;
        let mut base_uri_parameters = Vec::new();
        let mut options = Options::default();
        let mut root = Suite::default();
        let mut schemas = SchemaTable::default();
        let mut raml_path = None;

        for (key, val) in map {
            let key = value::expect_str("document", key)?;
            match key {
                "variables" => {
                    variables = value::yaml_to_json("variables", val)?;
                    if !variables.is_object() {
                        return Err(value::field_type("variables", "a mapping", val));
                    }
                }
                "baseUri" => {
                    let uri = value::expect_str("baseUri", val)?;
                    base_uri = Some(uri.trim_end_matches('/').to_string());
                }
                "baseUriParameters" => {
                    let params = val
                        .as_mapping()
                        .ok_or_else(|| value::field_type("baseUriParameters", "a mapping", val))?;
                    for (name, param) in params {
                        let name = value::expect_str("baseUriParameters", name)?;
                        let field = format!("baseUriParameters.{}", name);
                        base_uri_parameters
                            .push((name.to_string(), value::scalar_expr(&field, param)?));
                    }
                }
                "options" => options = parse_options(val, &mut warnings)?,
                "tests" => {
                    let suites = val
                        .as_mapping()
                        .ok_or_else(|| value::field_type("tests", "a mapping", val))?;
                    for (name, body) in suites {
                        let name = value::expect_str("tests", name)?;
                        root.children
                            .push(suite::parse_suite(name, body, &mut warnings)?);
                    }
                }
                "schemas" => {
                    let entries = val
                        .as_sequence()
                        .ok_or_else(|| value::field_type("schemas", "a sequence", val))?;
                    for (index, entry) in entries.iter().enumerate() {
                        let (name, schema) = parse_schema_entry(index, entry)?;
                        schemas.insert(name, schema);
                    }
                }
                "raml" => raml_path = Some(value::expect_str("raml", val)?.to_string()),
                other => warnings.push(format!("unknown document key `{}`", other)),
            }
        }

        let raml = match raml_path {
            Some(rel) => {
                let doc = raml::load(&base_dir.join(rel), &options.raml)?;
                for (name, schema) in &doc.schemas {
                    schemas.insert_if_absent(name, schema);
                }
                Some(doc)
            }
            None => None,
        };

        let mut context = Context::with_variables(variables);
        context.merge_env(env);

        debug!(
            suites = root.children.len(),
            schemas = schemas.len(),
            raml = raml.is_some(),
            "parsed specification document"
        );

        Ok(SpecDocument {
            root,
            context,
            base_uri,
            base_uri_parameters,
            options,
            schemas,
            raml,
            warnings,
        })
    }
}

fn parse_options(yaml: &Yaml, warnings: &mut Vec<String>) -> Result<Options, SpecError> {
    let map = yaml
        .as_mapping()
        .ok_or_else(|| value::field_type("options", "a mapping", yaml))?;
    let mut options = Options::default();
    for (key, val) in map {
        let key = value::expect_str("options", key)?;
        match key {
            "selfSignedCert" => {
                options.self_signed_cert = value::expect_bool("options.selfSignedCert", val)?;
            }
            "raml" => {
                let raml = val
                    .as_mapping()
                    .ok_or_else(|| value::field_type("options.raml", "a mapping", val))?;
                for (key, val) in raml {
                    let key = value::expect_str("options.raml", key)?;
                    match key {
                        "coverage" => {
                            options.raml.coverage =
                                value::expect_bool("options.raml.coverage", val)?;
                        }
                        "resourceTypes" => {
                            options.raml.resource_types =
                                value::expect_bool("options.raml.resourceTypes", val)?;
                        }
                        "traits" => {
                            options.raml.traits = value::expect_bool("options.raml.traits", val)?;
                        }
                        other => warnings.push(format!("unknown option `raml.{}`", other)),
                    }
                }
            }
            other => warnings.push(format!("unknown option `{}`", other)),
        }
    }
    Ok(options)
}

/// One `schemas` entry: a single-entry mapping of name to either a string
/// containing JSON or an inline YAML schema. Shared with the RAML loader,
/// which declares schemas the same way.
pub(crate) fn parse_schema_entry(
    index: usize,
    entry: &Yaml,
) -> Result<(String, serde_json::Value), SpecError> {
    let field = format!("schemas[{}]", index);
    let map = entry
        .as_mapping()
        .filter(|map| map.len() == 1)
        .ok_or_else(|| value::field_type(&field, "a single-entry mapping", entry))?;
    // len() == 1 was just checked
    let (name, schema) = match map.iter().next() {
        Some(pair) => pair,
        None => return Err(value::field_type(&field, "a single-entry mapping", entry)),
    };
    let name = value::expect_str(&field, name)?;
    let schema = match schema {
        Yaml::String(text) => {
            serde_json::from_str(text).map_err(|err| SpecError::InvalidSchema {
                name: name.to_string(),
                reason: format!("not valid JSON: {}", err),
            })?
        }
        other => value::yaml_to_json(&format!("schemas.{}", name), other)?,
    };
    Ok((name.to_string(), schema))
}
