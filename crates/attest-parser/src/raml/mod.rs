//! RAML 0.8 document loader.
//!
//! RAML is YAML (the `#%RAML` header line is a comment), so documents parse
//! with serde_yaml; source spans come from the line index in [`locator`]. The
//! loader extracts what coverage needs: the resource tree, methods with query
//! parameters, per-status responses with content-types, headers, and schemas,
//! plus inline schema declarations. ResourceType and trait flattening are
//! applied here when the corresponding options are enabled.

pub(crate) mod locator;
pub mod model;

pub use model::{
    RamlBody, RamlDocument, RamlHeader, RamlMethod, RamlQueryParameter, RamlResource,
    RamlResponse, SourceSpan,
};

use crate::document::{self, RamlOptions};
use crate::error::SpecError;
use crate::value;
use attest_core::{Method, SchemaRef};
use locator::LineIndex;
use serde_yaml::Value as Yaml;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

pub fn load(path: &Path, opts: &RamlOptions) -> Result<RamlDocument, SpecError> {
    let text = std::fs::read_to_string(path)?;
    parse(&text, &path.display().to_string(), opts)
}

pub fn parse(text: &str, file: &str, opts: &RamlOptions) -> Result<RamlDocument, SpecError> {
    let yaml: Yaml = serde_yaml::from_str(text)?;
    let map = yaml
        .as_mapping()
        .ok_or_else(|| raml_err(file, "document is not a mapping"))?;
    let index = LineIndex::build(text);

    let mut title = None;
    let mut base_uri = None;
    let mut schemas = Vec::new();
    let mut resource_types = Vec::new();
    let mut traits = Vec::new();
    let mut resource_entries = Vec::new();

    for (key, val) in map {
        let key = key
            .as_str()
            .ok_or_else(|| raml_err(file, "document keys must be strings"))?;
        match key {
            "title" => title = Some(expect_string(file, "title", val)?),
            "baseUri" => base_uri = Some(expect_string(file, "baseUri", val)?),
            "schemas" => {
                let entries = val
                    .as_sequence()
                    .ok_or_else(|| raml_err(file, "`schemas` is not a sequence"))?;
                for (i, entry) in entries.iter().enumerate() {
                    schemas.push(document::parse_schema_entry(i, entry)?);
                }
            }
            "resourceTypes" => resource_types = named_templates(file, "resourceTypes", val)?,
            "traits" => traits = named_templates(file, "traits", val)?,
            resource if resource.starts_with('/') => resource_entries.push((resource, val)),
            other => debug!(key = other, "ignoring RAML document key"),
        }
    }

    let loader = Loader {
        file,
        index: &index,
        opts,
        resource_types,
        traits,
        schema_names: schemas.iter().map(|(name, _)| name.clone()).collect(),
    };
    let mut resources = Vec::new();
    for (key, val) in resource_entries {
        let key_path = vec![key.to_string()];
        resources.push(loader.resource(key, val, "", &key_path)?);
    }

    Ok(RamlDocument {
        title,
        base_uri,
        schemas,
        resources,
    })
}

struct Loader<'y> {
    file: &'y str,
    index: &'y LineIndex,
    opts: &'y RamlOptions,
    resource_types: Vec<(String, &'y Yaml)>,
    traits: Vec<(String, &'y Yaml)>,
    schema_names: HashSet<String>,
}

impl<'y> Loader<'y> {
    fn resource(
        &self,
        key: &str,
        body: &Yaml,
        parent_path: &str,
        key_path: &[String],
    ) -> Result<RamlResource, SpecError> {
        let mut resource = RamlResource {
            path: format!("{}{}", parent_path, key),
            methods: Vec::new(),
            children: Vec::new(),
            span: self.span(key_path),
        };
        let mut type_name = None;

        match body {
            Yaml::Null => {}
            Yaml::Mapping(map) => {
                for (k, v) in map {
                    let k = k
                        .as_str()
                        .ok_or_else(|| self.err("resource keys must be strings"))?;
                    if k.starts_with('/') {
                        let child_path = push(key_path, k);
                        let child = self.resource(k, v, &resource.path, &child_path)?;
                        resource.children.push(child);
                    } else if let Some(verb) = Method::parse(k) {
                        let method_path = push(key_path, k);
                        resource.methods.push(self.method(verb, v, &method_path)?);
                    } else if k == "type" {
                        type_name = Some(template_name(self.file, "type", v)?);
                    } else {
                        debug!(key = k, resource = %resource.path, "ignoring RAML resource key");
                    }
                }
            }
            _ => return Err(self.err(format!("resource `{}` is not a mapping", key))),
        }

        if self.opts.resource_types {
            if let Some(name) = type_name {
                self.apply_resource_type(&mut resource, &name)?;
            }
        }
        Ok(resource)
    }

    fn method(
        &self,
        verb: Method,
        body: &Yaml,
        key_path: &[String],
    ) -> Result<RamlMethod, SpecError> {
        let mut method = RamlMethod {
            verb,
            query_parameters: Vec::new(),
            responses: Vec::new(),
            span: self.span(key_path),
        };
        let mut trait_names = Vec::new();

        match body {
            Yaml::Null => {}
            Yaml::Mapping(map) => {
                for (k, v) in map {
                    let k = k
                        .as_str()
                        .ok_or_else(|| self.err("method keys must be strings"))?;
                    match k {
                        "queryParameters" => {
                            let path = push(key_path, "queryParameters");
                            method.query_parameters = self.query_parameters(v, &path)?;
                        }
                        "responses" => {
                            let responses = v.as_mapping().ok_or_else(|| {
                                self.err(format!("`{}` responses is not a mapping", verb))
                            })?;
                            for (status_key, response_body) in responses {
                                let status_text = scalar_key(self.file, status_key)?;
                                let status =
                                    status_text.parse::<u16>().map_err(|_| {
                                        self.err(format!(
                                            "invalid status code `{}`",
                                            status_text
                                        ))
                                    })?;
                                let mut path = push(key_path, "responses");
                                path.push(status_text);
                                method
                                    .responses
                                    .push(self.response(status, response_body, &path)?);
                            }
                        }
                        "is" => trait_names = trait_list(self.file, v)?,
                        other => debug!(key = other, method = %verb, "ignoring RAML method key"),
                    }
                }
            }
            _ => return Err(self.err(format!("method `{}` is not a mapping", verb))),
        }

        if self.opts.traits {
            for name in trait_names {
                self.apply_trait(&mut method, &name)?;
            }
        }
        Ok(method)
    }

    fn query_parameters(
        &self,
        yaml: &Yaml,
        key_path: &[String],
    ) -> Result<Vec<RamlQueryParameter>, SpecError> {
        let map = yaml
            .as_mapping()
            .ok_or_else(|| self.err("`queryParameters` is not a mapping"))?;
        let mut out = Vec::with_capacity(map.len());
        for (name, param) in map {
            let name = name
                .as_str()
                .ok_or_else(|| self.err("query parameter names must be strings"))?;
            out.push(RamlQueryParameter {
                name: name.to_string(),
                required: param.get("required").and_then(Yaml::as_bool).unwrap_or(false),
                span: self.span(&push(key_path, name)),
            });
        }
        Ok(out)
    }

    fn response(
        &self,
        status: u16,
        body: &Yaml,
        key_path: &[String],
    ) -> Result<RamlResponse, SpecError> {
        let mut response = RamlResponse {
            status,
            headers: Vec::new(),
            bodies: Vec::new(),
            span: self.span(key_path),
        };
        let Yaml::Mapping(map) = body else {
            return Ok(response);
        };

        for (k, v) in map {
            let k = k
                .as_str()
                .ok_or_else(|| self.err("response keys must be strings"))?;
            match k {
                "headers" => {
                    let headers = v
                        .as_mapping()
                        .ok_or_else(|| self.err("response `headers` is not a mapping"))?;
                    let headers_path = push(key_path, "headers");
                    for (name, header) in headers {
                        let name = name
                            .as_str()
                            .ok_or_else(|| self.err("header names must be strings"))?;
                        response.headers.push(RamlHeader {
                            name: name.to_string(),
                            required: header
                                .get("required")
                                .and_then(Yaml::as_bool)
                                .unwrap_or(false),
                            span: self.span(&push(&headers_path, name)),
                        });
                    }
                }
                "body" => {
                    let bodies = v
                        .as_mapping()
                        .ok_or_else(|| self.err("response `body` is not a mapping"))?;
                    let body_path = push(key_path, "body");
                    for (content_type, spec) in bodies {
                        let content_type = content_type
                            .as_str()
                            .ok_or_else(|| self.err("content types must be strings"))?;
                        let schema = match spec.get("schema") {
                            Some(schema) => Some(self.schema_ref(content_type, schema)?),
                            None => None,
                        };
                        response.bodies.push(RamlBody {
                            content_type: content_type.to_string(),
                            schema,
                            span: self.span(&push(&body_path, content_type)),
                        });
                    }
                }
                other => debug!(key = other, status, "ignoring RAML response key"),
            }
        }
        Ok(response)
    }

    /// A string schema value either names a declared schema or carries inline
    /// JSON. Names that are declared nowhere stay `Named` and are resolved
    /// against the specification's merged schema table at check time.
    fn schema_ref(&self, content_type: &str, yaml: &Yaml) -> Result<SchemaRef, SpecError> {
        match yaml {
            Yaml::String(text) => {
                if self.schema_names.contains(text) {
                    return Ok(SchemaRef::Named(text.clone()));
                }
                match serde_json::from_str::<serde_json::Value>(text) {
                    Ok(inline) if inline.is_object() || inline.is_boolean() => {
                        Ok(SchemaRef::Inline(inline))
                    }
                    _ => Ok(SchemaRef::Named(text.clone())),
                }
            }
            Yaml::Mapping(_) => Ok(SchemaRef::Inline(value::yaml_to_json(
                &format!("schema for `{}`", content_type),
                yaml,
            )?)),
            _ => Err(self.err(format!(
                "schema for `{}` must be a name or an inline schema",
                content_type
            ))),
        }
    }

    fn apply_resource_type(
        &self,
        resource: &mut RamlResource,
        name: &str,
    ) -> Result<(), SpecError> {
        let template = self
            .resource_types
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, body)| *body)
            .ok_or_else(|| SpecError::UnknownResourceType(name.to_string()))?;
        let map = template
            .as_mapping()
            .ok_or_else(|| self.err(format!("resourceType `{}` is not a mapping", name)))?;

        for (k, v) in map {
            let k = k
                .as_str()
                .ok_or_else(|| self.err("resourceType keys must be strings"))?;
            let (verb_key, optional) = match k.strip_suffix('?') {
                Some(base) => (base, true),
                None => (k, false),
            };
            let Some(verb) = Method::parse(verb_key) else {
                debug!(key = k, resource_type = name, "ignoring resourceType key");
                continue;
            };
            let template_path = vec![
                "resourceTypes".to_string(),
                name.to_string(),
                k.to_string(),
            ];
            let template_method = self.method(verb, v, &template_path)?;
            if let Some(declared) = resource.methods.iter_mut().find(|m| m.verb == verb) {
                merge_method(declared, template_method);
            } else if !optional {
                resource.methods.push(template_method);
            }
        }
        Ok(())
    }

    fn apply_trait(&self, method: &mut RamlMethod, name: &str) -> Result<(), SpecError> {
        let template = self
            .traits
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, body)| *body)
            .ok_or_else(|| SpecError::UnknownTrait(name.to_string()))?;
        let map = template
            .as_mapping()
            .ok_or_else(|| self.err(format!("trait `{}` is not a mapping", name)))?;

        for (k, v) in map {
            let k = k
                .as_str()
                .ok_or_else(|| self.err("trait keys must be strings"))?;
            if k != "queryParameters" {
                debug!(key = k, trait_name = name, "ignoring trait key");
                continue;
            }
            let path = vec![
                "traits".to_string(),
                name.to_string(),
                "queryParameters".to_string(),
            ];
            for param in self.query_parameters(v, &path)? {
                if !method.query_parameters.iter().any(|p| p.name == param.name) {
                    method.query_parameters.push(param);
                }
            }
        }
        Ok(())
    }

    fn span(&self, key_path: &[String]) -> SourceSpan {
        let parts: Vec<&str> = key_path.iter().map(String::as_str).collect();
        let (line, line_end) = self.index.span(&parts).unwrap_or((1, 1));
        SourceSpan {
            file: self.file.to_string(),
            line,
            line_end,
        }
    }

    fn err(&self, reason: impl Into<String>) -> SpecError {
        raml_err(self.file, reason)
    }
}

/// Merge a resourceType template method into a declared one: the template
/// supplies the query parameters and responses the declaration left out.
fn merge_method(declared: &mut RamlMethod, template: RamlMethod) {
    for param in template.query_parameters {
        if !declared.query_parameters.iter().any(|p| p.name == param.name) {
            declared.query_parameters.push(param);
        }
    }
    for response in template.responses {
        if !declared.responses.iter().any(|r| r.status == response.status) {
            declared.responses.push(response);
        }
    }
}

fn push(key_path: &[String], key: &str) -> Vec<String> {
    let mut path = key_path.to_vec();
    path.push(key.to_string());
    path
}

fn raml_err(file: &str, reason: impl Into<String>) -> SpecError {
    SpecError::Raml {
        file: file.to_string(),
        reason: reason.into(),
    }
}

fn expect_string(file: &str, field: &str, yaml: &Yaml) -> Result<String, SpecError> {
    yaml.as_str()
        .map(str::to_string)
        .ok_or_else(|| raml_err(file, format!("`{}` must be a string", field)))
}

fn scalar_key(file: &str, yaml: &Yaml) -> Result<String, SpecError> {
    match yaml {
        Yaml::String(s) => Ok(s.clone()),
        Yaml::Number(n) => Ok(n.to_string()),
        _ => Err(raml_err(file, "response status keys must be scalars")),
    }
}

/// `type: name` or the parameterized `type: { name: { … } }` form; parameter
/// substitution is not applied.
fn template_name(file: &str, field: &str, yaml: &Yaml) -> Result<String, SpecError> {
    match yaml {
        Yaml::String(name) => Ok(name.clone()),
        Yaml::Mapping(map) if map.len() == 1 => match map.iter().next() {
            Some((name, _)) => expect_string(file, field, name),
            None => Err(raml_err(file, format!("`{}` must name a template", field))),
        },
        _ => Err(raml_err(file, format!("`{}` must name a template", field))),
    }
}

fn trait_list(file: &str, yaml: &Yaml) -> Result<Vec<String>, SpecError> {
    let seq = yaml
        .as_sequence()
        .ok_or_else(|| raml_err(file, "`is` must be a sequence of trait names"))?;
    let mut names = Vec::with_capacity(seq.len());
    for item in seq {
        names.push(template_name(file, "is", item)?);
    }
    Ok(names)
}

fn named_templates<'y>(
    file: &str,
    field: &str,
    yaml: &'y Yaml,
) -> Result<Vec<(String, &'y Yaml)>, SpecError> {
    let seq = yaml
        .as_sequence()
        .ok_or_else(|| raml_err(file, format!("`{}` is not a sequence", field)))?;
    let mut out = Vec::with_capacity(seq.len());
    for entry in seq {
        let map = entry
            .as_mapping()
            .filter(|map| map.len() == 1)
            .ok_or_else(|| {
                raml_err(file, format!("`{}` entries are single-entry mappings", field))
            })?;
        if let Some((name, body)) = map.iter().next() {
            let name = name
                .as_str()
                .ok_or_else(|| raml_err(file, format!("`{}` names must be strings", field)))?;
            out.push((name.to_string(), body));
        }
    }
    Ok(out)
}
