//! API specification loading and normalization.
//!
//! Accepts a URL or local path holding an OpenAPI 3.0 or Swagger 2.0
//! document in JSON or YAML. Swagger 2.0 shapes (`parameters in: body`,
//! `formData`, bare `type` on parameters) are normalized into the
//! OpenAPI 3.0 form with a single request-body schema. Local `$ref`
//! pointers are resolved inline; external references fail loudly.

use crate::error::{GeneratorError, Result};
use casecraft_shared::types::api::{
    ApiEndpoint, ApiParameter, ApiSpecification, AuthKind, AuthRequirement, HttpMethod,
    ParamLocation,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Loads and normalizes API specifications.
pub struct SpecParser;

impl SpecParser {
    /// Fetch the raw document from a URL or local path.
    pub async fn load_source(source: &str) -> Result<String> {
        if source.starts_with("http://") || source.starts_with("https://") {
            debug!("Fetching API spec from URL: {}", source);
            let response = reqwest::get(source)
                .await
                .map_err(|e| GeneratorError::spec(format!("Failed to fetch {}: {}", source, e)))?;
            if !response.status().is_success() {
                return Err(GeneratorError::spec(format!(
                    "Failed to fetch {}: HTTP {}",
                    source,
                    response.status()
                )));
            }
            response
                .text()
                .await
                .map_err(|e| GeneratorError::spec(format!("Failed to read {}: {}", source, e)))
        } else {
            debug!("Reading API spec from file: {}", source);
            tokio::fs::read_to_string(source)
                .await
                .map_err(|e| GeneratorError::spec(format!("Failed to read {}: {}", source, e)))
        }
    }

    /// Parse a raw JSON or YAML document into a normalized specification.
    pub fn parse(content: &str, source_name: &str) -> Result<ApiSpecification> {
        let data = Self::parse_document(content)?;

        if data.get("openapi").is_some() {
            Self::parse_openapi_v3(&data, source_name)
        } else if data.get("swagger").is_some() {
            Self::parse_swagger_v2(&data, source_name)
        } else {
            Err(GeneratorError::spec(format!(
                "{}: unsupported specification (expected an 'openapi' or 'swagger' version field)",
                source_name
            )))
        }
    }

    fn parse_document(content: &str) -> Result<Value> {
        let trimmed = content.trim_start();
        if trimmed.starts_with('{') {
            return serde_json::from_str(content).map_err(|e| {
                GeneratorError::spec(format!(
                    "malformed JSON document at line {}: {}",
                    e.line(),
                    e
                ))
            });
        }
        let yaml: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| {
            let location = e
                .location()
                .map(|l| format!(" at line {}", l.line()))
                .unwrap_or_default();
            GeneratorError::spec(format!("malformed YAML document{}: {}", location, e))
        })?;
        yaml_to_json(yaml)
    }

    // ========================================================================
    // OpenAPI 3.0
    // ========================================================================

    fn parse_openapi_v3(data: &Value, source_name: &str) -> Result<ApiSpecification> {
        let info = data.get("info").cloned().unwrap_or_else(|| json!({}));
        let title = str_field(&info, "title").unwrap_or_else(|| source_name.to_string());
        let version = str_field(&info, "version").unwrap_or_else(|| "1.0.0".to_string());

        let base_url = data
            .get("servers")
            .and_then(|s| s.as_array())
            .and_then(|s| s.first())
            .and_then(|s| str_field(s, "url"));

        let global_auth = Self::auth_from_security(
            data.get("security"),
            data.pointer("/components/securitySchemes"),
            data,
        )?;

        let mut endpoints = Vec::new();
        let paths = data
            .get("paths")
            .and_then(|p| p.as_object())
            .ok_or_else(|| GeneratorError::spec(format!("{}: missing 'paths' object", source_name)))?;

        for (path, item) in paths {
            let Some(item_obj) = item.as_object() else {
                continue;
            };
            let shared_params = item_obj.get("parameters").cloned();

            for (key, operation) in item_obj {
                let Ok(method) = HttpMethod::from_str(key) else {
                    continue;
                };
                let endpoint = Self::parse_v3_operation(
                    method,
                    path,
                    operation,
                    shared_params.as_ref(),
                    global_auth,
                    data,
                )?;
                endpoints.push(endpoint);
            }
        }

        Ok(ApiSpecification {
            title,
            version,
            description: str_field(&info, "description"),
            base_url,
            endpoints,
        })
    }

    fn parse_v3_operation(
        method: HttpMethod,
        path: &str,
        operation: &Value,
        shared_params: Option<&Value>,
        global_auth: AuthRequirement,
        root: &Value,
    ) -> Result<ApiEndpoint> {
        let mut parameters = Vec::new();
        for source in [shared_params, operation.get("parameters")].into_iter().flatten() {
            if let Some(list) = source.as_array() {
                for param in list {
                    let param = Self::resolve_value(param, root)?;
                    if let Some(parsed) = Self::parse_v3_parameter(&param, root)? {
                        // Operation-level parameters override shared ones
                        parameters.retain(|p: &ApiParameter| {
                            !(p.name == parsed.name && p.location == parsed.location)
                        });
                        parameters.push(parsed);
                    }
                }
            }
        }

        let request_body = match operation.get("requestBody") {
            Some(rb) => {
                let rb = Self::resolve_value(rb, root)?;
                Self::body_schema_from_content(rb.get("content"), root)?
            }
            None => None,
        };

        let mut responses = BTreeMap::new();
        if let Some(resp_obj) = operation.get("responses").and_then(|r| r.as_object()) {
            for (status, response) in resp_obj {
                let response = Self::resolve_value(response, root)?;
                let schema = Self::body_schema_from_content(response.get("content"), root)?
                    .unwrap_or_else(|| json!({}));
                responses.insert(status.clone(), schema);
            }
        }

        let auth = match operation.get("security") {
            Some(security) => Self::auth_from_security(
                Some(security),
                root.pointer("/components/securitySchemes"),
                root,
            )?,
            None => global_auth,
        };

        Ok(ApiEndpoint {
            method,
            path: path.to_string(),
            operation_id: str_field(operation, "operationId"),
            summary: str_field(operation, "summary"),
            description: str_field(operation, "description"),
            tags: string_list(operation.get("tags")),
            parameters,
            request_body,
            responses,
            auth,
        })
    }

    fn parse_v3_parameter(param: &Value, root: &Value) -> Result<Option<ApiParameter>> {
        let Some(name) = str_field(param, "name") else {
            return Ok(None);
        };
        let location = str_field(param, "in")
            .and_then(|l| ParamLocation::from_str(&l).ok());
        let Some(location) = location else {
            return Ok(None);
        };

        let schema = match param.get("schema") {
            Some(schema) => Some(Self::resolve_value(schema, root)?),
            None => None,
        };

        Ok(Some(ApiParameter {
            name,
            location,
            required: param.get("required").and_then(|r| r.as_bool()).unwrap_or(false),
            description: str_field(param, "description"),
            schema,
        }))
    }

    /// Pull the JSON schema out of a `content` map, preferring JSON
    /// media types.
    fn body_schema_from_content(content: Option<&Value>, root: &Value) -> Result<Option<Value>> {
        let Some(content) = content.and_then(|c| c.as_object()) else {
            return Ok(None);
        };

        let json_entry = content
            .iter()
            .find(|(media, _)| media.to_lowercase().contains("json"))
            .or_else(|| content.iter().next());

        match json_entry.and_then(|(_, media)| media.get("schema")) {
            Some(schema) => Ok(Some(Self::resolve_value(schema, root)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Swagger 2.0
    // ========================================================================

    fn parse_swagger_v2(data: &Value, source_name: &str) -> Result<ApiSpecification> {
        let version_tag = str_field(data, "swagger").unwrap_or_default();
        if version_tag != "2.0" {
            return Err(GeneratorError::spec(format!(
                "{}: unsupported Swagger version '{}'",
                source_name, version_tag
            )));
        }

        let info = data.get("info").cloned().unwrap_or_else(|| json!({}));
        let title = str_field(&info, "title").unwrap_or_else(|| source_name.to_string());
        let version = str_field(&info, "version").unwrap_or_else(|| "1.0.0".to_string());

        let base_url = match (str_field(data, "host"), str_field(data, "basePath")) {
            (Some(host), base) => Some(format!("https://{}{}", host, base.unwrap_or_default())),
            _ => None,
        };

        let global_auth = Self::auth_from_security(
            data.get("security"),
            data.get("securityDefinitions"),
            data,
        )?;

        let mut endpoints = Vec::new();
        let paths = data
            .get("paths")
            .and_then(|p| p.as_object())
            .ok_or_else(|| GeneratorError::spec(format!("{}: missing 'paths' object", source_name)))?;

        for (path, item) in paths {
            let Some(item_obj) = item.as_object() else {
                continue;
            };
            let shared_params = item_obj.get("parameters").cloned();

            for (key, operation) in item_obj {
                let Ok(method) = HttpMethod::from_str(key) else {
                    continue;
                };
                let endpoint = Self::parse_v2_operation(
                    method,
                    path,
                    operation,
                    shared_params.as_ref(),
                    global_auth,
                    data,
                )?;
                endpoints.push(endpoint);
            }
        }

        Ok(ApiSpecification {
            title,
            version,
            description: str_field(&info, "description"),
            base_url,
            endpoints,
        })
    }

    fn parse_v2_operation(
        method: HttpMethod,
        path: &str,
        operation: &Value,
        shared_params: Option<&Value>,
        global_auth: AuthRequirement,
        root: &Value,
    ) -> Result<ApiEndpoint> {
        let mut parameters = Vec::new();
        let mut request_body: Option<Value> = None;
        let mut form_properties = serde_json::Map::new();
        let mut form_required = Vec::new();

        for source in [shared_params, operation.get("parameters")].into_iter().flatten() {
            let Some(list) = source.as_array() else {
                continue;
            };
            for param in list {
                let param = Self::resolve_value(param, root)?;
                let location = str_field(&param, "in").unwrap_or_default();

                match location.as_str() {
                    "body" => {
                        // Swagger 2.0 body parameter becomes the request body
                        request_body = match param.get("schema") {
                            Some(schema) => Some(Self::resolve_value(schema, root)?),
                            None => None,
                        };
                    }
                    "formData" => {
                        if let Some(name) = str_field(&param, "name") {
                            form_properties
                                .insert(name.clone(), Self::v2_inline_schema(&param));
                            if param.get("required").and_then(|r| r.as_bool()).unwrap_or(false) {
                                form_required.push(Value::String(name));
                            }
                        }
                    }
                    _ => {
                        if let Ok(loc) = ParamLocation::from_str(&location) {
                            if let Some(name) = str_field(&param, "name") {
                                let parsed = ApiParameter {
                                    name,
                                    location: loc,
                                    required: param
                                        .get("required")
                                        .and_then(|r| r.as_bool())
                                        .unwrap_or(false),
                                    description: str_field(&param, "description"),
                                    schema: Some(Self::v2_inline_schema(&param)),
                                };
                                parameters.retain(|p: &ApiParameter| {
                                    !(p.name == parsed.name && p.location == parsed.location)
                                });
                                parameters.push(parsed);
                            }
                        }
                    }
                }
            }
        }

        // formData parameters fold into a single object body
        if request_body.is_none() && !form_properties.is_empty() {
            request_body = Some(json!({
                "type": "object",
                "properties": Value::Object(form_properties),
                "required": form_required,
            }));
        }

        let mut responses = BTreeMap::new();
        if let Some(resp_obj) = operation.get("responses").and_then(|r| r.as_object()) {
            for (status, response) in resp_obj {
                let response = Self::resolve_value(response, root)?;
                let schema = match response.get("schema") {
                    Some(schema) => Self::resolve_value(schema, root)?,
                    None => json!({}),
                };
                responses.insert(status.clone(), schema);
            }
        }

        let auth = match operation.get("security") {
            Some(security) => {
                Self::auth_from_security(Some(security), root.get("securityDefinitions"), root)?
            }
            None => global_auth,
        };

        Ok(ApiEndpoint {
            method,
            path: path.to_string(),
            operation_id: str_field(operation, "operationId"),
            summary: str_field(operation, "summary"),
            description: str_field(operation, "description"),
            tags: string_list(operation.get("tags")),
            parameters,
            request_body,
            responses,
            auth,
        })
    }

    /// Swagger 2.0 parameters carry `type`/`format` directly; promote
    /// them into a schema object.
    fn v2_inline_schema(param: &Value) -> Value {
        let mut schema = serde_json::Map::new();
        for key in ["type", "format", "enum", "minimum", "maximum", "items", "default"] {
            if let Some(value) = param.get(key) {
                schema.insert(key.to_string(), value.clone());
            }
        }
        Value::Object(schema)
    }

    // ========================================================================
    // Security
    // ========================================================================

    fn auth_from_security(
        security: Option<&Value>,
        schemes: Option<&Value>,
        root: &Value,
    ) -> Result<AuthRequirement> {
        let Some(requirements) = security.and_then(|s| s.as_array()) else {
            return Ok(AuthRequirement::none());
        };
        if requirements.is_empty() {
            // An explicit empty security array disables authentication
            return Ok(AuthRequirement::none());
        }

        let scheme_name = requirements
            .iter()
            .filter_map(|r| r.as_object())
            .flat_map(|r| r.keys())
            .next();
        let Some(scheme_name) = scheme_name else {
            return Ok(AuthRequirement::none());
        };

        let kind = schemes
            .and_then(|s| s.get(scheme_name))
            .map(|scheme| Self::resolve_value(scheme, root))
            .transpose()?
            .map(|scheme| Self::classify_scheme(&scheme))
            .unwrap_or(AuthKind::Bearer);

        Ok(AuthRequirement::required(kind))
    }

    fn classify_scheme(scheme: &Value) -> AuthKind {
        let scheme_type = str_field(scheme, "type").unwrap_or_default().to_lowercase();
        match scheme_type.as_str() {
            "http" => {
                let http_scheme = str_field(scheme, "scheme").unwrap_or_default().to_lowercase();
                if http_scheme == "basic" {
                    AuthKind::Basic
                } else {
                    AuthKind::Bearer
                }
            }
            "apikey" => AuthKind::ApiKey,
            "basic" => AuthKind::Basic,
            // oauth2 and openIdConnect flows present bearer tokens
            "oauth2" | "openidconnect" => AuthKind::Bearer,
            _ => AuthKind::Bearer,
        }
    }

    // ========================================================================
    // $ref resolution
    // ========================================================================

    /// Resolve local `$ref` pointers in a value, inlining the target.
    /// Cycles are replaced with a `{"$cycle": <entry>}` sentinel keyed
    /// by the cycle's entry node so structurally identical cyclic
    /// schemas compare equal.
    fn resolve_value(value: &Value, root: &Value) -> Result<Value> {
        let mut stack = Vec::new();
        Self::resolve_inner(value, root, &mut stack)
    }

    fn resolve_inner(value: &Value, root: &Value, stack: &mut Vec<String>) -> Result<Value> {
        match value {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref").and_then(|r| r.as_str()) {
                    let Some(pointer) = reference.strip_prefix('#') else {
                        return Err(GeneratorError::spec(format!(
                            "external $ref is not supported: {}",
                            reference
                        )));
                    };
                    if stack.iter().any(|seen| seen == reference) {
                        return Ok(json!({ "$cycle": ref_name(reference) }));
                    }
                    let target = root.pointer(pointer).ok_or_else(|| {
                        GeneratorError::spec(format!("unresolvable $ref: {}", reference))
                    })?;
                    stack.push(reference.to_string());
                    let resolved = Self::resolve_inner(target, root, stack)?;
                    stack.pop();
                    return Ok(resolved);
                }

                let mut out = serde_json::Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), Self::resolve_inner(item, root, stack)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Self::resolve_inner(item, root, stack)?);
                }
                Ok(Value::Array(out))
            }
            other => Ok(other.clone()),
        }
    }
}

fn ref_name(reference: &str) -> String {
    reference.rsplit('/').next().unwrap_or(reference).to_string()
}

/// Convert a YAML document to JSON, stringifying the numeric keys
/// Swagger files commonly use for status codes.
fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    match value {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::from(u))
            } else {
                Ok(Value::from(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s)),
        serde_yaml::Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(yaml_to_json(item)?);
            }
            Ok(Value::Array(out))
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(GeneratorError::spec(format!(
                            "unsupported mapping key in YAML document: {:?}",
                            other
                        )))
                    }
                };
                out.insert(key, yaml_to_json(item)?);
            }
            Ok(Value::Object(out))
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Log a short summary of the parsed specification.
pub fn log_spec_summary(spec: &ApiSpecification) {
    debug!(
        "Parsed spec '{}' v{}: {} endpoints",
        spec.title,
        spec.version,
        spec.endpoints.len()
    );
    if spec.endpoints.is_empty() {
        warn!("Specification contains no endpoints");
    }
}
