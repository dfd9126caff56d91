//! Normalized API specification types
//!
//! Both OpenAPI 3.0 and Swagger 2.0 documents are normalized into the
//! shapes defined here. Endpoints are created by the parser and treated
//! as read-only for the rest of the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// HTTP PRIMITIVES
// ============================================================================

/// HTTP methods recognized in API specifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// All methods in specification document order
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Whether the method carries a request body by convention
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(format!("Invalid HTTP method: {}", s)),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter lives in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
        }
    }
}

impl FromStr for ParamLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "path" => Ok(ParamLocation::Path),
            "query" => Ok(ParamLocation::Query),
            "header" => Ok(ParamLocation::Header),
            "cookie" => Ok(ParamLocation::Cookie),
            _ => Err(format!("Invalid parameter location: {}", s)),
        }
    }
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Authentication scheme kind declared on an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthKind {
    Bearer,
    ApiKey,
    Basic,
    None,
}

impl Default for AuthKind {
    fn default() -> Self {
        AuthKind::None
    }
}

/// Declared authentication requirement for an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthRequirement {
    /// Whether the endpoint requires authentication
    pub required: bool,
    /// Scheme kind used when authentication is required
    pub kind: AuthKind,
}

impl AuthRequirement {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn required(kind: AuthKind) -> Self {
        Self { required: true, kind }
    }
}

// ============================================================================
// ENDPOINTS
// ============================================================================

/// A single parameter of an API operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiParameter {
    pub name: String,
    pub location: ParamLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the parameter value, when declared
    #[serde(default, rename = "schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// A normalized HTTP operation parsed from the API specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub method: HttpMethod,
    /// Path template, e.g. `/users/{id}`
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ApiParameter>,
    /// Request body JSON Schema (Swagger 2.0 body parameters are folded here)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<serde_json::Value>,
    /// Response schema per declared status code
    #[serde(default)]
    pub responses: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub auth: AuthRequirement,
}

impl ApiEndpoint {
    /// Unique endpoint key, `METHOD path`
    pub fn endpoint_id(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn params_in(&self, location: ParamLocation) -> impl Iterator<Item = &ApiParameter> {
        self.parameters.iter().filter(move |p| p.location == location)
    }

    pub fn count_params(&self, location: ParamLocation) -> usize {
        self.params_in(location).count()
    }
}

/// A complete, normalized API specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSpecification {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<ApiEndpoint>,
}

impl ApiSpecification {
    /// Apply include/exclude filters, preserving document order.
    ///
    /// Include filters are intersections; exclude filters are removals
    /// applied after includes.
    pub fn filter_endpoints(&self, filter: &EndpointFilter) -> ApiSpecification {
        let endpoints = self
            .endpoints
            .iter()
            .filter(|ep| filter.matches(ep))
            .cloned()
            .collect();

        ApiSpecification {
            title: self.title.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            base_url: self.base_url.clone(),
            endpoints,
        }
    }
}

// ============================================================================
// FILTERING
// ============================================================================

/// Endpoint selection filters applied after parsing
#[derive(Debug, Clone, Default)]
pub struct EndpointFilter {
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    /// Glob patterns matched against the path template
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub include_methods: Vec<HttpMethod>,
    pub exclude_methods: Vec<HttpMethod>,
}

impl EndpointFilter {
    pub fn is_empty(&self) -> bool {
        self.include_tags.is_empty()
            && self.exclude_tags.is_empty()
            && self.include_paths.is_empty()
            && self.exclude_paths.is_empty()
            && self.include_methods.is_empty()
            && self.exclude_methods.is_empty()
    }

    pub fn matches(&self, endpoint: &ApiEndpoint) -> bool {
        if !self.include_tags.is_empty()
            && !self.include_tags.iter().any(|t| endpoint.tags.contains(t))
        {
            return false;
        }
        if self.exclude_tags.iter().any(|t| endpoint.tags.contains(t)) {
            return false;
        }

        if !self.include_paths.is_empty()
            && !self
                .include_paths
                .iter()
                .any(|p| glob_match(p, &endpoint.path))
        {
            return false;
        }
        if self
            .exclude_paths
            .iter()
            .any(|p| glob_match(p, &endpoint.path))
        {
            return false;
        }

        if !self.include_methods.is_empty() && !self.include_methods.contains(&endpoint.method) {
            return false;
        }
        if self.exclude_methods.contains(&endpoint.method) {
            return false;
        }

        true
    }
}

/// Glob-style matching with `*` (any run) and `?` (any single char).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let (mut star, mut mark) = (None::<usize>, 0usize);

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}
