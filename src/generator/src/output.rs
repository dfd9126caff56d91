//! Artifact validation and writing.
//!
//! The validator enforces the test-case contract on model output:
//! shape, types, endpoint identity, and per-type counts within the
//! budget ±1. The writer persists one JSON array per endpoint under a
//! deterministic filename, atomically.

use crate::complexity::{assign_priorities, Budget};
use crate::error::{GeneratorError, Result};
use casecraft_shared::types::api::ApiEndpoint;
use casecraft_shared::types::cases::{TestCase, TestType};
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

// ============================================================================
// VALIDATION
// ============================================================================

/// Why model output was rejected. The reasons feed the correction
/// suffix on retry.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub reasons: Vec<String>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reasons.join("; "))
    }
}

/// Validate cleaned model output against the artifact contract.
pub fn validate_output(
    value: &Value,
    endpoint: &ApiEndpoint,
    budget: &Budget,
) -> std::result::Result<Vec<TestCase>, ValidationFailure> {
    let mut reasons = Vec::new();

    let Some(items) = value.as_array() else {
        return Err(ValidationFailure {
            reasons: vec!["top-level value must be a JSON array of test cases".into()],
        });
    };
    if items.is_empty() {
        return Err(ValidationFailure {
            reasons: vec!["no test cases were generated".into()],
        });
    }

    let mut cases = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<TestCase>(item.clone()) {
            Ok(case) => cases.push(case),
            Err(e) => reasons.push(format!("test case {}: {}", index, e)),
        }
    }
    if !reasons.is_empty() {
        return Err(ValidationFailure { reasons });
    }

    for (index, case) in cases.iter().enumerate() {
        if case.name.trim().is_empty() {
            reasons.push(format!("test case {}: empty name", index));
        }
        if case.description.trim().is_empty() {
            reasons.push(format!("test case {}: empty description", index));
        }
        if !(100..=599).contains(&case.expected_status) {
            reasons.push(format!(
                "test case {}: expected_status {} is not a valid HTTP status",
                index, case.expected_status
            ));
        }
        if case.method != endpoint.method {
            reasons.push(format!(
                "test case {}: method {} does not match endpoint {}",
                index, case.method, endpoint.method
            ));
        }
        if case.path != endpoint.path {
            reasons.push(format!(
                "test case {}: path {} does not match endpoint {}",
                index, case.path, endpoint.path
            ));
        }
    }

    for test_type in TestType::ALL {
        let expected = budget.count_of(test_type);
        let actual = cases.iter().filter(|c| c.test_type == test_type).count();
        if actual.abs_diff(expected) > 1 {
            reasons.push(format!(
                "expected {} {} cases (±1), found {}",
                expected, test_type, actual
            ));
        }
    }

    if reasons.is_empty() {
        Ok(cases)
    } else {
        Err(ValidationFailure { reasons })
    }
}

// ============================================================================
// ENHANCEMENT
// ============================================================================

/// Post-validation enrichment: response schemas for positive cases,
/// status-code inference for negative cases, metadata, and priority
/// slicing.
pub fn enhance_cases(
    cases: &mut [TestCase],
    endpoint: &ApiEndpoint,
    api_version: &str,
    provider: &str,
    model: &str,
) {
    let success_schema = endpoint
        .responses
        .get("200")
        .filter(|schema| schema.as_object().map(|o| !o.is_empty()).unwrap_or(false))
        .cloned();

    let generated_at = Utc::now();
    for case in cases.iter_mut() {
        if case.test_type == TestType::Positive
            && case.expected_status == 200
            && case.expected_response_schema.is_none()
        {
            case.expected_response_schema = success_schema.clone();
        }

        if case.test_type == TestType::Negative {
            case.expected_status = infer_negative_status(case);
        }

        case.metadata.generated_at = generated_at;
        case.metadata.api_version = Some(api_version.to_string());
        case.metadata.llm_provider = Some(provider.to_string());
        case.metadata.llm_model = Some(model.to_string());
    }

    assign_priorities(cases);
}

/// Nudge obviously wrong expected codes on negative cases using
/// name/description keywords. Codes already in the 4xx error family
/// are kept.
fn infer_negative_status(case: &TestCase) -> u16 {
    if matches!(case.expected_status, 400 | 401 | 403 | 404 | 409 | 422) {
        return case.expected_status;
    }

    let text = format!("{} {}", case.name, case.description).to_lowercase();

    if ["unauthorized", "authentication", "no token", "missing token"]
        .iter()
        .any(|kw| text.contains(kw))
    {
        return 401;
    }
    if ["forbidden", "permission", "access denied"]
        .iter()
        .any(|kw| text.contains(kw))
    {
        return 403;
    }
    if ["not found", "nonexistent", "does not exist", "unknown id"]
        .iter()
        .any(|kw| text.contains(kw))
    {
        return 404;
    }
    if ["validation", "constraint", "out of range", "too long", "too short"]
        .iter()
        .any(|kw| text.contains(kw))
    {
        return 422;
    }
    // Missing/invalid parameter shapes default to a plain bad request
    400
}

// ============================================================================
// WRITER
// ============================================================================

/// Derive the artifact file slug from a path template: separators
/// become underscores and braces are removed.
pub fn path_slug(path: &str) -> String {
    let slug: String = path
        .trim_matches('/')
        .chars()
        .filter(|c| *c != '{' && *c != '}')
        .map(|c| if c == '/' { '_' } else { c })
        .collect();
    if slug.is_empty() {
        "root".to_string()
    } else {
        slug
    }
}

/// Writes one artifact file per endpoint.
pub struct ArtifactWriter {
    directory: PathBuf,
    organize_by_tag: bool,
}

impl ArtifactWriter {
    pub fn new(directory: impl Into<PathBuf>, organize_by_tag: bool) -> Self {
        Self {
            directory: directory.into(),
            organize_by_tag,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Deterministic artifact path: `{method}_{path_slug}.json`,
    /// optionally nested under the endpoint's first tag.
    pub fn artifact_path(&self, endpoint: &ApiEndpoint) -> PathBuf {
        let filename = format!(
            "{}_{}.json",
            endpoint.method.as_str().to_lowercase(),
            path_slug(&endpoint.path)
        );

        match (self.organize_by_tag, endpoint.tags.first()) {
            (true, Some(tag)) => self.directory.join(tag).join(filename),
            _ => self.directory.join(filename),
        }
    }

    /// Persist the ordered case list as a JSON array, atomically.
    /// An existing file for the endpoint is overwritten.
    pub async fn write(&self, endpoint: &ApiEndpoint, cases: &[TestCase]) -> Result<PathBuf> {
        let path = self.artifact_path(endpoint);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GeneratorError::state_io(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let json = serde_json::to_string_pretty(cases)
            .map_err(|e| GeneratorError::state_io(format!("failed to serialize cases: {}", e)))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await.map_err(|e| {
            GeneratorError::state_io(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            GeneratorError::state_io(format!("failed to move artifact into place: {}", e))
        })?;

        debug!("Wrote {} test cases to {}", cases.len(), path.display());
        Ok(path)
    }
}
