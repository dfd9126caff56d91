//! Incremental generation state
//!
//! The state file (`.casecraft_state.json`) maps endpoint keys
//! (`METHOD path`) to their last-generation record plus an aggregate
//! counters block. It is rewritten atomically after each successful
//! endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current state file format version
pub const STATE_VERSION: &str = "1.0";

// ============================================================================
// PER-ENDPOINT STATE
// ============================================================================

/// Last-generation record for a single endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointState {
    /// Fingerprint of the endpoint's semantic definition
    pub definition_hash: String,
    pub last_generated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default)]
    pub test_cases_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
    /// Primary provider the job fell back from, when fallback was used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

// ============================================================================
// AGGREGATE STATE
// ============================================================================

/// Identity of the spec source the state was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// URL or file path of the API source
    pub api_source: String,
    pub last_modified: DateTime<Utc>,
    /// SHA-256 of the raw API document content
    pub source_hash: String,
}

/// Aggregate counters for the last run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatistics {
    #[serde(default)]
    pub total_endpoints: usize,
    #[serde(default)]
    pub generated_count: usize,
    #[serde(default)]
    pub skipped_count: usize,
    #[serde(default)]
    pub failed_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_duration_seconds: Option<f64>,
    #[serde(default)]
    pub provider_usage: BTreeMap<String, u64>,
    #[serde(default)]
    pub provider_success_rate: BTreeMap<String, f64>,
    #[serde(default)]
    pub provider_avg_tokens: BTreeMap<String, f64>,
}

/// Root state file object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationState {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ProjectConfig>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointState>,
    #[serde(default)]
    pub statistics: ProcessingStatistics,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            config: None,
            endpoints: BTreeMap::new(),
            statistics: ProcessingStatistics::default(),
        }
    }
}

impl GenerationState {
    pub fn endpoint_state(&self, endpoint_id: &str) -> Option<&EndpointState> {
        self.endpoints.get(endpoint_id)
    }

    pub fn update_endpoint_state(&mut self, endpoint_id: String, state: EndpointState) {
        self.endpoints.insert(endpoint_id, state);
    }

    /// Whether the stored definition hash matches the current one
    pub fn is_endpoint_unchanged(&self, endpoint_id: &str, definition_hash: &str) -> bool {
        self.endpoint_state(endpoint_id)
            .map(|s| s.definition_hash == definition_hash)
            .unwrap_or(false)
    }

    /// Drop state for endpoints no longer present in the spec.
    /// Returns the removed endpoint keys.
    pub fn prune_removed<'a, I>(&mut self, current_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: std::collections::BTreeSet<&str> = current_ids.into_iter().collect();
        let removed: Vec<String> = self
            .endpoints
            .keys()
            .filter(|k| !keep.contains(k.as_str()))
            .cloned()
            .collect();
        for key in &removed {
            self.endpoints.remove(key);
        }
        removed
    }
}
