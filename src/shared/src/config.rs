//! Shared configuration types for CaseCraft
//!
//! Provider configuration is immutable after load. Values come from the
//! configuration file, overridden by environment variables, overridden
//! by CLI arguments; the merge happens in the generator crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single LLM provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name (glm, qwen, deepseek, kimi, local)
    #[serde(default)]
    pub name: String,
    /// Model identifier sent to the remote API
    #[serde(default)]
    pub model: String,
    /// API key; optional for local backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override; each provider has a default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Transport-level retries within the client
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Stream responses when the provider supports it
    #[serde(default)]
    pub stream: bool,
    /// Requested worker slots; clamped by the provider's declared cap
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_timeout_seconds() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_workers() -> usize {
    1
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            model: String::new(),
            api_key: None,
            base_url: None,
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: false,
            max_workers: default_max_workers(),
        }
    }
}

impl ProviderConfig {
    /// Per-request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Overall deadline for one job on this provider and its fallbacks:
    /// timeout × (max_retries + 1) × (fallback chain length + 1)
    pub fn job_deadline(&self, fallback_chain_len: usize) -> Duration {
        let attempts = u64::from(self.max_retries) + 1;
        let chain = fallback_chain_len as u64 + 1;
        Duration::from_secs(self.timeout_seconds * attempts * chain)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model.is_empty() {
            return Err(format!("provider '{}': model cannot be empty", self.name));
        }
        if self.timeout_seconds == 0 {
            return Err(format!("provider '{}': timeout must be positive", self.name));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "provider '{}': invalid temperature {} (must be 0.0-2.0)",
                self.name, self.temperature
            ));
        }
        if self.max_tokens == 0 || self.max_tokens > 128_000 {
            return Err(format!(
                "provider '{}': invalid max_tokens {} (must be 1-128000)",
                self.name, self.max_tokens
            ));
        }
        if self.max_workers == 0 {
            return Err(format!(
                "provider '{}': max_workers must be at least 1",
                self.name
            ));
        }
        Ok(())
    }
}

/// Provider role tags consumed by the complexity assignment strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderRoles {
    /// Provider receiving endpoints with complexity score > 10
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strongest: Option<String>,
    /// Provider receiving endpoints with complexity score <= 5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fastest: Option<String>,
    /// Provider receiving everything in between
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balanced: Option<String>,
}

/// Artifact output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory test-case files are written to
    #[serde(default = "default_output_directory")]
    pub directory: String,
    /// Nest artifacts under a subdirectory named after the first tag
    #[serde(default)]
    pub organize_by_tag: bool,
}

fn default_output_directory() -> String {
    "test_cases".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            organize_by_tag: false,
        }
    }
}
