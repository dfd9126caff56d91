//! Configuration loading and merging.
//!
//! Values come from an optional YAML file, overridden by `CASECRAFT_*`
//! environment variables, overridden by CLI arguments (applied by the
//! binary). The merged config is validated before any job is
//! dispatched.

use crate::error::{GeneratorError, Result};
use crate::providers::registry::ProviderRegistry;
use crate::state::DEFAULT_STATE_FILE;
use crate::strategy::StrategyKind;
use casecraft_shared::config::{OutputConfig, ProviderConfig, ProviderRoles};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Default configuration file name in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "casecraft.yaml";

/// Provider section of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersSection {
    /// Providers participating in this run, in round-robin order
    #[serde(default)]
    pub active: Vec<String>,
    /// Providers tried, in order, when the primary fails
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    /// Role tags for the complexity strategy
    #[serde(default)]
    pub roles: ProviderRoles,
    /// Per-provider settings keyed by provider name
    #[serde(default)]
    pub configs: BTreeMap<String, ProviderConfig>,
}

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasecraftConfig {
    #[serde(default)]
    pub providers: ProvidersSection,
    /// Assignment strategy: round_robin, random, complexity, manual
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Manual strategy mapping, `pattern:provider,...`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_mapping: Option<String>,
    /// Seed for the random strategy; derived when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub output: OutputConfig,
    /// Path of the incremental state file
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

fn default_strategy() -> String {
    "round_robin".to_string()
}

fn default_state_path() -> String {
    DEFAULT_STATE_FILE.to_string()
}

impl Default for CasecraftConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersSection::default(),
            strategy: default_strategy(),
            manual_mapping: None,
            random_seed: None,
            output: OutputConfig::default(),
            state_path: default_state_path(),
        }
    }
}

impl CasecraftConfig {
    /// Load the configuration file (when present) and apply
    /// environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path).await?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path).await?
                } else {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GeneratorError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: CasecraftConfig = serde_yaml::from_str(&content).map_err(|e| {
            GeneratorError::config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(providers) = env_string("CASECRAFT_PROVIDERS") {
            self.providers.active = split_list(&providers);
        }
        if let Some(fallback) = env_string("CASECRAFT_FALLBACK") {
            self.providers.fallback_chain = split_list(&fallback);
        }
        if let Some(strategy) = env_string("CASECRAFT_STRATEGY") {
            self.strategy = strategy;
        }
        if let Some(mapping) = env_string("CASECRAFT_MANUAL_MAPPING") {
            self.manual_mapping = Some(mapping);
        }
        if let Some(seed) = env_parse::<u64>("CASECRAFT_RANDOM_SEED")? {
            self.random_seed = Some(seed);
        }
        if let Some(dir) = env_string("CASECRAFT_OUTPUT_DIR") {
            self.output.directory = dir;
        }
        if let Some(state) = env_string("CASECRAFT_STATE_PATH") {
            self.state_path = state;
        }
        if let Some(roles) = env_string("CASECRAFT_ROLE_STRONGEST") {
            self.providers.roles.strongest = Some(roles);
        }
        if let Some(roles) = env_string("CASECRAFT_ROLE_FASTEST") {
            self.providers.roles.fastest = Some(roles);
        }
        if let Some(roles) = env_string("CASECRAFT_ROLE_BALANCED") {
            self.providers.roles.balanced = Some(roles);
        }

        // Per-provider overrides: CASECRAFT_<NAME>_<FIELD>
        let names: Vec<String> = self.providers.active.clone();
        for name in names {
            self.apply_provider_env(&name)?;
        }
        Ok(())
    }

    fn apply_provider_env(&mut self, name: &str) -> Result<()> {
        let prefix = format!("CASECRAFT_{}", name.to_uppercase());
        let entry = self
            .providers
            .configs
            .entry(name.to_string())
            .or_insert_with(|| ProviderConfig {
                name: name.to_string(),
                ..Default::default()
            });
        entry.name = name.to_string();

        if let Some(key) = env_string(&format!("{}_API_KEY", prefix)) {
            entry.api_key = Some(key);
        }
        if let Some(model) = env_string(&format!("{}_MODEL", prefix)) {
            entry.model = model;
        }
        if let Some(url) = env_string(&format!("{}_BASE_URL", prefix)) {
            entry.base_url = Some(url);
        }
        if let Some(timeout) = env_parse::<u64>(&format!("{}_TIMEOUT", prefix))? {
            entry.timeout_seconds = timeout;
        }
        if let Some(retries) = env_parse::<u32>(&format!("{}_MAX_RETRIES", prefix))? {
            entry.max_retries = retries;
        }
        if let Some(temperature) = env_parse::<f32>(&format!("{}_TEMPERATURE", prefix))? {
            entry.temperature = temperature;
        }
        if let Some(tokens) = env_parse::<u32>(&format!("{}_MAX_TOKENS", prefix))? {
            entry.max_tokens = tokens;
        }
        if let Some(stream) = env_parse::<bool>(&format!("{}_STREAM", prefix))? {
            entry.stream = stream;
        }
        if let Some(workers) = env_parse::<usize>(&format!("{}_MAX_WORKERS", prefix))? {
            entry.max_workers = workers;
        }
        Ok(())
    }

    /// Effective config for one provider, with its name filled in.
    pub fn provider_config(&self, name: &str) -> ProviderConfig {
        let mut config = self
            .providers
            .configs
            .get(name)
            .cloned()
            .unwrap_or_default();
        config.name = name.to_string();
        config
    }

    pub fn strategy_kind(&self) -> Result<StrategyKind> {
        StrategyKind::from_str(&self.strategy).map_err(GeneratorError::Config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.providers.active.is_empty() {
            return Err(GeneratorError::NoProviderConfigured);
        }

        for name in &self.providers.active {
            if !ProviderRegistry::is_known(name) {
                return Err(GeneratorError::config(format!(
                    "unknown provider '{}' in active list",
                    name
                )));
            }
        }
        for name in &self.providers.fallback_chain {
            if !ProviderRegistry::is_known(name) {
                return Err(GeneratorError::config(format!(
                    "unknown provider '{}' in fallback chain",
                    name
                )));
            }
        }

        let kind = self.strategy_kind()?;
        if kind == StrategyKind::Manual && self.manual_mapping.is_none() {
            return Err(GeneratorError::config(
                "strategy 'manual' requires manual_mapping",
            ));
        }
        if kind == StrategyKind::Complexity {
            for role in [
                &self.providers.roles.strongest,
                &self.providers.roles.fastest,
                &self.providers.roles.balanced,
            ]
            .into_iter()
            .flatten()
            {
                if !self.providers.active.contains(role) {
                    return Err(GeneratorError::config(format!(
                        "role provider '{}' is not in the active list",
                        role
                    )));
                }
            }
        }

        for name in &self.providers.active {
            if let Some(config) = self.providers.configs.get(name) {
                config.validate().map_err(GeneratorError::Config)?;
            }
        }

        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| GeneratorError::config(format!("invalid {}: {}", key, e))),
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
