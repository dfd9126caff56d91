//! Process-wide provider registry.
//!
//! A lazily-initialized, lock-guarded name→client map. `get` returns a
//! singleton per name, constructing and validating on first use.
//! Declared worker capacities are published without constructing
//! clients.

use crate::providers::{
    deepseek, glm, kimi, local, qwen, LlmProvider, ProviderError,
};
use casecraft_shared::config::ProviderConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Names of the built-in providers, in documentation order.
pub const BUILTIN_PROVIDERS: [&str; 5] = [
    glm::PROVIDER_NAME,
    qwen::PROVIDER_NAME,
    deepseek::PROVIDER_NAME,
    kimi::PROVIDER_NAME,
    local::PROVIDER_NAME,
];

static INSTANCES: OnceLock<RwLock<HashMap<String, Arc<dyn LlmProvider>>>> = OnceLock::new();

fn instances() -> &'static RwLock<HashMap<String, Arc<dyn LlmProvider>>> {
    INSTANCES.get_or_init(|| RwLock::new(HashMap::new()))
}

pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Get the singleton client for `name`, constructing it from
    /// `config` on first use. Unknown names fail with an explicit
    /// error listing the available providers.
    pub fn get(name: &str, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let key = name.to_lowercase();

        if let Some(existing) = instances().read().get(&key) {
            return Ok(existing.clone());
        }

        let provider = Self::construct(&key, config)?;
        provider.validate_config()?;

        let mut map = instances().write();
        // Another caller may have won the race; keep the first instance
        let entry = map.entry(key.clone()).or_insert_with(|| {
            info!(provider = %key, model = %provider.model(), "initialized provider");
            provider
        });
        Ok(entry.clone())
    }

    /// Declared worker capacity for a provider name, without
    /// constructing the client. Unknown names return None.
    pub fn declared_max_workers(name: &str) -> Option<usize> {
        match name.to_lowercase().as_str() {
            glm::PROVIDER_NAME => Some(glm::MAX_WORKERS),
            qwen::PROVIDER_NAME => Some(qwen::MAX_WORKERS),
            deepseek::PROVIDER_NAME => Some(deepseek::MAX_WORKERS),
            kimi::PROVIDER_NAME => Some(kimi::MAX_WORKERS),
            local::PROVIDER_NAME => Some(local::DEFAULT_MAX_WORKERS),
            _ => None,
        }
    }

    pub fn is_known(name: &str) -> bool {
        BUILTIN_PROVIDERS.contains(&name.to_lowercase().as_str())
    }

    /// Drop all cached instances. Intended for tests.
    pub fn clear() {
        instances().write().clear();
    }

    fn construct(name: &str, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        match name {
            glm::PROVIDER_NAME => Ok(Arc::new(glm::GlmProvider::new(config)?)),
            qwen::PROVIDER_NAME => Ok(Arc::new(qwen::QwenProvider::new(config)?)),
            deepseek::PROVIDER_NAME => Ok(Arc::new(deepseek::DeepSeekProvider::new(config)?)),
            kimi::PROVIDER_NAME => Ok(Arc::new(kimi::KimiProvider::new(config)?)),
            local::PROVIDER_NAME => Ok(Arc::new(local::LocalProvider::new(config)?)),
            unknown => Err(ProviderError::Config(format!(
                "unknown provider '{}'; available providers: {}",
                unknown,
                BUILTIN_PROVIDERS.join(", ")
            ))),
        }
    }
}
