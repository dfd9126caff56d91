//! Local provider for Ollama- and vLLM-compatible servers.
//!
//! Talks the same OpenAI-style chat endpoint the hosted providers use,
//! but requires no API key and takes its worker count straight from
//! configuration.

use crate::providers::{
    ChatClient, GenerationRequest, LlmProvider, LlmResponse, ProviderError,
};
use async_trait::async_trait;
use casecraft_shared::config::ProviderConfig;

pub const PROVIDER_NAME: &str = "local";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_MODEL: &str = "llama3";
/// Declared capacity when no configuration is available
pub const DEFAULT_MAX_WORKERS: usize = 2;

pub struct LocalProvider {
    client: ChatClient,
    config: ProviderConfig,
}

impl LocalProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut config = config.clone();
        config.name = PROVIDER_NAME.to_string();
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        // Local servers rarely implement response_format
        let client = ChatClient::new(PROVIDER_NAME, DEFAULT_BASE_URL, &config, false)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmProvider for LocalProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        self.client.model()
    }

    fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        self.config.validate().map_err(ProviderError::Config)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<LlmResponse, ProviderError> {
        self.client.execute(request).await
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.client.health_check().await
    }
}
