//! Kimi (Moonshot) provider.
//!
//! Moonshot rejects temperatures above 1.0, so the configured value is
//! clamped before the client is built.

use crate::providers::{
    validate_hosted_config, ChatClient, GenerationRequest, LlmProvider, LlmResponse, ProviderError,
};
use async_trait::async_trait;
use casecraft_shared::config::ProviderConfig;

pub const PROVIDER_NAME: &str = "kimi";
pub const DEFAULT_BASE_URL: &str = "https://api.moonshot.cn/v1";
pub const DEFAULT_MODEL: &str = "moonshot-v1-8k";
pub const MAX_WORKERS: usize = 3;

pub struct KimiProvider {
    client: ChatClient,
    config: ProviderConfig,
}

impl KimiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut config = config.clone();
        config.name = PROVIDER_NAME.to_string();
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }
        config.temperature = config.temperature.min(1.0);

        let client = ChatClient::new(PROVIDER_NAME, DEFAULT_BASE_URL, &config, true)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmProvider for KimiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        self.client.model()
    }

    fn max_workers(&self) -> usize {
        self.config.max_workers.min(MAX_WORKERS)
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        validate_hosted_config(PROVIDER_NAME, &self.config)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<LlmResponse, ProviderError> {
        self.client.execute(request).await
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.client.health_check().await
    }
}
