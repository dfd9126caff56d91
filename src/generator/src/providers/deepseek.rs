//! DeepSeek provider.

use crate::providers::{
    validate_hosted_config, ChatClient, GenerationRequest, LlmProvider, LlmResponse, ProviderError,
};
use async_trait::async_trait;
use casecraft_shared::config::ProviderConfig;

pub const PROVIDER_NAME: &str = "deepseek";
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const MAX_WORKERS: usize = 3;

pub struct DeepSeekProvider {
    client: ChatClient,
    config: ProviderConfig,
}

impl DeepSeekProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut config = config.clone();
        config.name = PROVIDER_NAME.to_string();
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        let client = ChatClient::new(PROVIDER_NAME, DEFAULT_BASE_URL, &config, true)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmProvider for DeepSeekProvider {
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
