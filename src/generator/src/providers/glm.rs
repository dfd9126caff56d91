//! GLM (BigModel) provider.
//!
//! The BigModel API caps chat-completion concurrency at a single
//! in-flight request per key, so this provider always declares one
//! worker slot regardless of configuration.

use crate::providers::{
    validate_hosted_config, ChatClient, GenerationRequest, LlmProvider, LlmResponse, ProviderError,
};
use async_trait::async_trait;
use casecraft_shared::config::ProviderConfig;

pub const PROVIDER_NAME: &str = "glm";
pub const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn/api/paas/v4";
pub const DEFAULT_MODEL: &str = "glm-4";
/// BigModel allows one concurrent request
pub const MAX_WORKERS: usize = 1;

pub struct GlmProvider {
    client: ChatClient,
    config: ProviderConfig,
}

impl GlmProvider {
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
impl LlmProvider for GlmProvider {
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
