//! Error types for the CaseCraft generator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Top-level error taxonomy. Transport and invalid-output errors are
/// routed through retry/fallback by the scheduler; config and spec
/// errors abort the run before any job is dispatched.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Spec error: {0}")]
    Spec(String),

    #[error("No provider configured")]
    NoProviderConfigured,

    #[error("Provider transport error: {provider}: {message}")]
    ProviderTransport { provider: String, message: String },

    #[error("Provider fatal error: {provider}: {message}")]
    ProviderFatal { provider: String, message: String },

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("State I/O error: {0}")]
    StateIo(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl GeneratorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn spec(message: impl Into<String>) -> Self {
        Self::Spec(message.into())
    }

    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderTransport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn fatal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderFatal {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn state_io(message: impl Into<String>) -> Self {
        Self::StateIo(message.into())
    }

    /// Whether the scheduler may route this error through retry/fallback
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GeneratorError::ProviderTransport { .. } | GeneratorError::InvalidOutput(_)
        )
    }

    /// Whether the error aborts the run before job dispatch
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            GeneratorError::Config(_)
                | GeneratorError::Spec(_)
                | GeneratorError::NoProviderConfigured
        )
    }
}

impl From<std::io::Error> for GeneratorError {
    fn from(err: std::io::Error) -> Self {
        GeneratorError::StateIo(err.to_string())
    }
}
