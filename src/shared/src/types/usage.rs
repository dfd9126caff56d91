//! Token usage accounting
//!
//! Providers report token counts when the remote API returns them;
//! otherwise the client estimates. Records are appended to the usage
//! aggregator which produces the end-of-run report.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// PER-CALL USAGE
// ============================================================================

/// Token usage for a single LLM call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Normalize a possibly-incomplete usage block from a provider.
    pub fn normalized(self) -> Self {
        if self.total_tokens == 0 {
            Self {
                total_tokens: self.prompt_tokens + self.completion_tokens,
                ..self
            }
        } else {
            self
        }
    }
}

/// Outcome of a single provider call, as seen by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageOutcome {
    Success,
    InvalidOutput,
    TransportError,
    RateLimited,
    Timeout,
    Cancelled,
}

/// One aggregator entry for one provider call
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    pub duration: Duration,
    pub outcome: UsageOutcome,
    pub retries: u32,
}

// ============================================================================
// PER-PROVIDER AGGREGATES
// ============================================================================

/// Accumulated counters for one provider
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderStats {
    pub attempts: u64,
    pub successes: u64,
    pub invalid_output: u64,
    pub transport_errors: u64,
    pub rate_limited: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub retries: u64,
    pub wall_time_seconds: f64,
}

impl ProviderStats {
    pub fn record(&mut self, record: &UsageRecord) {
        self.attempts += 1;
        self.prompt_tokens += record.usage.prompt_tokens;
        self.completion_tokens += record.usage.completion_tokens;
        self.retries += u64::from(record.retries);
        self.wall_time_seconds += record.duration.as_secs_f64();

        match record.outcome {
            UsageOutcome::Success => self.successes += 1,
            UsageOutcome::InvalidOutput => self.invalid_output += 1,
            UsageOutcome::TransportError => self.transport_errors += 1,
            UsageOutcome::RateLimited => self.rate_limited += 1,
            UsageOutcome::Timeout => self.timeouts += 1,
            UsageOutcome::Cancelled => self.cancelled += 1,
        }
    }

    pub fn failures(&self) -> u64 {
        self.attempts - self.successes
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f64 / self.attempts as f64
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn avg_tokens_per_success(&self) -> f64 {
        if self.successes == 0 {
            return 0.0;
        }
        self.total_tokens() as f64 / self.successes as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: UsageOutcome, prompt: u64, completion: u64) -> UsageRecord {
        UsageRecord {
            provider: "glm".into(),
            model: "glm-4".into(),
            usage: TokenUsage::new(prompt, completion),
            duration: Duration::from_millis(1200),
            outcome,
            retries: 0,
        }
    }

    #[test]
    fn test_usage_normalization() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 0,
        };
        assert_eq!(usage.normalized().total_tokens, 150);

        let explicit = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 155,
        };
        assert_eq!(explicit.normalized().total_tokens, 155);
    }

    #[test]
    fn test_stats_accumulation() {
        let mut stats = ProviderStats::default();
        stats.record(&record(UsageOutcome::Success, 100, 50));
        stats.record(&record(UsageOutcome::RateLimited, 100, 0));
        stats.record(&record(UsageOutcome::Success, 200, 80));

        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures(), 1);
        assert_eq!(stats.rate_limited, 1);
        assert_eq!(stats.total_tokens(), 530);
        assert!((stats.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }
}
