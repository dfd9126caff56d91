//! Per-provider usage aggregation.
//!
//! Workers append a record per provider call; the aggregator produces
//! the end-of-run report and the statistics block persisted in the
//! state file.

use casecraft_shared::types::state::ProcessingStatistics;
use casecraft_shared::types::usage::{ProviderStats, UsageRecord};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Default)]
pub struct UsageAggregator {
    stats: Mutex<BTreeMap<String, ProviderStats>>,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: UsageRecord) {
        let mut stats = self.stats.lock().await;
        stats
            .entry(record.provider.clone())
            .or_default()
            .record(&record);
    }

    pub async fn snapshot(&self) -> BTreeMap<String, ProviderStats> {
        self.stats.lock().await.clone()
    }

    /// Fold the per-provider aggregates into the state file statistics
    /// block.
    pub async fn apply_to_statistics(&self, statistics: &mut ProcessingStatistics) {
        let stats = self.stats.lock().await;
        for (provider, entry) in stats.iter() {
            statistics
                .provider_usage
                .insert(provider.clone(), entry.successes);
            statistics
                .provider_success_rate
                .insert(provider.clone(), entry.success_rate());
            statistics
                .provider_avg_tokens
                .insert(provider.clone(), entry.avg_tokens_per_success());
        }
    }

    /// Emit the final per-provider report.
    pub async fn log_report(&self) {
        let stats = self.stats.lock().await;
        if stats.is_empty() {
            info!("No provider calls were made");
            return;
        }

        let mut total_tokens = 0u64;
        let mut total_attempts = 0u64;
        let mut total_successes = 0u64;

        for (provider, entry) in stats.iter() {
            total_tokens += entry.total_tokens();
            total_attempts += entry.attempts;
            total_successes += entry.successes;

            info!(
                provider = %provider,
                attempts = entry.attempts,
                successes = entry.successes,
                failures = entry.failures(),
                invalid_output = entry.invalid_output,
                rate_limited = entry.rate_limited,
                timeouts = entry.timeouts,
                retries = entry.retries,
                tokens_in = entry.prompt_tokens,
                tokens_out = entry.completion_tokens,
                success_rate = format!("{:.1}%", entry.success_rate() * 100.0),
                wall_time_s = format!("{:.1}", entry.wall_time_seconds),
                "provider usage"
            );
        }

        info!(
            providers = stats.len(),
            attempts = total_attempts,
            successes = total_successes,
            total_tokens = total_tokens,
            "usage totals"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casecraft_shared::types::usage::{TokenUsage, UsageOutcome};
    use std::time::Duration;

    fn record(provider: &str, outcome: UsageOutcome) -> UsageRecord {
        UsageRecord {
            provider: provider.into(),
            model: "m".into(),
            usage: TokenUsage::new(100, 40),
            duration: Duration::from_secs(2),
            outcome,
            retries: 1,
        }
    }

    #[tokio::test]
    async fn test_aggregation_by_provider() {
        let aggregator = UsageAggregator::new();
        aggregator.record(record("glm", UsageOutcome::Success)).await;
        aggregator.record(record("glm", UsageOutcome::Timeout)).await;
        aggregator.record(record("qwen", UsageOutcome::Success)).await;

        let snapshot = aggregator.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["glm"].attempts, 2);
        assert_eq!(snapshot["glm"].timeouts, 1);
        assert_eq!(snapshot["qwen"].successes, 1);
    }

    #[tokio::test]
    async fn test_statistics_application() {
        let aggregator = UsageAggregator::new();
        aggregator.record(record("glm", UsageOutcome::Success)).await;
        aggregator.record(record("glm", UsageOutcome::Success)).await;

        let mut statistics = ProcessingStatistics::default();
        aggregator.apply_to_statistics(&mut statistics).await;
        assert_eq!(statistics.provider_usage["glm"], 2);
        assert!((statistics.provider_success_rate["glm"] - 1.0).abs() < 1e-9);
        assert!((statistics.provider_avg_tokens["glm"] - 140.0).abs() < 1e-9);
    }
}
