//! Generation engine: the top-level pipeline.
//!
//! Loads and filters the spec, compares fingerprints against stored
//! state, assigns providers, runs the scheduler, and folds the results
//! into the final report and the persisted statistics block.

use crate::complexity::{budget_for, score_endpoint};
use crate::config::CasecraftConfig;
use crate::error::{GeneratorError, Result};
use crate::fingerprint::{fingerprint_endpoint, hash_content};
use crate::output::ArtifactWriter;
use crate::parser::{log_spec_summary, SpecParser};
use crate::progress::{self, ProgressEvent};
use crate::providers::{LlmProvider, ProviderRegistry};
use crate::scheduler::{JobResult, JobSpec, Scheduler, SchedulerContext};
use crate::state::StateStore;
use crate::strategy::{build_strategy, default_random_seed};
use crate::usage::UsageAggregator;
use casecraft_shared::types::api::EndpointFilter;
use casecraft_shared::types::state::ProcessingStatistics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Options for one generation run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// URL or local path of the API document
    pub source: String,
    pub filter: EndpointFilter,
    /// Regenerate even when fingerprints are unchanged
    pub force: bool,
}

/// One terminal endpoint failure, for the end-of-run report.
#[derive(Debug, Clone)]
pub struct FailureDetail {
    pub endpoint: String,
    pub provider: String,
    pub error: String,
}

/// Aggregate result of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub duration: Duration,
    pub failures: Vec<FailureDetail>,
    pub was_cancelled: bool,
}

impl RunSummary {
    /// Exit code contract: 0 success, 2 all endpoints failed,
    /// 3 partial failure, 130 cancelled by user.
    pub fn exit_code(&self) -> i32 {
        if self.was_cancelled {
            130
        } else if self.failed > 0 && self.generated == 0 {
            2
        } else if self.failed > 0 {
            3
        } else {
            0
        }
    }
}

/// Whether an endpoint can be skipped: fingerprint unchanged since the
/// last run and its artifact still on disk.
pub async fn should_skip(
    state: &StateStore,
    writer: &ArtifactWriter,
    endpoint: &casecraft_shared::types::api::ApiEndpoint,
    fingerprint: &str,
    force: bool,
) -> bool {
    if force {
        return false;
    }
    let endpoint_id = endpoint.endpoint_id();
    if !state.is_unchanged(&endpoint_id, fingerprint).await {
        return false;
    }
    let artifact = state
        .artifact_path(&endpoint_id)
        .await
        .unwrap_or_else(|| writer.artifact_path(endpoint));
    tokio::fs::try_exists(&artifact).await.unwrap_or(false)
}

pub struct GenerationEngine {
    config: CasecraftConfig,
    cancel: CancellationToken,
}

impl GenerationEngine {
    pub fn new(config: CasecraftConfig, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, cancel })
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunSummary> {
        let started = Instant::now();

        // Load and parse the spec
        let content = SpecParser::load_source(&options.source).await?;
        let spec = SpecParser::parse(&content, &options.source)?;
        log_spec_summary(&spec);
        let source_hash = hash_content(&content);

        let filtered = spec.filter_endpoints(&options.filter);
        info!(
            "{} of {} endpoints selected after filtering",
            filtered.endpoints.len(),
            spec.endpoints.len()
        );

        // State store
        let state = Arc::new(StateStore::open(&self.config.state_path).await);
        if let Err(e) = state.record_source(&options.source, &source_hash).await {
            warn!("Failed to record source in state: {}", e);
        }

        // Construct provider clients through the registry
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut configs = HashMap::new();
        for name in &self.config.providers.active {
            let provider_config = self.config.provider_config(name);
            let client = ProviderRegistry::get(name, &provider_config)
                .map_err(|e| GeneratorError::config(e.to_string()))?;
            info!(
                provider = %name,
                model = %client.model(),
                workers = client.max_workers(),
                "provider ready"
            );
            providers.insert(name.clone(), client);
            configs.insert(name.clone(), provider_config);
        }

        // Progress fan-in
        let (progress_tx, mut progress_rx) = progress::channel();
        let renderer = tokio::spawn(async move {
            while let Some(event) = progress_rx.recv().await {
                render_event(&event);
            }
        });

        // Assignment strategy
        let seed = self
            .config
            .random_seed
            .unwrap_or_else(|| default_random_seed(filtered.endpoints.len(), &source_hash));
        let mut strategy = build_strategy(
            self.config.strategy_kind()?,
            &self.config.providers.active,
            &self.config.providers.roles,
            self.config.manual_mapping.as_deref(),
            seed,
        )?;

        let writer = Arc::new(ArtifactWriter::new(
            &self.config.output.directory,
            self.config.output.organize_by_tag,
        ));

        // Fingerprint comparison decides skip vs. generate
        let mut specs = Vec::new();
        let mut skipped = 0usize;
        for endpoint in &filtered.endpoints {
            let endpoint_id = endpoint.endpoint_id();
            let fingerprint = fingerprint_endpoint(endpoint);

            if should_skip(&state, &writer, endpoint, &fingerprint, options.force).await {
                skipped += 1;
                let _ = progress_tx.send(ProgressEvent::Skipped {
                    endpoint: endpoint_id,
                });
                continue;
            }

            let score = score_endpoint(endpoint);
            let budget = budget_for(score, endpoint.method);
            let primary = strategy.assign(endpoint)?;
            trace!(
                endpoint = %endpoint_id,
                score,
                primary = %primary,
                "job planned"
            );

            specs.push(JobSpec {
                endpoint: endpoint.clone(),
                fingerprint,
                budget,
                primary,
                fallback_chain: self.config.providers.fallback_chain.clone(),
            });
        }

        // Endpoints gone from the spec leave the state file
        let current_ids: Vec<String> = spec.endpoints.iter().map(|e| e.endpoint_id()).collect();
        if let Err(e) = state.prune_removed(&current_ids).await {
            warn!("Failed to prune state: {}", e);
        }

        let usage = Arc::new(UsageAggregator::new());
        let total = filtered.endpoints.len();
        info!(
            "Dispatching {} jobs ({} skipped as unchanged)",
            specs.len(),
            skipped
        );

        let scheduler = Scheduler::new(SchedulerContext {
            providers,
            configs,
            state: state.clone(),
            writer,
            usage: usage.clone(),
            progress: progress_tx.clone(),
            cancel: self.cancel.clone(),
            api_version: spec.version.clone(),
        });
        let report = scheduler.run(specs).await;
        drop(scheduler);
        drop(progress_tx);
        let _ = renderer.await;

        // Fold outcomes into the summary
        let mut summary = RunSummary {
            total,
            skipped,
            duration: started.elapsed(),
            was_cancelled: self.cancel.is_cancelled(),
            ..Default::default()
        };
        for outcome in &report.outcomes {
            match &outcome.result {
                JobResult::Written { .. } => summary.generated += 1,
                JobResult::Failed { provider, error } => {
                    summary.failed += 1;
                    summary.failures.push(FailureDetail {
                        endpoint: outcome.endpoint_id.clone(),
                        provider: provider.clone(),
                        error: error.clone(),
                    });
                }
                JobResult::Cancelled => summary.cancelled += 1,
            }
        }
        summary.cancelled += report.unreported;

        // Persist the aggregate statistics block
        let mut statistics = ProcessingStatistics {
            total_endpoints: summary.total,
            generated_count: summary.generated,
            skipped_count: summary.skipped,
            failed_count: summary.failed,
            last_run_duration_seconds: Some(summary.duration.as_secs_f64()),
            ..Default::default()
        };
        usage.apply_to_statistics(&mut statistics).await;
        if let Err(e) = state.record_statistics(statistics).await {
            warn!("Failed to persist statistics: {}", e);
        }

        // Final report
        usage.log_report().await;
        for failure in &summary.failures {
            error!(
                endpoint = %failure.endpoint,
                provider = %failure.provider,
                "endpoint failed: {}",
                failure.error
            );
        }
        info!(
            generated = summary.generated,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            duration_s = format!("{:.1}", summary.duration.as_secs_f64()),
            "run complete"
        );

        Ok(summary)
    }
}

fn render_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Queued { endpoint } => debug!("queued   {}", endpoint),
        ProgressEvent::Started { endpoint, provider } => {
            info!("running  {} [{}]", endpoint, provider)
        }
        ProgressEvent::Attempt {
            endpoint,
            provider,
            attempt,
        } if *attempt > 1 => info!("retry    {} [{}] attempt {}", endpoint, provider, attempt),
        ProgressEvent::Attempt { .. } => {}
        ProgressEvent::Streaming { endpoint, percent } => {
            trace!("progress {} {:.0}%", endpoint, percent * 100.0)
        }
        ProgressEvent::Validated { endpoint } => debug!("valid    {}", endpoint),
        ProgressEvent::Written { endpoint, path } => {
            info!("written  {} -> {}", endpoint, path.display())
        }
        ProgressEvent::Skipped { endpoint } => info!("skipped  {} (unchanged)", endpoint),
        ProgressEvent::Failed {
            endpoint,
            provider,
            error,
        } => error!("failed   {} [{}]: {}", endpoint, provider, error),
    }
}
