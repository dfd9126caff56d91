//! Multi-provider scheduler and fallback engine.
//!
//! Jobs are grouped by primary provider; each provider runs a bounded
//! worker pool sized by its declared capacity. Workers pull from a
//! shared queue in FIFO submission order, invoke prompt building, the
//! provider client, and the validator, retry invalid output with a
//! correction suffix, and hand exhausted jobs to the next provider in
//! the fallback chain through a central router. Cancellation is
//! cooperative at every suspension point.

use crate::complexity::Budget;
use crate::json_cleaner::clean_json_response;
use crate::output::{enhance_cases, validate_output, ArtifactWriter};
use crate::progress::{ProgressEvent, ProgressHandle, ProgressSender};
use crate::prompt;
use crate::providers::{GenerationRequest, LlmProvider, ProviderError};
use crate::state::StateStore;
use crate::usage::UsageAggregator;
use casecraft_shared::config::ProviderConfig;
use casecraft_shared::types::api::ApiEndpoint;
use casecraft_shared::types::state::EndpointState;
use casecraft_shared::types::usage::{TokenUsage, UsageOutcome, UsageRecord};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Additional same-provider attempts after invalid output
const INVALID_OUTPUT_RETRIES: u32 = 2;
/// Grace period for workers to wind down after cancellation
const CANCEL_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// JOBS AND OUTCOMES
// ============================================================================

/// A unit of work as submitted by the engine.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub endpoint: ApiEndpoint,
    pub fingerprint: String,
    pub budget: Budget,
    pub primary: String,
    pub fallback_chain: Vec<String>,
}

/// Internal job state while it moves through provider pools.
#[derive(Debug, Clone)]
struct Job {
    id: Uuid,
    endpoint: ApiEndpoint,
    fingerprint: String,
    budget: Budget,
    /// Full provider chain, primary first
    chain: Vec<String>,
    chain_index: usize,
    /// Invalid-output retries accumulated across the chain
    retry_count: u32,
    deadline: Instant,
}

impl Job {
    fn current_provider(&self) -> &str {
        &self.chain[self.chain_index]
    }

    fn fallback_from(&self) -> Option<&str> {
        (self.chain_index > 0).then(|| self.chain[0].as_str())
    }
}

/// Terminal result for one endpoint.
#[derive(Debug, Clone)]
pub enum JobResult {
    Written {
        provider: String,
        model: String,
        path: PathBuf,
        case_count: usize,
        tokens: Option<u64>,
        retry_count: u32,
        fallback_from: Option<String>,
    },
    Failed {
        provider: String,
        error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct EndpointOutcome {
    pub endpoint_id: String,
    pub result: JobResult,
}

/// Aggregate result of a scheduler run.
#[derive(Debug, Default)]
pub struct SchedulerReport {
    pub outcomes: Vec<EndpointOutcome>,
    /// Jobs discarded before reporting an outcome (cancellation)
    pub unreported: usize,
}

impl SchedulerReport {
    pub fn written_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, JobResult::Written { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, JobResult::Failed { .. }))
            .count()
    }

    pub fn cancelled_count(&self) -> usize {
        self.unreported
            + self
                .outcomes
                .iter()
                .filter(|o| matches!(o.result, JobResult::Cancelled))
                .count()
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Everything the scheduler needs to run.
pub struct SchedulerContext {
    pub providers: HashMap<String, Arc<dyn LlmProvider>>,
    pub configs: HashMap<String, ProviderConfig>,
    pub state: Arc<StateStore>,
    pub writer: Arc<ArtifactWriter>,
    pub usage: Arc<UsageAggregator>,
    pub progress: ProgressSender,
    pub cancel: CancellationToken,
    pub api_version: String,
}

pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    configs: HashMap<String, ProviderConfig>,
    state: Arc<StateStore>,
    writer: Arc<ArtifactWriter>,
    usage: Arc<UsageAggregator>,
    progress: ProgressSender,
    cancel: CancellationToken,
    api_version: String,
}

type JobSender = mpsc::Sender<Job>;
type SharedJobReceiver = Arc<Mutex<mpsc::Receiver<Job>>>;
type RouterSender = mpsc::UnboundedSender<Job>;
type OutcomeSender = mpsc::UnboundedSender<EndpointOutcome>;

impl Scheduler {
    pub fn new(context: SchedulerContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                providers: context.providers,
                configs: context.configs,
                state: context.state,
                writer: context.writer,
                usage: context.usage,
                progress: context.progress,
                cancel: context.cancel,
                api_version: context.api_version,
            }),
        }
    }

    /// Dispatch all jobs and wait for every one to reach a terminal
    /// state or be discarded by cancellation.
    pub async fn run(&self, specs: Vec<JobSpec>) -> SchedulerReport {
        let mut report = SchedulerReport::default();
        if specs.is_empty() {
            return report;
        }

        let shutdown = CancellationToken::new();
        let (router_tx, router_rx) = mpsc::unbounded_channel::<Job>();
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<EndpointOutcome>();

        // One bounded pool per provider, workers sized by declared capacity
        let mut pool_senders: HashMap<String, JobSender> = HashMap::new();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for (name, provider) in &self.inner.providers {
            let workers = provider.max_workers().max(1);
            let (tx, rx) = mpsc::channel::<Job>(workers * 2);
            pool_senders.insert(name.clone(), tx);

            let shared_rx: SharedJobReceiver = Arc::new(Mutex::new(rx));
            for worker_id in 0..workers {
                handles.push(tokio::spawn(worker_loop(
                    self.inner.clone(),
                    name.clone(),
                    worker_id,
                    shared_rx.clone(),
                    router_tx.clone(),
                    results_tx.clone(),
                    shutdown.clone(),
                )));
            }
        }

        handles.push(tokio::spawn(router_loop(
            router_rx,
            pool_senders,
            results_tx.clone(),
            shutdown.clone(),
        )));

        // Submit jobs in document order
        let mut submitted = 0usize;
        for spec in specs {
            match self.build_job(spec) {
                Ok(job) => {
                    let _ = self.inner.progress.send(ProgressEvent::Queued {
                        endpoint: job.endpoint.endpoint_id(),
                    });
                    if router_tx.send(job).is_ok() {
                        submitted += 1;
                    }
                }
                Err(outcome) => {
                    report.outcomes.push(outcome);
                }
            }
        }
        drop(router_tx);
        drop(results_tx);

        // Collect terminal outcomes; after cancellation allow a grace
        // period for in-flight workers to wind down.
        let mut remaining = submitted;
        while remaining > 0 {
            if self.inner.cancel.is_cancelled() {
                match tokio::time::timeout(CANCEL_DRAIN_TIMEOUT, results_rx.recv()).await {
                    Ok(Some(outcome)) => {
                        remaining -= 1;
                        report.outcomes.push(outcome);
                    }
                    Ok(None) | Err(_) => break,
                }
            } else {
                tokio::select! {
                    outcome = results_rx.recv() => match outcome {
                        Some(outcome) => {
                            remaining -= 1;
                            report.outcomes.push(outcome);
                        }
                        None => break,
                    },
                    _ = self.inner.cancel.cancelled() => {
                        info!("Cancellation requested, draining in-flight jobs");
                    }
                }
            }
        }
        report.unreported = remaining;

        shutdown.cancel();
        for handle in handles {
            let _ = handle.await;
        }

        report
    }

    fn build_job(&self, spec: JobSpec) -> std::result::Result<Job, EndpointOutcome> {
        let endpoint_id = spec.endpoint.endpoint_id();

        if !self.inner.providers.contains_key(&spec.primary) {
            return Err(EndpointOutcome {
                endpoint_id,
                result: JobResult::Failed {
                    provider: spec.primary.clone(),
                    error: format!("primary provider '{}' is not available", spec.primary),
                },
            });
        }

        let mut chain = vec![spec.primary.clone()];
        for name in &spec.fallback_chain {
            if name == &spec.primary || chain.contains(name) {
                continue;
            }
            if !self.inner.providers.contains_key(name) {
                warn!(
                    "Fallback provider '{}' is not available, skipping it for {}",
                    name, endpoint_id
                );
                continue;
            }
            chain.push(name.clone());
        }

        let deadline = self
            .inner
            .configs
            .get(&spec.primary)
            .map(|c| Instant::now() + c.job_deadline(chain.len() - 1))
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        Ok(Job {
            id: Uuid::new_v4(),
            endpoint: spec.endpoint,
            fingerprint: spec.fingerprint,
            budget: spec.budget,
            chain,
            chain_index: 0,
            retry_count: 0,
            deadline,
        })
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Forwards jobs into the bounded pool of their current provider.
/// Fallback re-dispatch goes through here so pool workers never block
/// on another pool's queue.
async fn router_loop(
    mut router_rx: mpsc::UnboundedReceiver<Job>,
    pools: HashMap<String, JobSender>,
    results_tx: OutcomeSender,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            job = router_rx.recv() => job,
            _ = shutdown.cancelled() => break,
        };
        let Some(job) = job else { break };

        let provider = job.current_provider().to_string();
        let Some(pool) = pools.get(&provider) else {
            let _ = results_tx.send(EndpointOutcome {
                endpoint_id: job.endpoint.endpoint_id(),
                result: JobResult::Failed {
                    provider: provider.clone(),
                    error: format!("no worker pool for provider '{}'", provider),
                },
            });
            continue;
        };

        tokio::select! {
            sent = pool.send(job) => {
                if let Err(e) = sent {
                    let job = e.0;
                    let _ = results_tx.send(EndpointOutcome {
                        endpoint_id: job.endpoint.endpoint_id(),
                        result: JobResult::Cancelled,
                    });
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

// ============================================================================
// WORKERS
// ============================================================================

async fn worker_loop(
    inner: Arc<Inner>,
    provider_name: String,
    worker_id: usize,
    shared_rx: SharedJobReceiver,
    router_tx: RouterSender,
    results_tx: OutcomeSender,
    shutdown: CancellationToken,
) {
    debug!(provider = %provider_name, worker = worker_id, "worker started");

    loop {
        // Holding the lock only for the pull keeps job starts FIFO
        let job = {
            let mut rx = shared_rx.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                _ = shutdown.cancelled() => None,
            }
        };
        let Some(job) = job else { break };

        // Jobs dispatched but not yet running are discarded on cancel
        if inner.cancel.is_cancelled() {
            let _ = results_tx.send(EndpointOutcome {
                endpoint_id: job.endpoint.endpoint_id(),
                result: JobResult::Cancelled,
            });
            continue;
        }

        if let Some(outcome) = process_job(&inner, job, &router_tx).await {
            let _ = results_tx.send(outcome);
        }
    }

    debug!(provider = %provider_name, worker = worker_id, "worker stopped");
}

/// Run a job on its current provider. Returns None when the job was
/// re-dispatched to a fallback provider.
async fn process_job(inner: &Inner, mut job: Job, router_tx: &RouterSender) -> Option<EndpointOutcome> {
    let endpoint_id = job.endpoint.endpoint_id();
    let provider_name = job.current_provider().to_string();
    let provider = inner
        .providers
        .get(&provider_name)
        .expect("router only targets known providers")
        .clone();

    debug!(job = %job.id, endpoint = %endpoint_id, provider = %provider_name, "job running");
    let _ = inner.progress.send(ProgressEvent::Started {
        endpoint: endpoint_id.clone(),
        provider: provider_name.clone(),
    });

    let handle = Arc::new(ProgressHandle::new(
        endpoint_id.clone(),
        Some(inner.progress.clone()),
    ));

    let system = prompt::system_prompt(&job.budget);
    let base_task = prompt::task_prompt(&job.endpoint, &job.budget);
    let mut correction: Option<String> = None;
    let mut invalid_attempts = 0u32;
    let mut last_failure = String::new();

    loop {
        let attempt = invalid_attempts + 1;
        let _ = inner.progress.send(ProgressEvent::Attempt {
            endpoint: endpoint_id.clone(),
            provider: provider_name.clone(),
            attempt,
        });

        let mut task = base_task.clone();
        if let Some(suffix) = &correction {
            task.push_str(suffix);
        }

        let request = GenerationRequest {
            prompt: task,
            system_prompt: Some(system.clone()),
            temperature: None,
            max_tokens: None,
            cancel: inner.cancel.child_token(),
            progress: Some(handle.clone()),
        };

        let started = Instant::now();
        let remaining = job.deadline.saturating_duration_since(Instant::now());
        let result = if remaining.is_zero() {
            Err(ProviderError::Timeout("job deadline exceeded".into()))
        } else {
            match tokio::time::timeout(remaining, provider.generate(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout("job deadline exceeded".into())),
            }
        };

        match result {
            Ok(response) => {
                let duration = started.elapsed();
                let validation = clean_json_response(&response.content)
                    .map_err(|e| format!("output was not valid JSON: {}", e))
                    .and_then(|value| {
                        validate_output(&value, &job.endpoint, &job.budget)
                            .map_err(|failure| failure.to_string())
                    });

                match validation {
                    Ok(mut cases) => {
                        let usage = response.usage.unwrap_or_default();
                        inner
                            .usage
                            .record(UsageRecord {
                                provider: provider_name.clone(),
                                model: response.model.clone(),
                                usage,
                                duration,
                                outcome: UsageOutcome::Success,
                                retries: response.transport_retries + job.retry_count,
                            })
                            .await;

                        let _ = inner.progress.send(ProgressEvent::Validated {
                            endpoint: endpoint_id.clone(),
                        });

                        enhance_cases(
                            &mut cases,
                            &job.endpoint,
                            &inner.api_version,
                            &provider_name,
                            &response.model,
                        );

                        let tokens = Some(usage.normalized().total_tokens);
                        return Some(
                            finalize_job(inner, &job, &provider_name, &response.model, cases, tokens)
                                .await,
                        );
                    }
                    Err(reason) => {
                        warn!(
                            endpoint = %endpoint_id,
                            provider = %provider_name,
                            attempt,
                            "invalid output: {}", reason
                        );
                        inner
                            .usage
                            .record(UsageRecord {
                                provider: provider_name.clone(),
                                model: response.model.clone(),
                                usage: response.usage.unwrap_or_default(),
                                duration,
                                outcome: UsageOutcome::InvalidOutput,
                                retries: response.transport_retries,
                            })
                            .await;

                        job.retry_count += 1;
                        last_failure = reason.clone();

                        if invalid_attempts < INVALID_OUTPUT_RETRIES {
                            invalid_attempts += 1;
                            correction = Some(prompt::correction_suffix(&reason));
                            handle.rollback();
                            continue;
                        }
                        // Same-provider retries exhausted, fall back
                    }
                }
            }
            Err(ProviderError::Cancelled) => {
                return Some(EndpointOutcome {
                    endpoint_id,
                    result: JobResult::Cancelled,
                });
            }
            Err(err) => {
                let duration = started.elapsed();
                warn!(
                    endpoint = %endpoint_id,
                    provider = %provider_name,
                    "provider call failed: {}", err
                );
                inner
                    .usage
                    .record(UsageRecord {
                        provider: provider_name.clone(),
                        model: provider.model().to_string(),
                        usage: TokenUsage::default(),
                        duration,
                        outcome: usage_outcome_for(&err),
                        retries: 0,
                    })
                    .await;
                last_failure = err.to_string();
            }
        }

        // Fallback: hand the job to the next provider in its chain.
        job.chain_index += 1;
        if job.chain_index < job.chain.len() {
            let next = job.current_provider().to_string();
            info!(
                endpoint = %endpoint_id,
                from = %provider_name,
                to = %next,
                "falling back to next provider"
            );
            let _ = inner.progress.send(ProgressEvent::Queued {
                endpoint: endpoint_id.clone(),
            });
            if router_tx.send(job).is_err() {
                return Some(EndpointOutcome {
                    endpoint_id,
                    result: JobResult::Cancelled,
                });
            }
            return None;
        }

        error!(
            endpoint = %endpoint_id,
            provider = %provider_name,
            "all providers in chain failed: {}", last_failure
        );
        let _ = inner.progress.send(ProgressEvent::Failed {
            endpoint: endpoint_id.clone(),
            provider: provider_name.clone(),
            error: last_failure.clone(),
        });
        return Some(EndpointOutcome {
            endpoint_id,
            result: JobResult::Failed {
                provider: provider_name,
                error: last_failure,
            },
        });
    }
}

/// Persist the artifact and the state entry for a validated job.
async fn finalize_job(
    inner: &Inner,
    job: &Job,
    provider_name: &str,
    model: &str,
    cases: Vec<casecraft_shared::types::cases::TestCase>,
    tokens: Option<u64>,
) -> EndpointOutcome {
    let endpoint_id = job.endpoint.endpoint_id();

    let path = match inner.writer.write(&job.endpoint, &cases).await {
        Ok(path) => path,
        Err(e) => {
            error!(endpoint = %endpoint_id, "failed to write artifact: {}", e);
            let _ = inner.progress.send(ProgressEvent::Failed {
                endpoint: endpoint_id.clone(),
                provider: provider_name.to_string(),
                error: e.to_string(),
            });
            return EndpointOutcome {
                endpoint_id,
                result: JobResult::Failed {
                    provider: provider_name.to_string(),
                    error: e.to_string(),
                },
            };
        }
    };

    let entry = EndpointState {
        definition_hash: job.fingerprint.clone(),
        last_generated: Utc::now(),
        provider_used: Some(provider_name.to_string()),
        model_used: Some(model.to_string()),
        test_cases_count: cases.len(),
        tokens_used: tokens,
        retry_count: job.retry_count,
        fallback_from: job.fallback_from().map(String::from),
        output_file: Some(path.to_string_lossy().into_owned()),
    };

    // A state write failure does not invalidate the artifact
    if let Err(e) = inner.state.record_success(&endpoint_id, entry).await {
        warn!(endpoint = %endpoint_id, "failed to persist state: {}", e);
    }

    let _ = inner.progress.send(ProgressEvent::Written {
        endpoint: endpoint_id.clone(),
        path: path.clone(),
    });

    EndpointOutcome {
        endpoint_id,
        result: JobResult::Written {
            provider: provider_name.to_string(),
            model: model.to_string(),
            path,
            case_count: cases.len(),
            tokens,
            retry_count: job.retry_count,
            fallback_from: job.fallback_from().map(String::from),
        },
    }
}

fn usage_outcome_for(error: &ProviderError) -> UsageOutcome {
    match error {
        ProviderError::RateLimited(_) => UsageOutcome::RateLimited,
        ProviderError::Timeout(_) => UsageOutcome::Timeout,
        ProviderError::Cancelled => UsageOutcome::Cancelled,
        ProviderError::Transient(_) | ProviderError::Fatal(_) | ProviderError::Config(_) => {
            UsageOutcome::TransportError
        }
    }
}
