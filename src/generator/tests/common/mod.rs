//! Shared test support: a scriptable stub provider and scheduler
//! harness helpers.

use async_trait::async_trait;
use casecraft::complexity::{budget_for, score_endpoint};
use casecraft::fingerprint::fingerprint_endpoint;
use casecraft::output::ArtifactWriter;
use casecraft::providers::{GenerationRequest, LlmProvider, LlmResponse, ProviderError};
use casecraft::scheduler::{JobSpec, Scheduler, SchedulerContext};
use casecraft::state::StateStore;
use casecraft::usage::UsageAggregator;
use casecraft_shared::config::ProviderConfig;
use casecraft_shared::types::api::{ApiEndpoint, AuthRequirement, HttpMethod};
use casecraft_shared::types::usage::TokenUsage;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Behavior of a single stub call.
#[derive(Debug, Clone, Copy)]
pub enum StubStep {
    /// Emit output matching the prompt's budget
    Ok,
    /// Emit the wrong number of cases (5 positives)
    Invalid,
    /// Return a fatal provider error
    Fatal,
}

/// A scriptable in-memory provider. Steps are consumed per call; once
/// the script runs dry every call succeeds.
pub struct StubProvider {
    name: String,
    workers: usize,
    delay: Duration,
    script: Mutex<VecDeque<StubStep>>,
    pub calls: AtomicUsize,
    pub seen_paths: Mutex<Vec<String>>,
    concurrent: AtomicUsize,
    pub max_concurrent: AtomicUsize,
}

impl StubProvider {
    pub fn new(name: &str, workers: usize) -> Self {
        Self {
            name: name.to_string(),
            workers,
            delay: Duration::from_millis(10),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            seen_paths: Mutex::new(Vec::new()),
            concurrent: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_script(self, steps: &[StubStep]) -> Self {
        self.script.lock().unwrap().extend(steps.iter().copied());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    fn max_workers(&self) -> usize {
        self.workers
    }

    fn validate_config(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<LlmResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_paths
            .lock()
            .unwrap()
            .push(extract_str(&request.prompt, "path"));

        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        let slept = tokio::select! {
            _ = tokio::time::sleep(self.delay) => true,
            _ = request.cancel.cancelled() => false,
        };
        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        if !slept {
            return Err(ProviderError::Cancelled);
        }

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StubStep::Ok);

        let content = match step {
            StubStep::Ok => budgeted_cases_json(&request.prompt),
            StubStep::Invalid => {
                let method = extract_str(&request.prompt, "method");
                let path = extract_str(&request.prompt, "path");
                let cases: Vec<_> = (0..5)
                    .map(|i| stub_case(&format!("extra positive {}", i), &method, &path, 200, "positive"))
                    .collect();
                serde_json::to_string(&cases).unwrap()
            }
            StubStep::Fatal => {
                return Err(ProviderError::Fatal("stub fatal error".into()));
            }
        };

        Ok(LlmResponse {
            content,
            provider: self.name.clone(),
            model: "stub-model".into(),
            usage: Some(TokenUsage::new(120, 60)),
            finish_reason: Some("stop".into()),
            transport_retries: 0,
        })
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Pull a quoted string field out of the embedded endpoint JSON.
pub fn extract_str(prompt: &str, key: &str) -> String {
    let needle = format!("\"{}\": \"", key);
    let start = prompt.find(&needle).map(|i| i + needle.len()).unwrap_or(0);
    let end = prompt[start..].find('"').unwrap_or(0);
    prompt[start..start + end].to_string()
}

/// Parse the budget line (`exactly P positive, N negative, and B
/// boundary`) and emit a matching case array.
pub fn budgeted_cases_json(prompt: &str) -> String {
    let method = extract_str(prompt, "method");
    let path = extract_str(prompt, "path");

    let after = prompt.split("exactly ").nth(1).expect("budget line present");
    let numbers: Vec<usize> = after
        .split_whitespace()
        .filter_map(|w| w.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok())
        .take(3)
        .collect();
    let (positive, negative, boundary) = (numbers[0], numbers[1], numbers[2]);

    let mut cases = Vec::new();
    for i in 0..positive {
        cases.push(stub_case(
            &format!("valid request {}", i + 1),
            &method,
            &path,
            200,
            "positive",
        ));
    }
    for i in 0..negative {
        cases.push(stub_case(
            &format!("invalid request {}", i + 1),
            &method,
            &path,
            400,
            "negative",
        ));
    }
    for i in 0..boundary {
        cases.push(stub_case(
            &format!("boundary value {}", i + 1),
            &method,
            &path,
            200,
            "boundary",
        ));
    }
    serde_json::to_string(&cases).unwrap()
}

fn stub_case(
    name: &str,
    method: &str,
    path: &str,
    status: u16,
    test_type: &str,
) -> serde_json::Value {
    json!({
        "name": name,
        "description": format!("{} scenario for {}", name, path),
        "method": method,
        "path": path,
        "headers": {"Accept": "application/json"},
        "query_params": {},
        "body": null,
        "expected_status": status,
        "test_type": test_type,
        "tags": ["generated"]
    })
}

// ============================================================================
// HARNESS
// ============================================================================

pub fn endpoint(method: HttpMethod, path: &str) -> ApiEndpoint {
    ApiEndpoint {
        method,
        path: path.into(),
        operation_id: None,
        summary: Some(format!("{} {}", method, path)),
        description: None,
        tags: vec!["test".into()],
        parameters: Vec::new(),
        request_body: None,
        responses: BTreeMap::from([("200".to_string(), json!({"type": "object"}))]),
        auth: AuthRequirement::none(),
    }
}

pub fn job_spec(endpoint: &ApiEndpoint, primary: &str, fallback: &[&str]) -> JobSpec {
    JobSpec {
        endpoint: endpoint.clone(),
        fingerprint: fingerprint_endpoint(endpoint),
        budget: budget_for(score_endpoint(endpoint), endpoint.method),
        primary: primary.to_string(),
        fallback_chain: fallback.iter().map(|s| s.to_string()).collect(),
    }
}

/// A scheduler wired to stub providers over a temp directory.
pub struct Harness {
    pub scheduler: Scheduler,
    pub state: Arc<StateStore>,
    pub writer: Arc<ArtifactWriter>,
    pub usage: Arc<UsageAggregator>,
    pub cancel: CancellationToken,
    pub progress_rx: casecraft::progress::ProgressReceiver,
    pub dir: tempfile::TempDir,
}

pub async fn harness(stubs: Vec<Arc<StubProvider>>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(StateStore::open(dir.path().join("state.json")).await);
    let writer = Arc::new(ArtifactWriter::new(dir.path().join("cases"), false));
    let usage = Arc::new(UsageAggregator::new());
    let cancel = CancellationToken::new();
    let (progress_tx, progress_rx) = casecraft::progress::channel();

    let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
    let mut configs = HashMap::new();
    for stub in stubs {
        let name = stub.name().to_string();
        configs.insert(
            name.clone(),
            ProviderConfig {
                name: name.clone(),
                model: "stub-model".into(),
                ..Default::default()
            },
        );
        providers.insert(name, stub as Arc<dyn LlmProvider>);
    }

    let scheduler = Scheduler::new(SchedulerContext {
        providers,
        configs,
        state: state.clone(),
        writer: writer.clone(),
        usage: usage.clone(),
        progress: progress_tx,
        cancel: cancel.clone(),
        api_version: "1.0.0".into(),
    });

    Harness {
        scheduler,
        state,
        writer,
        usage,
        cancel,
        progress_rx,
        dir,
    }
}
