//! Content-hash incremental skip semantics.

mod common;

use casecraft::engine::should_skip;
use casecraft::fingerprint::fingerprint_endpoint;
use casecraft_shared::types::api::HttpMethod;
use common::{endpoint, harness, job_spec, StubProvider};
use std::sync::Arc;

#[tokio::test]
async fn test_second_run_skips_unchanged_endpoints() {
    let glm = Arc::new(StubProvider::new("glm", 1));
    let h = harness(vec![glm.clone()]).await;

    let endpoints = [
        endpoint(HttpMethod::Get, "/users"),
        endpoint(HttpMethod::Post, "/users"),
        endpoint(HttpMethod::Get, "/orders"),
    ];

    let specs: Vec<_> = endpoints
        .iter()
        .map(|ep| job_spec(ep, "glm", &[]))
        .collect();
    let report = h.scheduler.run(specs).await;
    assert_eq!(report.written_count(), 3);
    assert_eq!(glm.call_count(), 3);

    // Identical input: every endpoint is skipped, zero provider calls
    for ep in &endpoints {
        let fingerprint = fingerprint_endpoint(ep);
        assert!(
            should_skip(&h.state, &h.writer, ep, &fingerprint, false).await,
            "{} should be skipped on an unchanged rerun",
            ep.endpoint_id()
        );
    }
    assert_eq!(glm.call_count(), 3, "no further provider calls expected");
}

#[tokio::test]
async fn test_force_overrides_skip() {
    let glm = Arc::new(StubProvider::new("glm", 1));
    let h = harness(vec![glm.clone()]).await;

    let ep = endpoint(HttpMethod::Get, "/users");
    h.scheduler.run(vec![job_spec(&ep, "glm", &[])]).await;

    let fingerprint = fingerprint_endpoint(&ep);
    assert!(should_skip(&h.state, &h.writer, &ep, &fingerprint, false).await);
    assert!(!should_skip(&h.state, &h.writer, &ep, &fingerprint, true).await);
}

#[tokio::test]
async fn test_cosmetic_spec_change_still_skips() {
    let glm = Arc::new(StubProvider::new("glm", 1));
    let h = harness(vec![glm.clone()]).await;

    let ep = endpoint(HttpMethod::Get, "/users");
    h.scheduler.run(vec![job_spec(&ep, "glm", &[])]).await;

    // Reworded summary and description leave the fingerprint alone
    let mut cosmetic = ep.clone();
    cosmetic.summary = Some("Entirely new wording".into());
    cosmetic.description = Some("More words about the same operation".into());

    let fingerprint = fingerprint_endpoint(&cosmetic);
    assert!(should_skip(&h.state, &h.writer, &cosmetic, &fingerprint, false).await);
}

#[tokio::test]
async fn test_semantic_spec_change_regenerates() {
    let glm = Arc::new(StubProvider::new("glm", 1));
    let h = harness(vec![glm.clone()]).await;

    let ep = endpoint(HttpMethod::Get, "/users");
    h.scheduler.run(vec![job_spec(&ep, "glm", &[])]).await;

    let mut changed = ep.clone();
    changed
        .responses
        .insert("404".to_string(), serde_json::json!({}));

    let fingerprint = fingerprint_endpoint(&changed);
    assert!(
        !should_skip(&h.state, &h.writer, &changed, &fingerprint, false).await,
        "a new response status must invalidate the stored fingerprint"
    );
}

#[tokio::test]
async fn test_missing_artifact_regenerates() {
    let glm = Arc::new(StubProvider::new("glm", 1));
    let h = harness(vec![glm.clone()]).await;

    let ep = endpoint(HttpMethod::Get, "/users");
    h.scheduler.run(vec![job_spec(&ep, "glm", &[])]).await;

    // Delete the artifact out from under the state file
    let path = h.writer.artifact_path(&ep);
    tokio::fs::remove_file(&path).await.unwrap();

    let fingerprint = fingerprint_endpoint(&ep);
    assert!(!should_skip(&h.state, &h.writer, &ep, &fingerprint, false).await);
}
