//! State store for incremental generation.
//!
//! Loads `.casecraft_state.json` at start, holds it in memory, and
//! rewrites it atomically (write-temp + rename) after each successful
//! endpoint. A missing or corrupt file starts an empty state with a
//! warning; it never crashes the run. Updates are serialized through a
//! single async mutex.

use crate::error::{GeneratorError, Result};
use casecraft_shared::types::state::{
    EndpointState, GenerationState, ProcessingStatistics, ProjectConfig, STATE_VERSION,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default state file name in the working directory
pub const DEFAULT_STATE_FILE: &str = ".casecraft_state.json";

pub struct StateStore {
    path: PathBuf,
    state: Mutex<GenerationState>,
}

impl StateStore {
    /// Open the state file, tolerating absence and corruption.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load_state(&path).await;
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    async fn load_state(path: &Path) -> GenerationState {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", path.display());
                return GenerationState::default();
            }
            Err(e) => {
                warn!(
                    "Failed to read state file {}: {}; starting with empty state",
                    path.display(),
                    e
                );
                return GenerationState::default();
            }
        };

        if content.trim().is_empty() {
            return GenerationState::default();
        }

        match serde_json::from_str::<GenerationState>(&content) {
            Ok(state) if state.version == STATE_VERSION => state,
            Ok(state) => {
                warn!(
                    "Unknown state file version '{}' in {}; rebuilding state",
                    state.version,
                    path.display()
                );
                GenerationState::default()
            }
            Err(e) => {
                warn!(
                    "Corrupt state file {}: {}; starting with empty state",
                    path.display(),
                    e
                );
                GenerationState::default()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the endpoint is unchanged since its last generation.
    pub async fn is_unchanged(&self, endpoint_id: &str, fingerprint: &str) -> bool {
        self.state
            .lock()
            .await
            .is_endpoint_unchanged(endpoint_id, fingerprint)
    }

    /// The recorded artifact path for an endpoint, if any.
    pub async fn artifact_path(&self, endpoint_id: &str) -> Option<PathBuf> {
        self.state
            .lock()
            .await
            .endpoint_state(endpoint_id)
            .and_then(|s| s.output_file.as_ref().map(PathBuf::from))
    }

    /// Record a successful generation and persist atomically.
    pub async fn record_success(&self, endpoint_id: &str, entry: EndpointState) -> Result<()> {
        let mut state = self.state.lock().await;
        state.update_endpoint_state(endpoint_id.to_string(), entry);
        Self::persist(&self.path, &state).await
    }

    /// Record the spec source identity.
    pub async fn record_source(&self, api_source: &str, source_hash: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.config = Some(ProjectConfig {
            api_source: api_source.to_string(),
            last_modified: Utc::now(),
            source_hash: source_hash.to_string(),
        });
        Self::persist(&self.path, &state).await
    }

    /// Replace the aggregate statistics block and persist.
    pub async fn record_statistics(&self, statistics: ProcessingStatistics) -> Result<()> {
        let mut state = self.state.lock().await;
        state.statistics = statistics;
        Self::persist(&self.path, &state).await
    }

    /// Drop endpoints no longer present in the spec and persist when
    /// anything was removed.
    pub async fn prune_removed(&self, current_ids: &[String]) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        let removed = state.prune_removed(current_ids.iter().map(String::as_str));
        if !removed.is_empty() {
            debug!("Pruning {} removed endpoints from state", removed.len());
            Self::persist(&self.path, &state).await?;
        }
        Ok(removed)
    }

    /// Snapshot of the current state for reporting.
    pub async fn snapshot(&self) -> GenerationState {
        self.state.lock().await.clone()
    }

    async fn persist(path: &Path, state: &GenerationState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| GeneratorError::state_io(format!("failed to serialize state: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    GeneratorError::state_io(format!(
                        "failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes()).await.map_err(|e| {
            GeneratorError::state_io(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            GeneratorError::state_io(format!("failed to rename state file into place: {}", e))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str) -> EndpointState {
        EndpointState {
            definition_hash: hash.into(),
            last_generated: Utc::now(),
            provider_used: Some("glm".into()),
            model_used: Some("glm-4".into()),
            test_cases_count: 6,
            tokens_used: Some(1000),
            retry_count: 0,
            fallback_from: None,
            output_file: Some("get_users.json".into()),
        }
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await;
        assert!(!store.is_unchanged("GET /users", "abc").await);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = StateStore::open(&path).await;
        assert!(store.snapshot().await.endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_version_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, r#"{"version": "9.9", "endpoints": {}}"#)
            .await
            .unwrap();

        let store = StateStore::open(&path).await;
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.version, STATE_VERSION);
    }

    #[tokio::test]
    async fn test_record_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = StateStore::open(&path).await;
        store
            .record_success("GET /users", entry("hash-1"))
            .await
            .unwrap();
        assert!(store.is_unchanged("GET /users", "hash-1").await);
        assert!(!store.is_unchanged("GET /users", "hash-2").await);

        // Reload from disk
        let reloaded = StateStore::open(&path).await;
        assert!(reloaded.is_unchanged("GET /users", "hash-1").await);
        assert_eq!(
            reloaded.artifact_path("GET /users").await,
            Some(PathBuf::from("get_users.json"))
        );

        // Temp file must not linger
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_prune_removed_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = StateStore::open(&path).await;
        store.record_success("GET /a", entry("h1")).await.unwrap();
        store.record_success("GET /b", entry("h2")).await.unwrap();

        let removed = store.prune_removed(&["GET /a".to_string()]).await.unwrap();
        assert_eq!(removed, vec!["GET /b".to_string()]);

        let reloaded = StateStore::open(&path).await;
        assert!(reloaded.snapshot().await.endpoints.contains_key("GET /a"));
        assert!(!reloaded.snapshot().await.endpoints.contains_key("GET /b"));
    }
}
