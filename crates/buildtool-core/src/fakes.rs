//! In-memory fakes for the orchestrator seams (testing only)
//!
//! Provides `FakeSourceCodeManager`, `StaticExistenceChecker`, and
//! `RecordingInvoker` that satisfy the trait contracts without touching the
//! network or spawning processes.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BuildToolError, Result};
use crate::existence::{ArtifactExistenceChecker, ExistenceQuery};
use crate::invoker::{InvocationOutcome, InvocationRequest, RemoteBuildInvoker};
use crate::model::{BuildVersion, Repository};
use crate::scm::SourceCodeManager;

// ---------------------------------------------------------------------------
// FakeSourceCodeManager
// ---------------------------------------------------------------------------

/// Source-code manager over a fixed list of `(name, version)` entries.
#[derive(Debug, Default)]
pub struct FakeSourceCodeManager {
    repos: Vec<(Repository, BuildVersion)>,
}

impl FakeSourceCodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(mut self, name: &str, version: &str, build_number: Option<u64>) -> Self {
        let mut v = BuildVersion::new(version);
        v.build_number = build_number;
        self.repos
            .push((Repository::new(name, PathBuf::from("/src").join(name)), v));
        self
    }

    pub fn repositories(&self) -> Vec<Repository> {
        self.repos.iter().map(|(r, _)| r.clone()).collect()
    }
}

#[async_trait]
impl SourceCodeManager for FakeSourceCodeManager {
    async fn resolve_version(&self, repository: &Repository) -> Result<BuildVersion> {
        self.repos
            .iter()
            .find(|(r, _)| r.name == repository.name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| BuildToolError::SourceInfo {
                repository: repository.name.clone(),
                reason: "unknown to fake".to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// StaticExistenceChecker
// ---------------------------------------------------------------------------

/// Existence checker answering from a fixed table keyed by `(name, version)`.
///
/// Unknown artifacts are absent. Entries added with `with_error` fail with a
/// response error carrying the given HTTP status.
#[derive(Debug, Default)]
pub struct StaticExistenceChecker {
    present: HashSet<(String, String)>,
    errors: HashMap<(String, String), u16>,
    queries: Mutex<Vec<ExistenceQuery>>,
}

impl StaticExistenceChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_present(mut self, name: &str, version: &str) -> Self {
        self.present.insert((name.to_string(), version.to_string()));
        self
    }

    pub fn with_error(mut self, name: &str, version: &str, status: u16) -> Self {
        self.errors
            .insert((name.to_string(), version.to_string()), status);
        self
    }

    /// Every query received so far, in arrival order.
    pub fn queries(&self) -> Vec<ExistenceQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactExistenceChecker for StaticExistenceChecker {
    async fn exists(&self, query: &ExistenceQuery) -> Result<bool> {
        self.queries.lock().unwrap().push(query.clone());
        let key = (query.name.clone(), query.version.clone());
        if let Some(status) = self.errors.get(&key) {
            return Err(BuildToolError::response(
                "fake.check",
                format!("unexpected HTTP {status} for {query}"),
            ));
        }
        Ok(self.present.contains(&key))
    }
}

// ---------------------------------------------------------------------------
// RecordingInvoker
// ---------------------------------------------------------------------------

/// Invoker that records requests instead of running anything.
///
/// Tracks how many invocations were in flight at once so concurrency
/// ceilings can be asserted.
#[derive(Debug, Default)]
pub struct RecordingInvoker {
    requests: Mutex<Vec<InvocationRequest>>,
    failing: HashSet<String>,
    unstartable: HashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds of `repository` exit with code 1.
    pub fn failing(mut self, repository: &str) -> Self {
        self.failing.insert(repository.to_string());
        self
    }

    /// Builds of `repository` fail to start.
    pub fn unstartable(mut self, repository: &str) -> Self {
        self.unstartable.insert(repository.to_string());
        self
    }

    /// Hold every invocation open for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<InvocationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn invoked(&self, repository: &str) -> bool {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.repository.name == repository)
    }

    /// Highest number of simultaneous invocations observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteBuildInvoker for RecordingInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutcome> {
        self.requests.lock().unwrap().push(request.clone());
        let name = &request.repository.name;
        if self.unstartable.contains(name) {
            return Err(BuildToolError::Invocation {
                repository: name.clone(),
                reason: "fake spawn failure".to_string(),
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(InvocationOutcome {
            exit_code: Some(if self.failing.contains(name) { 1 } else { 0 }),
            duration: self.delay,
        })
    }
}
