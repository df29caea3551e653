//! Build-or-skip orchestration across repositories.
//!
//! A pass runs in two phases:
//!
//! 1. **Check**: every repository resolves its version and, unless it is on
//!    the always-build list, asks the existence checker whether its artifacts
//!    are already published. Checks run concurrently and are not rate limited.
//!    Any `Config`, `Response` or `SourceInfo` error ends the pass here,
//!    before a single build has been submitted.
//! 2. **Build**: repositories that were not skipped submit a remote build
//!    each, on separate tasks, bounded by the optional build semaphore. A
//!    failed build is recorded and never retried; its siblings keep going.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, Instrument};

use crate::config::{BuildOptions, Credentials, ExistenceErrorPolicy};
use crate::error::{BuildToolError, Result};
use crate::existence::{
    ArtifactExistenceChecker, ExistenceQuery, PackageVersionChecker, RegistryTagChecker,
};
use crate::invoker::{build_log_path, CloudBuildInvoker, InvocationRequest, RemoteBuildInvoker};
use crate::metrics::{labels, BuildMetrics, REUSE_ARTIFACT};
use crate::model::{
    BuildOutcome, BuildVersion, PassSummary, RepoBuildState, Repository, RepositoryReport,
};
use crate::obs;
use crate::profile::{BuildKind, BuildProfile};
use crate::scm::SourceCodeManager;

/// Orchestrator knobs that are not part of the build profile.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Skip repositories whose artifacts all exist.
    pub skip_existing: bool,
    /// Ceiling on in-flight remote builds; 0 means unlimited.
    pub max_concurrent_builds: usize,
    pub existence_error_policy: ExistenceErrorPolicy,
    pub logs_dir: PathBuf,
}

impl OrchestratorSettings {
    pub fn from_options(options: &BuildOptions) -> Self {
        Self {
            skip_existing: options.skip_existing,
            max_concurrent_builds: options.max_concurrent_builds,
            existence_error_policy: options.existence_error_policy,
            logs_dir: options.logs_dir.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_options(&BuildOptions::default())
    }
}

/// What the check phase decided for one repository.
enum RepoPlan {
    Skip {
        repository: Repository,
        version: BuildVersion,
    },
    Build {
        version: BuildVersion,
        request: InvocationRequest,
    },
}

/// Drives one build command over a set of repositories.
pub struct RepositoryBuildOrchestrator {
    profile: BuildProfile,
    scm: Arc<dyn SourceCodeManager>,
    checker: Arc<dyn ArtifactExistenceChecker>,
    invoker: Arc<dyn RemoteBuildInvoker>,
    metrics: Arc<BuildMetrics>,
    settings: OrchestratorSettings,
}

impl RepositoryBuildOrchestrator {
    pub fn new(
        profile: BuildProfile,
        scm: Arc<dyn SourceCodeManager>,
        checker: Arc<dyn ArtifactExistenceChecker>,
        invoker: Arc<dyn RemoteBuildInvoker>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            profile,
            scm,
            checker,
            invoker,
            metrics: Arc::new(BuildMetrics::new()),
            settings,
        }
    }

    /// Wire the production checker and invoker for `kind` from `options`.
    ///
    /// Options are validated here, and for Debian builds `credentials` is
    /// resolved here, so misconfiguration fails before any repository is
    /// touched.
    pub fn from_options(
        kind: BuildKind,
        options: &BuildOptions,
        scm: Arc<dyn SourceCodeManager>,
        credentials: impl FnOnce() -> Result<Credentials>,
    ) -> Result<Self> {
        options.validate_for(kind)?;

        let checker: Arc<dyn ArtifactExistenceChecker> = match kind {
            BuildKind::Container => {
                Arc::new(RegistryTagChecker::new(options.gcb_service_account()))
            }
            BuildKind::Debian => {
                let credentials = match credentials() {
                    Ok(c) => c,
                    Err(e) if options.require_credentials => return Err(e),
                    Err(e) => {
                        tracing::warn!(error = %e, "continuing without package store credentials");
                        Credentials::new("", "")
                    }
                };
                Arc::new(PackageVersionChecker::new(
                    options.bintray_host.clone(),
                    options.bintray_org(),
                    credentials,
                )?)
            }
        };
        let invoker = Arc::new(CloudBuildInvoker::new(
            options.gcb_service_account(),
            options.gcb_project(),
        ));

        Ok(Self::new(
            BuildProfile::from_options(kind, options),
            scm,
            checker,
            invoker,
            OrchestratorSettings::from_options(options),
        ))
    }

    /// Share a metrics recorder with the caller.
    pub fn with_metrics(mut self, metrics: Arc<BuildMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<BuildMetrics> {
        &self.metrics
    }

    pub fn profile(&self) -> &BuildProfile {
        &self.profile
    }

    /// Run one pass over `repositories`.
    ///
    /// Returns `Err` only for pass-fatal errors; failed builds are reported
    /// in the summary.
    pub async fn run(&self, repositories: Vec<Repository>) -> Result<PassSummary> {
        let pass_id = format!(
            "pass-{}",
            uuid::Uuid::new_v4()
                .to_string()
                .split('-')
                .next()
                .unwrap_or("x")
        );
        let span = obs::pass_span(&pass_id, self.profile.kind().command_name());
        self.run_pass(pass_id, repositories).instrument(span).await
    }

    async fn run_pass(&self, pass_id: String, repositories: Vec<Repository>) -> Result<PassSummary> {
        let kind = self.profile.kind();
        let started_at = chrono::Utc::now();
        let start = Instant::now();

        let repositories: Vec<Repository> = repositories
            .into_iter()
            .filter(|r| {
                let keep = kind.produces_artifact(&r.name);
                if !keep {
                    info!(repository = %r.name, "no {} artifact for repository", kind.description());
                }
                keep
            })
            .collect();

        let mut seen = HashSet::new();
        if let Some(dup) = repositories.iter().find(|r| !seen.insert(r.name.as_str())) {
            return Err(BuildToolError::config(format!(
                "repository {} listed twice in pass",
                dup.name
            )));
        }
        obs::emit_pass_started(&pass_id, kind.command_name(), repositories.len());

        let plans = try_join_all(repositories.iter().map(|r| self.plan_repository(r))).await?;

        let mut reports: Vec<RepositoryReport> = Vec::with_capacity(plans.len());
        let mut builds = Vec::new();
        for plan in plans {
            match plan {
                RepoPlan::Skip {
                    repository,
                    version,
                } => reports.push(RepositoryReport {
                    repository: repository.name,
                    version: version.version,
                    outcome: BuildOutcome::SkippedReuse,
                    duration_ms: 0,
                }),
                RepoPlan::Build { version, request } => builds.push((version, request)),
            }
        }

        reports.extend(self.run_builds(builds).await?);

        let order: Vec<&str> = repositories.iter().map(|r| r.name.as_str()).collect();
        reports.sort_by_key(|r| order.iter().position(|n| *n == r.repository));

        let summary = PassSummary {
            pass_id: pass_id.clone(),
            command: kind.command_name().to_string(),
            started_at,
            reports,
        };
        obs::emit_pass_finished(
            &pass_id,
            summary.succeeded().len(),
            summary.skipped().len(),
            summary.failed().len(),
            start.elapsed().as_millis() as u64,
        );
        Ok(summary)
    }

    async fn plan_repository(&self, repository: &Repository) -> Result<RepoPlan> {
        debug!(repository = %repository.name, state = ?RepoBuildState::Pending);
        let version = self.scm.resolve_version(repository).await?;
        let service_name = self.scm.service_name(repository);

        if self.profile.is_always_build(&repository.name) {
            debug!(repository = %repository.name, "always-build repository, not checking store");
        } else {
            debug!(repository = %repository.name, state = ?RepoBuildState::Checking);
            if self
                .artifacts_exist(repository, &service_name, &version)
                .await?
            {
                let kind = self.profile.kind();
                self.metrics.inc_counter(
                    REUSE_ARTIFACT,
                    &labels(&[
                        ("repository", repository.name.as_str()),
                        ("artifact", kind.artifact_label()),
                    ]),
                );
                obs::emit_repo_skipped(&repository.name, kind.artifact_label(), &version.version);
                return Ok(RepoPlan::Skip {
                    repository: repository.clone(),
                    version,
                });
            }
        }

        let substitutions = self
            .profile
            .substitutions(repository, &service_name, &version)?;
        let request = InvocationRequest {
            repository: repository.clone(),
            substitutions,
            config_path: self.profile.config_path().to_path_buf(),
            log_path: build_log_path(&self.settings.logs_dir, &repository.name),
            description: format!("{} {}", repository.name, self.profile.kind().description()),
        };
        Ok(RepoPlan::Build { version, request })
    }

    /// `true` when every required artifact exists and skipping is enabled.
    async fn artifacts_exist(
        &self,
        repository: &Repository,
        service_name: &str,
        version: &BuildVersion,
    ) -> Result<bool> {
        let mut present: Vec<ExistenceQuery> = Vec::new();
        let mut missing: Vec<ExistenceQuery> = Vec::new();
        let mut errored = false;

        for query in self
            .profile
            .existence_queries(repository, service_name, version)
        {
            match self.checker.exists(&query).await {
                Ok(true) => present.push(query),
                Ok(false) => missing.push(query),
                Err(e) => match self.settings.existence_error_policy {
                    ExistenceErrorPolicy::Abort => return Err(e),
                    ExistenceErrorPolicy::TreatAsAbsent => {
                        obs::emit_existence_check_ignored(&repository.name, &e);
                        errored = true;
                    }
                },
            }
        }

        // Unanswered checks count as unpublished.
        if errored || present.is_empty() || !self.settings.skip_existing {
            return Ok(false);
        }
        if let Some(absent) = missing.first() {
            return Err(BuildToolError::config(format!(
                "Have {} version for {} but not {}",
                repository.name, present[0], absent
            )));
        }
        Ok(true)
    }

    async fn run_builds(
        &self,
        builds: Vec<(BuildVersion, InvocationRequest)>,
    ) -> Result<Vec<RepositoryReport>> {
        let limiter = (self.settings.max_concurrent_builds > 0)
            .then(|| Arc::new(Semaphore::new(self.settings.max_concurrent_builds)));
        let kind = self.profile.kind();

        let mut tasks = JoinSet::new();
        for (version, request) in builds {
            let invoker = Arc::clone(&self.invoker);
            let metrics = Arc::clone(&self.metrics);
            let limiter = limiter.clone();
            let task = async move {
                let name = request.repository.name.clone();
                let build = run_build(kind, invoker, metrics, limiter, &version, &request);
                match std::panic::AssertUnwindSafe(build).catch_unwind().await {
                    Ok(report) => report,
                    Err(_) => RepositoryReport {
                        repository: name,
                        version: version.version.clone(),
                        outcome: BuildOutcome::Failed {
                            reason: "build task panicked".to_string(),
                        },
                        duration_ms: 0,
                    },
                }
            };
            tasks.spawn(task.in_current_span());
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            reports.push(joined.map_err(|e| BuildToolError::Task(e.to_string()))?);
        }
        Ok(reports)
    }
}

async fn run_build(
    kind: BuildKind,
    invoker: Arc<dyn RemoteBuildInvoker>,
    metrics: Arc<BuildMetrics>,
    limiter: Option<Arc<Semaphore>>,
    version: &BuildVersion,
    request: &InvocationRequest,
) -> RepositoryReport {
    let name = request.repository.name.clone();
    let report = |outcome: BuildOutcome, duration_ms: u64| RepositoryReport {
        repository: name.clone(),
        version: version.version.clone(),
        outcome,
        duration_ms,
    };

    let _permit = match limiter {
        Some(semaphore) => match semaphore.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(e) => {
                return report(
                    BuildOutcome::Failed {
                        reason: format!("build limiter closed: {e}"),
                    },
                    0,
                )
            }
        },
        None => None,
    };

    debug!(repository = %name, state = ?RepoBuildState::Building);
    obs::emit_repo_build_started(&name, &version.version, &request.log_path);
    let start = Instant::now();
    let result = invoker.invoke(request).await;
    let elapsed = start.elapsed();

    let outcome = match result {
        Ok(o) if o.success() => BuildOutcome::Succeeded,
        Ok(o) => BuildOutcome::Failed {
            reason: match o.exit_code {
                Some(code) => format!("{} exited with code {code}", request.description),
                None => format!("{} terminated by signal", request.description),
            },
        },
        Err(e) => BuildOutcome::Failed {
            reason: e.to_string(),
        },
    };

    let succeeded = matches!(outcome, BuildOutcome::Succeeded);
    metrics.record_timer(
        kind.timer_metric(),
        &labels(&[("repository", name.as_str())]),
        elapsed,
        succeeded,
    );
    let duration_ms = elapsed.as_millis() as u64;
    obs::emit_repo_finished(&name, outcome.label(), duration_ms);
    debug!(repository = %name, state = ?outcome.state());
    report(outcome, duration_ms)
}
