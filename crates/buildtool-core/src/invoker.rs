//! Remote build submission.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{BuildToolError, Result};
use crate::model::Repository;
use crate::substitutions::SubstitutionSet;

/// Suffix of the per-repository build log file name.
pub const BUILD_LOG_SUFFIX: &str = "-gcb-build.log";

/// Path of the append-only build log for `repository`.
pub fn build_log_path(logs_dir: &Path, repository: &str) -> PathBuf {
    logs_dir.join(format!("{repository}{BUILD_LOG_SUFFIX}"))
}

/// Everything needed to submit one remote build.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub repository: Repository,
    pub substitutions: SubstitutionSet,
    /// Build-step configuration file handed to the build service.
    pub config_path: PathBuf,
    pub log_path: PathBuf,
    /// Human-readable label written to the log, e.g. "deck deb build".
    pub description: String,
}

/// Result of a remote build process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    /// Exit code, or `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl InvocationOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Backend that performs a remote build and waits for it.
///
/// `Ok` means the tool ran; check [`InvocationOutcome::success`]. `Err` means
/// it could not be started. Neither is retried.
#[async_trait::async_trait]
pub trait RemoteBuildInvoker: Send + Sync {
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutcome>;
}

/// Submits builds with `gcloud builds submit`.
#[derive(Debug, Clone)]
pub struct CloudBuildInvoker {
    program: String,
    account: String,
    project: String,
}

impl CloudBuildInvoker {
    pub fn new(account: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            program: "gcloud".to_string(),
            account: account.into(),
            project: project.into(),
        }
    }

    /// Use a different submission executable (tests point this at a script).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments for one submission; the checkout dir is passed as `.`.
    pub fn command_args(&self, request: &InvocationRequest) -> Vec<String> {
        vec![
            "builds".to_string(),
            "submit".to_string(),
            format!("--account={}", self.account),
            format!("--project={}", self.project),
            format!("--substitutions={}", request.substitutions.to_arg()),
            format!("--config={}", request.config_path.display()),
            ".".to_string(),
        ]
    }

    async fn open_log(&self, request: &InvocationRequest, args: &[String]) -> Result<std::fs::File> {
        if let Some(parent) = request.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_path)
            .await?;
        let header = format!(
            "[{}] {}: {} {}\n",
            chrono::Utc::now().to_rfc3339(),
            request.description,
            self.program,
            args.join(" ")
        );
        log.write_all(header.as_bytes()).await?;
        log.flush().await?;
        Ok(log.into_std().await)
    }
}

#[async_trait::async_trait]
impl RemoteBuildInvoker for CloudBuildInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutcome> {
        let start = Instant::now();
        let args = self.command_args(request);
        let log = self.open_log(request, &args).await?;
        let stderr_log = log.try_clone()?;

        debug!(
            repository = %request.repository.name,
            cwd = %request.repository.git_dir.display(),
            "submitting remote build"
        );

        let status = Command::new(&self.program)
            .args(&args)
            .current_dir(request.repository.git_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr_log))
            .status()
            .await
            .map_err(|e| BuildToolError::Invocation {
                repository: request.repository.name.clone(),
                reason: format!("failed to run {}: {e}", self.program),
            })?;

        Ok(InvocationOutcome {
            exit_code: status.code(),
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &Path) -> InvocationRequest {
        InvocationRequest {
            repository: Repository::new("deck", dir),
            substitutions: SubstitutionSet::builder()
                .set("_VERSION", "2.15.0")
                .set("_BRANCH_NAME", "master")
                .build(),
            config_path: PathBuf::from("/opt/cloudbuild/debs.yml"),
            log_path: build_log_path(&dir.join("logs"), "deck"),
            description: "deck deb build".to_string(),
        }
    }

    #[test]
    fn test_build_log_path() {
        assert_eq!(
            build_log_path(Path::new("/tmp/logs"), "deck"),
            PathBuf::from("/tmp/logs/deck-gcb-build.log")
        );
    }

    #[test]
    fn test_command_args() {
        let invoker = CloudBuildInvoker::new("builder@example.iam", "my-project");
        let args = invoker.command_args(&request(Path::new("/src/deck")));
        assert_eq!(
            args,
            vec![
                "builds",
                "submit",
                "--account=builder@example.iam",
                "--project=my-project",
                "--substitutions=_BRANCH_NAME=master,_VERSION=2.15.0",
                "--config=/opt/cloudbuild/debs.yml",
                ".",
            ]
        );
    }

    #[test]
    fn test_outcome_success_requires_zero_exit() {
        let ok = InvocationOutcome {
            exit_code: Some(0),
            duration: Duration::ZERO,
        };
        let killed = InvocationOutcome {
            exit_code: None,
            duration: Duration::ZERO,
        };
        assert!(ok.success());
        assert!(!killed.success());
    }

    #[tokio::test]
    async fn test_successful_invocation_appends_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = CloudBuildInvoker::new("acct", "proj").with_program("echo");
        let req = request(dir.path());

        let first = invoker.invoke(&req).await.unwrap();
        let second = invoker.invoke(&req).await.unwrap();
        assert!(first.success());
        assert!(second.success());

        let log = std::fs::read_to_string(&req.log_path).unwrap();
        assert_eq!(log.matches("deck deb build").count(), 2);
        assert!(log.contains("--substitutions=_BRANCH_NAME=master,_VERSION=2.15.0"));
    }

    #[tokio::test]
    async fn test_failing_invocation_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = CloudBuildInvoker::new("acct", "proj").with_program("false");
        let outcome = invoker.invoke(&request(dir.path())).await.unwrap();
        assert!(!outcome.success());
        assert_ne!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_missing_program_is_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let invoker =
            CloudBuildInvoker::new("acct", "proj").with_program("/nonexistent/gcloud-binary");
        let err = invoker.invoke(&request(dir.path())).await.unwrap_err();
        assert!(matches!(err, BuildToolError::Invocation { .. }));
    }
}
