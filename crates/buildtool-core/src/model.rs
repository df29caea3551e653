//! Repository identity, resolved versions, and build outcomes.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A local source checkout taking part in a build pass.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Canonical repository name, e.g. "clouddriver".
    pub name: String,
    /// Local checkout directory; remote builds run with this as cwd.
    pub git_dir: PathBuf,
}

impl Repository {
    pub fn new(name: impl Into<String>, git_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            git_dir: git_dir.into(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}

/// Version resolved for a repository once per pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildVersion {
    pub version: String,
    #[serde(default)]
    pub build_number: Option<u64>,
}

impl BuildVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            build_number: None,
        }
    }

    pub fn with_build_number(mut self, build_number: u64) -> Self {
        self.build_number = Some(build_number);
        self
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)
    }
}

/// Where a repository is in its build-or-skip procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoBuildState {
    Pending,
    Checking,
    Skipped,
    Building,
    Done,
    Failed,
}

impl RepoBuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Done | Self::Failed)
    }
}

/// Terminal result for one repository in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum BuildOutcome {
    Succeeded,
    Failed { reason: String },
    /// The artifact already existed and skip-existing was enabled.
    SkippedReuse,
}

impl BuildOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "success",
            Self::Failed { .. } => "failure",
            Self::SkippedReuse => "reuse",
        }
    }

    pub fn state(&self) -> RepoBuildState {
        match self {
            Self::Succeeded => RepoBuildState::Done,
            Self::Failed { .. } => RepoBuildState::Failed,
            Self::SkippedReuse => RepoBuildState::Skipped,
        }
    }
}

/// Outcome of one repository, as reported at the end of a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryReport {
    pub repository: String,
    pub version: String,
    #[serde(flatten)]
    pub outcome: BuildOutcome,
    pub duration_ms: u64,
}

/// Summary of a whole orchestration pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    pub pass_id: String,
    pub command: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub reports: Vec<RepositoryReport>,
}

impl PassSummary {
    pub fn succeeded(&self) -> Vec<&str> {
        self.names_where(|o| matches!(o, BuildOutcome::Succeeded))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_where(|o| matches!(o, BuildOutcome::SkippedReuse))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_where(|o| matches!(o, BuildOutcome::Failed { .. }))
    }

    /// `true` when no repository failed to build.
    pub fn overall_success(&self) -> bool {
        self.failed().is_empty()
    }

    pub fn outcome_of(&self, repository: &str) -> Option<&BuildOutcome> {
        self.reports
            .iter()
            .find(|r| r.repository == repository)
            .map(|r| &r.outcome)
    }

    fn names_where(&self, pred: impl Fn(&BuildOutcome) -> bool) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| pred(&r.outcome))
            .map(|r| r.repository.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, outcome: BuildOutcome) -> RepositoryReport {
        RepositoryReport {
            repository: name.to_string(),
            version: "1.2.3".to_string(),
            outcome,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_outcome_maps_to_terminal_state() {
        assert_eq!(BuildOutcome::Succeeded.state(), RepoBuildState::Done);
        assert_eq!(BuildOutcome::SkippedReuse.state(), RepoBuildState::Skipped);
        let failed = BuildOutcome::Failed {
            reason: "exit 1".to_string(),
        };
        assert_eq!(failed.state(), RepoBuildState::Failed);
        assert!(failed.state().is_terminal());
        assert!(!RepoBuildState::Building.is_terminal());
    }

    #[test]
    fn test_summary_partitions_by_outcome() {
        let summary = PassSummary {
            pass_id: "pass-1".to_string(),
            command: "build_debians".to_string(),
            started_at: chrono::Utc::now(),
            reports: vec![
                report("clouddriver", BuildOutcome::Succeeded),
                report("deck", BuildOutcome::SkippedReuse),
                report(
                    "echo",
                    BuildOutcome::Failed {
                        reason: "exit 2".to_string(),
                    },
                ),
            ],
        };
        assert_eq!(summary.succeeded(), vec!["clouddriver"]);
        assert_eq!(summary.skipped(), vec!["deck"]);
        assert_eq!(summary.failed(), vec!["echo"]);
        assert!(!summary.overall_success());
        assert_eq!(
            summary.outcome_of("deck"),
            Some(&BuildOutcome::SkippedReuse)
        );
    }

    #[test]
    fn test_report_serializes_flat_outcome() {
        let json = serde_json::to_value(report("deck", BuildOutcome::SkippedReuse)).unwrap();
        assert_eq!(json["outcome"], "skipped_reuse");
        assert_eq!(json["repository"], "deck");
    }
}
