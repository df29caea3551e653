//! Flat configuration schema for build commands, validated in one place.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildToolError, Result};
use crate::profile::BuildKind;

/// Environment variable holding the package-store user.
pub const BINTRAY_USER_ENV: &str = "BINTRAY_USER";
/// Environment variable holding the package-store API key.
pub const BINTRAY_KEY_ENV: &str = "BINTRAY_KEY";

pub const DEFAULT_BINTRAY_HOST: &str = "https://api.bintray.com";

/// What to do when an existence check itself errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceErrorPolicy {
    /// Stop the pass with the response error.
    #[default]
    Abort,
    /// Log the error and build as though the artifact were absent.
    TreatAsAbsent,
}

/// Every option recognised by the build commands.
///
/// Loaded from an optional TOML file and overridden by command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// GCP project that runs the remote builds.
    pub gcb_project: Option<String>,
    /// Service account used for both builds and registry listing.
    pub gcb_service_account: Option<String>,
    /// Registry the container images are pushed to.
    pub docker_registry: Option<String>,
    /// Branch passed verbatim and sanitized into the build.
    pub git_branch: Option<String>,
    pub bintray_org: Option<String>,
    pub bintray_debian_repository: Option<String>,
    pub bintray_host: String,
    /// Skip repositories whose artifact already exists.
    pub skip_existing: bool,
    /// Ceiling on simultaneous remote builds; 0 means unlimited.
    pub max_concurrent_builds: usize,
    /// Require package-store credentials at startup.
    pub require_credentials: bool,
    pub existence_error_policy: ExistenceErrorPolicy,
    pub logs_dir: PathBuf,
    /// Directory holding `containers.yml` and `debs.yml`.
    pub cloudbuild_dir: PathBuf,
    /// Manifest describing the repositories in this pass.
    pub manifest: Option<PathBuf>,
    /// Restrict the pass to these repositories; empty means all.
    pub repositories: Vec<String>,
    /// Repositories that bypass the existence check and always build.
    pub always_build: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            gcb_project: None,
            gcb_service_account: None,
            docker_registry: None,
            git_branch: None,
            bintray_org: None,
            bintray_debian_repository: None,
            bintray_host: DEFAULT_BINTRAY_HOST.to_string(),
            skip_existing: false,
            max_concurrent_builds: 0,
            require_credentials: true,
            existence_error_policy: ExistenceErrorPolicy::default(),
            logs_dir: PathBuf::from("build_logs"),
            cloudbuild_dir: PathBuf::from("cloudbuild"),
            manifest: None,
            repositories: Vec::new(),
            always_build: Vec::new(),
        }
    }
}

impl BuildOptions {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check that every option `kind` depends on is present.
    pub fn validate_for(&self, kind: BuildKind) -> Result<()> {
        let mut missing = Vec::new();
        let mut require = |name: &'static str, value: &Option<String>| {
            if value.as_deref().map_or(true, str::is_empty) {
                missing.push(name);
            }
        };
        require("gcb_project", &self.gcb_project);
        require("gcb_service_account", &self.gcb_service_account);
        require("git_branch", &self.git_branch);
        match kind {
            BuildKind::Container => require("docker_registry", &self.docker_registry),
            BuildKind::Debian => {
                require("bintray_org", &self.bintray_org);
                require("bintray_debian_repository", &self.bintray_debian_repository);
            }
        }
        if self.manifest.is_none() {
            missing.push("manifest");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BuildToolError::config(format!(
                "missing required options for {}: {}",
                kind.command_name(),
                missing.join(", ")
            )))
        }
    }

    pub fn gcb_project(&self) -> &str {
        self.gcb_project.as_deref().unwrap_or_default()
    }

    pub fn gcb_service_account(&self) -> &str {
        self.gcb_service_account.as_deref().unwrap_or_default()
    }

    pub fn docker_registry(&self) -> &str {
        self.docker_registry.as_deref().unwrap_or_default()
    }

    pub fn git_branch(&self) -> &str {
        self.git_branch.as_deref().unwrap_or_default()
    }

    pub fn bintray_org(&self) -> &str {
        self.bintray_org.as_deref().unwrap_or_default()
    }

    pub fn bintray_debian_repository(&self) -> &str {
        self.bintray_debian_repository.as_deref().unwrap_or_default()
    }

    /// Whether `name` passes the repository filter.
    pub fn selects(&self, name: &str) -> bool {
        self.repositories.is_empty() || self.repositories.iter().any(|r| r == name)
    }
}

/// Package-store credentials, validated once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub key: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            key: key.into(),
        }
    }

    /// Read `BINTRAY_USER` and `BINTRAY_KEY` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through `lookup`; both values must be non-empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let fetch = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| BuildToolError::config(format!("{name} environment variable is not set")))
        };
        Ok(Self {
            user: fetch(BINTRAY_USER_ENV)?,
            key: fetch(BINTRAY_KEY_ENV)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("key", &"<redacted>")
            .finish()
    }
}
