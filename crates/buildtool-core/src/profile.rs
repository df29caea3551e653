//! What differs between container and Debian builds.
//!
//! A [`BuildProfile`] answers, for one build kind: which artifacts must exist
//! for a repository to be skipped, what substitutions the remote build gets,
//! and which config file and metric names apply.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::BuildOptions;
use crate::error::{BuildToolError, Result};
use crate::existence::ExistenceQuery;
use crate::model::{BuildVersion, Repository};
use crate::substitutions::{sanitize_branch_tag, SubstitutionSet};

/// Image variants that must all be present before a container build is skipped.
pub const CONTAINER_VARIANTS: [&str; 2] = ["slim", "ubuntu"];

/// Repositories in the BOM that never produce a Debian package.
pub const NON_DEBIAN_REPOSITORIES: [&str; 1] = ["spin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildKind {
    Container,
    Debian,
}

impl BuildKind {
    pub fn command_name(&self) -> &'static str {
        match self {
            BuildKind::Container => "build_bom_containers",
            BuildKind::Debian => "build_debians",
        }
    }

    /// `artifact` label used on the reuse counter.
    pub fn artifact_label(&self) -> &'static str {
        match self {
            BuildKind::Container => "gcr-container",
            BuildKind::Debian => "debian",
        }
    }

    /// Timer metric recorded around each remote build.
    pub fn timer_metric(&self) -> &'static str {
        match self {
            BuildKind::Container => "GcrBuild",
            BuildKind::Debian => "DebBuild",
        }
    }

    pub fn config_file(&self) -> &'static str {
        match self {
            BuildKind::Container => "containers.yml",
            BuildKind::Debian => "debs.yml",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            BuildKind::Container => "container build",
            BuildKind::Debian => "deb build",
        }
    }

    /// Whether `repository` takes part in this kind of build at all.
    pub fn produces_artifact(&self, repository: &str) -> bool {
        match self {
            BuildKind::Container => true,
            BuildKind::Debian => !NON_DEBIAN_REPOSITORIES.contains(&repository),
        }
    }
}

/// Debian package name published for a repository.
pub fn debian_package_name(repository: &str) -> String {
    if repository == "spinnaker-monitoring" {
        "spinnaker-monitoring-daemon".to_string()
    } else if repository.starts_with("spinnaker") {
        repository.to_string()
    } else {
        format!("spinnaker-{repository}")
    }
}

/// Build-kind adapter used by the orchestrator.
#[derive(Debug, Clone)]
pub struct BuildProfile {
    kind: BuildKind,
    git_branch: String,
    docker_registry: String,
    debian_repository: String,
    always_build: Vec<String>,
    config_path: PathBuf,
}

impl BuildProfile {
    pub fn from_options(kind: BuildKind, options: &BuildOptions) -> Self {
        Self {
            kind,
            git_branch: options.git_branch().to_string(),
            docker_registry: options.docker_registry().to_string(),
            debian_repository: options.bintray_debian_repository().to_string(),
            always_build: options.always_build.clone(),
            config_path: options.cloudbuild_dir.join(kind.config_file()),
        }
    }

    pub fn kind(&self) -> BuildKind {
        self.kind
    }

    pub fn config_path(&self) -> &std::path::Path {
        &self.config_path
    }

    /// Repositories on this list bypass the existence check and always build.
    pub fn is_always_build(&self, repository: &str) -> bool {
        self.always_build.iter().any(|r| r == repository)
    }

    /// Every artifact that must already exist for `repository` to be skipped.
    pub fn existence_queries(
        &self,
        repository: &Repository,
        service_name: &str,
        version: &BuildVersion,
    ) -> Vec<ExistenceQuery> {
        match self.kind {
            BuildKind::Container => CONTAINER_VARIANTS
                .iter()
                .map(|variant| {
                    ExistenceQuery::new(
                        self.docker_registry.clone(),
                        service_name,
                        format!("{version}-{variant}"),
                    )
                })
                .collect(),
            BuildKind::Debian => vec![ExistenceQuery::new(
                self.debian_repository.clone(),
                debian_package_name(&repository.name),
                version.version.clone(),
            )],
        }
    }

    /// Substitutions passed to the remote build for one repository.
    pub fn substitutions(
        &self,
        repository: &Repository,
        service_name: &str,
        version: &BuildVersion,
    ) -> Result<SubstitutionSet> {
        let builder = SubstitutionSet::builder()
            .set("_BRANCH_NAME", &self.git_branch)
            .set("_BRANCH_TAG", sanitize_branch_tag(&self.git_branch))
            .set("_IMAGE_NAME", service_name);

        let set = match self.kind {
            BuildKind::Container => builder
                .set("_DOCKER_REGISTRY", &self.docker_registry)
                .set("TAG_NAME", &version.version)
                .build(),
            BuildKind::Debian => {
                let build_number =
                    version
                        .build_number
                        .ok_or_else(|| BuildToolError::SourceInfo {
                            repository: repository.name.clone(),
                            reason: "debian builds need a build number".to_string(),
                        })?;
                builder
                    .set("_BUILD_NUMBER", build_number)
                    .set("_VERSION", &version.version)
                    .build()
            }
        };
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> BuildOptions {
        BuildOptions {
            git_branch: Some("release-1.20.x".to_string()),
            docker_registry: Some("gcr.io/spinnaker-community".to_string()),
            bintray_debian_repository: Some("debians".to_string()),
            cloudbuild_dir: PathBuf::from("/opt/cloudbuild"),
            always_build: vec!["halyard".to_string()],
            ..BuildOptions::default()
        }
    }

    #[test]
    fn test_debian_package_names() {
        assert_eq!(debian_package_name("deck"), "spinnaker-deck");
        assert_eq!(debian_package_name("spinnaker"), "spinnaker");
        assert_eq!(
            debian_package_name("spinnaker-monitoring"),
            "spinnaker-monitoring-daemon"
        );
    }

    #[test]
    fn test_container_requires_both_variants() {
        let profile = BuildProfile::from_options(BuildKind::Container, &options());
        let repo = Repository::new("clouddriver", "/src/clouddriver");
        let queries =
            profile.existence_queries(&repo, "clouddriver", &BuildVersion::new("6.4.0-20200101"));
        let tags: Vec<_> = queries.iter().map(|q| q.version.as_str()).collect();
        assert_eq!(tags, vec!["6.4.0-20200101-slim", "6.4.0-20200101-ubuntu"]);
        assert!(queries.iter().all(|q| q.store == "gcr.io/spinnaker-community"));
    }

    #[test]
    fn test_debian_query_uses_package_name() {
        let profile = BuildProfile::from_options(BuildKind::Debian, &options());
        let repo = Repository::new("deck", "/src/deck");
        let queries = profile.existence_queries(&repo, "deck", &BuildVersion::new("2.15.0"));
        assert_eq!(
            queries,
            vec![ExistenceQuery::new("debians", "spinnaker-deck", "2.15.0")]
        );
    }

    #[test]
    fn test_container_substitutions() {
        let profile = BuildProfile::from_options(BuildKind::Container, &options());
        let repo = Repository::new("clouddriver", "/src/clouddriver");
        let subs = profile
            .substitutions(&repo, "clouddriver", &BuildVersion::new("6.4.0"))
            .unwrap();
        assert_eq!(subs.get("_BRANCH_NAME"), Some("release-1.20.x"));
        assert_eq!(subs.get("_BRANCH_TAG"), Some("release_1_20_x"));
        assert_eq!(subs.get("_DOCKER_REGISTRY"), Some("gcr.io/spinnaker-community"));
        assert_eq!(subs.get("TAG_NAME"), Some("6.4.0"));
        assert!(subs.get("_BUILD_NUMBER").is_none());
    }

    #[test]
    fn test_debian_substitutions_need_build_number() {
        let profile = BuildProfile::from_options(BuildKind::Debian, &options());
        let repo = Repository::new("deck", "/src/deck");
        let err = profile
            .substitutions(&repo, "deck", &BuildVersion::new("2.15.0"))
            .unwrap_err();
        assert!(matches!(err, BuildToolError::SourceInfo { .. }));

        let subs = profile
            .substitutions(&repo, "deck", &BuildVersion::new("2.15.0").with_build_number(7))
            .unwrap();
        assert_eq!(subs.get("_BUILD_NUMBER"), Some("7"));
        assert_eq!(subs.get("_VERSION"), Some("2.15.0"));
    }

    #[test]
    fn test_profile_paths_and_lists() {
        let profile = BuildProfile::from_options(BuildKind::Debian, &options());
        assert_eq!(
            profile.config_path(),
            std::path::Path::new("/opt/cloudbuild/debs.yml")
        );
        assert!(profile.is_always_build("halyard"));
        assert!(!profile.is_always_build("deck"));
        assert!(!BuildKind::Debian.produces_artifact("spin"));
        assert!(BuildKind::Container.produces_artifact("spin"));
    }
}
