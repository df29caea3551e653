//! Source-code manager seam: which repositories exist and what version each
//! one builds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildToolError, Result};
use crate::model::{BuildVersion, Repository};

/// Resolves versions and service names for repositories in a pass.
///
/// Inject a real implementation backed by a BOM or git, or a fake for tests.
#[async_trait::async_trait]
pub trait SourceCodeManager: Send + Sync {
    /// Version (and build number) this pass should produce for `repository`.
    async fn resolve_version(&self, repository: &Repository) -> Result<BuildVersion>;

    /// Name of the service/image built from `repository`.
    fn service_name(&self, repository: &Repository) -> String {
        repository.name.clone()
    }
}

/// One repository entry in a source manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// Checkout directory; relative paths resolve against the manifest file.
    pub path: PathBuf,
    pub version: String,
    #[serde(default)]
    pub build_number: Option<u64>,
    #[serde(default)]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceManifest {
    pub repositories: Vec<ManifestEntry>,
}

/// [`SourceCodeManager`] backed by a JSON manifest of pre-resolved versions.
#[derive(Debug, Clone)]
pub struct ManifestSourceCodeManager {
    order: Vec<String>,
    entries: HashMap<String, ManifestEntry>,
}

impl ManifestSourceCodeManager {
    pub fn new(manifest: SourceManifest) -> Result<Self> {
        let mut order = Vec::with_capacity(manifest.repositories.len());
        let mut entries = HashMap::new();
        for entry in manifest.repositories {
            if entries.contains_key(&entry.name) {
                return Err(BuildToolError::config(format!(
                    "repository {} listed twice in manifest",
                    entry.name
                )));
            }
            order.push(entry.name.clone());
            entries.insert(entry.name.clone(), entry);
        }
        Ok(Self { order, entries })
    }

    pub fn from_json_str(content: &str, base_dir: &Path) -> Result<Self> {
        let mut manifest: SourceManifest = serde_json::from_str(content)?;
        for entry in &mut manifest.repositories {
            if entry.path.is_relative() {
                entry.path = base_dir.join(&entry.path);
            }
        }
        Self::new(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json_str(&content, base_dir)
    }

    /// Repositories in manifest order.
    pub fn repositories(&self) -> Vec<Repository> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|e| Repository::new(e.name.clone(), e.path.clone()))
            .collect()
    }

    fn entry(&self, repository: &Repository) -> Result<&ManifestEntry> {
        self.entries
            .get(&repository.name)
            .ok_or_else(|| BuildToolError::SourceInfo {
                repository: repository.name.clone(),
                reason: "not present in manifest".to_string(),
            })
    }
}

#[async_trait::async_trait]
impl SourceCodeManager for ManifestSourceCodeManager {
    async fn resolve_version(&self, repository: &Repository) -> Result<BuildVersion> {
        let entry = self.entry(repository)?;
        let version = BuildVersion::new(entry.version.clone());
        Ok(match entry.build_number {
            Some(n) => version.with_build_number(n),
            None => version,
        })
    }

    fn service_name(&self, repository: &Repository) -> String {
        self.entries
            .get(&repository.name)
            .and_then(|e| e.service_name.clone())
            .unwrap_or_else(|| repository.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "repositories": [
            {"name": "deck", "path": "deck", "version": "2.15.0", "build_number": 42},
            {"name": "spinnaker-monitoring", "path": "/abs/monitoring", "version": "0.18.0",
             "service_name": "monitoring-daemon"}
        ]
    }"#;

    #[tokio::test]
    async fn test_manifest_resolves_versions() {
        let scm = ManifestSourceCodeManager::from_json_str(MANIFEST, Path::new("/src")).unwrap();
        let repos = scm.repositories();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].name, "deck");
        assert_eq!(repos[0].git_dir, PathBuf::from("/src/deck"));
        assert_eq!(repos[1].git_dir, PathBuf::from("/abs/monitoring"));

        let v = scm.resolve_version(&repos[0]).await.unwrap();
        assert_eq!(v.version, "2.15.0");
        assert_eq!(v.build_number, Some(42));
        assert_eq!(scm.service_name(&repos[0]), "deck");
        assert_eq!(scm.service_name(&repos[1]), "monitoring-daemon");
    }

    #[tokio::test]
    async fn test_unknown_repository_is_source_info_error() {
        let scm = ManifestSourceCodeManager::from_json_str(MANIFEST, Path::new("/src")).unwrap();
        let err = scm
            .resolve_version(&Repository::new("kayenta", "/src/kayenta"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildToolError::SourceInfo { .. }));
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let json = r#"{"repositories": [
            {"name": "deck", "path": "a", "version": "1"},
            {"name": "deck", "path": "b", "version": "2"}
        ]}"#;
        let err = ManifestSourceCodeManager::from_json_str(json, Path::new(".")).unwrap_err();
        assert!(matches!(err, BuildToolError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bom.json");
        std::fs::write(&path, MANIFEST).unwrap();
        let scm = ManifestSourceCodeManager::load(&path).unwrap();
        assert_eq!(scm.repositories()[0].git_dir, dir.path().join("deck"));
    }
}
