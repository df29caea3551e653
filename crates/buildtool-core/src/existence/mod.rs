//! Artifact existence checks against remote stores.
//!
//! Provides:
//! - [`registry::RegistryTagChecker`]: container tag listing via `gcloud`
//! - [`package::PackageVersionChecker`]: authenticated package-version lookup over HTTP

pub mod package;
pub mod registry;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use package::PackageVersionChecker;
pub use registry::RegistryTagChecker;

/// One existence lookup: which store, which artifact, which version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExistenceQuery {
    /// Registry host or package repository name.
    pub store: String,
    /// Image or package name.
    pub name: String,
    /// Tag or package version.
    pub version: String,
}

impl ExistenceQuery {
    pub fn new(
        store: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            store: store.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for ExistenceQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.store, self.name, self.version)
    }
}

/// Backend answering whether an artifact version is already published.
///
/// `Ok(false)` means the store positively reported the artifact as absent.
/// Anything the store cannot answer cleanly is an `Err`, never `Ok(false)`.
#[async_trait::async_trait]
pub trait ArtifactExistenceChecker: Send + Sync {
    async fn exists(&self, query: &ExistenceQuery) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_display() {
        let q = ExistenceQuery::new("gcr.io/proj", "clouddriver", "1.2.3-slim");
        assert_eq!(q.to_string(), "gcr.io/proj/clouddriver@1.2.3-slim");
    }
}
