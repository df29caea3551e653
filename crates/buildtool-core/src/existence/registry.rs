//! Container registry tag lookup through the `gcloud` CLI.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::{ArtifactExistenceChecker, ExistenceQuery};
use crate::error::{BuildToolError, Result};

const SERVER: &str = "gcr.list_tags";

/// Lists tags for `<store>/<name>` filtered by the query version.
///
/// The image exists iff the filtered JSON listing is non-empty.
#[derive(Debug, Clone)]
pub struct RegistryTagChecker {
    program: String,
    account: String,
}

impl RegistryTagChecker {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            program: "gcloud".to_string(),
            account: account.into(),
        }
    }

    /// Use a different listing executable (tests point this at a script).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to the listing tool for `query`.
    pub fn command_args(&self, query: &ExistenceQuery) -> Vec<String> {
        vec![
            "--account".to_string(),
            self.account.clone(),
            "container".to_string(),
            "images".to_string(),
            "list-tags".to_string(),
            format!("{}/{}", query.store, query.name),
            format!("--filter={}", query.version),
            "--format=json".to_string(),
        ]
    }
}

/// Interpret `list-tags --format=json` output.
pub fn parse_tag_listing(stdout: &[u8]) -> Result<bool> {
    let tags: Vec<serde_json::Value> = serde_json::from_slice(stdout)
        .map_err(|e| BuildToolError::response(SERVER, format!("unparseable tag listing: {e}")))?;
    Ok(!tags.is_empty())
}

#[async_trait::async_trait]
impl ArtifactExistenceChecker for RegistryTagChecker {
    async fn exists(&self, query: &ExistenceQuery) -> Result<bool> {
        debug!(query = %query, "listing registry tags");
        let output = Command::new(&self.program)
            .args(self.command_args(query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BuildToolError::response(SERVER, format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildToolError::response(
                SERVER,
                format!("listing {query} exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        parse_tag_listing(&output.stdout)
    }
}
