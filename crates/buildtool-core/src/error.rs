//! Error taxonomy for build orchestration.

use thiserror::Error;

/// Errors produced by the build orchestration layer.
///
/// `Config`, `Response` and `SourceInfo` abort a whole pass before any build
/// starts. A failed remote build is recorded as a failed outcome instead.
#[derive(Debug, Error)]
pub enum BuildToolError {
    /// Missing or inconsistent configuration, detected before or during a pass.
    #[error("configuration error: {0}")]
    Config(String),

    /// An artifact store answered with something other than present/absent.
    #[error("{server} failure: {message}")]
    Response { server: String, message: String },

    /// The remote build tool could not be started or waited on.
    #[error("build invocation failed for {repository}: {reason}")]
    Invocation { repository: String, reason: String },

    /// The source-code manager could not describe a repository.
    #[error("source info unavailable for {repository}: {reason}")]
    SourceInfo { repository: String, reason: String },

    /// A spawned build task ended without reporting.
    #[error("build task failed: {0}")]
    Task(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config file error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BuildToolError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn response(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Response {
            server: server.into(),
            message: message.into(),
        }
    }
}

/// Result type for buildtool operations.
pub type Result<T> = std::result::Result<T, BuildToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_error_names_server() {
        let err = BuildToolError::response("bintray.check", "HTTP 500");
        let msg = err.to_string();
        assert!(msg.contains("bintray.check"));
        assert!(msg.contains("HTTP 500"));
    }

    #[test]
    fn test_config_error_display() {
        let err = BuildToolError::config("BINTRAY_USER is not set");
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("BINTRAY_USER"));
    }

    #[test]
    fn test_invocation_error_names_repository() {
        let err = BuildToolError::Invocation {
            repository: "clouddriver".to_string(),
            reason: "spawn failed".to_string(),
        };
        assert!(err.to_string().contains("clouddriver"));
        assert!(err.to_string().contains("spawn failed"));
    }
}
