//! Package repository version lookup over authenticated HTTP.

use reqwest::StatusCode;
use tracing::{debug, warn};

use super::{ArtifactExistenceChecker, ExistenceQuery};
use crate::config::Credentials;
use crate::error::{BuildToolError, Result};

const SERVER: &str = "bintray.check";

/// Checks `GET <host>/packages/<org>/<repo>/<package>/versions/<version>`.
///
/// 200 means present, 404 means absent, anything else is a response error.
#[derive(Debug, Clone)]
pub struct PackageVersionChecker {
    host: String,
    org: String,
    credentials: Credentials,
    http_client: reqwest::Client,
}

impl PackageVersionChecker {
    pub fn new(
        host: impl Into<String>,
        org: impl Into<String>,
        credentials: Credentials,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("buildtool/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BuildToolError::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            org: org.into(),
            credentials,
            http_client,
        })
    }

    /// URL of the versioned package described by `query`.
    pub fn version_url(&self, query: &ExistenceQuery) -> String {
        format!(
            "{}/packages/{}/{}/{}/versions/{}",
            self.host, self.org, query.store, query.name, query.version
        )
    }
}

#[async_trait::async_trait]
impl ArtifactExistenceChecker for PackageVersionChecker {
    async fn exists(&self, query: &ExistenceQuery) -> Result<bool> {
        let url = self.version_url(query);
        debug!(url = %url, "checking package version");

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.key))
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "package store unreachable");
                BuildToolError::response(SERVER, format!("request to {url} failed: {e}"))
            })?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                warn!(url = %url, status = %status, "unexpected package store status");
                Err(BuildToolError::response(
                    SERVER,
                    format!("unexpected HTTP {status} for {url}"),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(host: &str) -> PackageVersionChecker {
        PackageVersionChecker::new(host, "spinnaker-releases", Credentials::new("bob", "secret"))
            .unwrap()
    }

    fn query() -> ExistenceQuery {
        ExistenceQuery::new("debians", "spinnaker-deck", "2.15.0-20200101")
    }

    const PATH: &str = "/packages/spinnaker-releases/debians/spinnaker-deck/versions/2.15.0-20200101";

    #[test]
    fn test_version_url() {
        let c = checker("https://api.bintray.com/");
        assert_eq!(
            c.version_url(&query()),
            format!("https://api.bintray.com{PATH}")
        );
    }

    #[tokio::test]
    async fn test_200_is_present_and_sends_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        // base64("bob:secret")
        let mock = server
            .mock("GET", PATH)
            .match_header("authorization", "Basic Ym9iOnNlY3JldA==")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        assert!(checker(&server.url()).exists(&query()).await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_404_is_absent() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .with_status(404)
            .create_async()
            .await;

        assert!(!checker(&server.url()).exists(&query()).await.unwrap());
    }

    #[tokio::test]
    async fn test_500_is_response_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .with_status(500)
            .create_async()
            .await;

        let err = checker(&server.url()).exists(&query()).await.unwrap_err();
        assert!(matches!(err, BuildToolError::Response { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_401_is_response_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", PATH)
            .with_status(401)
            .create_async()
            .await;

        let err = checker(&server.url()).exists(&query()).await.unwrap_err();
        assert!(matches!(err, BuildToolError::Response { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_response_error() {
        let err = checker("http://127.0.0.1:1").exists(&query()).await.unwrap_err();
        assert!(matches!(err, BuildToolError::Response { .. }));
    }
}
