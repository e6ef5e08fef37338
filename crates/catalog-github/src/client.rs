//! The source-hosting platform's REST surface (§4.3, §6): repository
//! descriptor, contributors, participation stats, tags, default-branch
//! head, readme, arbitrary path contents, hook registration, commit
//! status, and markdown rendering.

use crate::fetch::{FetchClient, FetchOutcome};
use crate::markdown::unwrap_demo_blocks;
use base64::Engine;
use catalog_core::CatalogError;
use std::time::Duration;

pub struct GithubClient {
    fetch: FetchClient,
    api_base: String,
}

/// One outcome of a conditional fetch against a repository-scoped
/// endpoint, already folded down to what callers actually branch on.
pub enum RepoFetch {
    NotModified,
    Body { bytes: Vec<u8>, etag: Option<String> },
    NotFound,
    QuotaExceeded,
    ServerError(u16),
}

impl GithubClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            fetch: FetchClient::new("catalog-pipeline/0.1", Duration::from_secs(15), token),
            api_base: api_base.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn get(&self, path: &str, etag: Option<&str>) -> Result<RepoFetch, CatalogError> {
        let url = self.url(path);
        let outcome = self.fetch.fetch_with_etag(&url, etag).await?;
        Ok(match outcome {
            FetchOutcome::NotModified => RepoFetch::NotModified,
            FetchOutcome::NotFound => RepoFetch::NotFound,
            FetchOutcome::Forbidden => RepoFetch::QuotaExceeded,
            FetchOutcome::ServerError(status) => RepoFetch::ServerError(status),
            FetchOutcome::Ok(ok) => RepoFetch::Body {
                bytes: ok.body.to_vec(),
                etag: ok.etag,
            },
        })
    }

    /// `GET /repos/:owner/:repo`
    pub async fn repo(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<RepoFetch, CatalogError> {
        self.get(&format!("repos/{owner}/{repo}"), etag).await
    }

    /// `GET /repos/:owner/:repo/contributors`
    pub async fn contributors(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<RepoFetch, CatalogError> {
        self.get(&format!("repos/{owner}/{repo}/contributors"), etag).await
    }

    /// `GET /repos/:owner/:repo/stats/participation`
    pub async fn participation(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<RepoFetch, CatalogError> {
        self.get(&format!("repos/{owner}/{repo}/stats/participation"), etag).await
    }

    /// `GET /repos/:owner/:repo/tags`
    pub async fn tags(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<RepoFetch, CatalogError> {
        self.get(&format!("repos/{owner}/{repo}/tags"), etag).await
    }

    /// `GET /repos/:owner/:repo/git/refs/heads/master`
    pub async fn master_ref(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<RepoFetch, CatalogError> {
        self.get(&format!("repos/{owner}/{repo}/git/refs/heads/master"), etag).await
    }

    /// `GET /users/:login`, for Author metadata reconciliation.
    pub async fn user(&self, login: &str, etag: Option<&str>) -> Result<RepoFetch, CatalogError> {
        self.get(&format!("users/{login}"), etag).await
    }

    /// `GET /repos/:owner/:repo/readme?ref=<sha>`, base64-decoded.
    pub async fn readme(&self, owner: &str, repo: &str, sha: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        match self.get(&format!("repos/{owner}/{repo}/readme?ref={sha}"), None).await? {
            RepoFetch::Body { bytes, .. } => {
                let envelope: serde_json::Value =
                    serde_json::from_slice(&bytes).map_err(|source| CatalogError::Parse {
                        what: format!("readme envelope for {owner}/{repo}"),
                        source,
                    })?;
                let content = envelope
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .replace('\n', "");
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .unwrap_or_default();
                Ok(Some(decoded))
            }
            RepoFetch::NotFound => Ok(None),
            RepoFetch::QuotaExceeded => Err(CatalogError::QuotaExceeded {
                resource: format!("{owner}/{repo}/readme"),
            }),
            RepoFetch::ServerError(status) => Err(CatalogError::UpstreamServerError {
                resource: format!("{owner}/{repo}/readme"),
                status,
            }),
            RepoFetch::NotModified => Ok(None),
        }
    }

    /// `GET /repos/:owner/:repo/contents/:path?ref=<sha>`, base64-decoded.
    pub async fn contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        sha: &str,
    ) -> Result<Option<Vec<u8>>, CatalogError> {
        let encoded_path = path
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");
        match self
            .get(&format!("repos/{owner}/{repo}/contents/{encoded_path}?ref={sha}"), None)
            .await?
        {
            RepoFetch::Body { bytes, .. } => {
                let envelope: serde_json::Value =
                    serde_json::from_slice(&bytes).map_err(|source| CatalogError::Parse {
                        what: format!("contents envelope for {owner}/{repo}/{path}"),
                        source,
                    })?;
                let content = envelope
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .replace('\n', "");
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .unwrap_or_default();
                Ok(Some(decoded))
            }
            RepoFetch::NotFound | RepoFetch::NotModified => Ok(None),
            RepoFetch::QuotaExceeded => Err(CatalogError::QuotaExceeded {
                resource: format!("{owner}/{repo}/contents/{path}"),
            }),
            RepoFetch::ServerError(status) => Err(CatalogError::UpstreamServerError {
                resource: format!("{owner}/{repo}/contents/{path}"),
                status,
            }),
        }
    }

    /// Registers a push hook so subsequent updates arrive as webhooks
    /// rather than only via the periodic sweep (C9).
    pub async fn register_hook(&self, owner: &str, repo: &str, callback_url: &str) -> Result<(), CatalogError> {
        let payload = serde_json::json!({
            "name": "web",
            "active": true,
            "events": ["push"],
            "config": { "url": callback_url, "content_type": "json" },
        })
        .to_string();
        self.fetch
            .post_text(&self.url(&format!("repos/{owner}/{repo}/hooks")), payload)
            .await?;
        Ok(())
    }

    /// Posts a commit status for `sha`, surfacing ingestion outcome
    /// back on the upstream commit.
    pub async fn set_status(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
        state: &str,
        description: &str,
    ) -> Result<(), CatalogError> {
        let payload = serde_json::json!({ "state": state, "description": description }).to_string();
        self.fetch
            .post_text(&self.url(&format!("repos/{owner}/{repo}/statuses/{sha}")), payload)
            .await?;
        Ok(())
    }

    /// Renders `markdown` via the platform's markdown endpoint, first
    /// applying the demo-block unwrap transform.
    pub async fn render_markdown(&self, markdown: &str) -> Result<String, CatalogError> {
        let normalized = unwrap_demo_blocks(markdown);
        let payload = serde_json::json!({ "text": normalized, "mode": "gfm" }).to_string();
        self.fetch.post_text(&self.url("markdown"), payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repo_maps_404_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/org/missing")
            .with_status(404)
            .create_async()
            .await;
        let client = GithubClient::new(server.url(), None);
        let outcome = client.repo("org", "missing", None).await.unwrap();
        assert!(matches!(outcome, RepoFetch::NotFound));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn repo_maps_403_to_quota_exceeded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/org/repo")
            .with_status(403)
            .create_async()
            .await;
        let client = GithubClient::new(server.url(), None);
        let outcome = client.repo("org", "repo", None).await.unwrap();
        assert!(matches!(outcome, RepoFetch::QuotaExceeded));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn readme_decodes_base64_content() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!({ "content": base64::engine::general_purpose::STANDARD.encode("hello world") })
            .to_string();
        let mock = server
            .mock("GET", mockito::Matcher::Regex("/repos/org/repo/readme.*".into()))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;
        let client = GithubClient::new(server.url(), None);
        let decoded = client.readme("org", "repo", "abc123").await.unwrap().unwrap();
        assert_eq!(decoded, b"hello world");
        mock.assert_async().await;
    }
}
