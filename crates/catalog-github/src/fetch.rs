//! The conditional-fetch primitive (§4.3), generalized from the
//! teacher's `HttpCache` (`deps-core::cache::HttpCache`) to classify
//! 404/403/5xx distinctly instead of folding every non-2xx into one
//! error variant — the task shell (C4) needs to tell them apart.

use catalog_core::CatalogError;
use dashmap::DashMap;
use reqwest::{header, Client, StatusCode};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FetchOk {
    pub body: Arc<Vec<u8>>,
    pub etag: Option<String>,
    pub rate_limit_remaining: Option<u32>,
}

#[derive(Debug)]
pub enum FetchOutcome {
    NotModified,
    Ok(FetchOk),
    NotFound,
    Forbidden,
    ServerError(u16),
}

#[derive(Clone)]
struct CachedEntry {
    body: Arc<Vec<u8>>,
    etag: Option<String>,
}

/// Conditional-GET client shared by `GithubClient` and (by
/// composition) any other adapter that wants etag caching without
/// rolling its own `DashMap`.
pub struct FetchClient {
    entries: DashMap<String, CachedEntry>,
    client: Client,
    bearer_token: Option<String>,
}

impl FetchClient {
    pub fn new(user_agent: &str, timeout: std::time::Duration, bearer_token: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            entries: DashMap::new(),
            client,
            bearer_token,
        }
    }

    /// Performs a conditional GET against `url`. The etag used is
    /// whichever this client last observed for that exact URL — callers
    /// that want to force a fresh fetch should not reuse the same
    /// `FetchClient` instance, or should evict first.
    pub async fn fetch(&self, url: &str) -> Result<FetchOutcome, CatalogError> {
        let etag = self.entries.get(url).and_then(|e| e.etag.clone());
        self.fetch_with_etag(url, etag.as_deref()).await
    }

    pub async fn fetch_with_etag(&self, url: &str, etag: Option<&str>) -> Result<FetchOutcome, CatalogError> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(|source| CatalogError::Upstream {
            resource: url.to_string(),
            source,
        })?;

        let rate_limit_remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());
        if let Some(remaining) = rate_limit_remaining {
            tracing::debug!(url, remaining, "upstream rate-limit-remaining");
        }

        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(FetchOutcome::NotModified),
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound),
            StatusCode::FORBIDDEN => Ok(FetchOutcome::Forbidden),
            status if status.is_server_error() => Ok(FetchOutcome::ServerError(status.as_u16())),
            status if status.is_success() => {
                let response_etag = response
                    .headers()
                    .get(header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                let body = response
                    .bytes()
                    .await
                    .map_err(|source| CatalogError::Upstream {
                        resource: url.to_string(),
                        source,
                    })?;
                let body = Arc::new(body.to_vec());
                self.entries.insert(
                    url.to_string(),
                    CachedEntry {
                        body: Arc::clone(&body),
                        etag: response_etag.clone(),
                    },
                );
                Ok(FetchOutcome::Ok(FetchOk {
                    body,
                    etag: response_etag,
                    rate_limit_remaining,
                }))
            }
            status => Ok(FetchOutcome::ServerError(status.as_u16())),
        }
    }

    pub async fn post_text(&self, url: &str, body: String) -> Result<String, CatalogError> {
        let mut request = self.client.post(url).body(body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|source| CatalogError::Upstream {
            resource: url.to_string(),
            source,
        })?;
        response.text().await.map_err(|source| CatalogError::Upstream {
            resource: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_classifies_404_and_403_distinctly() {
        let mut server = mockito::Server::new_async().await;
        let not_found = server.mock("GET", "/missing").with_status(404).create_async().await;
        let forbidden = server.mock("GET", "/quota").with_status(403).create_async().await;

        let client = FetchClient::new("catalog-pipeline/0.1", std::time::Duration::from_secs(5), None);
        let outcome = client.fetch(&format!("{}/missing", server.url())).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NotFound));

        let outcome = client.fetch(&format!("{}/quota", server.url())).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Forbidden));

        not_found.assert_async().await;
        forbidden.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_returns_etag_and_reuses_it_for_conditional_request() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/thing")
            .with_status(200)
            .with_header("etag", "\"v1\"")
            .with_body("hello")
            .create_async()
            .await;

        let client = FetchClient::new("catalog-pipeline/0.1", std::time::Duration::from_secs(5), None);
        let url = format!("{}/thing", server.url());
        let outcome = client.fetch(&url).await.unwrap();
        match outcome {
            FetchOutcome::Ok(ok) => assert_eq!(ok.etag.as_deref(), Some("\"v1\"")),
            _ => panic!("expected Ok"),
        }
        first.assert_async().await;

        let second = server
            .mock("GET", "/thing")
            .match_header("if-none-match", "\"v1\"")
            .with_status(304)
            .create_async()
            .await;
        let outcome = client.fetch(&url).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NotModified));
        second.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_classifies_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/flaky").with_status(503).create_async().await;
        let client = FetchClient::new("catalog-pipeline/0.1", std::time::Duration::from_secs(5), None);
        let outcome = client.fetch(&format!("{}/flaky", server.url())).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::ServerError(503)));
        mock.assert_async().await;
    }
}
