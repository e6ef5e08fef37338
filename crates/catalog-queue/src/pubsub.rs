//! Pub/sub bridge for off-host analysis requests (C7, §4.7).
//!
//! Publishing and replying are asymmetric: this crate only models the
//! publish side as an explicit dependency (so handlers can be tested
//! against a fake); the reply arrives later as an ordinary inbound
//! HTTP request handled in `catalog-server`, not through this trait.

use async_trait::async_trait;
use catalog_core::CatalogError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub library: String,
    pub tag: String,
    pub sha: String,
    pub manifest_url: Option<String>,
}

#[async_trait]
pub trait AnalysisPublisher: Send + Sync {
    async fn publish(&self, request: AnalysisRequest) -> Result<(), CatalogError>;
}

/// Test/in-process double that records every publish instead of
/// shipping it to a real topic.
#[derive(Default)]
pub struct RecordingAnalysisPublisher {
    pub published: tokio::sync::Mutex<Vec<AnalysisRequest>>,
}

#[async_trait]
impl AnalysisPublisher for RecordingAnalysisPublisher {
    async fn publish(&self, request: AnalysisRequest) -> Result<(), CatalogError> {
        self.published.lock().await.push(request);
        Ok(())
    }
}

/// Publishes to a pub/sub-style REST push endpoint (e.g. Cloud Pub/Sub's
/// `topics/<name>:publish`), carrying the request as message attributes
/// with an empty payload per §6. Mirrors `catalog_github::FetchClient`'s
/// plain `reqwest::Client` usage rather than pulling in a cloud SDK.
pub struct HttpAnalysisPublisher {
    client: reqwest::Client,
    topic_url: String,
}

impl HttpAnalysisPublisher {
    pub fn new(topic_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            topic_url: topic_url.into(),
        }
    }
}

#[async_trait]
impl AnalysisPublisher for HttpAnalysisPublisher {
    async fn publish(&self, request: AnalysisRequest) -> Result<(), CatalogError> {
        let attributes = serde_json::json!({
            "owner": request.library.split('/').next().unwrap_or_default(),
            "tag": request.tag,
            "sha": request.sha,
            "manifestUrl": request.manifest_url,
        });
        let body = serde_json::json!({
            "messages": [{ "attributes": attributes, "data": "" }]
        });
        let response = self
            .client
            .post(&self.topic_url)
            .json(&body)
            .send()
            .await
            .map_err(|source| CatalogError::Upstream { resource: self.topic_url.clone(), source })?;
        if response.status().is_server_error() {
            return Err(CatalogError::UpstreamServerError {
                resource: self.topic_url.clone(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_publisher_records_requests() {
        let publisher = RecordingAnalysisPublisher::default();
        publisher
            .publish(AnalysisRequest {
                library: "org/repo".into(),
                tag: "v1.0.0".into(),
                sha: "abc".into(),
                manifest_url: None,
            })
            .await
            .unwrap();
        assert_eq!(publisher.published.lock().await.len(), 1);
    }
}
