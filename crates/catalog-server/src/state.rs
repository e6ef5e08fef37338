//! Shared process state: the `Collaborators` bundle plus the XSRF
//! token store, assembled once in `main` from `Config`.

use catalog_core::Config;
use catalog_github::GithubClient;
use catalog_queue::{HttpAnalysisPublisher, MemoryTaskQueue, XsrfTokenStore};
use catalog_registry::RegistryClient;
use catalog_store::MemoryDatastore;
use catalog_tasks::{Collaborators, GithubSourceHost, RegistryUpstream};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub collab: Collaborators,
    pub xsrf: Arc<XsrfTokenStore>,
    pub search: Arc<catalog_tasks::MemorySearchIndex>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let github = GithubClient::new(config.github_api_base.clone(), config.github_token.clone());
        let registry = RegistryClient::new(config.registry_api_base.clone(), config.unpkg_base.clone());
        let collab = Collaborators {
            store: Arc::new(MemoryDatastore::new()),
            queue: Arc::new(MemoryTaskQueue::new(10_000)),
            source_host: Arc::new(GithubSourceHost::new(github)),
            registry: Arc::new(RegistryUpstream::new(registry)),
            analysis: Arc::new(HttpAnalysisPublisher::new(config.analysis_topic_url.clone())),
        };
        Self {
            collab,
            xsrf: Arc::new(XsrfTokenStore::new()),
            search: Arc::new(catalog_tasks::MemorySearchIndex::new()),
        }
    }
}
