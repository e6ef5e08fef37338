//! Process configuration, loaded from environment variables.
//!
//! Mirrors `cargo-registry`'s `dotenv`-then-`env::var` loading style
//! (`examples/other_examples/manifests/leopard930418-crates.io`) rather
//! than a full config-file layer: this pipeline has a handful of knobs
//! (upstream tokens, queue concurrency, the analysis payload cap) and
//! no deployment-specific file tree to merge.

use std::env;
use std::time::Duration;

/// Default upstream HTTP deadline (spec.md §5: "typically 10-20s").
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 15;

/// Default cap on analysis reply payloads (spec.md §4.7: "~5 MB").
const DEFAULT_ANALYSIS_PAYLOAD_CAP_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token for the source-hosting platform's API.
    pub github_token: Option<String>,
    /// Base URL for the source-hosting platform's API (overridable for tests).
    pub github_api_base: String,
    /// Base URL for the package registry's API.
    pub registry_api_base: String,
    /// Base URL for the unpkg-style tarball/file fetcher.
    pub unpkg_base: String,
    /// Push-subscription topic URL the analysis worker replies to (§4.7).
    pub analysis_topic_url: String,
    pub upstream_timeout: Duration,
    pub analysis_payload_cap_bytes: usize,
    /// Entries to page through per `UpdateAll`/`AnalyzeAll` sweep step (§4.9).
    pub sweep_page_size: usize,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
}

impl Config {
    /// Loads configuration from the process environment, applying
    /// `.env` first (if present) the way `dotenvy` is meant to be used
    /// in a dev environment — a missing `.env` file is not an error.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            github_token: env::var("CATALOG_GITHUB_TOKEN").ok(),
            github_api_base: env::var("CATALOG_GITHUB_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            registry_api_base: env::var("CATALOG_REGISTRY_API_BASE")
                .unwrap_or_else(|_| "https://registry.npmjs.org".to_string()),
            unpkg_base: env::var("CATALOG_UNPKG_BASE")
                .unwrap_or_else(|_| "https://unpkg.com".to_string()),
            analysis_topic_url: env::var("CATALOG_ANALYSIS_TOPIC_URL")
                .unwrap_or_else(|_| "https://pubsub.googleapis.com/v1/projects/catalog/topics/analysis-requests:publish".to_string()),
            upstream_timeout: env::var("CATALOG_UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS)),
            analysis_payload_cap_bytes: env::var("CATALOG_ANALYSIS_PAYLOAD_CAP_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ANALYSIS_PAYLOAD_CAP_BYTES),
            sweep_page_size: env::var("CATALOG_SWEEP_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            bind_addr: env::var("CATALOG_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            github_api_base: "https://api.github.com".to_string(),
            registry_api_base: "https://registry.npmjs.org".to_string(),
            unpkg_base: "https://unpkg.com".to_string(),
            analysis_topic_url: "https://pubsub.googleapis.com/v1/projects/catalog/topics/analysis-requests:publish".to_string(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            analysis_payload_cap_bytes: DEFAULT_ANALYSIS_PAYLOAD_CAP_BYTES,
            sweep_page_size: 50,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}
