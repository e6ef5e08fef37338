//! Upstream collaborators, modeled as explicit dependencies (§9:
//! "global singletons... model them as explicit dependencies on the
//! handler closure so tests can inject fakes") rather than reaching
//! for `catalog_github::GithubClient` / `catalog_registry::RegistryClient`
//! directly from the handlers in this crate.

use async_trait::async_trait;
use catalog_core::CatalogError;
use catalog_github::{GithubClient, RepoFetch};
use catalog_registry::{DescriptorFetch, RegistryClient};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum UpstreamFetch {
    NotModified,
    Found { bytes: Vec<u8>, etag: Option<String> },
    NotFound,
    QuotaExceeded,
    ServerError(u16),
}

#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn repo(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError>;
    async fn contributors(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError>;
    async fn participation(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError>;
    async fn tags(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError>;
    async fn master_ref(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError>;
    async fn user(&self, login: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError>;
    async fn readme(&self, owner: &str, repo: &str, sha: &str) -> Result<Option<Vec<u8>>, CatalogError>;
    async fn contents(&self, owner: &str, repo: &str, path: &str, sha: &str) -> Result<Option<Vec<u8>>, CatalogError>;
    async fn render_markdown(&self, markdown: &str) -> Result<String, CatalogError>;
    async fn register_hook(&self, owner: &str, repo: &str, callback_url: &str) -> Result<(), CatalogError>;
    async fn set_status(&self, owner: &str, repo: &str, sha: &str, state: &str, description: &str) -> Result<(), CatalogError>;
}

fn convert(outcome: RepoFetch) -> UpstreamFetch {
    match outcome {
        RepoFetch::NotModified => UpstreamFetch::NotModified,
        RepoFetch::Body { bytes, etag } => UpstreamFetch::Found { bytes, etag },
        RepoFetch::NotFound => UpstreamFetch::NotFound,
        RepoFetch::QuotaExceeded => UpstreamFetch::QuotaExceeded,
        RepoFetch::ServerError(status) => UpstreamFetch::ServerError(status),
    }
}

pub struct GithubSourceHost {
    client: GithubClient,
}

impl GithubSourceHost {
    pub fn new(client: GithubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceHost for GithubSourceHost {
    async fn repo(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        self.client.repo(owner, repo, etag).await.map(convert)
    }
    async fn contributors(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        self.client.contributors(owner, repo, etag).await.map(convert)
    }
    async fn participation(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        self.client.participation(owner, repo, etag).await.map(convert)
    }
    async fn tags(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        self.client.tags(owner, repo, etag).await.map(convert)
    }
    async fn master_ref(&self, owner: &str, repo: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        self.client.master_ref(owner, repo, etag).await.map(convert)
    }
    async fn user(&self, login: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        self.client.user(login, etag).await.map(convert)
    }
    async fn readme(&self, owner: &str, repo: &str, sha: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        self.client.readme(owner, repo, sha).await
    }
    async fn contents(&self, owner: &str, repo: &str, path: &str, sha: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        self.client.contents(owner, repo, path, sha).await
    }
    async fn render_markdown(&self, markdown: &str) -> Result<String, CatalogError> {
        self.client.render_markdown(markdown).await
    }
    async fn register_hook(&self, owner: &str, repo: &str, callback_url: &str) -> Result<(), CatalogError> {
        self.client.register_hook(owner, repo, callback_url).await
    }
    async fn set_status(&self, owner: &str, repo: &str, sha: &str, state: &str, description: &str) -> Result<(), CatalogError> {
        self.client.set_status(owner, repo, sha, state, description).await
    }
}

#[async_trait]
pub trait Registry: Send + Sync {
    async fn descriptor(&self, scope: Option<&str>, package: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError>;
    async fn readme(&self, package: &str, version_tag: &str, readme_filename: &str) -> Result<Option<Vec<u8>>, CatalogError>;
}

pub struct RegistryUpstream {
    client: RegistryClient,
}

impl RegistryUpstream {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Registry for RegistryUpstream {
    async fn descriptor(&self, scope: Option<&str>, package: &str, etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        match self.client.descriptor(scope, package, etag).await? {
            DescriptorFetch::NotModified => Ok(UpstreamFetch::NotModified),
            DescriptorFetch::NotFound => Ok(UpstreamFetch::NotFound),
            DescriptorFetch::QuotaExceeded => Ok(UpstreamFetch::QuotaExceeded),
            DescriptorFetch::ServerError(status) => Ok(UpstreamFetch::ServerError(status)),
            DescriptorFetch::Found { descriptor, etag } => Ok(UpstreamFetch::Found {
                bytes: serde_json::to_vec(&SerializableDescriptor::from(&descriptor)).unwrap_or_default(),
                etag,
            }),
        }
    }

    async fn readme(&self, package: &str, version_tag: &str, readme_filename: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        self.client.readme(package, version_tag, readme_filename).await
    }
}

/// `RegistryDescriptor` doesn't implement `Serialize` (it's a pure
/// deserialize-side DTO in `catalog-registry`); round-trip through
/// `serde_json::Value` so `UpstreamFetch::Found` can carry raw bytes
/// like every other variant.
#[derive(serde::Serialize)]
struct SerializableDescriptor {
    repository: Option<serde_json::Value>,
    license: Option<String>,
    description: Option<String>,
    keywords: Vec<String>,
    versions: std::collections::BTreeMap<String, SerializableVersion>,
}

#[derive(serde::Serialize)]
struct SerializableVersion {
    #[serde(rename = "gitHead")]
    git_head: String,
    #[serde(rename = "readmeFilename")]
    readme_filename: Option<String>,
}

impl From<&catalog_registry::RegistryDescriptor> for SerializableDescriptor {
    fn from(d: &catalog_registry::RegistryDescriptor) -> Self {
        Self {
            repository: d.repository.clone(),
            license: d.license.clone(),
            description: d.description.clone(),
            keywords: d.keywords.clone(),
            versions: d
                .versions
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        SerializableVersion {
                            git_head: v.git_head.clone(),
                            readme_filename: v.readme_filename.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Scripted fake used by unit/integration tests: each key is
/// `"{owner}/{repo}#{resource}"`; values are enqueued and consumed
/// in order, the way the teacher's own test doubles script a fixed
/// sequence of responses per call site.
#[derive(Default)]
pub struct FakeSourceHost {
    pub responses: DashMap<String, std::collections::VecDeque<UpstreamFetch>>,
    pub files: DashMap<String, Vec<u8>>,
    pub readmes: DashMap<String, Vec<u8>>,
    pub rendered_markdown: DashMap<String, String>,
}

impl FakeSourceHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, owner: &str, repo: &str, resource: &str, outcome: UpstreamFetch) {
        self.responses
            .entry(format!("{owner}/{repo}#{resource}"))
            .or_default()
            .push_back(outcome);
    }

    pub fn set_readme(&self, owner: &str, repo: &str, sha: &str, body: &[u8]) {
        self.readmes.insert(format!("{owner}/{repo}@{sha}"), body.to_vec());
    }

    pub fn set_file(&self, owner: &str, repo: &str, path: &str, sha: &str, body: &[u8]) {
        self.files.insert(format!("{owner}/{repo}@{sha}:{path}"), body.to_vec());
    }

    fn take(&self, owner: &str, repo: &str, resource: &str) -> UpstreamFetch {
        self.responses
            .get_mut(&format!("{owner}/{repo}#{resource}"))
            .and_then(|mut q| q.pop_front())
            .unwrap_or(UpstreamFetch::NotModified)
    }
}

#[async_trait]
impl SourceHost for FakeSourceHost {
    async fn repo(&self, owner: &str, repo: &str, _etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        Ok(self.take(owner, repo, "repo"))
    }
    async fn contributors(&self, owner: &str, repo: &str, _etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        Ok(self.take(owner, repo, "contributors"))
    }
    async fn participation(&self, owner: &str, repo: &str, _etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        Ok(self.take(owner, repo, "participation"))
    }
    async fn tags(&self, owner: &str, repo: &str, _etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        Ok(self.take(owner, repo, "tags"))
    }
    async fn master_ref(&self, owner: &str, repo: &str, _etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        Ok(self.take(owner, repo, "master_ref"))
    }
    async fn user(&self, login: &str, _etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        Ok(self.take(login, "", "user"))
    }
    async fn readme(&self, owner: &str, repo: &str, sha: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        Ok(self.readmes.get(&format!("{owner}/{repo}@{sha}")).map(|v| v.clone()))
    }
    async fn contents(&self, owner: &str, repo: &str, path: &str, sha: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        Ok(self.files.get(&format!("{owner}/{repo}@{sha}:{path}")).map(|v| v.clone()))
    }
    async fn render_markdown(&self, markdown: &str) -> Result<String, CatalogError> {
        Ok(self
            .rendered_markdown
            .get(markdown)
            .map(|v| v.clone())
            .unwrap_or_else(|| format!("<p>{markdown}</p>")))
    }
    async fn register_hook(&self, _owner: &str, _repo: &str, _callback_url: &str) -> Result<(), CatalogError> {
        Ok(())
    }
    async fn set_status(&self, _owner: &str, _repo: &str, _sha: &str, _state: &str, _description: &str) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    pub responses: DashMap<String, std::collections::VecDeque<UpstreamFetch>>,
    pub readmes: DashMap<String, Vec<u8>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, package: &str, outcome: UpstreamFetch) {
        self.responses.entry(package.to_string()).or_default().push_back(outcome);
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn descriptor(&self, _scope: Option<&str>, package: &str, _etag: Option<&str>) -> Result<UpstreamFetch, CatalogError> {
        Ok(self
            .responses
            .get_mut(package)
            .and_then(|mut q| q.pop_front())
            .unwrap_or(UpstreamFetch::NotModified))
    }

    async fn readme(&self, package: &str, version_tag: &str, _readme_filename: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        Ok(self.readmes.get(&format!("{package}@{version_tag}")).map(|v| v.clone()))
    }
}

pub type SharedSourceHost = Arc<dyn SourceHost>;
pub type SharedRegistry = Arc<dyn Registry>;
