//! The package registry's REST surface (§4.3, §6.2): package
//! descriptor fetch, `node-semver` range matching, and the unpkg-style
//! secondary README fetcher (the registry descriptor only lists a
//! filename, never the body).

use catalog_github::{FetchClient, FetchOutcome};
use catalog_core::CatalogError;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryVersion {
    #[serde(default, rename = "gitHead")]
    pub git_head: String,
    #[serde(default, rename = "readmeFilename")]
    pub readme_filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryDescriptor {
    #[serde(default)]
    pub repository: Option<serde_json::Value>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub versions: std::collections::BTreeMap<String, RegistryVersion>,
}

impl RegistryDescriptor {
    /// The `repository` field is either `{"url": "..."}` or a bare
    /// `"owner/repo"` shorthand string; both forms appear in the wild.
    pub fn repository_owner_repo(&self) -> Option<(String, String)> {
        let value = self.repository.as_ref()?;
        let raw = if let Some(s) = value.as_str() {
            s.to_string()
        } else {
            value.get("url")?.as_str()?.to_string()
        };
        parse_owner_repo(&raw)
    }
}

fn parse_owner_repo(raw: &str) -> Option<(String, String)> {
    let cleaned = raw
        .trim_start_matches("git+")
        .trim_start_matches("https://github.com/")
        .trim_start_matches("git://github.com/")
        .trim_start_matches("git@github.com:")
        .trim_end_matches(".git")
        .trim_end_matches('/');
    let mut parts = cleaned.rsplitn(2, '/');
    let repo = parts.next()?;
    let owner = parts.next()?;
    if owner.is_empty() || repo.is_empty() || owner.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

pub enum DescriptorFetch {
    NotModified,
    Found { descriptor: RegistryDescriptor, etag: Option<String> },
    NotFound,
    QuotaExceeded,
    ServerError(u16),
}

pub struct RegistryClient {
    fetch: FetchClient,
    api_base: String,
    unpkg_base: String,
}

impl RegistryClient {
    pub fn new(api_base: impl Into<String>, unpkg_base: impl Into<String>) -> Self {
        Self {
            fetch: FetchClient::new("catalog-pipeline/0.1", Duration::from_secs(15), None),
            api_base: api_base.into(),
            unpkg_base: unpkg_base.into(),
        }
    }

    /// `GET /:scope/:package` (scope already includes its leading `@`
    /// for scoped packages, or is omitted entirely for unscoped ones).
    pub async fn descriptor(
        &self,
        scope: Option<&str>,
        package: &str,
        etag: Option<&str>,
    ) -> Result<DescriptorFetch, CatalogError> {
        let encoded_package = urlencoding::encode(package);
        let path = match scope {
            Some(scope) => format!("{scope}%2F{encoded_package}"),
            None => encoded_package.to_string(),
        };
        let url = format!("{}/{path}", self.api_base.trim_end_matches('/'));
        let outcome = self.fetch.fetch_with_etag(&url, etag).await?;
        Ok(match outcome {
            FetchOutcome::NotModified => DescriptorFetch::NotModified,
            FetchOutcome::NotFound => DescriptorFetch::NotFound,
            FetchOutcome::Forbidden => DescriptorFetch::QuotaExceeded,
            FetchOutcome::ServerError(status) => DescriptorFetch::ServerError(status),
            FetchOutcome::Ok(ok) => {
                let descriptor: RegistryDescriptor =
                    serde_json::from_slice(&ok.body).map_err(|source| CatalogError::Parse {
                        what: format!("registry descriptor for {package}"),
                        source,
                    })?;
                DescriptorFetch::Found {
                    descriptor,
                    etag: ok.etag,
                }
            }
        })
    }

    /// Finds the highest version matching `range`, delegating the
    /// actual range semantics to `node-semver` (§4.1 desugars
    /// shorthand ranges before they ever reach here).
    pub fn latest_matching<'a>(descriptor: &'a RegistryDescriptor, range: &str) -> Option<(&'a str, &'a RegistryVersion)> {
        let parsed_range = node_semver::Range::parse(range).ok()?;
        descriptor
            .versions
            .iter()
            .filter_map(|(tag, v)| {
                let version = node_semver::Version::parse(tag.trim_start_matches('v')).ok()?;
                parsed_range.satisfies(&version).then_some((tag.as_str(), v))
            })
            .max_by(|(a, _), (b, _)| {
                let av = node_semver::Version::parse(a.trim_start_matches('v')).unwrap();
                let bv = node_semver::Version::parse(b.trim_start_matches('v')).unwrap();
                av.cmp(&bv)
            })
    }

    /// Secondary fetch for registry package README content, since the
    /// descriptor only carries `readmeFilename`, never the body.
    pub async fn readme(&self, package: &str, version_tag: &str, readme_filename: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        let url = format!(
            "{}/{}@{}/{}",
            self.unpkg_base.trim_end_matches('/'),
            package,
            version_tag,
            readme_filename
        );
        match self.fetch.fetch(&url).await? {
            FetchOutcome::Ok(ok) => Ok(Some(ok.body.to_vec())),
            FetchOutcome::NotFound | FetchOutcome::NotModified => Ok(None),
            FetchOutcome::Forbidden => Err(CatalogError::QuotaExceeded { resource: url }),
            FetchOutcome::ServerError(status) => Err(CatalogError::UpstreamServerError { resource: url, status }),
        }
    }
}
