//! Library ingestor/updater (C5, §4.5).
//!
//! `Ensure`, `Update`, and `IngestWebhook` all funnel through
//! [`reconcile`], parameterized by [`IngestOptions`] the way §4.5
//! describes ("share one procedure parameterized by four choices").
//! `IngestPreview` is its own, much smaller entry point
//! ([`ingest_preview`]) since shallow ingestion skips tag enumeration
//! and author ingestion entirely.

use crate::collaborators::Collaborators;
use crate::license;
use crate::manifest::BowerManifest;
use crate::upstream::UpstreamFetch;
use catalog_core::{version, CatalogError, Content, ContentRole, ErrorCode, HandlerResult, Kind, Library, LibraryId, Status, Version};
use catalog_queue::{AnalysisRequest, QueueName};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub create_if_absent: bool,
    pub shallow: bool,
    pub honor_existing_error: bool,
    pub commit_ready: bool,
}

impl IngestOptions {
    pub const fn ensure() -> Self {
        Self { create_if_absent: true, shallow: false, honor_existing_error: true, commit_ready: true }
    }
    pub const fn update() -> Self {
        Self { create_if_absent: false, shallow: false, honor_existing_error: true, commit_ready: true }
    }
    pub const fn webhook() -> Self {
        Self { create_if_absent: true, shallow: false, honor_existing_error: false, commit_ready: true }
    }
}

struct TagPlan {
    new_tag_map: Vec<(String, String)>,
    kind: Kind,
}

/// Shared ingestion/update procedure (§4.5).
pub async fn reconcile(collab: &Collaborators, id: &LibraryId, options: IngestOptions, now: DateTime<Utc>) -> HandlerResult {
    let existing = collab.store.get_library(id).await;
    let mut library = match existing {
        Some(library) => library,
        None if options.create_if_absent => Library::new(id.clone(), Kind::Element, now),
        None => return HandlerResult::Fatal(CatalogError::MissingEntity { key: id.id() }),
    };

    if options.honor_existing_error && library.status == Status::Error {
        return HandlerResult::Continue;
    }

    library.shallow_ingestion = options.shallow;
    if library.github_owner.is_none() || library.github_repo.is_none() {
        if id.is_registry() {
            // Resolved below, once the registry descriptor is fetched.
        } else {
            library.github_owner = Some(id.scope.clone());
            library.github_repo = Some(id.package.clone());
        }
    }

    // --- metadata reconciliation -------------------------------------
    let mut registry_descriptor: Option<catalog_registry::RegistryDescriptor> = None;
    if id.is_registry() {
        let fetch = match collab.registry.descriptor(Some(&id.scope.trim_start_matches('@')), &id.package, library.registry_metadata.etag.as_deref()).await {
            Ok(fetch) => fetch,
            Err(err) => return err.into(),
        };
        match fetch {
            UpstreamFetch::NotFound => {
                collab.store.delete_library(id).await;
                return HandlerResult::Continue;
            }
            UpstreamFetch::QuotaExceeded => return HandlerResult::retry("registry quota exceeded"),
            UpstreamFetch::ServerError(status) => return HandlerResult::retry(format!("registry 5xx ({status})")),
            UpstreamFetch::NotModified => {}
            UpstreamFetch::Found { bytes, etag } => {
                let descriptor: catalog_registry::RegistryDescriptor = match serde_json::from_slice(&bytes) {
                    Ok(d) => d,
                    Err(source) => {
                        return HandlerResult::permanent(ErrorCode::LibraryParseRegistry, source.to_string());
                    }
                };
                let body = String::from_utf8_lossy(&bytes).to_string();
                library.registry_metadata.store(body, etag, now);

                if let Some((owner, repo)) = descriptor.repository_owner_repo() {
                    let stored = (library.github_owner.clone(), library.github_repo.clone());
                    if stored.0.as_deref() != Some(owner.as_str()) || stored.1.as_deref() != Some(repo.as_str()) {
                        collab.store.delete_library(id).await;
                        let new_id = LibraryId::github(&owner, &repo);
                        let _ = collab.queue.enqueue(QueueName::Default, format!("tasks/library/ensure/{}", new_id.id())).await;
                        return HandlerResult::Continue;
                    }
                    library.github_owner = Some(owner);
                    library.github_repo = Some(repo);
                }
                registry_descriptor = Some(descriptor);
            }
        }
    }

    let (owner, repo) = match (library.github_owner.clone(), library.github_repo.clone()) {
        (Some(o), Some(r)) => (o, r),
        _ => return HandlerResult::permanent(ErrorCode::LibraryNoGithub, "no source-host coordinates resolved"),
    };

    let repo_fetch = match collab.source_host.repo(&owner, &repo, library.metadata.etag.as_deref()).await {
        Ok(fetch) => fetch,
        Err(err) => return err.into(),
    };
    let mut descriptor_license: Option<String> = None;
    match repo_fetch {
        UpstreamFetch::NotFound => {
            collab.store.delete_library(id).await;
            return HandlerResult::Continue;
        }
        UpstreamFetch::QuotaExceeded => return HandlerResult::retry("upstream quota exceeded"),
        UpstreamFetch::ServerError(status) => return HandlerResult::retry(format!("upstream 5xx ({status})")),
        UpstreamFetch::NotModified => {}
        UpstreamFetch::Found { bytes, etag } => {
            let parsed: serde_json::Value = match serde_json::from_slice(&bytes) {
                Ok(v) => v,
                Err(source) => return HandlerResult::permanent(ErrorCode::LibraryParseMetadata, source.to_string()),
            };
            descriptor_license = parsed
                .get("license")
                .and_then(|l| l.get("spdx_id"))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let body = String::from_utf8_lossy(&bytes).to_string();
            library.metadata.store(body, etag, now);
        }
    }

    if !options.shallow {
        match collab.source_host.contributors(&owner, &repo, library.contributors.etag.as_deref()).await {
            Ok(UpstreamFetch::Found { bytes, etag }) => {
                library.contributors.store(String::from_utf8_lossy(&bytes).to_string(), etag, now);
            }
            Ok(UpstreamFetch::NotModified) | Ok(UpstreamFetch::NotFound) => {}
            Ok(UpstreamFetch::QuotaExceeded) => return HandlerResult::retry("contributors quota exceeded"),
            Ok(UpstreamFetch::ServerError(status)) => return HandlerResult::retry(format!("contributors 5xx ({status})")),
            Err(err) => return err.into(),
        }

        match collab.source_host.participation(&owner, &repo, library.participation.etag.as_deref()).await {
            Ok(UpstreamFetch::Found { bytes, etag }) => {
                library.participation.store(String::from_utf8_lossy(&bytes).to_string(), etag, now);
            }
            Ok(UpstreamFetch::NotModified) | Ok(UpstreamFetch::NotFound) => {}
            Ok(UpstreamFetch::QuotaExceeded) => return HandlerResult::retry("participation quota exceeded"),
            Ok(UpstreamFetch::ServerError(status)) => return HandlerResult::retry(format!("participation 5xx ({status})")),
            Err(err) => return err.into(),
        }
    }

    // --- default-branch manifest (license fallback + kind) ------------
    let master_sha = match collab.source_host.master_ref(&owner, &repo, None).await {
        Ok(UpstreamFetch::Found { bytes, .. }) => extract_master_sha(&bytes),
        Ok(UpstreamFetch::NotModified) => None,
        Ok(UpstreamFetch::NotFound) => {
            return HandlerResult::permanent(ErrorCode::LibraryCollectionMaster, "no default branch head");
        }
        Ok(UpstreamFetch::QuotaExceeded) => return HandlerResult::retry("master ref quota exceeded"),
        Ok(UpstreamFetch::ServerError(status)) => return HandlerResult::retry(format!("master ref 5xx ({status})")),
        Err(err) => return err.into(),
    };

    let manifest = if let Some(sha) = &master_sha {
        match collab.source_host.contents(&owner, &repo, "bower.json", sha).await {
            Ok(Some(bytes)) => match BowerManifest::parse(&bytes) {
                Ok(manifest) => Some(manifest),
                Err(_) => None,
            },
            Ok(None) => None,
            Err(err) => return err.into(),
        }
    } else {
        None
    };

    let resolved_license = license::resolve([
        descriptor_license.as_deref(),
        manifest.as_ref().and_then(|m| m.license.as_deref()),
        registry_descriptor.as_ref().and_then(|d| d.license.as_deref()),
    ]);
    let kind = if manifest.as_ref().is_some_and(BowerManifest::is_collection) {
        Kind::Collection
    } else {
        Kind::Element
    };
    library.kind = kind;

    match resolved_license {
        Some(identifier) => library.spdx_identifier = Some(identifier),
        None => return HandlerResult::permanent(ErrorCode::LibraryLicense, "no valid SPDX identifier resolved"),
    }

    if options.shallow {
        collab.store.put_library(library).await;
        return HandlerResult::Continue;
    }

    // --- tag discovery -------------------------------------------------
    let plan = match build_tag_plan(collab, &library, &owner, &repo, kind, master_sha.as_deref(), registry_descriptor.as_ref()).await {
        Ok(plan) => plan,
        Err(result) => return result,
    };
    library.kind = plan.kind;

    let existing_version_tags: Vec<String> = collab.store.list_versions(id).await.into_iter().map(|v| v.tag).collect();
    let new_keys: Vec<String> = plan.new_tag_map.iter().map(|(k, _)| k.clone()).collect();

    let mut to_add: Vec<String> = new_keys.iter().filter(|t| !existing_version_tags.contains(t)).cloned().collect();
    let to_delete: Vec<String> = existing_version_tags.iter().filter(|t| !new_keys.contains(t)).cloned().collect();

    if existing_version_tags.is_empty() {
        if let Some(first) = pick_default(&to_add) {
            to_add = vec![first];
        }
    } else if let Some(baseline) = pick_default(&existing_version_tags) {
        let baseline_parsed = version::parse(&baseline);
        to_add.retain(|t| match (version::parse(t), &baseline_parsed) {
            (Some(tv), Some(bv)) => version::compare_tags(&tv, bv) == std::cmp::Ordering::Greater,
            _ => true,
        });
    }

    library.tag_map = plan.new_tag_map;
    library.tags = library.tag_map_keys();
    if kind == Kind::Collection {
        library.collection_sequence_number = collection_sequence_from_tags(&library.tags);
    }

    let mut author_to_ensure: Option<String> = None;

    if !to_add.is_empty() {
        // At most one new tag is ingested per pass (§4.5); pick the newest
        // of the candidates, not whichever happened to sort first out of
        // upstream's tag listing.
        let Some(tag) = pick_default(&to_add) else {
            return HandlerResult::permanent(ErrorCode::LibraryElementParseTags, "no parseable tag among candidates");
        };
        let sha = library.tag_map_get(&tag).unwrap_or_default().to_string();
        if !version_exists(&existing_version_tags, &tag) {
            let mut v = Version::new(tag.clone(), sha.clone(), now);
            v.status = Status::Pending;
            collab.store.put_version(id, v).await;
            let _ = collab
                .queue
                .enqueue(QueueName::Default, format!("tasks/version/ingest/{}/{}", id.id(), urlencoding::encode(&tag)))
                .await;
            // A pending analysis Content entity must exist before the worker's
            // reply arrives, or `apply_analysis_reply` drops it as stale (§4.7 step 1).
            collab.store.put_content(id, &tag, Content::pending(ContentRole::Analysis, now)).await;
            let _ = collab.analysis.publish(AnalysisRequest {
                library: id.id(),
                tag: tag.clone(),
                sha,
                manifest_url: None,
            }).await;
            author_to_ensure = Some(owner.clone());
        }
    } else if let Some(tag) = to_delete.first() {
        collab.store.delete_version(id, tag).await;
        let changed = catalog_store::version_cache::refresh(&collab.store, id).await;
        if changed {
            let _ = collab.queue.enqueue(QueueName::Update, format!("tasks/index/update/{}", id.id())).await;
        }
    }

    if let Some(login) = author_to_ensure {
        let _ = collab.queue.enqueue(QueueName::Default, format!("tasks/author/ensure/{login}")).await;
    }

    if library.tag_map.is_empty() {
        return HandlerResult::permanent(ErrorCode::LibraryNoVersion, "no valid version tags discovered");
    }

    if options.commit_ready {
        library.status = Status::Ready;
        library.error = None;
    }
    library.updated = now;
    collab.store.put_library(library).await;
    HandlerResult::Continue
}

/// Shallow preview ingestion (§8 scenario 6): creates the library if
/// absent with `shallow_ingestion = true` and a single preview Version,
/// skipping tag enumeration and author ingestion entirely.
pub async fn ingest_preview(collab: &Collaborators, id: &LibraryId, commit_sha: &str, pr_url: Option<String>, now: DateTime<Utc>) -> HandlerResult {
    let mut library = match collab.store.get_library(id).await {
        Some(library) => library,
        None => {
            let mut library = Library::new(id.clone(), Kind::Element, now);
            library.github_owner = Some(id.scope.clone());
            library.github_repo = Some(id.package.clone());
            library
        }
    };
    library.shallow_ingestion = true;

    let mut version = Version::new(commit_sha.to_string(), commit_sha.to_string(), now);
    version.preview = true;
    version.url = pr_url;
    version.status = Status::Pending;
    collab.store.put_version(id, version).await;

    library.tag_map_set(commit_sha.to_string(), commit_sha.to_string());
    library.tags = library.tag_map_keys();
    library.updated = now;
    collab.store.put_library(library).await;

    let _ = collab
        .queue
        .enqueue(QueueName::Default, format!("tasks/version/ingest/{}/{}", id.id(), commit_sha))
        .await;

    HandlerResult::Continue
}

fn pick_default(tags: &[String]) -> Option<String> {
    version::default_tag(tags)
}

fn version_exists(existing: &[String], tag: &str) -> bool {
    existing.iter().any(|t| t == tag)
}

/// A collection's pseudo-version tags are always `v0.0.N`; the sequence
/// number is the highest `N` seen, so it survives reconcile re-runs
/// without needing its own persisted field mutation inside `build_tag_plan`.
fn collection_sequence_from_tags(tags: &[String]) -> u64 {
    tags.iter()
        .filter_map(|t| t.strip_prefix("v0.0.").and_then(|n| n.parse::<u64>().ok()))
        .max()
        .unwrap_or(0)
}

fn extract_master_sha(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value.get("object").and_then(|o| o.get("sha")).and_then(|s| s.as_str()).map(str::to_string)
}

async fn build_tag_plan(
    collab: &Collaborators,
    library: &Library,
    owner: &str,
    repo: &str,
    kind: Kind,
    master_sha: Option<&str>,
    registry_descriptor: Option<&catalog_registry::RegistryDescriptor>,
) -> Result<TagPlan, HandlerResult> {
    match kind {
        Kind::Collection => {
            let sha = master_sha.ok_or_else(|| HandlerResult::permanent(ErrorCode::LibraryCollectionMaster, "missing default branch head"))?;
            let current_tag = if library.collection_sequence_number > 0 {
                Some(format!("v0.0.{}", library.collection_sequence_number))
            } else {
                None
            };
            let stored_sha = current_tag.as_deref().and_then(|t| library.tag_map_get(t));
            let mut new_tag_map = library.tag_map.clone();
            if stored_sha != Some(sha) {
                let next_seq = library.collection_sequence_number + 1;
                new_tag_map.push((format!("v0.0.{next_seq}"), sha.to_string()));
            }
            Ok(TagPlan { new_tag_map, kind })
        }
        Kind::Element if library.npm_package.is_none() && !library_is_registry(library) => {
            let fetch = collab
                .source_host
                .tags(owner, repo, None)
                .await
                .map_err(HandlerResult::from)?;
            match fetch {
                UpstreamFetch::Found { bytes, .. } => {
                    let entries: Vec<serde_json::Value> = serde_json::from_slice(&bytes)
                        .map_err(|e| HandlerResult::permanent(ErrorCode::LibraryElementParseTags, e.to_string()))?;
                    let mut new_tag_map = Vec::new();
                    for entry in entries {
                        let name = entry.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                        let sha = entry
                            .get("commit")
                            .and_then(|c| c.get("sha"))
                            .and_then(|v| v.as_str())
                            .unwrap_or_default();
                        if version::is_valid(name) {
                            new_tag_map.push((name.to_string(), sha.to_string()));
                        }
                    }
                    Ok(TagPlan { new_tag_map, kind })
                }
                UpstreamFetch::NotModified => Ok(TagPlan { new_tag_map: library.tag_map.clone(), kind }),
                UpstreamFetch::NotFound => Ok(TagPlan { new_tag_map: Vec::new(), kind }),
                UpstreamFetch::QuotaExceeded => Err(HandlerResult::retry("tags quota exceeded")),
                UpstreamFetch::ServerError(status) => Err(HandlerResult::retry(format!("tags 5xx ({status})"))),
            }
        }
        // Registry-sourced element (§4.5's table): the versions dict of
        // the registry descriptor is the authoritative tag source;
        // commit id may be the empty string when gitHead is unset.
        Kind::Element if library_is_registry(library) => {
            let new_tag_map = registry_descriptor
                .map(|d| d.versions.iter().map(|(v, entry)| (v.clone(), entry.git_head.clone())).collect())
                .unwrap_or_else(|| library.tag_map.clone());
            Ok(TagPlan { new_tag_map, kind })
        }
        Kind::Element => Ok(TagPlan { new_tag_map: library.tag_map.clone(), kind }),
    }
}

fn library_is_registry(library: &Library) -> bool {
    library.id.is_registry()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_default_prefers_non_prerelease() {
        let tags = vec!["v1.0.0-beta.1".to_string(), "v1.0.0".to_string(), "v0.9.0".to_string()];
        assert_eq!(pick_default(&tags), Some("v1.0.0".to_string()));
    }

    #[test]
    fn extract_master_sha_reads_ref_object() {
        let bytes = br#"{"object":{"sha":"abc123"}}"#;
        assert_eq!(extract_master_sha(bytes), Some("abc123".to_string()));
    }
}
