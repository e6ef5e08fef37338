//! Index builder (C8, §4.8).
//!
//! No full-text engine dependency appears anywhere relevant in the
//! retrieval pack, so [`SearchDocument`] is a plain struct handed to
//! an injected [`SearchIndex`] trait — the same explicit-dependency
//! seam as [`catalog_store::Datastore`]. The document is this crate's
//! deliverable; whatever serves search queries over it is an external
//! collaborator (spec.md §1).

use crate::collaborators::Collaborators;
use async_trait::async_trait;
use catalog_core::{ContentBody, ContentRole, ErrorCode, HandlerResult, Kind, LibraryId};
use catalog_queue::QueueName;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Fixed epoch `rank` is measured against (§4.8 step 6); an arbitrary
/// but stable zero point, not a deployment date.
fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchDocument {
    pub owner: String,
    pub github_owner: Option<String>,
    pub repo: String,
    pub kind: String,
    pub version: String,
    pub github_description: Option<String>,
    pub manifest_description: Option<String>,
    pub registry_description: Option<String>,
    pub manifest_keywords: Vec<String>,
    pub registry_keywords: Vec<String>,
    pub prefix_matches: Vec<String>,
    pub element: String,
    pub behavior: String,
    pub weighted_fields: String,
    pub rank: i64,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn put(&self, library: &LibraryId, document: SearchDocument);
    async fn remove(&self, library: &LibraryId);
}

#[derive(Default)]
pub struct MemorySearchIndex {
    documents: Mutex<BTreeMap<String, SearchDocument>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, library: &LibraryId) -> Option<SearchDocument> {
        self.documents.lock().unwrap().get(&library.id()).cloned()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn put(&self, library: &LibraryId, document: SearchDocument) {
        self.documents.lock().unwrap().insert(library.id(), document);
    }
    async fn remove(&self, library: &LibraryId) {
        self.documents.lock().unwrap().remove(&library.id());
    }
}

pub async fn update_indexes(collab: &Collaborators, search: &dyn SearchIndex, id: &LibraryId, now: DateTime<Utc>) -> HandlerResult {
    let Some(cache) = collab.store.get_version_cache(id).await else {
        return HandlerResult::permanent(ErrorCode::LibraryNoVersion, "no version cache to index from");
    };
    let Some(default_tag) = catalog_core::version::default_tag(&cache.versions) else {
        return HandlerResult::permanent(ErrorCode::LibraryNoVersion, "version cache is empty");
    };

    let Some(library) = collab.store.get_library(id).await else {
        return HandlerResult::Fatal(catalog_core::CatalogError::MissingEntity { key: id.id() });
    };
    if library.npm_package.is_some() {
        // Shadowed by a registry successor (§4.8 step 3).
        return HandlerResult::Continue;
    }

    let manifest_content = collab.store.get_content(id, &default_tag, &ContentRole::Bower).await;
    let manifest: Option<crate::manifest::BowerManifest> = manifest_content.and_then(|c| match c.body {
        Some(ContentBody::Json(value)) => serde_json::from_value(value).ok(),
        _ => None,
    });

    let analysis_content = collab.store.get_content(id, &default_tag, &ContentRole::Analysis).await;
    let analysis_json = analysis_content.and_then(|c| match c.body {
        Some(ContentBody::Json(value)) => Some(value),
        _ => None,
    });
    let (element_field, behavior_field) = analysis_json.as_ref().map(extract_elements_and_behaviors).unwrap_or_default();

    let github_description = library
        .metadata
        .body
        .as_deref()
        .and_then(|body| serde_json::from_str::<serde_json::Value>(body).ok())
        .and_then(|v| v.get("description").and_then(|d| d.as_str()).map(str::to_string));

    let registry_descriptor: Option<catalog_registry::RegistryDescriptor> = library
        .registry_metadata
        .body
        .as_deref()
        .and_then(|body| serde_json::from_str(body).ok());
    let registry_description = registry_descriptor.as_ref().and_then(|d| d.description.clone());
    let registry_keywords = registry_descriptor.map(|d| d.keywords).unwrap_or_default();

    let repo = library.github_repo.clone().unwrap_or_else(|| id.package.clone());
    let owner = library.github_owner.clone().unwrap_or_else(|| id.scope.clone());

    let mut prefix_source = vec![repo.clone()];
    prefix_source.extend(github_description.clone());
    prefix_source.extend(manifest.as_ref().and_then(|m| m.description.clone()));
    prefix_source.extend(registry_description.clone());
    let prefix_matches = build_prefix_matches(&prefix_source);

    let mut weighted_tokens = vec![repo.clone(); 10];
    if !element_field.is_empty() {
        weighted_tokens.extend(std::iter::repeat(element_field.clone()).take(5));
    }
    if !behavior_field.is_empty() {
        weighted_tokens.extend(std::iter::repeat(behavior_field.clone()).take(5));
    }
    let weighted_fields = weighted_tokens.join(" ");

    let document = SearchDocument {
        owner: owner.clone(),
        github_owner: library.github_owner.clone(),
        repo: repo.clone(),
        kind: match library.kind {
            Kind::Element => "element".to_string(),
            Kind::Collection => "collection".to_string(),
        },
        version: default_tag.clone(),
        github_description,
        manifest_description: manifest.as_ref().and_then(|m| m.description.clone()),
        registry_description,
        manifest_keywords: manifest.as_ref().map(|m| m.keywords.clone()).unwrap_or_default(),
        registry_keywords,
        prefix_matches,
        element: element_field,
        behavior: behavior_field,
        weighted_fields,
        rank: (library.updated - epoch()).num_seconds(),
    };
    search.put(id, document).await;

    if library.kind == Kind::Collection {
        if let Some(manifest) = &manifest {
            for (dep_name, range) in &manifest.dependencies {
                let member_id = parse_dependency_id(dep_name, &owner);
                let reference = catalog_core::CollectionReference {
                    collection: id.clone(),
                    collection_tag: default_tag.clone(),
                    range: range.clone(),
                };
                collab.store.put_collection_reference(&member_id, reference).await;
                let _ = collab.queue.enqueue(QueueName::Default, format!("tasks/library/ensure/{}", member_id.id())).await;
            }
        }
    }

    // Race guard (§4.8 step 8): the default version may have moved
    // while this build ran; re-check and ask the queue to retry if so.
    let after = collab.store.get_version_cache(id).await;
    if after.and_then(|c| catalog_core::version::default_tag(&c.versions)) != Some(default_tag) {
        return HandlerResult::retry("default version changed during index build");
    }

    HandlerResult::Continue
}

/// Bower dependency keys are usually bare package names, resolved
/// against the collection's own GitHub org (elements in a collection
/// conventionally live alongside it); a `owner/repo` key overrides that.
fn parse_dependency_id(name: &str, collection_owner: &str) -> LibraryId {
    let trimmed = name.trim_start_matches('@');
    if let Some((owner, repo)) = trimmed.split_once('/') {
        LibraryId::github(owner, repo)
    } else {
        LibraryId::github(collection_owner, trimmed)
    }
}

/// Extracts `element`/`behavior` text fields from analysis JSON,
/// supporting both the new `analyzerData` schema and the legacy
/// `elementsByTagName`/`behaviorsByName` maps (§4.8 step 4).
fn extract_elements_and_behaviors(value: &serde_json::Value) -> (String, String) {
    if let Some(elements) = value.get("elements").and_then(|v| v.as_array()) {
        let element_names: Vec<String> = elements
            .iter()
            .filter_map(|e| e.get("tagname").or_else(|| e.get("classname")).and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect();
        let behavior_names: Vec<String> = value
            .get("metadata")
            .and_then(|m| m.get("polymer"))
            .and_then(|p| p.get("behaviors"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|b| b.get("name").and_then(|v| v.as_str())).map(str::to_string).collect())
            .unwrap_or_default();
        return (element_names.join(" "), behavior_names.join(" "));
    }

    let element_names: Vec<String> = value
        .get("elementsByTagName")
        .and_then(|v| v.as_object())
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    let behavior_names: Vec<String> = value
        .get("behaviorsByName")
        .and_then(|v| v.as_object())
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    (element_names.join(" "), behavior_names.join(" "))
}

/// Builds `prefix_matches`: three-character-or-longer prefixes of
/// every word, additionally tokenizing on CamelCase boundaries.
fn build_prefix_matches(sources: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for source in sources {
        for word in tokenize(source) {
            let lower = word.to_lowercase();
            let chars: Vec<char> = lower.chars().collect();
            for len in 3..=chars.len() {
                out.push(chars[..len].iter().collect());
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

fn tokenize(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for raw_word in text.split(|c: char| !c.is_alphanumeric()) {
        if raw_word.is_empty() {
            continue;
        }
        words.push(raw_word.to_string());
        let mut current = String::new();
        for ch in raw_word.chars() {
            if ch.is_uppercase() && !current.is_empty() {
                words.push(current.clone());
                current.clear();
            }
            current.push(ch);
        }
        if !current.is_empty() && current != raw_word {
            words.push(current);
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{FakeRegistry, FakeSourceHost};
    use catalog_core::{Content, Library, Status, Version, VersionCache};
    use catalog_queue::{MemoryTaskQueue, RecordingAnalysisPublisher, TaskQueue};
    use catalog_store::MemoryDatastore;
    use std::sync::Arc;

    fn collab() -> Collaborators {
        Collaborators {
            store: Arc::new(MemoryDatastore::new()),
            queue: Arc::new(MemoryTaskQueue::default()),
            source_host: Arc::new(FakeSourceHost::new()),
            registry: Arc::new(FakeRegistry::new()),
            analysis: Arc::new(RecordingAnalysisPublisher::default()),
        }
    }

    #[tokio::test]
    async fn missing_version_cache_is_permanent_error() {
        let collab = collab();
        let index = MemorySearchIndex::new();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = update_indexes(&collab, &index, &id, now).await;
        assert!(matches!(result, HandlerResult::Permanent(ErrorCode::LibraryNoVersion, _)));
    }

    #[tokio::test]
    async fn shadowed_library_is_skipped() {
        let collab = collab();
        let index = MemorySearchIndex::new();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        collab.store.put_version_cache(&id, VersionCache { versions: vec!["v1.0.0".to_string()] }).await;
        let mut library = Library::new(id.clone(), Kind::Element, now);
        library.npm_package = Some(LibraryId::registry(Some("org"), "repo"));
        collab.store.put_library(library).await;

        let result = update_indexes(&collab, &index, &id, now).await;
        assert!(matches!(result, HandlerResult::Continue));
        assert!(index.get(&id).is_none());
    }

    #[tokio::test]
    async fn builds_document_with_weighted_fields_and_rank() {
        let collab = collab();
        let index = MemorySearchIndex::new();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        collab.store.put_version_cache(&id, VersionCache { versions: vec!["v1.0.0".to_string()] }).await;
        let mut library = Library::new(id.clone(), Kind::Element, now);
        library.github_owner = Some("org".to_string());
        library.github_repo = Some("repo".to_string());
        library.metadata.body = Some(r#"{"description":"a fast data-grid"}"#.to_string());
        library.updated = now;
        collab.store.put_library(library).await;
        let mut version = Version::new("v1.0.0", "sha1", now);
        version.status = Status::Ready;
        collab.store.put_version(&id, version).await;

        let mut bower = Content::pending(ContentRole::Bower, now);
        bower.body = Some(ContentBody::Json(serde_json::json!({"description": "a grid", "keywords": ["grid"]})));
        collab.store.put_content(&id, "v1.0.0", bower).await;

        let result = update_indexes(&collab, &index, &id, now).await;
        assert!(matches!(result, HandlerResult::Continue));

        let doc = index.get(&id).unwrap();
        assert_eq!(doc.repo, "repo");
        assert_eq!(doc.kind, "element");
        assert!(doc.prefix_matches.contains(&"fas".to_string()));
        assert_eq!(doc.weighted_fields.split(' ').count(), 10);
    }

    #[test]
    fn prefix_matches_tokenizes_camel_case() {
        let matches = build_prefix_matches(&["IronAjaxElement".to_string()]);
        assert!(matches.contains(&"iro".to_string()));
        assert!(matches.contains(&"aja".to_string()));
        assert!(matches.contains(&"ele".to_string()));
    }

    #[test]
    fn extract_prefers_new_analyzer_schema_over_legacy() {
        let value = serde_json::json!({
            "elements": [{"tagname": "iron-ajax"}],
            "elementsByTagName": {"legacy-el": {}}
        });
        let (elements, _) = extract_elements_and_behaviors(&value);
        assert_eq!(elements, "iron-ajax");
    }
}
