//! `MemoryDatastore`: the one production `Datastore` implementation.
//!
//! Backed by `dashmap`, the teacher's own choice for the concurrent
//! `HttpCache` (`deps-core::cache::HttpCache`). Per-root-key
//! `tokio::sync::Mutex` instances provide the "ancestor transaction"
//! serialization spec.md §4.2/§5 describe.

use crate::datastore::{Datastore, Page, RootLock};
use async_trait::async_trait;
use catalog_core::{
    Author, CollectionReference, Content, ContentBody, ContentRole, Library, LibraryId, Sitemap,
    SitemapKind, Version, VersionCache,
};
use dashmap::DashMap;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::sync::Arc;
use tokio::sync::Mutex;

/// JSON bodies are gzipped before they land in the map (spec.md §3);
/// text bodies are small and stored as-is.
struct StoredContent {
    content: Content,
    compressed_json: Option<Vec<u8>>,
}

fn compress_json(value: &serde_json::Value) -> Vec<u8> {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&bytes).expect("in-memory gzip write cannot fail");
    encoder.finish().expect("in-memory gzip finish cannot fail")
}

fn decompress_json(bytes: &[u8]) -> Option<serde_json::Value> {
    let mut decoder = GzDecoder::new(bytes);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded).ok()?;
    serde_json::from_slice(&decoded).ok()
}

#[derive(Default)]
pub struct MemoryDatastore {
    libraries: DashMap<String, Library>,
    versions: DashMap<(String, String), Version>,
    contents: DashMap<(String, String, String), StoredContent>,
    version_caches: DashMap<String, VersionCache>,
    collection_refs: DashMap<(String, String), CollectionReference>,
    authors: DashMap<String, Author>,
    sitemaps: DashMap<String, Sitemap>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn lock_root(&self, id: &LibraryId) -> RootLock {
        let lock = self.lock_for(&id.id());
        let guard = lock.lock_owned().await;
        RootLock::new(guard)
    }

    async fn get_library(&self, id: &LibraryId) -> Option<Library> {
        self.libraries.get(&id.id()).map(|entry| entry.clone())
    }

    async fn put_library(&self, library: Library) {
        self.libraries.insert(library.id.id(), library);
    }

    async fn delete_library(&self, id: &LibraryId) {
        let key = id.id();
        self.libraries.remove(&key);
        self.version_caches.remove(&key);
        self.versions.retain(|(lib, _), _| lib != &key);
        self.contents.retain(|(lib, _, _), _| lib != &key);
        self.collection_refs.retain(|(member, _), _| member != &key);
    }

    async fn get_version(&self, library: &LibraryId, tag: &str) -> Option<Version> {
        self.versions
            .get(&(library.id(), tag.to_string()))
            .map(|entry| entry.clone())
    }

    async fn put_version(&self, library: &LibraryId, version: Version) {
        self.versions
            .insert((library.id(), version.tag.clone()), version);
    }

    async fn delete_version(&self, library: &LibraryId, tag: &str) {
        self.versions.remove(&(library.id(), tag.to_string()));
        let lib_key = library.id();
        let tag_owned = tag.to_string();
        self.contents
            .retain(|(lib, t, _), _| !(lib == &lib_key && t == &tag_owned));
    }

    async fn list_versions(&self, library: &LibraryId) -> Vec<Version> {
        let key = library.id();
        self.versions
            .iter()
            .filter(|entry| entry.key().0 == key)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn get_content(&self, library: &LibraryId, tag: &str, role: &ContentRole) -> Option<Content> {
        self.contents
            .get(&(library.id(), tag.to_string(), role.id()))
            .map(|entry| {
                let mut content = entry.content.clone();
                if let Some(bytes) = &entry.compressed_json {
                    content.body = decompress_json(bytes).map(ContentBody::Json);
                }
                content
            })
    }

    async fn put_content(&self, library: &LibraryId, tag: &str, mut content: Content) {
        let compressed_json = match &content.body {
            Some(ContentBody::Json(value)) => Some(compress_json(value)),
            _ => None,
        };
        if compressed_json.is_some() {
            content.body = None;
        }
        self.contents.insert(
            (library.id(), tag.to_string(), content.role.id()),
            StoredContent { content, compressed_json },
        );
    }

    async fn get_version_cache(&self, library: &LibraryId) -> Option<VersionCache> {
        self.version_caches.get(&library.id()).map(|entry| entry.clone())
    }

    async fn put_version_cache(&self, library: &LibraryId, cache: VersionCache) {
        self.version_caches.insert(library.id(), cache);
    }

    async fn get_collection_reference(
        &self,
        member: &LibraryId,
        collection: &LibraryId,
        collection_tag: &str,
    ) -> Option<CollectionReference> {
        let reference_id = format!("{}/{}", collection.id(), collection_tag);
        let found = self
            .collection_refs
            .get(&(member.id(), reference_id))
            .map(|entry| entry.clone());

        if let Some(reference) = &found {
            let target_exists = self
                .versions
                .contains_key(&(collection.id(), reference.collection_tag.clone()));
            if !target_exists {
                // Invariant 5: lazy-delete a stale reference on read.
                self.collection_refs
                    .remove(&(member.id(), reference.id()));
                return None;
            }
        }
        found
    }

    async fn put_collection_reference(&self, member: &LibraryId, reference: CollectionReference) {
        self.collection_refs
            .insert((member.id(), reference.id()), reference);
    }

    async fn list_collection_references(&self, member: &LibraryId) -> Vec<CollectionReference> {
        let key = member.id();
        self.collection_refs
            .iter()
            .filter(|entry| entry.key().0 == key)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn get_author(&self, login: &str) -> Option<Author> {
        self.authors.get(&login.to_lowercase()).map(|entry| entry.clone())
    }

    async fn put_author(&self, author: Author) {
        self.authors.insert(author.login.to_lowercase(), author);
    }

    async fn list_libraries_page(&self, cursor: Option<String>, limit: usize) -> Page<Library> {
        let mut keys: Vec<String> = self.libraries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        page_by_key(&keys, cursor, limit, |key| self.libraries.get(key).map(|e| e.clone()))
    }

    async fn list_authors_page(&self, cursor: Option<String>, limit: usize) -> Page<Author> {
        let mut keys: Vec<String> = self.authors.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        page_by_key(&keys, cursor, limit, |key| self.authors.get(key).map(|e| e.clone()))
    }

    async fn put_sitemap(&self, sitemap: Sitemap) {
        let key = match sitemap.kind {
            SitemapKind::Elements => "elements",
            SitemapKind::Collections => "collections",
            SitemapKind::Authors => "authors",
        };
        self.sitemaps.insert(key.to_string(), sitemap);
    }

    async fn get_sitemap(&self, kind: SitemapKind) -> Option<Sitemap> {
        let key = match kind {
            SitemapKind::Elements => "elements",
            SitemapKind::Collections => "collections",
            SitemapKind::Authors => "authors",
        };
        self.sitemaps.get(key).map(|entry| entry.clone())
    }
}

fn page_by_key<T>(
    keys: &[String],
    cursor: Option<String>,
    limit: usize,
    get: impl Fn(&String) -> Option<T>,
) -> Page<T> {
    let start = match &cursor {
        Some(after) => keys.iter().position(|k| k == after).map(|i| i + 1).unwrap_or(0),
        None => 0,
    };
    let slice = &keys[start.min(keys.len())..];
    let items: Vec<T> = slice.iter().take(limit).filter_map(get).collect();
    let next_cursor = if slice.len() > limit {
        slice.get(limit - 1).cloned()
    } else {
        None
    };
    Page { items, next_cursor }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::Kind;
    use chrono::Utc;

    fn lib(owner: &str, repo: &str) -> Library {
        Library::new(LibraryId::github(owner, repo), Kind::Element, Utc::now())
    }

    #[tokio::test]
    async fn put_then_get_library_round_trips() {
        let store = MemoryDatastore::new();
        let library = lib("org", "repo");
        let id = library.id.clone();
        store.put_library(library).await;
        let fetched = store.get_library(&id).await.unwrap();
        assert_eq!(fetched.id.id(), "org/repo");
    }

    #[tokio::test]
    async fn delete_library_cascades_versions_and_content() {
        let store = MemoryDatastore::new();
        let library = lib("org", "repo");
        let id = library.id.clone();
        store.put_library(library).await;
        store
            .put_version(&id, Version::new("v1.0.0", "sha1", Utc::now()))
            .await;
        store
            .put_content(&id, "v1.0.0", Content::pending(ContentRole::Readme, Utc::now()))
            .await;
        store
            .put_version_cache(&id, VersionCache { versions: vec!["v1.0.0".into()] })
            .await;

        store.delete_library(&id).await;

        assert!(store.get_library(&id).await.is_none());
        assert!(store.get_version(&id, "v1.0.0").await.is_none());
        assert!(store.get_content(&id, "v1.0.0", &ContentRole::Readme).await.is_none());
        assert!(store.get_version_cache(&id).await.is_none());
    }

    #[tokio::test]
    async fn collection_reference_lazy_deletes_on_stale_read() {
        let store = MemoryDatastore::new();
        let member = LibraryId::github("org", "member");
        let collection = LibraryId::github("org", "collection");
        let reference = CollectionReference {
            collection: collection.clone(),
            collection_tag: "v0.0.1".into(),
            range: "^1.0.0".into(),
        };
        store.put_collection_reference(&member, reference).await;

        // Target version doesn't exist yet -> lazily deleted on read.
        let found = store.get_collection_reference(&member, &collection, "v0.0.1").await;
        assert!(found.is_none());
        assert!(store.list_collection_references(&member).await.is_empty());
    }

    #[tokio::test]
    async fn collection_reference_survives_when_target_exists() {
        let store = MemoryDatastore::new();
        let member = LibraryId::github("org", "member");
        let collection = LibraryId::github("org", "collection");
        store
            .put_version(&collection, Version::new("v0.0.1", "sha", Utc::now()))
            .await;
        let reference = CollectionReference {
            collection: collection.clone(),
            collection_tag: "v0.0.1".into(),
            range: "^1.0.0".into(),
        };
        store.put_collection_reference(&member, reference).await;

        let found = store.get_collection_reference(&member, &collection, "v0.0.1").await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn paging_walks_all_libraries_in_pages() {
        let store = MemoryDatastore::new();
        for i in 0..5 {
            store.put_library(lib("org", &format!("repo{i}"))).await;
        }

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = store.list_libraries_page(cursor.clone(), 2).await;
            seen.extend(page.items.into_iter().map(|l| l.id.id()));
            if page.next_cursor.is_none() {
                break;
            }
            cursor = page.next_cursor;
        }
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn root_lock_serializes_concurrent_writers() {
        let store = Arc::new(MemoryDatastore::new());
        let id = LibraryId::github("org", "repo");
        store.put_library(lib("org", "repo")).await;

        let store_a = store.clone();
        let id_a = id.clone();
        let handle_a = tokio::spawn(async move {
            let _lock = store_a.lock_root(&id_a).await;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let started = std::time::Instant::now();
        let _lock_b = store.lock_root(&id).await;
        handle_a.await.unwrap();
        assert!(started.elapsed() >= std::time::Duration::from_millis(10));
    }
}
