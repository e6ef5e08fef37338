//! The `Datastore` trait (§4.2, §9): an explicit dependency every task
//! handler takes instead of reaching for a process-global store, so
//! tests can inject an in-memory fake exactly as cheaply as production
//! code uses the real one.

use async_trait::async_trait;
use catalog_core::{Author, CollectionReference, Content, ContentRole, Library, LibraryId, Sitemap, Version, VersionCache};

/// A held lock on one root entity's key, scoping an "ancestor
/// transaction" (§4.2, §5). All writes to a library and its
/// descendants happen while holding the `RootLock` for that library's
/// id — this is what makes the `VersionCache` refresh-then-compare
/// sequence atomic with respect to concurrent writers, since the
/// underlying per-key maps only guarantee atomicity of a single
/// get/put, not of a read-modify-write sequence.
///
/// Dropping the guard releases the lock; there is no explicit
/// `commit`/`rollback` — the handler simply returns (spec.md §9: "a
/// stale refresh is safe because the scan is re-done inside the
/// transaction").
pub struct RootLock {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

/// A page of keys/entities plus an opaque cursor for the next page,
/// per spec.md §4.9 ("50 keys per page").
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait Datastore: Send + Sync {
    /// Acquires the ancestor-transaction lock for `id`. Reentrant
    /// within the same call chain is NOT supported — nested
    /// transactional helpers (e.g. the `VersionCache` refresh inside
    /// version-ready commit, §4.6 step 5) must be passed the already
    /// held lock rather than calling this again.
    async fn lock_root(&self, id: &LibraryId) -> RootLock;

    async fn get_library(&self, id: &LibraryId) -> Option<Library>;
    async fn put_library(&self, library: Library);
    /// Removes the library and every descendant entity (`Version`,
    /// `Content`, `VersionCache`, and any `CollectionReference`
    /// entities parented under it). Does not touch the search index —
    /// callers do that separately (spec.md §6's deletion cascade).
    async fn delete_library(&self, id: &LibraryId);

    async fn get_version(&self, library: &LibraryId, tag: &str) -> Option<Version>;
    async fn put_version(&self, library: &LibraryId, version: Version);
    async fn delete_version(&self, library: &LibraryId, tag: &str);
    async fn list_versions(&self, library: &LibraryId) -> Vec<Version>;

    async fn get_content(&self, library: &LibraryId, tag: &str, role: &ContentRole) -> Option<Content>;
    async fn put_content(&self, library: &LibraryId, tag: &str, content: Content);

    async fn get_version_cache(&self, library: &LibraryId) -> Option<VersionCache>;
    async fn put_version_cache(&self, library: &LibraryId, cache: VersionCache);

    /// Lazily deletes the reference if its target `Version` no longer
    /// exists (invariant 5), returning `None` in that case.
    async fn get_collection_reference(
        &self,
        member: &LibraryId,
        collection: &LibraryId,
        collection_tag: &str,
    ) -> Option<CollectionReference>;
    async fn put_collection_reference(&self, member: &LibraryId, reference: CollectionReference);
    async fn list_collection_references(&self, member: &LibraryId) -> Vec<CollectionReference>;

    async fn get_author(&self, login: &str) -> Option<Author>;
    async fn put_author(&self, author: Author);

    async fn list_libraries_page(&self, cursor: Option<String>, limit: usize) -> Page<Library>;
    async fn list_authors_page(&self, cursor: Option<String>, limit: usize) -> Page<Author>;

    async fn put_sitemap(&self, sitemap: Sitemap);
    async fn get_sitemap(&self, kind: catalog_core::SitemapKind) -> Option<Sitemap>;
}

impl RootLock {
    pub(crate) fn new(guard: tokio::sync::OwnedMutexGuard<()>) -> Self {
        Self { _guard: guard }
    }
}
