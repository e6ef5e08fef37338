//! C2: `VersionCache` refresh.
//!
//! The read path never scans `Version` entities directly — it reads
//! the derived `VersionCache` singleton instead. This module is the
//! only writer of that singleton. Callers must already hold the
//! `RootLock` for `library` (§4.2) before calling [`refresh`], since
//! the scan-then-compare-then-write sequence is not atomic on its own.

use catalog_core::{version, LibraryId, Status, VersionCache};
use std::sync::Arc;

use crate::datastore::Datastore;

/// Re-scans `library`'s `Version` children, recomputes the `ready`
/// tag list, and writes it back. Returns whether the *default*
/// version (per `version::default_version`) changed, which callers
/// use to decide whether a re-index (C8) is needed — rebuilding the
/// `VersionCache` on every version commit regardless of default-version
/// movement would be wasted work for preview/non-default releases.
pub async fn refresh(store: &Arc<dyn Datastore>, library: &LibraryId) -> bool {
    let existing = store.get_version_cache(library).await.unwrap_or_default();
    let old_default = default_of(&existing.versions);

    let mut ready_tags: Vec<String> = store
        .list_versions(library)
        .await
        .into_iter()
        .filter(|v| v.status == Status::Ready && version::is_valid(&v.tag))
        .map(|v| v.tag)
        .collect();

    let mut parsed: Vec<_> = ready_tags.iter().filter_map(|t| version::parse(t)).collect();
    version::sort_tags(&mut parsed);
    // sort_tags orders ascending; VersionCache stores descending (newest first),
    // matching the read path's expectation that versions[0] is latest.
    ready_tags = parsed.into_iter().rev().map(|t| t.raw).collect();

    let new_default = default_of(&ready_tags);
    let changed = old_default != new_default;

    store
        .put_version_cache(library, VersionCache { versions: ready_tags })
        .await;

    changed
}

fn default_of(tags: &[String]) -> Option<String> {
    version::default_tag(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatastore;
    use catalog_core::Version;
    use chrono::Utc;

    fn store() -> Arc<dyn Datastore> {
        Arc::new(MemoryDatastore::new())
    }

    #[tokio::test]
    async fn refresh_reports_no_change_when_cache_is_empty_and_stays_empty() {
        let store = store();
        let library = LibraryId::github("org", "repo");
        let changed = refresh(&store, &library).await;
        assert!(!changed);
        assert!(store.get_version_cache(&library).await.unwrap().versions.is_empty());
    }

    #[tokio::test]
    async fn refresh_detects_new_default_version() {
        let store = store();
        let library = LibraryId::github("org", "repo");

        let mut v1 = Version::new("v1.0.0", "sha1", Utc::now());
        v1.status = Status::Ready;
        store.put_version(&library, v1).await;
        let changed = refresh(&store, &library).await;
        assert!(changed);
        assert_eq!(
            store.get_version_cache(&library).await.unwrap().versions,
            vec!["v1.0.0".to_string()]
        );

        let mut v2 = Version::new("v2.0.0", "sha2", Utc::now());
        v2.status = Status::Ready;
        store.put_version(&library, v2).await;
        let changed = refresh(&store, &library).await;
        assert!(changed);
        assert_eq!(
            store.get_version_cache(&library).await.unwrap().versions,
            vec!["v2.0.0".to_string(), "v1.0.0".to_string()]
        );
    }

    #[tokio::test]
    async fn refresh_ignores_non_ready_and_invalid_tags() {
        let store = store();
        let library = LibraryId::github("org", "repo");

        let mut pending = Version::new("v1.0.0", "sha1", Utc::now());
        pending.status = Status::Pending;
        store.put_version(&library, pending).await;

        let mut malformed = Version::new("not-a-version", "sha2", Utc::now());
        malformed.status = Status::Ready;
        store.put_version(&library, malformed).await;

        let changed = refresh(&store, &library).await;
        assert!(!changed);
        assert!(store.get_version_cache(&library).await.unwrap().versions.is_empty());
    }

    #[tokio::test]
    async fn refresh_preview_release_does_not_change_default_if_stable_exists() {
        let store = store();
        let library = LibraryId::github("org", "repo");

        let mut stable = Version::new("v1.0.0", "sha1", Utc::now());
        stable.status = Status::Ready;
        store.put_version(&library, stable).await;
        refresh(&store, &library).await;

        let mut preview = Version::new("v2.0.0-beta.1", "sha2", Utc::now());
        preview.status = Status::Ready;
        store.put_version(&library, preview).await;
        let changed = refresh(&store, &library).await;
        assert!(!changed);
    }
}
