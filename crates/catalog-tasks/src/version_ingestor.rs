//! Version ingestor (C6, §4.6).

use crate::collaborators::Collaborators;
use crate::manifest::BowerManifest;
use catalog_core::{CatalogError, ContentBody, ContentRole, ErrorCode, HandlerResult, LibraryId, Status};
use catalog_core::Content;
use catalog_queue::QueueName;
use chrono::{DateTime, Utc};

pub async fn ingest_version(collab: &Collaborators, library_id: &LibraryId, tag: &str, now: DateTime<Utc>) -> HandlerResult {
    let Some(mut version) = collab.store.get_version(library_id, tag).await else {
        return HandlerResult::Fatal(CatalogError::MissingEntity { key: format!("{}/{}", library_id.id(), tag) });
    };
    if version.status == Status::Ready {
        return HandlerResult::Continue; // idempotent re-run (§8)
    }

    let Some(library) = collab.store.get_library(library_id).await else {
        return HandlerResult::Fatal(CatalogError::MissingEntity { key: library_id.id() });
    };

    let readme_bytes = if library_id.is_registry() {
        let readme_filename = "README.md"; // registry descriptor's readmeFilename, defaulted (§4.6 step 1)
        match collab.registry.readme(&library_id.package, tag, readme_filename).await {
            Ok(bytes) => bytes,
            Err(err) => return err.into(),
        }
    } else {
        let owner = library.github_owner.clone().unwrap_or_default();
        let repo = library.github_repo.clone().unwrap_or_default();
        match collab.source_host.readme(&owner, &repo, &version.sha).await {
            Ok(bytes) => bytes,
            Err(err) => return err.into(),
        }
    };

    let Some(readme_bytes) = readme_bytes else {
        return HandlerResult::permanent(ErrorCode::VersionMissingBower, "no readme available");
    };
    let readme_text = match String::from_utf8(readme_bytes) {
        Ok(text) => text,
        Err(_) => return HandlerResult::permanent(ErrorCode::VersionUtf, "readme is not valid UTF-8"),
    };

    let mut readme_content = Content::pending(ContentRole::Readme, now);
    readme_content.body = Some(ContentBody::Text(readme_text.clone()));
    readme_content.status = Status::Ready;
    collab.store.put_content(library_id, tag, readme_content).await;

    let rendered = match collab.source_host.render_markdown(&readme_text).await {
        Ok(html) => html,
        Err(err) => return err.into(),
    };
    let mut html_content = Content::pending(ContentRole::ReadmeHtml, now);
    html_content.body = Some(ContentBody::Text(rendered));
    html_content.status = Status::Ready;
    collab.store.put_content(library_id, tag, html_content).await;

    let manifest_bytes = if library_id.is_registry() {
        // §4.6 step 3: manifest fetch is source-host only; a registry
        // version with an empty gitHead has nothing to resolve it against.
        if version.sha.is_empty() {
            return HandlerResult::permanent(ErrorCode::VersionMissingBower, "registry version has no gitHead to fetch a manifest with");
        }
        None
    } else {
        let owner = library.github_owner.clone().unwrap_or_default();
        let repo = library.github_repo.clone().unwrap_or_default();
        match collab.source_host.contents(&owner, &repo, "bower.json", &version.sha).await {
            Ok(bytes) => bytes,
            Err(err) => return err.into(),
        }
    };

    let manifest_bytes = match manifest_bytes {
        Some(bytes) => bytes,
        None => return HandlerResult::permanent(ErrorCode::VersionMissingBower, "no bower.json at this commit"),
    };
    let manifest = match BowerManifest::parse(&manifest_bytes) {
        Ok(manifest) => manifest,
        Err(source) => return HandlerResult::permanent(ErrorCode::VersionParseBower, source.to_string()),
    };

    let manifest_json: serde_json::Value = serde_json::from_slice(&manifest_bytes).unwrap_or(serde_json::Value::Null);
    let mut bower_content = Content::pending(ContentRole::Bower, now);
    bower_content.body = Some(ContentBody::Json(manifest_json));
    bower_content.status = Status::Ready;
    collab.store.put_content(library_id, tag, bower_content).await;

    if !library_id.is_registry() {
        let owner = library.github_owner.clone().unwrap_or_default();
        let repo = library.github_repo.clone().unwrap_or_default();
        for (page_key, path) in &manifest.pages {
            let page_bytes = match collab.source_host.contents(&owner, &repo, path, &version.sha).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => return err.into(),
            };
            let page_text = String::from_utf8_lossy(&page_bytes).to_string();
            let rendered_page = match collab.source_host.render_markdown(&page_text).await {
                Ok(html) => html,
                Err(err) => return err.into(),
            };
            let mut page_content = Content::pending(ContentRole::Page(page_key.clone()), now);
            page_content.body = Some(ContentBody::Text(rendered_page));
            page_content.status = Status::Ready;
            collab.store.put_content(library_id, tag, page_content).await;
        }
    }

    version.status = Status::Ready;
    version.updated = now;
    collab.store.put_version(library_id, version).await;

    let changed = catalog_store::version_cache::refresh(&collab.store, library_id).await;
    if changed {
        let _ = collab.queue.enqueue(QueueName::Update, format!("tasks/index/update/{}", library_id.id())).await;
    }

    HandlerResult::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{FakeRegistry, FakeSourceHost};
    use catalog_core::{Library, Status as EntityStatus, Version};
    use catalog_queue::{MemoryTaskQueue, RecordingAnalysisPublisher};
    use catalog_store::MemoryDatastore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn collab() -> (Collaborators, Arc<FakeSourceHost>) {
        let host = Arc::new(FakeSourceHost::new());
        let collab = Collaborators {
            store: Arc::new(MemoryDatastore::new()),
            queue: Arc::new(MemoryTaskQueue::default()),
            source_host: host.clone(),
            registry: Arc::new(FakeRegistry::new()),
            analysis: Arc::new(RecordingAnalysisPublisher::default()),
        };
        (collab, host)
    }

    #[tokio::test]
    async fn ingest_version_marks_ready_and_stores_contents() {
        let (collab, host) = collab();
        let id = LibraryId::github("org", "repo");
        let now = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut library = Library::new(id.clone(), catalog_core::Kind::Element, now);
        library.github_owner = Some("org".into());
        library.github_repo = Some("repo".into());
        collab.store.put_library(library).await;

        let mut version = Version::new("v1.0.0", "sha1", now);
        version.status = EntityStatus::Pending;
        collab.store.put_version(&id, version).await;

        host.set_readme("org", "repo", "sha1", b"# hello");
        host.set_file("org", "repo", "bower.json", "sha1", br#"{"license":"MIT"}"#);

        let result = ingest_version(&collab, &id, "v1.0.0", now).await;
        assert!(matches!(result, HandlerResult::Continue));

        let stored = collab.store.get_version(&id, "v1.0.0").await.unwrap();
        assert_eq!(stored.status, EntityStatus::Ready);

        let readme = collab.store.get_content(&id, "v1.0.0", &ContentRole::Readme).await.unwrap();
        assert!(matches!(readme.body, Some(ContentBody::Text(_))));
    }

    #[tokio::test]
    async fn ingest_version_is_idempotent_once_ready() {
        let (collab, _host) = collab();
        let id = LibraryId::github("org", "repo");
        let now = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut version = Version::new("v1.0.0", "sha1", now);
        version.status = EntityStatus::Ready;
        collab.store.put_version(&id, version).await;

        let result = ingest_version(&collab, &id, "v1.0.0", now).await;
        assert!(matches!(result, HandlerResult::Continue));
    }

    #[tokio::test]
    async fn non_utf8_readme_is_a_permanent_error() {
        let (collab, host) = collab();
        let id = LibraryId::github("org", "repo");
        let now = chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut library = Library::new(id.clone(), catalog_core::Kind::Element, now);
        library.github_owner = Some("org".into());
        library.github_repo = Some("repo".into());
        collab.store.put_library(library).await;
        let version = Version::new("v1.0.0", "sha1", now);
        collab.store.put_version(&id, version).await;
        host.set_readme("org", "repo", "sha1", &[0xff, 0xfe, 0xfd]);

        let result = ingest_version(&collab, &id, "v1.0.0", now).await;
        assert!(matches!(result, HandlerResult::Permanent(ErrorCode::VersionUtf, _)));
    }
}
