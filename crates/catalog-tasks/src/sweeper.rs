//! Fleet sweeper (C9, §4.9): paged bulk enqueue across every Library
//! and Author, plus sitemap generation.

use crate::collaborators::Collaborators;
use catalog_core::{HandlerResult, Sitemap, SitemapKind, Status};
use catalog_queue::QueueName;

const PAGE_SIZE: usize = 50;

/// `UpdateAll`: refuses to start while the `update` queue still has
/// backlog, so sweeps don't pile onto each other.
pub async fn update_all(collab: &Collaborators) -> HandlerResult {
    if !collab.queue.is_empty(QueueName::Update).await {
        return HandlerResult::retry("update queue is not empty");
    }
    sweep_task(collab, "tasks/library/update").await
}

/// `AnalyzeAll`: same refusal rule, re-requests analysis for every
/// library (useful after an analyzer upgrade).
pub async fn analyze_all(collab: &Collaborators) -> HandlerResult {
    if !collab.queue.is_empty(QueueName::Update).await {
        return HandlerResult::retry("update queue is not empty");
    }
    sweep_task(collab, "tasks/library/analyze").await
}

/// `IndexAll`: same refusal rule, rebuilds every library's search doc.
pub async fn index_all(collab: &Collaborators) -> HandlerResult {
    if !collab.queue.is_empty(QueueName::Update).await {
        return HandlerResult::retry("update queue is not empty");
    }
    sweep_task(collab, "tasks/index/update").await
}

async fn sweep_task(collab: &Collaborators, task_prefix: &str) -> HandlerResult {
    let mut cursor = None;
    loop {
        let page = collab.store.list_libraries_page(cursor.clone(), PAGE_SIZE).await;
        for library in &page.items {
            let _ = collab.queue.enqueue(QueueName::Update, format!("{task_prefix}/{}", library.id.id())).await;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let mut cursor = None;
    loop {
        let page = collab.store.list_authors_page(cursor.clone(), PAGE_SIZE).await;
        for author in &page.items {
            let _ = collab.queue.enqueue(QueueName::Update, format!("tasks/author/ensure/{}", author.login)).await;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    HandlerResult::Continue
}

/// `BuildSitemaps`: three entities (elements, collections, authors),
/// scanned by status/kind predicate rather than a dedicated index.
pub async fn build_sitemaps(collab: &Collaborators) -> HandlerResult {
    let mut element_ids = Vec::new();
    let mut collection_ids = Vec::new();
    let mut cursor = None;
    loop {
        let page = collab.store.list_libraries_page(cursor.clone(), PAGE_SIZE).await;
        for library in &page.items {
            if library.status != Status::Ready {
                continue;
            }
            match library.kind {
                catalog_core::Kind::Element => element_ids.push(library.id.id()),
                catalog_core::Kind::Collection => collection_ids.push(library.id.id()),
            }
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let mut author_ids = Vec::new();
    let mut cursor = None;
    loop {
        let page = collab.store.list_authors_page(cursor.clone(), PAGE_SIZE).await;
        for author in &page.items {
            if author.status == Status::Ready {
                author_ids.push(author.login.clone());
            }
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    collab.store.put_sitemap(Sitemap { kind: SitemapKind::Elements, ids: element_ids }).await;
    collab.store.put_sitemap(Sitemap { kind: SitemapKind::Collections, ids: collection_ids }).await;
    collab.store.put_sitemap(Sitemap { kind: SitemapKind::Authors, ids: author_ids }).await;

    HandlerResult::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{FakeRegistry, FakeSourceHost};
    use catalog_core::{Author, Kind, Library, LibraryId};
    use catalog_queue::{MemoryTaskQueue, RecordingAnalysisPublisher, TaskQueue};
    use catalog_store::MemoryDatastore;
    use chrono::{TimeZone, Utc};
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
    async fn update_all_refuses_when_queue_busy() {
        let collab = collab();
        collab.queue.enqueue(QueueName::Update, "tasks/library/update/org/repo".to_string()).await.unwrap();
        let result = update_all(&collab).await;
        assert!(matches!(result, HandlerResult::Retry(_)));
    }

    #[tokio::test]
    async fn update_all_enqueues_one_task_per_library_and_author() {
        let collab = collab();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for n in 0..3 {
            let id = LibraryId::github("org", format!("repo-{n}"));
            collab.store.put_library(Library::new(id, Kind::Element, now)).await;
        }
        collab.store.put_author(Author::new("octocat", now)).await;

        let result = update_all(&collab).await;
        assert!(matches!(result, HandlerResult::Continue));
        assert!(!collab.queue.is_empty(QueueName::Update).await);
    }

    #[tokio::test]
    async fn build_sitemaps_partitions_by_status_and_kind() {
        let collab = collab();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut element = Library::new(LibraryId::github("org", "elem"), Kind::Element, now);
        element.status = Status::Ready;
        collab.store.put_library(element).await;

        let mut collection = Library::new(LibraryId::github("org", "coll"), Kind::Collection, now);
        collection.status = Status::Ready;
        collab.store.put_library(collection).await;

        let pending = Library::new(LibraryId::github("org", "pending"), Kind::Element, now);
        collab.store.put_library(pending).await;

        let result = build_sitemaps(&collab).await;
        assert!(matches!(result, HandlerResult::Continue));

        let elements = collab.store.get_sitemap(SitemapKind::Elements).await.unwrap();
        assert_eq!(elements.ids, vec!["org/elem".to_string()]);
        let collections = collab.store.get_sitemap(SitemapKind::Collections).await.unwrap();
        assert_eq!(collections.ids, vec!["org/coll".to_string()]);
    }
}
