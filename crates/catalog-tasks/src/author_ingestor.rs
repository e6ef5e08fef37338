//! Author ingestion. Not a numbered component on its own — spec.md
//! folds it into C5's "author-ensure" enqueue and C9's sweep — but
//! `Author` is a first-class root entity (§3), so it gets the same
//! conditional-fetch-then-store treatment as a Library's `metadata`
//! blob, just without version/tag machinery.

use crate::collaborators::Collaborators;
use crate::upstream::UpstreamFetch;
use catalog_core::{Author, HandlerResult, Status};
use chrono::{DateTime, Utc};

pub async fn ensure_author(collab: &Collaborators, login: &str, now: DateTime<Utc>) -> HandlerResult {
    let mut author = collab.store.get_author(login).await.unwrap_or_else(|| Author::new(login, now));

    match collab.source_host.user(login, author.metadata.etag.as_deref()).await {
        Ok(UpstreamFetch::NotFound) => {
            // §7: upstream 404 on an author is not an error, it cascades to deletion.
            // There is no per-author delete in the datastore trait beyond letting
            // it sit `error`-tagged; mirror the library cascade by marking it so.
            author.status = Status::Error;
            author.error = Some(catalog_core::StoredError::new(catalog_core::ErrorCode::AuthorNotFound, "author not found upstream"));
            collab.store.put_author(author).await;
            return HandlerResult::Continue;
        }
        Ok(UpstreamFetch::QuotaExceeded) => return HandlerResult::retry("author quota exceeded"),
        Ok(UpstreamFetch::ServerError(status)) => return HandlerResult::retry(format!("author upstream 5xx ({status})")),
        Ok(UpstreamFetch::NotModified) => {}
        Ok(UpstreamFetch::Found { bytes, etag }) => {
            let body = String::from_utf8_lossy(&bytes).to_string();
            author.metadata.store(body, etag, now);
        }
        Err(err) => return err.into(),
    }

    author.status = Status::Ready;
    author.error = None;
    author.updated = now;
    collab.store.put_author(author).await;
    HandlerResult::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{FakeRegistry, FakeSourceHost};
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
    async fn fresh_author_is_fetched_and_marked_ready() {
        let (collab, host) = collab();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        host.push("octocat", "", "user", UpstreamFetch::Found { bytes: br#"{"login":"octocat"}"#.to_vec(), etag: Some("\"a\"".into()) });

        let result = ensure_author(&collab, "octocat", now).await;
        assert!(matches!(result, HandlerResult::Continue));
        let stored = collab.store.get_author("octocat").await.unwrap();
        assert_eq!(stored.status, Status::Ready);
        assert!(stored.metadata.body.is_some());
    }

    #[tokio::test]
    async fn missing_author_is_marked_error() {
        let (collab, host) = collab();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        host.push("ghost", "", "user", UpstreamFetch::NotFound);

        ensure_author(&collab, "ghost", now).await;
        let stored = collab.store.get_author("ghost").await.unwrap();
        assert_eq!(stored.status, Status::Error);
    }

    #[tokio::test]
    async fn quota_exceeded_is_retried() {
        let (collab, host) = collab();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        host.push("octocat", "", "user", UpstreamFetch::QuotaExceeded);

        let result = ensure_author(&collab, "octocat", now).await;
        assert!(matches!(result, HandlerResult::Retry(_)));
    }
}
