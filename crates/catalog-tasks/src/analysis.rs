//! Analysis bridge (C7, §4.7).
//!
//! The request side — creating the pending `analysis` Content entity
//! and publishing to [`AnalysisPublisher`] — happens inline in
//! [`crate::library_ingestor`] as part of new-version ingestion. This
//! module is the asynchronous reply half: an external worker's
//! analysis JSON (or error) arrives here and gets merged back.

use crate::collaborators::Collaborators;
use catalog_core::{Content, ContentBody, ContentRole, ErrorCode, HandlerResult, LibraryId, Status};
use catalog_queue::{AnalysisRequest, QueueName};
use chrono::{DateTime, Utc};

/// Datastore entity size limit (§4.7): payloads over this are dropped
/// rather than stored, to protect the datastore's per-entity cap.
pub const MAX_ANALYSIS_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum AnalysisReply {
    Success(serde_json::Value),
    Error(String),
}

pub async fn apply_analysis_reply(
    collab: &Collaborators,
    library_id: &LibraryId,
    tag: &str,
    reply: AnalysisReply,
    now: DateTime<Utc>,
) -> HandlerResult {
    let Some(mut content) = collab.store.get_content(library_id, tag, &ContentRole::Analysis).await else {
        // Version was deleted while analysis was in flight; drop silently (§4.7 step 1).
        return HandlerResult::Continue;
    };

    match reply {
        AnalysisReply::Success(payload) => {
            let encoded = serde_json::to_vec(&payload).unwrap_or_default();
            if encoded.len() > MAX_ANALYSIS_PAYLOAD_BYTES {
                return HandlerResult::Continue;
            }
            content.body = Some(ContentBody::Json(payload));
            content.status = Status::Ready;
            content.error = None;
        }
        AnalysisReply::Error(message) => {
            if message.len() > MAX_ANALYSIS_PAYLOAD_BYTES {
                return HandlerResult::Continue;
            }
            content.body = Some(ContentBody::Text(message.clone()));
            content.status = Status::Error;
            content.error = Some(catalog_core::StoredError {
                code: "Analysis_worker_error".to_string(),
                message,
            });
        }
    }
    content.updated = now;
    collab.store.put_content(library_id, tag, content).await;

    let Some(cache) = collab.store.get_version_cache(library_id).await else {
        return HandlerResult::Continue;
    };
    let is_default = catalog_core::version::default_tag(&cache.versions).as_deref() == Some(tag);
    if is_default {
        let _ = collab.queue.enqueue(QueueName::Update, format!("tasks/index/update/{}", library_id.id())).await;
    }

    HandlerResult::Continue
}

/// `AnalyzeAll`'s per-library task: re-requests analysis for the
/// current default version (§4.9, "useful after an analyzer upgrade").
/// Re-uses the same pending-then-publish shape as the new-version path
/// in `library_ingestor::reconcile` rather than introducing a second one.
pub async fn request_reanalysis(collab: &Collaborators, library_id: &LibraryId, now: DateTime<Utc>) -> HandlerResult {
    let Some(cache) = collab.store.get_version_cache(library_id).await else {
        return HandlerResult::permanent(ErrorCode::LibraryNoVersion, "no version cache to reanalyze");
    };
    let Some(tag) = catalog_core::version::default_tag(&cache.versions) else {
        return HandlerResult::permanent(ErrorCode::LibraryNoVersion, "version cache is empty");
    };
    let Some(version) = collab.store.get_version(library_id, &tag).await else {
        return HandlerResult::Fatal(catalog_core::CatalogError::MissingEntity { key: format!("{}/{}", library_id.id(), tag) });
    };

    collab.store.put_content(library_id, &tag, Content::pending(ContentRole::Analysis, now)).await;
    let _ = collab
        .analysis
        .publish(AnalysisRequest {
            library: library_id.id(),
            tag,
            sha: version.sha,
            manifest_url: None,
        })
        .await;

    HandlerResult::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{FakeRegistry, FakeSourceHost};
    use catalog_core::{Content, VersionCache};
    use catalog_queue::{MemoryTaskQueue, RecordingAnalysisPublisher, TaskQueue};
    use catalog_store::MemoryDatastore;
    use chrono::TimeZone;
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
    async fn missing_content_drops_reply_silently() {
        let collab = collab();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = apply_analysis_reply(&collab, &id, "v1.0.0", AnalysisReply::Success(serde_json::json!({})), now).await;
        assert!(matches!(result, HandlerResult::Continue));
    }

    #[tokio::test]
    async fn success_reply_marks_ready_and_enqueues_index_update_for_default_version() {
        let collab = collab();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        collab.store.put_content(&id, "v1.0.0", Content::pending(ContentRole::Analysis, now)).await;
        collab
            .store
            .put_version_cache(&id, VersionCache { versions: vec!["v1.0.0".to_string()] })
            .await;

        let result = apply_analysis_reply(&collab, &id, "v1.0.0", AnalysisReply::Success(serde_json::json!({"elements": []})), now).await;
        assert!(matches!(result, HandlerResult::Continue));

        let stored = collab.store.get_content(&id, "v1.0.0", &ContentRole::Analysis).await.unwrap();
        assert_eq!(stored.status, Status::Ready);
        assert!(!collab.queue.is_empty(QueueName::Update).await);
    }

    #[tokio::test]
    async fn reply_for_non_default_version_does_not_enqueue_index_update() {
        let collab = collab();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        collab.store.put_content(&id, "v1.0.0", Content::pending(ContentRole::Analysis, now)).await;
        collab
            .store
            .put_version_cache(&id, VersionCache { versions: vec!["v1.0.1".to_string(), "v1.0.0".to_string()] })
            .await;

        apply_analysis_reply(&collab, &id, "v1.0.0", AnalysisReply::Success(serde_json::json!({})), now).await;
        assert!(collab.queue.is_empty(QueueName::Update).await);
    }

    #[tokio::test]
    async fn error_reply_marks_error_status() {
        let collab = collab();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        collab.store.put_content(&id, "v1.0.0", Content::pending(ContentRole::Analysis, now)).await;

        apply_analysis_reply(&collab, &id, "v1.0.0", AnalysisReply::Error("worker crashed".to_string()), now).await;
        let stored = collab.store.get_content(&id, "v1.0.0", &ContentRole::Analysis).await.unwrap();
        assert_eq!(stored.status, Status::Error);
    }

    #[tokio::test]
    async fn oversized_payload_is_dropped() {
        let collab = collab();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        collab.store.put_content(&id, "v1.0.0", Content::pending(ContentRole::Analysis, now)).await;

        let huge = "x".repeat(MAX_ANALYSIS_PAYLOAD_BYTES + 1);
        apply_analysis_reply(&collab, &id, "v1.0.0", AnalysisReply::Error(huge), now).await;
        let stored = collab.store.get_content(&id, "v1.0.0", &ContentRole::Analysis).await.unwrap();
        assert_eq!(stored.status, Status::Pending);
    }

    #[tokio::test]
    async fn request_reanalysis_republishes_the_default_version() {
        let collab = collab();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        collab
            .store
            .put_version(&id, catalog_core::Version::new("v1.0.0", "sha1", now))
            .await;
        collab
            .store
            .put_version_cache(&id, VersionCache { versions: vec!["v1.0.0".to_string()] })
            .await;

        let result = request_reanalysis(&collab, &id, now).await;
        assert!(matches!(result, HandlerResult::Continue));

        let content = collab.store.get_content(&id, "v1.0.0", &ContentRole::Analysis).await.unwrap();
        assert_eq!(content.status, Status::Pending);
    }

    #[tokio::test]
    async fn request_reanalysis_without_a_version_cache_is_a_permanent_error() {
        let collab = collab();
        let id = LibraryId::github("org", "repo");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = request_reanalysis(&collab, &id, now).await;
        assert!(matches!(result, HandlerResult::Permanent(ErrorCode::LibraryNoVersion, _)));
    }
}
