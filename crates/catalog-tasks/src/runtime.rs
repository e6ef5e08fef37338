//! Task runtime shell (C4, §4.4, §9).
//!
//! Per §9's design note, this is deliberately a function taking a
//! handler closure plus a small options record rather than a
//! superclass every handler inherits from. Admission (queue header vs.
//! XSRF token) is an HTTP-layer concern handled in `catalog-server`
//! before `run_task` is ever called; what lives here is steps 2-5:
//! the transaction boundary, invoking the handler, and mapping its
//! `HandlerResult` onto a status code.

use catalog_core::HandlerResult;
use catalog_store::Datastore;
use catalog_core::LibraryId;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct TaskOptions {
    pub transactional: bool,
}

impl TaskOptions {
    pub const fn transactional() -> Self {
        Self { transactional: true }
    }
    pub const fn best_effort() -> Self {
        Self { transactional: false }
    }
}

/// Runs one task. The handler is responsible for its own reads and
/// commits (this crate's entities have no ambient "dirty" flag); what
/// `run_task` adds is the ancestor-transaction lock around the
/// handler body when `options.transactional`, and the final
/// `HandlerResult` → HTTP status mapping.
pub async fn run_task<F, Fut>(store: &Arc<dyn Datastore>, root: &LibraryId, options: TaskOptions, handler: F) -> u16
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = HandlerResult>,
{
    let _lock = if options.transactional {
        Some(store.lock_root(root).await)
    } else {
        None
    };

    let result = handler().await;
    if let HandlerResult::Fatal(ref err) = result {
        tracing::error!(%root, error = %err, "task handler failed fatally");
    } else if let HandlerResult::Retry(ref msg) = result {
        tracing::warn!(%root, msg, "task handler requested retry");
    }
    result.status_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::ErrorCode;
    use catalog_store::MemoryDatastore;

    #[tokio::test]
    async fn continue_maps_to_200() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let id = LibraryId::github("org", "repo");
        let status = run_task(&store, &id, TaskOptions::transactional(), || async { HandlerResult::Continue }).await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn permanent_maps_to_200() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let id = LibraryId::github("org", "repo");
        let status = run_task(&store, &id, TaskOptions::transactional(), || async {
            HandlerResult::permanent(ErrorCode::LibraryNoVersion, "no tags")
        })
        .await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn retry_maps_to_500() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let id = LibraryId::github("org", "repo");
        let status = run_task(&store, &id, TaskOptions::transactional(), || async { HandlerResult::retry("backoff") }).await;
        assert_eq!(status, 500);
    }

    #[tokio::test]
    async fn non_transactional_tasks_do_not_hold_the_root_lock_across_calls() {
        let store: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let id = LibraryId::github("org", "repo");
        let status = run_task(&store, &id, TaskOptions::best_effort(), || async { HandlerResult::Continue }).await;
        assert_eq!(status, 200);
        // A second, non-transactional call must not deadlock.
        let status = run_task(&store, &id, TaskOptions::best_effort(), || async { HandlerResult::Continue }).await;
        assert_eq!(status, 200);
    }
}
