//! Named task queues (§6: `default`, `update`, `analysis`).
//!
//! Every enqueued item is just a path — the same relative URL the
//! task runtime shell (C4) would accept as a `GET`, since the queue
//! transport here is an internal analogue of the platform's own
//! queue-push-as-HTTP-request model (spec.md §6).

use async_trait::async_trait;
use catalog_core::CatalogError;
use std::collections::VecDeque;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Default,
    Update,
    Analysis,
}

impl QueueName {
    fn index(self) -> usize {
        match self {
            QueueName::Default => 0,
            QueueName::Update => 1,
            QueueName::Analysis => 2,
        }
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, queue: QueueName, path: String) -> Result<(), CatalogError>;
    async fn is_empty(&self, queue: QueueName) -> bool;
    async fn dequeue(&self, queue: QueueName) -> Option<String>;
}

/// Bounded, in-memory queue set. A full queue returns
/// `CatalogError::QuotaExceeded`, mirroring the platform's own
/// backpressure signal for task-queue admission (spec.md §4.9: the
/// fleet sweeper is explicitly bounded by queue capacity).
pub struct MemoryTaskQueue {
    queues: [Mutex<VecDeque<String>>; 3],
    capacity: usize,
}

impl MemoryTaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: [Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new()), Mutex::new(VecDeque::new())],
            capacity,
        }
    }
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, queue: QueueName, path: String) -> Result<(), CatalogError> {
        let mut guard = self.queues[queue.index()].lock().await;
        if guard.len() >= self.capacity {
            return Err(CatalogError::QuotaExceeded {
                resource: format!("queue:{:?}", queue),
            });
        }
        tracing::debug!(?queue, %path, "enqueued task");
        guard.push_back(path);
        Ok(())
    }

    async fn is_empty(&self, queue: QueueName) -> bool {
        self.queues[queue.index()].lock().await.is_empty()
    }

    async fn dequeue(&self, queue: QueueName) -> Option<String> {
        self.queues[queue.index()].lock().await.pop_front()
    }
}
