//! Task queues, the analysis pub/sub bridge, and the XSRF token store.

pub mod pubsub;
pub mod queue;
pub mod xsrf;

pub use pubsub::{AnalysisPublisher, AnalysisRequest, HttpAnalysisPublisher, RecordingAnalysisPublisher};
pub use queue::{MemoryTaskQueue, QueueName, TaskQueue};
pub use xsrf::XsrfTokenStore;
