//! The explicit-dependency bundle every C5-C9 handler takes, per
//! §9's note to avoid global singletons: datastore, task queue,
//! upstream adapters, and the analysis publisher are all passed in
//! rather than reached for as process-global state.

use crate::upstream::{SharedRegistry, SharedSourceHost};
use catalog_queue::{AnalysisPublisher, TaskQueue};
use catalog_store::Datastore;
use std::sync::Arc;

#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn Datastore>,
    pub queue: Arc<dyn TaskQueue>,
    pub source_host: SharedSourceHost,
    pub registry: SharedRegistry,
    pub analysis: Arc<dyn AnalysisPublisher>,
}
