pub mod analysis;
pub mod author_ingestor;
pub mod collaborators;
pub mod index;
pub mod library_ingestor;
pub mod license;
pub mod manifest;
pub mod runtime;
pub mod sweeper;
pub mod upstream;
pub mod version_ingestor;

pub use analysis::{apply_analysis_reply, request_reanalysis, AnalysisReply};
pub use author_ingestor::ensure_author;
pub use collaborators::Collaborators;
pub use index::{update_indexes, MemorySearchIndex, SearchDocument, SearchIndex};
pub use library_ingestor::{ingest_preview, reconcile, IngestOptions};
pub use runtime::{run_task, TaskOptions};
pub use sweeper::{analyze_all, build_sitemaps, index_all, update_all};
pub use upstream::{GithubSourceHost, Registry, RegistryUpstream, SharedRegistry, SharedSourceHost, SourceHost, UpstreamFetch};
pub use version_ingestor::ingest_version;
