//! Core abstractions for the catalog ingestion pipeline.
//!
//! This crate provides the foundation shared by every other crate in
//! the workspace:
//!
//! - **Entities** (§3): `Library`, `Version`, `Content`,
//!   `CollectionReference`, `Author`, `VersionCache`, `Sitemap`.
//! - **Version-tag algebra** (C1, §4.1): parse/compare/match/categorize.
//! - **Error taxonomy** (§7) and the task-handler result type (§4.4).
//! - **Config and logging**: the ambient stack every task handler and
//!   upstream adapter depends on.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod version;

pub use error::{CatalogError, ErrorCode, HandlerResult, Result, StoredError};
pub use model::{
    Author, CachedBlob, CollectionReference, Content, ContentBody, ContentRole, Kind, Library,
    LibraryId, Sitemap, SitemapKind, Status, Version, VersionCache,
};
