//! Datastore abstraction (`Datastore`, `MemoryDatastore`) and the
//! derived `VersionCache` index (C2).

pub mod datastore;
pub mod memory;
pub mod version_cache;

pub use datastore::{Datastore, Page, RootLock};
pub use memory::MemoryDatastore;
