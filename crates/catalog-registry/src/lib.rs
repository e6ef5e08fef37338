//! Package registry adapter (C3).

pub mod client;

pub use client::{DescriptorFetch, RegistryClient, RegistryDescriptor, RegistryVersion};
