//! Source-hosting platform adapter (C3).

pub mod client;
pub mod fetch;
pub mod markdown;

pub use client::{GithubClient, RepoFetch};
pub use fetch::{FetchClient, FetchOk, FetchOutcome};
