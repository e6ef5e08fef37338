//! Entity definitions (§3).
//!
//! Every entity here is a plain data type; persistence and transaction
//! semantics live in `catalog-store`, not here, per spec.md §9's note
//! to model collaborators as explicit dependencies rather than bake
//! storage into the model.

use crate::error::StoredError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(scope, package)` identifier, composed as `<scope>/<package>`.
///
/// For source-hosted libraries, `scope` is the repository owner and
/// `package` is the repository name. For registry libraries, `scope`
/// is `@<npm-scope>` (or the sentinel `@@npm` for an unscoped
/// registry package), matching npm's own `@scope/name` convention.
/// All components are lower-cased on construction, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryId {
    pub scope: String,
    pub package: String,
}

/// Sentinel scope for a registry package with no npm scope.
pub const UNSCOPED_REGISTRY_SCOPE: &str = "@@npm";

impl LibraryId {
    pub fn new(scope: impl AsRef<str>, package: impl AsRef<str>) -> Self {
        Self {
            scope: scope.as_ref().to_lowercase(),
            package: package.as_ref().to_lowercase(),
        }
    }

    /// Builds the id for a source-hosted library: `owner/repo`.
    pub fn github(owner: impl AsRef<str>, repo: impl AsRef<str>) -> Self {
        Self::new(owner, repo)
    }

    /// Builds the id for a registry library. `scope` is the npm scope
    /// without its leading `@` (e.g. `"polymer"` for `@polymer/iron-ajax`);
    /// `None` maps to [`UNSCOPED_REGISTRY_SCOPE`].
    pub fn registry(scope: Option<&str>, package: impl AsRef<str>) -> Self {
        let scope = match scope {
            Some(s) if !s.is_empty() => format!("@{}", s.trim_start_matches('@')),
            _ => UNSCOPED_REGISTRY_SCOPE.to_string(),
        };
        Self::new(scope, package)
    }

    pub fn is_registry(&self) -> bool {
        self.scope.starts_with('@')
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.scope, self.package)
    }
}

impl std::fmt::Display for LibraryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Shared status vocabulary across entities. Only `Library` ever
/// carries `Suppressed` (an admin mute); other entities use the
/// `Pending | Ready | Error` subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Ready,
    Error,
    Suppressed,
}

impl Default for Status {
    fn default() -> Self {
        Status::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Element,
    Collection,
}

/// An opaque cached upstream response: body, validation etag, and the
/// time it was last refreshed. Used for `metadata`, `contributors`,
/// `participation`, and `registry_metadata` on `Library`, and for
/// `Author::metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBlob {
    pub body: Option<String>,
    pub etag: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

impl CachedBlob {
    pub fn store(&mut self, body: String, etag: Option<String>, now: DateTime<Utc>) {
        self.body = Some(body);
        self.etag = etag;
        self.updated = Some(now);
    }
}

/// The root `Library` entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub kind: Kind,
    pub status: Status,
    pub error: Option<StoredError>,
    pub shallow_ingestion: bool,

    pub github_owner: Option<String>,
    pub github_repo: Option<String>,
    pub spdx_identifier: Option<String>,

    pub metadata: CachedBlob,
    pub contributors: CachedBlob,
    pub participation: CachedBlob,
    pub registry_metadata: CachedBlob,

    /// Canonical ordered list for display.
    pub tags: Vec<String>,
    /// Ordered `tag -> commit id` mapping; the authoritative source of
    /// "what to ingest" (invariant 3).
    pub tag_map: Vec<(String, String)>,

    pub collection_sequence_number: u64,
    pub npm_package: Option<LibraryId>,
    pub migrated_from_bower: bool,

    pub updated: DateTime<Utc>,
}

impl Library {
    pub fn new(id: LibraryId, kind: Kind, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            status: Status::Pending,
            error: None,
            shallow_ingestion: false,
            github_owner: None,
            github_repo: None,
            spdx_identifier: None,
            metadata: CachedBlob::default(),
            contributors: CachedBlob::default(),
            participation: CachedBlob::default(),
            registry_metadata: CachedBlob::default(),
            tags: Vec::new(),
            tag_map: Vec::new(),
            collection_sequence_number: 0,
            npm_package: None,
            migrated_from_bower: false,
            updated: now,
        }
    }

    pub fn tag_map_get(&self, tag: &str) -> Option<&str> {
        self.tag_map
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, sha)| sha.as_str())
    }

    pub fn tag_map_set(&mut self, tag: String, sha: String) {
        if let Some(entry) = self.tag_map.iter_mut().find(|(t, _)| *t == tag) {
            entry.1 = sha;
        } else {
            self.tag_map.push((tag, sha));
        }
    }

    pub fn tag_map_remove(&mut self, tag: &str) {
        self.tag_map.retain(|(t, _)| t != tag);
    }

    pub fn tag_map_keys(&self) -> Vec<String> {
        self.tag_map.iter().map(|(t, _)| t.clone()).collect()
    }

    /// Invariant 6: a superseded library is excluded from the index.
    pub fn is_shadowed(&self) -> bool {
        self.npm_package.is_some()
    }
}

/// A `Version`, keyed by tag, child of `Library`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub tag: String,
    pub sha: String,
    pub url: Option<String>,
    pub preview: bool,
    pub status: Status,
    pub error: Option<StoredError>,
    pub updated: DateTime<Utc>,
}

impl Version {
    pub fn new(tag: impl Into<String>, sha: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            tag: tag.into(),
            sha: sha.into(),
            url: None,
            preview: false,
            status: Status::Pending,
            error: None,
            updated: now,
        }
    }
}

/// Identifies a `Content` entity's role within its parent `Version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentRole {
    Readme,
    ReadmeHtml,
    Bower,
    Analysis,
    Page(String),
}

impl ContentRole {
    pub fn id(&self) -> String {
        match self {
            ContentRole::Readme => "readme".to_string(),
            ContentRole::ReadmeHtml => "readme.html".to_string(),
            ContentRole::Bower => "bower".to_string(),
            ContentRole::Analysis => "analysis".to_string(),
            ContentRole::Page(path) => format!("page-{path}"),
        }
    }
}

/// Invariant 4: exactly one of `body_text`/`body_json` is ever set.
/// JSON bodies are compressed at rest (spec.md §3) — the compression
/// happens at the store boundary (`catalog-store`), this type just
/// distinguishes the two shapes in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContentBody {
    Text(String),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: ContentRole,
    pub body: Option<ContentBody>,
    pub etag: Option<String>,
    pub status: Status,
    pub error: Option<StoredError>,
    pub updated: DateTime<Utc>,
}

impl Content {
    pub fn pending(role: ContentRole, now: DateTime<Utc>) -> Self {
        Self {
            role,
            body: None,
            etag: None,
            status: Status::Pending,
            error: None,
            updated: now,
        }
    }
}

/// Child of the *member* `Library`: "this library appears in
/// `collection`'s version `collection_tag` with range `range`".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionReference {
    pub collection: LibraryId,
    pub collection_tag: String,
    pub range: String,
}

impl CollectionReference {
    pub fn id(&self) -> String {
        format!("{}/{}", self.collection.id(), self.collection_tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
    pub metadata: CachedBlob,
    pub status: Status,
    pub error: Option<StoredError>,
    pub updated: DateTime<Utc>,
}

impl Author {
    pub fn new(login: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            login: login.into(),
            metadata: CachedBlob::default(),
            status: Status::Pending,
            error: None,
            updated: now,
        }
    }
}

/// Singleton child of `Library`, id `"versions"`: the derived,
/// authoritative list of `ready` version tags for the read path (C2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionCache {
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SitemapKind {
    Elements,
    Collections,
    Authors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sitemap {
    pub kind: SitemapKind,
    pub ids: Vec<String>,
}
