//! Error taxonomy (§7) and the task-handler result type (§4.4, §9).
//!
//! Two distinct things live here, deliberately kept apart:
//!
//! - [`ErrorCode`] is a *stored* value — it gets written onto the
//!   failing `Library`/`Version`/`Content`/`Author` entity so the read
//!   API can surface it verbatim.
//! - [`HandlerResult`] is a *control-flow* value — the sum type the
//!   task runtime shell (C4) matches on to decide commit/retry/200/500,
//!   replacing the teacher language's `RequestAborted`/`GitHubError`
//!   exception-based control flow per spec.md §9's design note.

use thiserror::Error;

/// Permanent, stored failure codes (spec.md §7). A library or version
/// carrying one of these will never be retried by the task queue;
/// fixing it requires a human or an upstream state change (e.g. the
/// repository being fixed and re-ingested).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    LibraryParseMetadata,
    LibraryParseContributors,
    LibraryParseStats,
    LibraryParseBower,
    LibraryParseRegistry,
    LibraryLicense,
    LibraryCollectionParseTags,
    LibraryCollectionMaster,
    LibraryElementParseTags,
    LibraryNoVersion,
    LibraryNoPackage,
    LibraryNoGithub,
    VersionUtf,
    VersionParseBower,
    VersionMissingBower,
    AuthorNotFound,
}

impl ErrorCode {
    /// The wire/storage name, e.g. `Library_license`, matching
    /// spec.md §7's naming exactly so stored entities and the read API
    /// agree on vocabulary.
    pub fn code(self) -> &'static str {
        match self {
            ErrorCode::LibraryParseMetadata => "Library_parse_metadata",
            ErrorCode::LibraryParseContributors => "Library_parse_contributors",
            ErrorCode::LibraryParseStats => "Library_parse_stats",
            ErrorCode::LibraryParseBower => "Library_parse_bower",
            ErrorCode::LibraryParseRegistry => "Library_parse_registry",
            ErrorCode::LibraryLicense => "Library_license",
            ErrorCode::LibraryCollectionParseTags => "Library_collection_parse_tags",
            ErrorCode::LibraryCollectionMaster => "Library_collection_master",
            ErrorCode::LibraryElementParseTags => "Library_element_parse_tags",
            ErrorCode::LibraryNoVersion => "Library_no_version",
            ErrorCode::LibraryNoPackage => "Library_no_package",
            ErrorCode::LibraryNoGithub => "Library_no_github",
            ErrorCode::VersionUtf => "Version_utf",
            ErrorCode::VersionParseBower => "Version_parse_bower",
            ErrorCode::VersionMissingBower => "Version_missing_bower",
            ErrorCode::AuthorNotFound => "Author_not_found",
        }
    }
}

/// A stored `{code, message}` pair, as spec.md §7 describes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredError {
    pub code: String,
    pub message: String,
}

impl StoredError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code().to_string(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the ambient stack (datastore, upstream adapters,
/// queue) below the task-handler layer. Handlers translate these into
/// [`HandlerResult`] variants; this type itself is never stored.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("upstream request for {resource} failed: {source}")]
    Upstream {
        resource: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream quota exceeded fetching {resource}")]
    QuotaExceeded { resource: String },

    #[error("upstream server error ({status}) fetching {resource}")]
    UpstreamServerError { resource: String, status: u16 },

    #[error("upstream resource not found: {resource}")]
    NotFound { resource: String },

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("datastore contention on {key}")]
    Contention { key: String },

    #[error("entity not found: {key}")]
    MissingEntity { key: String },

    #[error("invalid library id: {0}")]
    InvalidLibraryId(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Outcome of a task handler body (spec.md §9's design note).
///
/// The task runtime shell (C4, in `catalog-tasks::runtime`) matches on
/// this after running a handler closure:
///
/// - `Continue` — handler body ran to completion with no failure;
///   commit if the entity is dirty, respond 200.
/// - `Permanent(code, msg)` — stamp the entity with this error, commit,
///   respond 200 (the queue must not retry; the failure is durable).
/// - `Retry(msg)` — commit whatever was mutated so far (if dirty),
///   respond 500 so the queue backs off and retries the whole task.
/// - `Fatal` — an unexpected error; commit nothing, propagate.
#[derive(Debug)]
pub enum HandlerResult {
    Continue,
    Permanent(ErrorCode, String),
    Retry(String),
    Fatal(CatalogError),
}

impl HandlerResult {
    pub fn permanent(code: ErrorCode, message: impl Into<String>) -> Self {
        HandlerResult::Permanent(code, message.into())
    }

    pub fn retry(message: impl Into<String>) -> Self {
        HandlerResult::Retry(message.into())
    }

    /// HTTP status the task queue sees, per spec.md §4.4 step 5.
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerResult::Continue => 200,
            HandlerResult::Permanent(..) => 200,
            HandlerResult::Retry(_) => 500,
            HandlerResult::Fatal(_) => 500,
        }
    }

    /// Whether the shell should still persist the entity it was
    /// handed, per spec.md §4.4 step 4 ("commit happens on both
    /// success and controlled failure").
    pub fn should_commit(&self) -> bool {
        !matches!(self, HandlerResult::Fatal(_))
    }
}

/// Classifies an upstream fetch outcome as transient (502/retry) vs.
/// permanent, mirroring spec.md §4.3's contract: 403 is transient
/// because quota resets independently of the pipeline; 5xx is
/// transient; 404 is not an error at all (callers cascade-delete
/// instead of calling this).
impl From<CatalogError> for HandlerResult {
    fn from(err: CatalogError) -> Self {
        match &err {
            CatalogError::QuotaExceeded { .. } | CatalogError::UpstreamServerError { .. } => {
                HandlerResult::Retry(err.to_string())
            }
            CatalogError::Contention { .. } => HandlerResult::Retry(err.to_string()),
            _ => HandlerResult::Fatal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_names_match_spec_vocabulary() {
        assert_eq!(ErrorCode::LibraryLicense.code(), "Library_license");
        assert_eq!(ErrorCode::VersionMissingBower.code(), "Version_missing_bower");
    }

    #[test]
    fn handler_result_status_codes() {
        assert_eq!(HandlerResult::Continue.status_code(), 200);
        assert_eq!(
            HandlerResult::permanent(ErrorCode::LibraryNoVersion, "no tags").status_code(),
            200
        );
        assert_eq!(HandlerResult::retry("backoff").status_code(), 500);
    }

    #[test]
    fn should_commit_is_false_only_for_fatal() {
        assert!(HandlerResult::Continue.should_commit());
        assert!(HandlerResult::retry("x").should_commit());
        assert!(
            HandlerResult::permanent(ErrorCode::LibraryNoVersion, "x").should_commit()
        );
        let fatal = HandlerResult::Fatal(CatalogError::MissingEntity { key: "x".into() });
        assert!(!fatal.should_commit());
    }

    #[test]
    fn quota_and_server_error_translate_to_retry() {
        let quota: HandlerResult = CatalogError::QuotaExceeded {
            resource: "repos/o/r".into(),
        }
        .into();
        assert!(matches!(quota, HandlerResult::Retry(_)));

        let server_error: HandlerResult = CatalogError::UpstreamServerError {
            resource: "repos/o/r".into(),
            status: 503,
        }
        .into();
        assert!(matches!(server_error, HandlerResult::Retry(_)));
    }
}
