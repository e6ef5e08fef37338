//! The task queue contract (§6): one route per task name, gated by
//! `catalog_queue::xsrf::admit` (§4.4 step 1), plus the analysis-reply
//! push endpoint and XSRF token issuance.

use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use catalog_core::LibraryId;
use catalog_queue::xsrf;
use catalog_tasks::{index, library_ingestor, runtime, sweeper, version_ingestor};
use serde::Deserialize;

const QUEUE_HEADER: &str = "x-appengine-queuename";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks/library/ensure/:owner/:repo", get(ensure_library))
        .route("/tasks/library/update/:owner/:repo", get(update_library))
        .route("/tasks/library/analyze/:owner/:repo", get(analyze_library))
        .route("/tasks/library/webhook/:owner/:repo", get(webhook_library))
        .route("/tasks/library/preview/:owner/:repo/:sha", get(preview_library))
        .route("/tasks/version/ingest/:owner/:repo/:tag", get(ingest_version))
        .route("/tasks/author/ensure/:login", get(ensure_author))
        .route("/tasks/index/update/:owner/:repo", get(update_index))
        .route("/tasks/sweep/update-all", get(update_all))
        .route("/tasks/sweep/analyze-all", get(analyze_all))
        .route("/tasks/sweep/index-all", get(index_all))
        .route("/tasks/sweep/build-sitemaps", get(build_sitemaps))
        .route("/_ah/push-handlers/analysis-reply", post(analysis_reply))
        .route("/manage/token", post(issue_token))
        .with_state(state)
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn admitted(headers: &HeaderMap, token: Option<&str>, state: &AppState) -> bool {
    xsrf::admit(headers.contains_key(QUEUE_HEADER), token, &state.xsrf)
}

async fn ensure_library(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<TokenQuery>,
    Path((owner, repo)): Path<(String, String)>,
) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    let id = LibraryId::github(owner, repo);
    let status = runtime::run_task(&state.collab.store, &id, runtime::TaskOptions::transactional(), || async {
        library_ingestor::reconcile(&state.collab, &id, library_ingestor::IngestOptions::ensure(), now()).await
    })
    .await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn update_library(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<TokenQuery>,
    Path((owner, repo)): Path<(String, String)>,
) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    let id = LibraryId::github(owner, repo);
    let status = runtime::run_task(&state.collab.store, &id, runtime::TaskOptions::transactional(), || async {
        library_ingestor::reconcile(&state.collab, &id, library_ingestor::IngestOptions::update(), now()).await
    })
    .await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn analyze_library(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<TokenQuery>,
    Path((owner, repo)): Path<(String, String)>,
) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    let id = LibraryId::github(owner, repo);
    let status = runtime::run_task(&state.collab.store, &id, runtime::TaskOptions::transactional(), || async {
        catalog_tasks::request_reanalysis(&state.collab, &id, now()).await
    })
    .await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn webhook_library(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<TokenQuery>,
    Path((owner, repo)): Path<(String, String)>,
) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    let id = LibraryId::github(owner, repo);
    let status = runtime::run_task(&state.collab.store, &id, runtime::TaskOptions::transactional(), || async {
        library_ingestor::reconcile(&state.collab, &id, library_ingestor::IngestOptions::webhook(), now()).await
    })
    .await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Deserialize)]
struct PreviewQuery {
    token: Option<String>,
    pr_url: Option<String>,
}

async fn preview_library(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<PreviewQuery>,
    Path((owner, repo, sha)): Path<(String, String, String)>,
) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    let id = LibraryId::github(owner, repo);
    let status = runtime::run_task(&state.collab.store, &id, runtime::TaskOptions::transactional(), || async {
        library_ingestor::ingest_preview(&state.collab, &id, &sha, q.pr_url.clone(), now()).await
    })
    .await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn ingest_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<TokenQuery>,
    Path((owner, repo, tag)): Path<(String, String, String)>,
) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    let id = LibraryId::github(owner, repo);
    let status = runtime::run_task(&state.collab.store, &id, runtime::TaskOptions::transactional(), || async {
        version_ingestor::ingest_version(&state.collab, &id, &tag, now()).await
    })
    .await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn ensure_author(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<TokenQuery>,
    Path(login): Path<String>,
) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    // Authors have no library root id for `run_task`'s lock; lock
    // keyed on the login itself is sufficient since authors don't
    // share a root entity with any library.
    let root = LibraryId::github(&login, "__author__");
    let status = runtime::run_task(&state.collab.store, &root, runtime::TaskOptions::transactional(), || async {
        catalog_tasks::ensure_author(&state.collab, &login, now()).await
    })
    .await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn update_index(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Query(q): axum::extract::Query<TokenQuery>,
    Path((owner, repo)): Path<(String, String)>,
) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    let id = LibraryId::github(owner, repo);
    let status = runtime::run_task(&state.collab.store, &id, runtime::TaskOptions::transactional(), || async {
        index::update_indexes(&state.collab, state.search.as_ref(), &id, now()).await
    })
    .await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn update_all(State(state): State<AppState>, headers: HeaderMap, axum::extract::Query(q): axum::extract::Query<TokenQuery>) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    StatusCode::from_u16(sweeper::update_all(&state.collab).await.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn analyze_all(State(state): State<AppState>, headers: HeaderMap, axum::extract::Query(q): axum::extract::Query<TokenQuery>) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    StatusCode::from_u16(sweeper::analyze_all(&state.collab).await.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn index_all(State(state): State<AppState>, headers: HeaderMap, axum::extract::Query(q): axum::extract::Query<TokenQuery>) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    StatusCode::from_u16(sweeper::index_all(&state.collab).await.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn build_sitemaps(State(state): State<AppState>, headers: HeaderMap, axum::extract::Query(q): axum::extract::Query<TokenQuery>) -> StatusCode {
    if !admitted(&headers, q.token.as_deref(), &state) {
        return StatusCode::FORBIDDEN;
    }
    StatusCode::from_u16(sweeper::build_sitemaps(&state.collab).await.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// `{message:{data:<base64 json>, attributes:{owner, repo, version, error?}}}` (§6).
#[derive(Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Deserialize)]
struct PushMessage {
    data: String,
    attributes: PushAttributes,
}

#[derive(Deserialize)]
struct PushAttributes {
    owner: String,
    repo: String,
    version: String,
    error: Option<String>,
}

async fn analysis_reply(State(state): State<AppState>, Json(envelope): Json<PushEnvelope>) -> StatusCode {
    let attrs = envelope.message.attributes;
    let id = LibraryId::github(&attrs.owner, &attrs.repo);
    let reply = match attrs.error {
        Some(message) => catalog_tasks::AnalysisReply::Error(message),
        None => {
            let decoded = match base64::engine::general_purpose::STANDARD.decode(&envelope.message.data) {
                Ok(bytes) => bytes,
                Err(_) => return StatusCode::BAD_REQUEST,
            };
            match serde_json::from_slice(&decoded) {
                Ok(value) => catalog_tasks::AnalysisReply::Success(value),
                Err(_) => return StatusCode::BAD_REQUEST,
            }
        }
    };
    let status = runtime::run_task(&state.collab.store, &id, runtime::TaskOptions::transactional(), || async {
        catalog_tasks::apply_analysis_reply(&state.collab, &id, &attrs.version, reply, now()).await
    })
    .await;
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn issue_token(State(state): State<AppState>) -> Json<serde_json::Value> {
    let token = state.xsrf.issue();
    Json(serde_json::json!({ "token": token }))
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
