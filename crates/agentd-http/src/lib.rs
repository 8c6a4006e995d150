//! Inbound HTTP surface: the only contract external bridges,
//! the admin dashboard, and a parent agent's repair path have with a
//! running workspace.

use std::sync::Arc;

use agentd_agent::StatusHandle;
use agentd_core::{OutboxMessage, QueueMessage, Workspace};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    workspace: Workspace,
    queue: agentd_core::MessageQueue,
    status: StatusHandle,
}

impl AppState {
    pub fn new(workspace: Workspace, queue: agentd_core::MessageQueue, status: StatusHandle) -> Self {
        AppState {
            workspace,
            queue,
            status,
        }
    }
}

/// Build the router. `CorsLayer::permissive()` is a common default for this
/// kind of service surface; there's no CORS requirement here, so this is
/// inert unless a browser-based bridge needs it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/message", post(post_message))
        .route("/status", get(get_status))
        .route("/repair-signal", post(post_repair_signal))
        .route("/outbox", get(get_outbox))
        .route("/outbox/:id", delete(delete_outbox))
        .route("/history", get(get_history))
        .route("/history/:round", get(get_history_round))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Bind and serve forever. Returns only on a listener error.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PostMessageBody {
    content: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct MessageIdResponse {
    #[serde(rename = "messageId")]
    message_id: String,
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PostMessageBody>,
) -> Result<Json<MessageIdResponse>, (StatusCode, Json<ErrorBody>)> {
    if body.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }
    let source = body
        .source
        .unwrap_or_else(|| format!("http:{}", agentd_core::utils::timestamp()));
    let mut msg = QueueMessage::new(source, body.content);
    msg.metadata = body.metadata;
    let id = msg.id.clone();
    state.queue.push(msg).await;
    Ok(Json(MessageIdResponse { message_id: id }))
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<agentd_agent::StatusSnapshot> {
    Json(state.status.snapshot().await)
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

async fn post_repair_signal(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OkResponse>, (StatusCode, Json<ErrorBody>)> {
    state
        .workspace
        .write_repair_signal()
        .await
        .map_err(internal_error)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn get_outbox(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OutboxMessage>>, (StatusCode, Json<ErrorBody>)> {
    let messages = state.workspace.list_outbox().await.map_err(internal_error)?;
    Ok(Json(messages))
}

async fn delete_outbox(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    let removed = state
        .workspace
        .delete_outbox(&id)
        .await
        .map_err(internal_error)?;
    if removed {
        Ok(StatusCode::OK)
    } else {
        Err(not_found())
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryPage {
    total: usize,
    rounds: Vec<agentd_core::HistorySummary>,
}

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, (StatusCode, Json<ErrorBody>)> {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);

    let mut rounds = state
        .workspace
        .list_history_rounds()
        .await
        .map_err(internal_error)?;
    rounds.sort_unstable_by(|a, b| b.cmp(a)); // newest-first

    let total = rounds.len();
    let mut page = Vec::new();
    for round in rounds.into_iter().skip(offset).take(limit) {
        if let Some(record) = state
            .workspace
            .read_history_record(round)
            .await
            .map_err(internal_error)?
        {
            page.push(agentd_core::HistorySummary::from(&record));
        } else {
            warn!(round, "history round listed but record unreadable, skipping");
        }
    }

    Ok(Json(HistoryPage { total, rounds: page }))
}

async fn get_history_round(
    State(state): State<Arc<AppState>>,
    Path(round): Path<u64>,
) -> Result<Json<agentd_core::RoundRecord>, (StatusCode, Json<ErrorBody>)> {
    match state
        .workspace
        .read_history_record(round)
        .await
        .map_err(internal_error)?
    {
        Some(record) => Ok(Json(record)),
        None => Err(not_found()),
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody { error: msg.into() }),
    )
}

fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "not found".to_string(),
        }),
    )
}

fn internal_error(err: anyhow::Error) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_dirs().await.unwrap();
        let queue = agentd_core::MessageQueue::new();
        let status = StatusHandle::new();
        let app = router(AppState::new(ws, queue, status));
        (dir, app)
    }

    #[tokio::test]
    async fn post_message_enqueues_and_returns_id() {
        let (_dir, app) = test_app().await;
        let req = Request::builder()
            .method("POST")
            .uri("/message")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"hello"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn post_message_rejects_empty_content() {
        let (_dir, app) = test_app().await;
        let req = Request::builder()
            .method("POST")
            .uri("/message")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"   "}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_status_returns_default_snapshot() {
        let (_dir, app) = test_app().await;
        let req = Request::builder()
            .uri("/status")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn repair_signal_writes_file() {
        let (dir, app) = test_app().await;
        let req = Request::builder()
            .method("POST")
            .uri("/repair-signal")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let ws = Workspace::new(dir.path());
        assert!(ws.has_repair_signal().await);
    }

    #[tokio::test]
    async fn delete_outbox_entry_twice_is_200_then_404() {
        let (dir, app) = test_app().await;
        let ws = Workspace::new(dir.path());
        let msg = agentd_core::OutboxMessage::new("telegram:1", "hi");
        ws.write_outbox(&msg).await.unwrap();

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/outbox/{}", msg.id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/outbox/{}", msg.id))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_missing_outbox_entry_is_404() {
        let (_dir, app) = test_app().await;
        let req = Request::builder()
            .method("DELETE")
            .uri("/outbox/does-not-exist")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_round_not_found_is_404() {
        let (_dir, app) = test_app().await;
        let req = Request::builder()
            .uri("/history/42")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_page_defaults_and_orders_newest_first() {
        let (_dir, app) = test_app().await;
        let req = Request::builder()
            .uri("/history")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
