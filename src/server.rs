//! HTTP service: JSON endpoints over the [`Engine`] plus the SSE chat stream.
//!
//! Every handler error becomes a JSON `{"error": message}` body with a 400,
//! 404, or 500 status.

use std::convert::Infallible;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use crate::config::Config;
use crate::engine::{Engine, IngestReport, NewChunk, SearchResponse};
use crate::error::Error;
use crate::store::types::{Entry, NewEntry};
use crate::stream::{escape_token, ChatEvent};

const DEFAULT_LIST_LIMIT: usize = 50;

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/entries", post(add_entry).get(list_entries))
        .route("/entries/{id}", get(get_entry).delete(delete_entry))
        .route("/embed", post(embed_chunk))
        .route("/search", post(search))
        .route("/chat/stream", post(chat_stream))
        .with_state(engine)
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let engine = Engine::from_config(config)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "journal-rag listening");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    models_loaded: ModelsLoaded,
    entries: u64,
    chunks: u64,
    embeddings: u64,
}

#[derive(Debug, Serialize)]
struct ModelsLoaded {
    chat: bool,
    embedder: bool,
}

async fn health(State(engine): State<Engine>) -> Result<Json<HealthResponse>, ApiError> {
    let report = engine.health().await?;
    Ok(Json(HealthResponse {
        ok: report.integrity_ok,
        models_loaded: ModelsLoaded {
            chat: engine.has_chat(),
            embedder: engine.has_embedder(),
        },
        entries: report.entry_count,
        chunks: report.chunk_count,
        embeddings: report.embedding_count,
    }))
}

async fn add_entry(
    State(engine): State<Engine>,
    payload: Result<Json<NewEntry>, JsonRejection>,
) -> Result<Json<IngestReport>, ApiError> {
    let Json(entry) = payload?;
    let report = engine.ingest_entry(entry).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    user_id: String,
    limit: Option<usize>,
}

async fn list_entries(
    State(engine): State<Engine>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Entry>>, ApiError> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let entries = engine.list_entries(&params.user_id, limit).await?;
    Ok(Json(entries))
}

async fn get_entry(
    State(engine): State<Engine>,
    Path(id): Path<i64>,
) -> Result<Json<Entry>, ApiError> {
    let entry = engine.get_entry(id).await?;
    Ok(Json(entry))
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: i64,
}

async fn delete_entry(
    State(engine): State<Engine>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    engine.delete_entry(id).await?;
    Ok(Json(DeleteResponse { deleted: id }))
}

#[derive(Debug, Serialize)]
struct EmbedResponse {
    chunk_id: i64,
}

async fn embed_chunk(
    State(engine): State<Engine>,
    payload: Result<Json<NewChunk>, JsonRejection>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let Json(chunk) = payload?;
    let chunk_id = engine.add_chunk(chunk).await?;
    Ok(Json(EmbedResponse { chunk_id }))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    user_id: String,
    query: String,
    k: Option<usize>,
}

async fn search(
    State(engine): State<Engine>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(req) = payload?;
    let response = engine.search(&req.user_id, &req.query, req.k).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct ChatRequestBody {
    user_id: String,
    question: String,
    k: Option<usize>,
}

async fn chat_stream(
    State(engine): State<Engine>,
    payload: Result<Json<ChatRequestBody>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(req) = payload?;
    let rx = engine.chat(&req.user_id, &req.question, req.k).await?;
    let events = ReceiverStream::new(rx).map(|event| Ok(sse_event(event)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Frame one chat event for the wire.
pub fn sse_event(event: ChatEvent) -> Event {
    match event {
        ChatEvent::Sources(sources) => {
            let data = serde_json::to_string(&sources).unwrap_or_else(|_| "[]".to_string());
            Event::default().event("sources").data(data)
        }
        ChatEvent::Token(token) => Event::default().data(escape_token(&token)),
        ChatEvent::Done => Event::default().event("done").data("[DONE]"),
        ChatEvent::Error { message } => Event::default()
            .event("error")
            .data(serde_json::json!({ "error": message }).to_string()),
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::Referential(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
