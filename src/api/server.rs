use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Json, Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::bus::Event;
use crate::chat::{DocumentInfo, Session};
use crate::controller::{Controller, Exchange};
use crate::document::UploadError;
use crate::state::Snapshot;

// Multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// -----------------------------------------------------------------------------
// Request / Response Types
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub preview: String,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        let preview = session.preview();
        Self { session, preview }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Upload(UploadError::Extraction) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upload(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// -----------------------------------------------------------------------------
// Server
// -----------------------------------------------------------------------------

pub struct ApiServer {
    controller: Arc<Controller>,
    max_upload_bytes: usize,
}

impl ApiServer {
    pub fn new(controller: Arc<Controller>, max_upload_bytes: usize) -> Self {
        Self {
            controller,
            max_upload_bytes,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/state", get(state_handler))
            .route(
                "/api/document",
                post(upload_handler).delete(clear_document_handler),
            )
            .route("/api/messages", post(send_handler))
            .route("/api/chat/new", post(new_chat_handler))
            .route("/api/sessions", get(sessions_handler))
            .route("/api/sessions/dates", get(dates_handler))
            .route("/api/sessions/:id/load", post(load_session_handler))
            .route("/api/events", get(events_handler))
            .with_state(self.controller.clone())
            .layer(DefaultBodyLimit::max(self.max_upload_bytes + MULTIPART_OVERHEAD))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

async fn health_handler() -> &'static str {
    "ok"
}

async fn state_handler(State(controller): State<Arc<Controller>>) -> Json<Snapshot> {
    Json(controller.snapshot().await)
}

async fn upload_handler(
    State(controller): State<Arc<Controller>>,
    mut multipart: Multipart,
) -> Result<Json<DocumentInfo>, ApiError> {
    let max_bytes = controller.max_upload_bytes();
    let to_api_error = |e: MultipartError| multipart_error(e, max_bytes);

    while let Some(field) = multipart.next_field().await.map_err(to_api_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or("document.pdf").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(to_api_error)?;

        info!(file = %name, size = bytes.len(), "Received document upload");

        let doc_info = controller
            .upload_document(&name, content_type.as_deref(), bytes.to_vec())
            .await?;
        return Ok(Json(doc_info));
    }

    Err(ApiError::BadRequest("Missing 'file' field".to_string()))
}

fn multipart_error(e: MultipartError, max_bytes: usize) -> ApiError {
    // The body limit cut the stream off before the file was complete.
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::Upload(UploadError::TooLarge { max_bytes })
    } else {
        ApiError::BadRequest(e.body_text())
    }
}

async fn clear_document_handler(State(controller): State<Arc<Controller>>) -> Json<Snapshot> {
    controller.clear_document().await;
    Json(controller.snapshot().await)
}

async fn send_handler(
    State(controller): State<Arc<Controller>>,
    Json(request): Json<SendRequest>,
) -> Result<Json<Exchange>, ApiError> {
    controller
        .send_message(&request.text)
        .await
        .map(Json)
        .ok_or_else(|| {
            ApiError::Conflict(
                "Message ignored: no document loaded, empty text, or a request is in progress"
                    .to_string(),
            )
        })
}

async fn new_chat_handler(State(controller): State<Arc<Controller>>) -> Json<Snapshot> {
    controller.new_chat().await;
    Json(controller.snapshot().await)
}

async fn sessions_handler(
    State(controller): State<Arc<Controller>>,
    Query(query): Query<SessionQuery>,
) -> Json<Vec<SessionView>> {
    let sessions = controller.sessions(query.date).await;
    Json(sessions.into_iter().map(SessionView::from).collect())
}

async fn dates_handler(State(controller): State<Arc<Controller>>) -> Json<Vec<NaiveDate>> {
    Json(controller.available_dates().await)
}

async fn load_session_handler(
    State(controller): State<Arc<Controller>>,
    Path(id): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    controller
        .load_session(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown session: {}", id)))
}

async fn events_handler(
    State(controller): State<Arc<Controller>>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::BoxError>>> {
    info!("New SSE connection established");

    let mut rx = controller.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    match SseEvent::default().event(event_name(&event)).json_data(&event) {
                        Ok(sse) => {
                            yield Ok(sse);
                        }
                        Err(e) => warn!("Failed to encode event: {}", e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("SSE client lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::MessageAppended(_) => "message",
        Event::LoadingChanged { .. } => "loading",
        Event::DocumentChanged(_) => "document",
        Event::ConversationReset { .. } => "reset",
        Event::SessionSaved { .. } => "session",
    }
}
