//! services/api/src/web/stories.rs
//!
//! Story generation, cancellation and retrieval.

use crate::web::{
    error_response, port_error, protocol::*, state::AppState, story_error, ClientId, HandlerError,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toy_stories_core::StoryOutcome;

/// Status for a request the client cancelled.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Write a new story about the given (or the selected) toys.
///
/// Closing the connection cancels the generation, as does
/// `POST /api/stories/cancel` from another request.
#[utoipa::path(
    post,
    path = "/api/gemini/create-story",
    request_body = CreateStoryRequest,
    responses(
        (status = 201, description = "The new story, also stored as the current story"),
        (status = 400, description = "No toys to write about", body = ErrorBody),
        (status = 429, description = "The AI vendor is rate limiting", body = ErrorBody),
        (status = 499, description = "Cancelled; nothing was stored", body = CancelledResponse),
        (status = 502, description = "The AI vendor failed", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn create_story_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    payload: Option<Json<CreateStoryRequest>>,
) -> Result<Response, HandlerError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let token = CancellationToken::new();
    // Dropped with this future when the client goes away.
    let _disconnect = token.clone().drop_guard();

    let outcome = app_state
        .stories
        .generate(client.as_str(), payload.toy_keys, token)
        .await
        .map_err(story_error)?;

    Ok(match outcome {
        StoryOutcome::Created(story) => (StatusCode::CREATED, Json(story)).into_response(),
        StoryOutcome::Cancelled => (
            StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::OK),
            Json(CancelledResponse { cancelled: true }),
        )
            .into_response(),
    })
}

/// Cancel the client's in-flight story generation. Safe to call repeatedly.
#[utoipa::path(
    post,
    path = "/api/stories/cancel",
    responses((status = 200, description = "Whether a generation was running", body = CancelStoryResponse)),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn cancel_story_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
) -> impl IntoResponse {
    let cancelled = app_state.stories.cancel(client.as_str());
    Json(CancelStoryResponse { cancelled })
}

/// List the client's stories, newest first.
#[utoipa::path(
    get,
    path = "/api/stories",
    responses((status = 200, description = "Stories, newest first")),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn list_stories_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
) -> Result<impl IntoResponse, HandlerError> {
    let stories = app_state
        .persistence
        .load_stories(client.as_str())
        .await
        .map_err(port_error)?;
    Ok(Json(stories.value))
}

/// The current story, else the newest.
#[utoipa::path(
    get,
    path = "/api/stories/current",
    responses(
        (status = 200, description = "The current story"),
        (status = 404, description = "The client has no stories", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn current_story_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
) -> Result<impl IntoResponse, HandlerError> {
    let story = app_state
        .stories
        .current_story(client.as_str())
        .await
        .map_err(story_error)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "No stories yet"))?;
    Ok(Json(story))
}

/// Translate a stored story's pages into the profile language.
#[utoipa::path(
    post,
    path = "/api/stories/translate",
    request_body = TranslateStoryRequest,
    responses(
        (status = 200, description = "The story with translated pages"),
        (status = 404, description = "Unknown story", body = ErrorBody),
        (status = 502, description = "The AI vendor failed", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn translate_story_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    Json(payload): Json<TranslateStoryRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let story = app_state
        .stories
        .translate_story(
            client.as_str(),
            &payload.story_id,
            payload.target_language.as_deref(),
        )
        .await
        .map_err(story_error)?;
    Ok(Json(story))
}
