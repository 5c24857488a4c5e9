//! services/api/src/web/cloud.rs
//!
//! Explicit cloud copies: profile and story saves, soundboard bitmaps and the
//! demo-data catalogue.

use crate::web::{port_error, protocol::*, state::AppState, ClientId, HandlerError};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{info, warn};

/// Save the profile to blob storage and the key-value store.
///
/// Succeeds when either target accepted the write; the body reports both.
#[utoipa::path(
    post,
    path = "/api/user-data/save",
    request_body = SaveUserDataRequest,
    responses(
        (status = 200, description = "At least one target succeeded"),
        (status = 502, description = "Both targets failed")
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn save_user_data_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    payload: Option<Json<SaveUserDataRequest>>,
) -> Result<impl IntoResponse, HandlerError> {
    let owner = client.as_str();
    let (user_data, user_id) = match payload {
        Some(Json(p)) => (p.user_data, p.user_id),
        None => (None, None),
    };
    let profile = match user_data {
        Some(profile) => profile,
        None => {
            app_state
                .persistence
                .load_profile(owner)
                .await
                .map_err(port_error)?
                .value
        }
    };
    let user_id = match user_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => app_state
            .persistence
            .user_id(owner)
            .await
            .map_err(port_error)?,
    };

    let report = app_state.backup.save_user_data(&user_id, &profile).await;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(report)))
}

/// Save the story list to blob storage.
#[utoipa::path(
    post,
    path = "/api/stories/save",
    request_body = SaveStoriesRequest,
    responses(
        (status = 200, description = "The stored blob's URL", body = SaveStoriesResponse),
        (status = 500, description = "The upload failed", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn save_stories_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    payload: Option<Json<SaveStoriesRequest>>,
) -> Result<impl IntoResponse, HandlerError> {
    let owner = client.as_str();
    let (stories, user_id) = match payload {
        Some(Json(p)) => (p.stories, p.user_id),
        None => (None, None),
    };
    let stories = match stories {
        Some(stories) => stories,
        None => {
            app_state
                .persistence
                .load_stories(owner)
                .await
                .map_err(port_error)?
                .value
        }
    };
    let user_id = match user_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => app_state
            .persistence
            .user_id(owner)
            .await
            .map_err(port_error)?,
    };

    let url = app_state
        .backup
        .save_stories(&user_id, &stories)
        .await
        .map_err(port_error)?;
    Ok(Json(SaveStoriesResponse { success: true, url }))
}

/// Convert toy photos into bitmaps for the soundboard device.
///
/// Each uploaded URL is also recorded on the stored toy.
#[utoipa::path(
    post,
    path = "/api/soundboard-prep",
    request_body = SoundboardRequest,
    responses((status = 200, description = "Per-toy bitmap URL or error", body = SoundboardResponse)),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn soundboard_prep_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    payload: Option<Json<SoundboardRequest>>,
) -> Result<impl IntoResponse, HandlerError> {
    let owner = client.as_str();
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let current = app_state
        .persistence
        .load_profile(owner)
        .await
        .map_err(port_error)?;
    let toys = payload.toys.unwrap_or_else(|| current.value.toys.clone());

    let entries = app_state.backup.prepare_soundboard(&toys).await;

    let mut profile = current.value;
    let mut changed = false;
    for entry in &entries {
        let Some(url) = &entry.bmp_url else { continue };
        if let Some(mut toy) = profile.find_toy(&entry.key).cloned() {
            toy.bmp_url = Some(url.clone());
            profile.upsert_toy(toy);
            changed = true;
        }
    }
    if changed {
        if let Err(e) = app_state
            .persistence
            .save_profile(owner, &profile, Some(current.version))
            .await
        {
            warn!("Could not record soundboard bitmaps for {}: {}", owner, e);
        }
    }

    Ok(Json(SoundboardResponse {
        success: true,
        toys: entries,
    }))
}

/// List saved profiles and story lists that can be loaded as demo data.
#[utoipa::path(
    get,
    path = "/api/demo-data/list",
    responses(
        (status = 200, description = "Profile and story blobs"),
        (status = 500, description = "Listing failed", body = ErrorBody)
    )
)]
pub async fn list_demo_data_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let listing = app_state.backup.list_demo_data().await.map_err(port_error)?;
    Ok(Json(listing))
}

/// Download a saved profile and story list, optionally applying them.
///
/// Applying replaces the client's profile and stories and makes the first
/// story current.
#[utoipa::path(
    post,
    path = "/api/demo-data/fetch",
    request_body = FetchDemoDataRequest,
    responses(
        (status = 200, description = "The downloaded profile and stories"),
        (status = 404, description = "A blob does not exist", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn fetch_demo_data_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    Json(payload): Json<FetchDemoDataRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let data = app_state
        .backup
        .fetch_demo_data(&payload.user_data_url, &payload.stories_url)
        .await
        .map_err(port_error)?;

    if payload.apply {
        let owner = client.as_str();
        let persistence = &app_state.persistence;
        persistence
            .save_profile(owner, &data.user_data, None)
            .await
            .map_err(port_error)?;
        persistence
            .save_stories(owner, &data.stories, None)
            .await
            .map_err(port_error)?;
        if let Some(first) = data.stories.first() {
            persistence
                .save_current_story_id(owner, &first.id)
                .await
                .map_err(port_error)?;
        }
        info!(
            "Applied demo data ({} toys, {} stories) to {}",
            data.user_data.toys.len(),
            data.stories.len(),
            owner
        );
    }

    Ok(Json(data))
}
