//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the profile and toy endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    ai, bad_request, cloud, onboarding_error, port_error, protocol::*, state::AppState, stories,
    ClientId, HandlerError,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use toy_stories_core::domain::Toy;
use tracing::{info, warn};
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_user_data_handler,
        update_user_data_handler,
        reset_user_data_handler,
        download_image_handler,
        resume_toy_handler,
        replace_toy_handler,
        delete_toy_handler,
        select_toys_handler,
        ai::prompt_handler,
        ai::toy_audio_handler,
        ai::translate_word_handler,
        ai::pronunciations_handler,
        stories::create_story_handler,
        stories::cancel_story_handler,
        stories::list_stories_handler,
        stories::current_story_handler,
        stories::translate_story_handler,
        cloud::save_user_data_handler,
        cloud::save_stories_handler,
        cloud::soundboard_prep_handler,
        cloud::list_demo_data_handler,
        cloud::fetch_demo_data_handler,
    ),
    components(
        schemas(
            ErrorBody,
            CancelledResponse,
            UpdateProfileRequest,
            SaveUserDataRequest,
            DownloadImageRequest,
            SelectedToysRequest,
            SoundboardRequest,
            SoundboardResponse,
            PromptRequest,
            PromptResponse,
            ToyAudioPayload,
            TranslateWordRequest,
            TranslateWordResponse,
            PronunciationsRequest,
            PronunciationsResponse,
            CreateStoryRequest,
            CancelStoryResponse,
            SaveStoriesRequest,
            SaveStoriesResponse,
            TranslateStoryRequest,
            FetchDemoDataRequest,
        )
    ),
    tags(
        (name = "Toys to Stories API", description = "Toy onboarding, story generation and cloud backup.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Profile Handlers
//=========================================================================================

/// Read the client's profile.
#[utoipa::path(
    get,
    path = "/api/user-data",
    responses(
        (status = 200, description = "The stored profile, empty when none exists"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace; defaults to `anonymous`."))
)]
pub async fn get_user_data_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
) -> Result<impl IntoResponse, HandlerError> {
    let profile = app_state
        .persistence
        .load_profile(client.as_str())
        .await
        .map_err(port_error)?;
    Ok(Json(profile.value))
}

/// Set the onboarding language and reading level.
#[utoipa::path(
    put,
    path = "/api/user-data",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "The updated profile"),
        (status = 400, description = "Reading level outside 1-5", body = ErrorBody),
        (status = 409, description = "The profile changed concurrently", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn update_user_data_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if let Some(level) = payload.reading_level {
        if !(1..=5).contains(&level) {
            return Err(bad_request("readingLevel must be between 1 and 5"));
        }
    }

    let current = app_state
        .persistence
        .load_profile(client.as_str())
        .await
        .map_err(port_error)?;
    let mut profile = current.value;
    if let Some(language) = payload.language {
        profile.language = Some(language);
    }
    if let Some(level) = payload.reading_level {
        profile.reading_level = Some(level);
    }

    app_state
        .persistence
        .save_profile(client.as_str(), &profile, Some(current.version))
        .await
        .map_err(port_error)?;
    Ok(Json(profile))
}

/// Delete every document the client owns.
#[utoipa::path(
    delete,
    path = "/api/user-data",
    responses((status = 204, description = "All client data removed")),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn reset_user_data_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
) -> Result<impl IntoResponse, HandlerError> {
    app_state
        .persistence
        .reset(client.as_str())
        .await
        .map_err(port_error)?;
    info!("Reset all data for {}", client.as_str());
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Toy Handlers
//=========================================================================================

/// Accept an uploaded photo and run the onboarding pipeline for it.
///
/// The response lists every stage that failed; a failed stage does not make
/// the request fail.
#[utoipa::path(
    post,
    path = "/api/download-image",
    request_body = DownloadImageRequest,
    responses(
        (status = 200, description = "The toy, the state reached and any stage failures"),
        (status = 400, description = "No image URL could be determined", body = ErrorBody),
        (status = 409, description = "This toy is already being processed", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn download_image_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    Json(payload): Json<DownloadImageRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if payload.file_key.trim().is_empty() {
        return Err(bad_request("fileKey is required"));
    }
    let image_url = payload
        .image_url
        .filter(|url| !url.trim().is_empty())
        .or_else(|| app_state.config.upload_url(&payload.file_key))
        .ok_or_else(|| bad_request("imageUrl is required when no upload app id is configured"))?;

    let outcome = app_state
        .onboarding
        .onboard(
            client.as_str(),
            &payload.file_key,
            &image_url,
            payload.file_name.as_deref(),
        )
        .await
        .map_err(onboarding_error)?;
    Ok(Json(outcome))
}

/// Continue onboarding a toy from its last checkpoint.
#[utoipa::path(
    post,
    path = "/api/toys/{key}/resume",
    responses(
        (status = 200, description = "The toy, the state reached and any stage failures"),
        (status = 404, description = "Unknown toy", body = ErrorBody),
        (status = 409, description = "This toy is already being processed", body = ErrorBody)
    ),
    params(
        ("key" = String, Path, description = "The toy's upload key."),
        ("x-user-id" = Option<String>, Header, description = "Client namespace.")
    )
)]
pub async fn resume_toy_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let outcome = app_state
        .onboarding
        .resume(client.as_str(), &key)
        .await
        .map_err(onboarding_error)?;
    Ok(Json(outcome))
}

/// Replace a toy record, e.g. after the parent edits its name.
#[utoipa::path(
    put,
    path = "/api/toys/{key}",
    request_body(content_type = "application/json", description = "The whole toy record."),
    responses(
        (status = 200, description = "The stored toy"),
        (status = 400, description = "The body's key does not match the path", body = ErrorBody),
        (status = 404, description = "Unknown toy", body = ErrorBody)
    ),
    params(
        ("key" = String, Path, description = "The toy's upload key."),
        ("x-user-id" = Option<String>, Header, description = "Client namespace.")
    )
)]
pub async fn replace_toy_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    Path(key): Path<String>,
    Json(toy): Json<Toy>,
) -> Result<impl IntoResponse, HandlerError> {
    if toy.key != key {
        return Err(bad_request("The toy key cannot be changed"));
    }

    let current = app_state
        .persistence
        .load_profile(client.as_str())
        .await
        .map_err(port_error)?;
    let mut profile = current.value;
    if profile.find_toy(&key).is_none() {
        return Err(onboarding_error(
            toy_stories_core::OnboardingError::NotFound(key),
        ));
    }
    profile.upsert_toy(toy.clone());

    app_state
        .persistence
        .save_profile(client.as_str(), &profile, Some(current.version))
        .await
        .map_err(port_error)?;
    Ok(Json(toy))
}

/// Remove a toy. It is also dropped from the selected toys.
#[utoipa::path(
    delete,
    path = "/api/toys/{key}",
    responses(
        (status = 204, description = "Toy removed"),
        (status = 404, description = "Unknown toy", body = ErrorBody)
    ),
    params(
        ("key" = String, Path, description = "The toy's upload key."),
        ("x-user-id" = Option<String>, Header, description = "Client namespace.")
    )
)]
pub async fn delete_toy_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let owner = client.as_str();
    let current = app_state
        .persistence
        .load_profile(owner)
        .await
        .map_err(port_error)?;
    let mut profile = current.value;
    if !profile.remove_toy(&key) {
        return Err(onboarding_error(
            toy_stories_core::OnboardingError::NotFound(key),
        ));
    }
    app_state
        .persistence
        .save_profile(owner, &profile, Some(current.version))
        .await
        .map_err(port_error)?;

    let mut selected = app_state
        .persistence
        .load_selected_toys(owner)
        .await
        .map_err(port_error)?;
    if selected.contains(&key) {
        selected.retain(|k| k != &key);
        if let Err(e) = app_state.persistence.save_selected_toys(owner, &selected).await {
            warn!("Could not drop {} from the selected toys: {}", key, e);
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the set of toys the next story is written about.
#[utoipa::path(
    put,
    path = "/api/selected-toys",
    request_body = SelectedToysRequest,
    responses(
        (status = 200, description = "The stored selection", body = Vec<String>),
        (status = 400, description = "A key does not name a stored toy", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn select_toys_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    Json(payload): Json<SelectedToysRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let owner = client.as_str();
    let profile = app_state
        .persistence
        .load_profile(owner)
        .await
        .map_err(port_error)?
        .value;
    if let Some(unknown) = payload
        .toy_keys
        .iter()
        .find(|key| profile.find_toy(key).is_none())
    {
        return Err(bad_request(format!("Unknown toy: {unknown}")));
    }

    app_state
        .persistence
        .save_selected_toys(owner, &payload.toy_keys)
        .await
        .map_err(port_error)?;
    Ok(Json(payload.toy_keys))
}
