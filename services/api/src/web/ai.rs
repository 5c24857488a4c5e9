//! services/api/src/web/ai.rs
//!
//! Handlers that call the AI vendor directly: the generic prompt passthrough,
//! audio matching, word translation and pronunciations.

use crate::web::{
    ai_error, bad_request, error_response, onboarding_error, protocol::*, state::AppState,
    ClientId, HandlerError,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::Value;
use std::sync::Arc;
use toy_stories_core::ports::{GenerationRequest, GenerativeAiService};
use toy_stories_core::PronunciationOptions;

/// Send a free-form prompt to the AI and return its text.
#[utoipa::path(
    post,
    path = "/api/gemini",
    request_body = PromptRequest,
    responses(
        (status = 200, description = "The generated text", body = PromptResponse),
        (status = 400, description = "Empty prompt", body = ErrorBody),
        (status = 429, description = "The AI vendor is rate limiting", body = ErrorBody),
        (status = 502, description = "The AI vendor failed", body = ErrorBody)
    )
)]
pub async fn prompt_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<PromptRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if payload.prompt.trim().is_empty() {
        return Err(bad_request("prompt is required"));
    }

    let mut request = GenerationRequest::text(payload.prompt);
    if let Some(model) = payload.model {
        request = request.with_model(model);
    }
    if let Some(temperature) = payload.temperature {
        request = request.with_temperature(temperature);
    }
    if let Some(max_tokens) = payload.max_tokens {
        request = request.with_max_output_tokens(max_tokens);
    }

    let text = match app_state.ai.generate(request).await.map_err(ai_error)? {
        Value::String(text) => text,
        other => other.to_string(),
    };
    Ok(Json(PromptResponse { text }))
}

/// Match a vocab list against the audio manifest.
#[utoipa::path(
    post,
    path = "/api/gemini/get-toy-audio",
    request_body = ToyAudioPayload,
    responses(
        (status = 200, description = "The same words with matched audio files", body = ToyAudioPayload),
        (status = 400, description = "Empty vocab list", body = ErrorBody),
        (status = 502, description = "The AI vendor failed", body = ErrorBody)
    )
)]
pub async fn toy_audio_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ToyAudioPayload>,
) -> Result<impl IntoResponse, HandlerError> {
    if payload.vocab.is_empty() {
        return Err(bad_request("vocab must not be empty"));
    }
    let vocab = app_state
        .onboarding
        .match_audio(&payload.vocab)
        .await
        .map_err(ai_error)?;
    Ok(Json(ToyAudioPayload { vocab }))
}

/// Translate a single word, optionally storing it on a toy.
#[utoipa::path(
    post,
    path = "/api/translate",
    request_body = TranslateWordRequest,
    responses(
        (status = 200, description = "The translated word", body = TranslateWordResponse),
        (status = 400, description = "Empty word", body = ErrorBody),
        (status = 404, description = "Unknown toy", body = ErrorBody)
    ),
    params(("x-user-id" = Option<String>, Header, description = "Client namespace."))
)]
pub async fn translate_word_handler(
    State(app_state): State<Arc<AppState>>,
    client: ClientId,
    Json(payload): Json<TranslateWordRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if payload.word.trim().is_empty() {
        return Err(bad_request("word is required"));
    }
    let translation = app_state
        .onboarding
        .translate_word(
            client.as_str(),
            payload.word.trim(),
            payload.target_language.as_deref(),
            payload.toy_key.as_deref(),
        )
        .await
        .map_err(onboarding_error)?;
    Ok(Json(TranslateWordResponse { translation }))
}

/// Generate (or reuse) spoken pronunciations for a batch of words.
#[utoipa::path(
    post,
    path = "/api/pronunciations",
    request_body = PronunciationsRequest,
    responses(
        (status = 200, description = "Audio URL per word", body = PronunciationsResponse),
        (status = 502, description = "Text-to-speech is not configured", body = ErrorBody)
    )
)]
pub async fn pronunciations_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<PronunciationsRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let Some(cache) = &app_state.pronunciations else {
        return Err(error_response(
            StatusCode::BAD_GATEWAY,
            "Text-to-speech is not configured",
        ));
    };
    let options = match payload.language_code {
        Some(language_code) => PronunciationOptions { language_code },
        None => PronunciationOptions::default(),
    };

    let pronunciations = cache.batch(&payload.words, &options).await;
    Ok(Json(PronunciationsResponse { pronunciations }))
}
