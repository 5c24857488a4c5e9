//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the web client and the API server.
//! Field names are camelCase to match the client's stored documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use toy_stories_core::domain::{Story, Toy, UserProfile, VocabEntry};
use utoipa::ToSchema;

//=========================================================================================
// Shared
//=========================================================================================

/// The body of every error response.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Returned instead of a story when generation was cancelled.
#[derive(Serialize, Debug, ToSchema)]
pub struct CancelledResponse {
    pub cancelled: bool,
}

//=========================================================================================
// User Data and Toys
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub language: Option<String>,
    /// 1 to 5.
    pub reading_level: Option<u8>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveUserDataRequest {
    /// Defaults to the stored profile.
    #[schema(value_type = Option<Object>)]
    pub user_data: Option<UserProfile>,
    /// Defaults to the client's stored user id.
    pub user_id: Option<String>,
}

/// The upload widget's acknowledgment of a photo.
#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadImageRequest {
    pub file_key: String,
    /// Defaults to the upload CDN URL for `file_key`.
    pub image_url: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectedToysRequest {
    pub toy_keys: Vec<String>,
}

#[derive(Serialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SoundboardResponse {
    pub success: bool,
    #[schema(value_type = Vec<Object>)]
    pub toys: Vec<toy_stories_core::SoundboardEntry>,
}

#[derive(Deserialize, Debug, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SoundboardRequest {
    /// Defaults to every stored toy.
    #[schema(value_type = Option<Vec<Object>>)]
    pub toys: Option<Vec<Toy>>,
}

//=========================================================================================
// AI Passthrough, Translation and Pronunciation
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct PromptResponse {
    pub text: String,
}

#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct ToyAudioPayload {
    #[schema(value_type = Vec<Object>)]
    pub vocab: Vec<VocabEntry>,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranslateWordRequest {
    pub word: String,
    pub target_language: Option<String>,
    /// When set, the translation is stored on this toy's vocab entry.
    pub toy_key: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct TranslateWordResponse {
    pub translation: String,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PronunciationsRequest {
    pub words: Vec<String>,
    pub language_code: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct PronunciationsResponse {
    /// Word to audio URL; `null` when that word failed.
    pub pronunciations: BTreeMap<String, Option<String>>,
}

//=========================================================================================
// Stories
//=========================================================================================

#[derive(Deserialize, Debug, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryRequest {
    /// Defaults to the client's selected toys.
    pub toy_keys: Option<Vec<String>>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct CancelStoryResponse {
    /// Whether a generation was running.
    pub cancelled: bool,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveStoriesRequest {
    /// Defaults to the stored stories.
    #[schema(value_type = Option<Vec<Object>>)]
    pub stories: Option<Vec<Story>>,
    pub user_id: Option<String>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SaveStoriesResponse {
    pub success: bool,
    pub url: String,
}

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranslateStoryRequest {
    pub story_id: String,
    pub target_language: Option<String>,
}

//=========================================================================================
// Demo Data
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FetchDemoDataRequest {
    pub user_data_url: String,
    pub stories_url: String,
    /// Also replace the client's stored profile and stories.
    #[serde(default)]
    pub apply: bool,
}
