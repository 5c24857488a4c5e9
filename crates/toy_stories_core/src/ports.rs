//! crates/toy_stories_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the AI vendor, the blob store and the document database.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::schema::ResponseSchema;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for storage and network port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A whole-document write lost a race with another writer.
    #[error("Version conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Failure kinds of a generative-AI call. Callers must handle each one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    #[error("The AI service is rate limiting requests")]
    RateLimited,
    #[error("The AI service returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("The AI service could not be reached: {0}")]
    NetworkFailure(String),
    #[error("The AI response did not match the requested schema: {0}")]
    SchemaViolation(String),
}

pub type AiResult<T> = Result<T, AiError>;

//=========================================================================================
// Generative AI
//=========================================================================================

/// Media passed alongside a prompt.
#[derive(Debug, Clone)]
pub enum Attachment {
    Inline { mime_type: String, data: Bytes },
    /// A file the vendor can reach by URI.
    Remote { mime_type: String, uri: String },
}

/// What shape the caller expects back.
#[derive(Debug, Clone)]
pub enum ResponseFormat {
    /// Free text, returned as a JSON string value.
    Text,
    /// A JSON document that must satisfy the schema.
    Json(ResponseSchema),
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_instruction: Option<String>,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub response_format: ResponseFormat,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Overrides the adapter's default model.
    pub model: Option<String>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: None,
            prompt: prompt.into(),
            attachments: Vec::new(),
            response_format: ResponseFormat::Text,
            temperature: None,
            max_output_tokens: None,
            model: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
pub trait GenerativeAiService: Send + Sync {
    /// Runs one prompt. For `ResponseFormat::Json` the adapter must return a value
    /// that parsed and passed `ResponseSchema::validate`.
    async fn generate(&self, request: GenerationRequest) -> AiResult<serde_json::Value>;
}

//=========================================================================================
// Blob Store
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobObject {
    pub url: String,
    pub pathname: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutOptions {
    pub content_type: String,
    /// Lets the store append a random suffix so every save is a new object.
    pub random_suffix: bool,
}

impl PutOptions {
    /// A JSON snapshot. Snapshots never overwrite each other.
    pub fn json() -> Self {
        Self {
            content_type: "application/json".to_string(),
            random_suffix: true,
        }
    }

    /// An object that lives at exactly `pathname` and replaces any earlier one.

    pub fn fixed(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            random_suffix: false,
        }
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `body` under `pathname` and returns its public URL.
    async fn put(&self, pathname: &str, body: Bytes, options: PutOptions) -> PortResult<String>;

    async fn list(&self, prefix: &str) -> PortResult<Vec<BlobObject>>;

    async fn get(&self, url: &str) -> PortResult<Bytes>;
}

/// A small key-value store used as the second target of profile saves.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: serde_json::Value) -> PortResult<()>;
}

//=========================================================================================
// Client Document Store
//=========================================================================================

/// The documents a client keeps. Names match the web client's storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    UserData,
    Stories,
    SelectedToys,
    CurrentStoryId,
    UserId,
}

impl DocumentKey {
    pub const ALL: [DocumentKey; 5] = [
        DocumentKey::UserData,
        DocumentKey::Stories,
        DocumentKey::SelectedToys,
        DocumentKey::CurrentStoryId,
        DocumentKey::UserId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKey::UserData => "userData",
            DocumentKey::Stories => "stories",
            DocumentKey::SelectedToys => "selectedToys",
            DocumentKey::CurrentStoryId => "currentStoryId",
            DocumentKey::UserId => "userId",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub body: String,
    /// Starts at 1 on first write and increases on every replace.
    pub version: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, owner: &str, key: DocumentKey) -> PortResult<Option<StoredDocument>>;

    /// Replaces the whole document and returns its new version.
    ///
    /// With `Some(v)` the write only succeeds if the stored version is `v`
    /// (`0` meaning "absent"); otherwise it fails with `PortError::Conflict`.
    /// `None` writes unconditionally.
    async fn replace(
        &self,
        owner: &str,
        key: DocumentKey,
        body: &str,
        expected_version: Option<u64>,
    ) -> PortResult<u64>;

    /// Deletes every document the owner has.
    async fn clear(&self, owner: &str) -> PortResult<()>;
}

//=========================================================================================
// Image Download and Speech
//=========================================================================================

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> PortResult<FetchedImage>;

    /// Writes a downloaded image to local storage and returns its path.
    /// `file_name` only hints the extension.
    async fn keep_copy(&self, image: &FetchedImage, file_name: Option<&str>) -> PortResult<PathBuf>;
}

/// Cuts the subject of a photo out of its background.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Returns the cut-out as PNG bytes with a transparent background.
    async fn remove_background(&self, image_url: &str) -> PortResult<Bytes>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Generates audio data from a string of text.
    async fn synthesize(&self, text: &str, language_code: &str) -> PortResult<Vec<u8>>;

    /// Identifies the voice, so cached audio is not reused across voices.
    fn voice_name(&self) -> String;
}
