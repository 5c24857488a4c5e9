//! services/api/src/adapters/gemini.rs
//!
//! This module contains the adapter for Google's Gemini `generateContent` REST API.
//! It implements the `GenerativeAiService` port from the `core` crate.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use toy_stories_core::ports::{
    AiError, AiResult, Attachment, GenerationRequest, GenerativeAiService, ResponseFormat,
};
use tracing::{debug, warn};

const DEFAULT_TEMPERATURE: f32 = 1.0;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `GenerativeAiService` port using the Gemini API.
#[derive(Clone)]
pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiAdapter {
    /// Creates a new `GeminiAdapter`.
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

/// Builds the `generateContent` request body.
fn request_body(request: &GenerationRequest) -> Value {
    let mut parts: Vec<Value> = request
        .attachments
        .iter()
        .map(|attachment| match attachment {
            Attachment::Inline { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(data),
                }
            }),
            Attachment::Remote { mime_type, uri } => json!({
                "fileData": { "mimeType": mime_type, "fileUri": uri }
            }),
        })
        .collect();
    parts.push(json!({ "text": request.prompt }));

    let mut generation_config = json!({
        "temperature": request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        "topP": 0.95,
        "topK": 40,
        "maxOutputTokens": request.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
        "responseMimeType": "text/plain",
    });
    if let ResponseFormat::Json(schema) = &request.response_format {
        generation_config["responseMimeType"] = json!("application/json");
        generation_config["responseSchema"] = schema.as_value().clone();
    }

    let mut body = json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation_config,
    });
    if let Some(instruction) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }
    body
}

//=========================================================================================
// Gemini API response types
//=========================================================================================

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Models sometimes wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn truncate(text: &str) -> String {
    if text.len() > 500 {
        let mut end = 500;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}

//=========================================================================================
// `GenerativeAiService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerativeAiService for GeminiAdapter {
    async fn generate(&self, request: GenerationRequest) -> AiResult<Value> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = request_body(&request);

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| AiError::NetworkFailure(e.to_string()))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Gemini rate limited the request");
            return Err(AiError::RateLimited);
        }
        if !status.is_success() {
            return Err(AiError::NetworkFailure(format!(
                "Gemini returned {}: {}",
                status,
                truncate(&response_text)
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| AiError::InvalidResponse(format!("Failed to parse response: {e}")))?;
        let text = parsed.text().ok_or_else(|| {
            AiError::InvalidResponse(format!("No text in response. Body: {}", truncate(&response_text)))
        })?;
        debug!("Gemini answered with {} characters", text.len());

        match &request.response_format {
            ResponseFormat::Text => Ok(Value::String(text)),
            ResponseFormat::Json(schema) => {
                let value: Value = serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
                    AiError::InvalidResponse(format!("Response is not JSON: {e}"))
                })?;
                schema.validate(&value).map_err(AiError::SchemaViolation)?;
                Ok(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toy_stories_core::schema::ResponseSchema;

    #[test]
    fn json_requests_carry_schema_and_inline_data() {
        let schema = ResponseSchema::new(json!({ "type": "object" }));
        let mut request = GenerationRequest::text("Identify")
            .with_system_instruction("Be brief")
            .with_attachment(Attachment::Inline {
                mime_type: "image/png".into(),
                data: bytes::Bytes::from_static(b"abc"),
            });
        request.response_format = ResponseFormat::Json(schema);

        let body = request_body(&request);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief");
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["data"], "YWJj");
        assert_eq!(parts[1]["text"], "Identify");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "object");
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence(" {\"a\":1} "), "{\"a\":1}");
    }
}
