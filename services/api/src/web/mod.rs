//! services/api/src/web/mod.rs
//!
//! The HTTP layer: shared state, request/response payloads, the client id
//! extractor and the mapping from domain errors to status codes.

pub mod ai;
pub mod cloud;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod stories;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use toy_stories_core::{AiError, OnboardingError, PortError, StoryError};
use tracing::error;

use crate::web::protocol::ErrorBody;

/// Client namespace used when a request carries no `x-user-id` header.
pub const ANONYMOUS_CLIENT: &str = "anonymous";
const MAX_CLIENT_ID_LEN: usize = 64;

/// The error half of every handler result.
pub type HandlerError = (StatusCode, Json<ErrorBody>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> HandlerError {
    error_response(StatusCode::BAD_REQUEST, message)
}

pub fn port_error(e: PortError) -> HandlerError {
    match e {
        PortError::NotFound(what) => error_response(StatusCode::NOT_FOUND, format!("Not found: {what}")),
        PortError::Conflict(what) => error_response(
            StatusCode::CONFLICT,
            format!("The data changed while it was being saved, please retry: {what}"),
        ),
        PortError::Unexpected(message) => {
            error!("Port failure: {}", message);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred")
        }
    }
}

pub fn ai_error(e: AiError) -> HandlerError {
    error!("AI call failed: {}", e);
    match e {
        AiError::RateLimited => error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "The AI service is busy, please try again shortly",
        ),
        other => error_response(StatusCode::BAD_GATEWAY, other.to_string()),
    }
}

pub fn onboarding_error(e: OnboardingError) -> HandlerError {
    match e {
        OnboardingError::AlreadyRunning(key) => error_response(
            StatusCode::CONFLICT,
            format!("Toy {key} is already being processed"),
        ),
        OnboardingError::NotFound(key) => {
            error_response(StatusCode::NOT_FOUND, format!("Toy not found: {key}"))
        }
        OnboardingError::Ai(e) => ai_error(e),
        OnboardingError::Port(e) => port_error(e),
    }
}

pub fn story_error(e: StoryError) -> HandlerError {
    match e {
        StoryError::NoToys => bad_request("Select at least one toy for the story"),
        StoryError::NotFound(id) => {
            error_response(StatusCode::NOT_FOUND, format!("Story not found: {id}"))
        }
        StoryError::Ai(e) => ai_error(e),
        StoryError::Port(e) => port_error(e),
    }
}

//=========================================================================================
// Client Namespace Extractor
//=========================================================================================

/// The client namespace from the `x-user-id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parse(raw: Option<&str>) -> Result<Self, HandlerError> {
        let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(Self(ANONYMOUS_CLIENT.to_string()));
        };
        let valid = raw.len() <= MAX_CLIENT_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(bad_request(
                "x-user-id may only contain letters, digits, '-' and '_' (64 at most)",
            ));
        }
        Ok(Self(raw.to_string()))
    }
}

impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = HandlerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-user-id")
            .map(|v| v.to_str().map_err(|_| bad_request("x-user-id must be ASCII")))
            .transpose()?;
        Self::parse(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_is_anonymous() {
        assert_eq!(ClientId::parse(None).unwrap().as_str(), "anonymous");
        assert_eq!(ClientId::parse(Some("  ")).unwrap().as_str(), "anonymous");
    }

    #[test]
    fn client_ids_are_restricted() {
        assert!(ClientId::parse(Some("family-42_a")).is_ok());
        let (status, _) = ClientId::parse(Some("../etc")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(ai_error(AiError::RateLimited).0, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ai_error(AiError::SchemaViolation("x".into())).0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            onboarding_error(OnboardingError::AlreadyRunning("k".into())).0,
            StatusCode::CONFLICT
        );
        assert_eq!(story_error(StoryError::NoToys).0, StatusCode::BAD_REQUEST);
        assert_eq!(
            port_error(PortError::Conflict("v".into())).0,
            StatusCode::CONFLICT
        );
    }
}
