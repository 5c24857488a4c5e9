//! services/api/src/adapters/replicate.rs
//!
//! Background removal through a hosted model on Replicate. Implements the
//! `BackgroundRemover` port.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use toy_stories_core::ports::{BackgroundRemover, PortError, PortResult};
use tracing::{debug, info};

use crate::config::ReplicateSettings;

/// 851-labs/background-remover
const MODEL_VERSION: &str = "a029dff38972b5fda4ec5d75d7d1cd25aeff621d2cf4946a41055d7db66b80bc";
const MAX_POLLS: u32 = 30;

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Clone)]
pub struct ReplicateBackgroundRemover {
    client: Client,
    settings: ReplicateSettings,
    poll_interval: Duration,
}

impl ReplicateBackgroundRemover {
    pub fn new(settings: ReplicateSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_base_url.trim_end_matches('/'), path)
    }

    async fn read_prediction(response: reqwest::Response) -> PortResult<Prediction> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PortError::NotFound("prediction".to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "Replicate request failed with {status}: {message}"
            )));
        }
        response
            .json::<Prediction>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Invalid Replicate response: {e}")))
    }

    async fn create(&self, image_url: &str) -> PortResult<Prediction> {
        let response = self
            .client
            .post(self.endpoint("/v1/predictions"))
            .bearer_auth(&self.settings.api_token)
            // Holds the request open until the prediction finishes or a minute passes.
            .header("Prefer", "wait")
            .json(&json!({ "version": MODEL_VERSION, "input": { "image": image_url } }))
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Self::read_prediction(response).await
    }

    async fn poll(&self, id: &str) -> PortResult<Prediction> {
        let response = self
            .client
            .get(self.endpoint(&format!("/v1/predictions/{id}")))
            .bearer_auth(&self.settings.api_token)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Self::read_prediction(response).await
    }

    async fn download(&self, url: &str) -> PortResult<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Download of {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Unexpected(format!(
                "Download of {url} failed with {status}"
            )));
        }
        response
            .bytes()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

/// The model answers with a single file URL; some versions wrap it in a list.
fn output_url(output: &Value) -> Option<&str> {
    match output {
        Value::String(url) => Some(url.as_str()),
        Value::Array(items) => items.iter().find_map(Value::as_str),
        _ => None,
    }
}

#[async_trait]
impl BackgroundRemover for ReplicateBackgroundRemover {
    async fn remove_background(&self, image_url: &str) -> PortResult<Bytes> {
        let mut prediction = self.create(image_url).await?;
        let mut polls = 0;
        while matches!(prediction.status.as_str(), "starting" | "processing") {
            if polls == MAX_POLLS {
                return Err(PortError::Unexpected(format!(
                    "Prediction {} did not finish in time",
                    prediction.id
                )));
            }
            polls += 1;
            debug!("Waiting for prediction {} ({})", prediction.id, prediction.status);
            tokio::time::sleep(self.poll_interval).await;
            prediction = self.poll(&prediction.id).await?;
        }

        if prediction.status != "succeeded" {
            let reason = prediction
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| prediction.status.clone());
            return Err(PortError::Unexpected(format!(
                "Background removal failed: {reason}"
            )));
        }
        let url = output_url(&prediction.output).ok_or_else(|| {
            PortError::Unexpected("Background removal returned no image".to_string())
        })?;

        let cutout = self.download(url).await?;
        info!("Removed background of {} ({} bytes)", image_url, cutout.len());
        Ok(cutout)
    }
}
