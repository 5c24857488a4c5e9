//! services/api/src/adapters/edge_config.rs
//!
//! Vercel Edge Config as the `KeyValueStore` port, written through the Vercel
//! management API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use toy_stories_core::ports::{KeyValueStore, PortError, PortResult};

use crate::config::EdgeConfigSettings;

#[derive(Clone)]
pub struct EdgeConfigAdapter {
    client: Client,
    settings: EdgeConfigSettings,
}

impl EdgeConfigAdapter {
    pub fn new(settings: EdgeConfigSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl KeyValueStore for EdgeConfigAdapter {
    async fn set(&self, key: &str, value: Value) -> PortResult<()> {
        let url = format!(
            "{}/v1/edge-config/{}/items",
            self.settings.api_base_url.trim_end_matches('/'),
            self.settings.config_id
        );
        // "upsert" also creates keys that do not exist yet.
        let body = json!({
            "items": [{ "operation": "upsert", "key": key, "value": value }]
        });

        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.settings.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "Edge Config update failed with {status}: {message}"
            )));
        }
        Ok(())
    }
}
