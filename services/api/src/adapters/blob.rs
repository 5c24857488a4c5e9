//! services/api/src/adapters/blob.rs
//!
//! Vercel Blob over its REST API. Implements the `BlobStore` port.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use toy_stories_core::ports::{BlobObject, BlobStore, PortError, PortResult, PutOptions};
use tracing::debug;

const API_VERSION: &str = "7";
const LIST_PAGE_SIZE: u32 = 1000;

#[derive(Clone)]
pub struct VercelBlobAdapter {
    client: Client,
    token: String,
    base_url: String,
}

impl VercelBlobAdapter {
    pub fn new(token: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct PutResponse {
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    blobs: Vec<BlobObject>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

fn unexpected(e: reqwest::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

async fn check_status(response: reqwest::Response, what: &str) -> PortResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => PortError::NotFound(what.to_string()),
        _ => PortError::Unexpected(format!("{what} failed with {status}: {body}")),
    })
}

#[async_trait]
impl BlobStore for VercelBlobAdapter {
    async fn put(&self, pathname: &str, body: Bytes, options: PutOptions) -> PortResult<String> {
        let response = self
            .client
            .put(format!("{}/{}", self.base_url, pathname))
            .bearer_auth(&self.token)
            .header("x-api-version", API_VERSION)
            .header("x-content-type", &options.content_type)
            .header(
                "x-add-random-suffix",
                if options.random_suffix { "1" } else { "0" },
            )
            .body(body)
            .send()
            .await
            .map_err(unexpected)?;
        let response = check_status(response, &format!("Upload of {pathname}")).await?;

        let uploaded: PutResponse = response.json().await.map_err(unexpected)?;
        debug!("Uploaded {} to {}", pathname, uploaded.url);
        Ok(uploaded.url)
    }

    async fn list(&self, prefix: &str) -> PortResult<Vec<BlobObject>> {
        let mut blobs = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let limit = LIST_PAGE_SIZE.to_string();
            let mut query = vec![("prefix", prefix.to_string()), ("limit", limit)];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }

            let response = self
                .client
                .get(&self.base_url)
                .bearer_auth(&self.token)
                .header("x-api-version", API_VERSION)
                .query(&query)
                .send()
                .await
                .map_err(unexpected)?;
            let response = check_status(response, &format!("Listing of {prefix}")).await?;
            let page: ListResponse = response.json().await.map_err(unexpected)?;

            blobs.extend(page.blobs);
            match page.cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }
        Ok(blobs)
    }

    async fn get(&self, url: &str) -> PortResult<Bytes> {
        let response = self.client.get(url).send().await.map_err(unexpected)?;
        let response = check_status(response, url).await?;
        response.bytes().await.map_err(unexpected)
    }
}
