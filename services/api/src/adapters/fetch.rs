//! services/api/src/adapters/fetch.rs
//!
//! Downloads toy photos over HTTP and, when asked, keeps a local copy in the
//! download directory. Implements the `ImageFetcher` port.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::path::{Path, PathBuf};
use toy_stories_core::ports::{FetchedImage, ImageFetcher, PortError, PortResult};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
    download_dir: PathBuf,
}

impl HttpImageFetcher {
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            client: Client::new(),
            download_dir,
        }
    }
}

fn extension_for(file_name: Option<&str>, mime_type: &str) -> String {
    if let Some(ext) = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        return ext.to_ascii_lowercase();
    }
    match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
    .to_string()
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> PortResult<FetchedImage> {
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

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| "image/jpeg".to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        debug!("Downloaded {} ({} bytes, {})", url, bytes.len(), mime_type);

        Ok(FetchedImage { bytes, mime_type })
    }

    async fn keep_copy(&self, image: &FetchedImage, file_name: Option<&str>) -> PortResult<PathBuf> {
        let write = async {
            tokio::fs::create_dir_all(&self.download_dir).await?;
            let path = self.download_dir.join(format!(
                "{}.{}",
                Uuid::new_v4(),
                extension_for(file_name, &image.mime_type)
            ));
            tokio::fs::write(&path, &image.bytes).await?;
            Ok::<_, std::io::Error>(path)
        };
        write.await.map_err(|e| {
            PortError::Unexpected(format!(
                "Could not write to {}: {e}",
                self.download_dir.display()
            ))
        })
    }
}
