//! crates/toy_stories_core/src/backup.rs
//!
//! Explicit, awaited cloud copies: profile saves to both the blob store and
//! the key-value store, story list saves, the demo-data catalogue and soundboard
//! bitmaps.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{Story, Toy, UserProfile};
use crate::mirror::{BackgroundMirror, MirrorJob};
use crate::ports::{
    BackgroundRemover, BlobObject, BlobStore, ImageFetcher, KeyValueStore, PortError, PortResult,
};

/// Result of writing to one target of a dual write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Option<String>, String>> for TargetOutcome {
    fn from(result: Result<Option<String>, String>) -> Self {
        match result {
            Ok(url) => Self {
                success: true,
                url,
                error: None,
            },
            Err(error) => Self {
                success: false,
                url: None,
                error: Some(error),
            },
        }
    }
}

/// Each target is reported on its own; the save succeeds if either did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DualWriteReport {
    pub success: bool,
    pub blob_storage: TargetOutcome,
    pub key_value_store: TargetOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoDataListing {
    pub user_data_blobs: Vec<BlobObject>,
    pub stories_blobs: Vec<BlobObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoData {
    pub user_data: UserProfile,
    pub stories: Vec<Story>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundboardEntry {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmp_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct CloudBackup {
    storage: Arc<dyn BlobStore>,
    kv: Option<Arc<dyn KeyValueStore>>,
    mirror: BackgroundMirror,
    fetcher: Arc<dyn ImageFetcher>,
    remover: Option<Arc<dyn BackgroundRemover>>,
}

impl CloudBackup {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        kv: Option<Arc<dyn KeyValueStore>>,
        mirror: BackgroundMirror,
        fetcher: Arc<dyn ImageFetcher>,
        remover: Option<Arc<dyn BackgroundRemover>>,
    ) -> Self {
        Self {
            storage,
            kv,
            mirror,
            fetcher,
            remover,
        }
    }

    /// Writes the profile to both targets concurrently.
    pub async fn save_user_data(&self, user_id: &str, profile: &UserProfile) -> DualWriteReport {
        let blob = self.mirror.upload_now(MirrorJob::Profile {
            user_id: user_id.to_string(),
            profile: profile.clone(),
        });
        let kv = async {
            let Some(kv) = &self.kv else {
                return Err("key-value store is not configured".to_string());
            };
            let value = serde_json::to_value(profile).map_err(|e| e.to_string())?;
            kv.set(&key_value_key(user_id), value)
                .await
                .map(|_| None::<String>)
                .map_err(|e| e.to_string())
        };

        let (blob, kv) = tokio::join!(blob, kv);
        if let Err(e) = &blob {
            warn!("Blob save of profile {} failed: {}", user_id, e);
        }
        if let Err(e) = &kv {
            warn!("Key-value save of profile {} failed: {}", user_id, e);
        }

        let report = DualWriteReport {
            success: blob.is_ok() || kv.is_ok(),
            blob_storage: blob.map(Some).into(),
            key_value_store: kv.into(),
        };
        info!("Saved profile {} (success: {})", user_id, report.success);
        report
    }

    pub async fn save_stories(&self, user_id: &str, stories: &[Story]) -> PortResult<String> {
        self.mirror
            .upload_now(MirrorJob::Stories {
                user_id: user_id.to_string(),
                stories: stories.to_vec(),
            })
            .await
            .map_err(PortError::Unexpected)
    }

    pub async fn list_demo_data(&self) -> PortResult<DemoDataListing> {
        let (user_data_blobs, stories_blobs) =
            tokio::try_join!(self.storage.list("userData"), self.storage.list("stories"))?;
        Ok(DemoDataListing {
            user_data_blobs,
            stories_blobs,
        })
    }

    /// Downloads a profile and story list pair saved earlier.
    pub async fn fetch_demo_data(&self, user_data_url: &str, stories_url: &str) -> PortResult<DemoData> {
        let (user_data, stories) = tokio::try_join!(
            self.storage.get(user_data_url),
            self.storage.get(stories_url)
        )?;
        let user_data = serde_json::from_slice(&user_data)
            .map_err(|e| PortError::Unexpected(format!("Demo profile is not valid: {e}")))?;
        let stories = serde_json::from_slice(&stories)
            .map_err(|e| PortError::Unexpected(format!("Demo stories are not valid: {e}")))?;
        Ok(DemoData { user_data, stories })
    }

    /// Bitmaps every toy one at a time and uploads it as `{key}.bmp`.
    pub async fn prepare_soundboard(&self, toys: &[Toy]) -> Vec<SoundboardEntry> {
        let mut entries = Vec::with_capacity(toys.len());
        for toy in toys {
            if toy.key.is_empty() || toy.image.is_empty() {
                warn!("Skipping toy without key or image");
                continue;
            }

            let result = match self.soundboard_source(toy).await {
                Ok(image) => {
                    self.mirror
                        .upload_now(MirrorJob::ToyBitmap {
                            toy_key: toy.key.clone(),
                            image,
                        })
                        .await
                }
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(url) => {
                    info!("Uploaded soundboard bitmap for {} to {}", toy.key, url);
                    entries.push(SoundboardEntry {
                        key: toy.key.clone(),
                        bmp_url: Some(url),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("Soundboard bitmap for {} failed: {}", toy.key, e);
                    entries.push(SoundboardEntry {
                        key: toy.key.clone(),
                        bmp_url: None,
                        error: Some(e),
                    });
                }
            }
        }
        entries
    }

    /// The toy cut out of its background when a remover is configured and
    /// succeeds, else the photo as uploaded.
    async fn soundboard_source(&self, toy: &Toy) -> PortResult<Bytes> {
        if let Some(remover) = &self.remover {
            match remover.remove_background(&toy.image).await {
                Ok(cutout) => return Ok(cutout),
                Err(e) => warn!(
                    "Background removal for {} failed, using the photo as is: {}",
                    toy.key, e
                ),
            }
        }
        Ok(self.fetcher.fetch(&toy.image).await?.bytes)
    }
}

/// Key-value keys only allow letters, digits, `_` and `-`.
fn key_value_key(user_id: &str) -> String {
    let sanitized: String = user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("userData_{sanitized}")
}
