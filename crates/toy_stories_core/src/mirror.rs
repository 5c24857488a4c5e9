//! crates/toy_stories_core/src/mirror.rs
//!
//! Best-effort copies of client data to the blob store. Jobs run as spawned
//! tasks with a timeout; callers never wait on them. Each finished job sends a
//! `MirrorReport` on the channel returned by `BackgroundMirror::new`, which the
//! service drains into its log and tests read directly.

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::{Story, UserProfile};
use crate::imaging::ImageProcessor;
use crate::ports::{BlobStore, PutOptions};

/// The fixed timeout for story mirrors.
pub const DEFAULT_MIRROR_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum MirrorJob {
    /// Bitmap the toy photo and upload it as `{toy_key}.bmp`.
    ToyBitmap { toy_key: String, image: Bytes },
    /// Upload a profile snapshot as `userData-{user_id}-{millis}.json`.
    Profile { user_id: String, profile: UserProfile },
    /// Upload a story list snapshot as `stories-{user_id}-{millis}.json`.
    Stories { user_id: String, stories: Vec<Story> },
}

impl MirrorJob {
    pub fn label(&self) -> String {
        match self {
            MirrorJob::ToyBitmap { toy_key, .. } => format!("bitmap {toy_key}"),
            MirrorJob::Profile { user_id, .. } => format!("profile {user_id}"),
            MirrorJob::Stories { user_id, .. } => format!("stories {user_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorReport {
    pub label: String,
    /// The uploaded URL, or why the mirror gave up.
    pub outcome: Result<String, String>,
}

#[derive(Clone)]
pub struct BackgroundMirror {
    storage: Arc<dyn BlobStore>,
    processor: ImageProcessor,
    timeout: Duration,
    reports: mpsc::UnboundedSender<MirrorReport>,
}

impl BackgroundMirror {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        processor: ImageProcessor,
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<MirrorReport>) {
        let (reports, receiver) = mpsc::unbounded_channel();
        (
            Self {
                storage,
                processor,
                timeout,
                reports,
            },
            receiver,
        )
    }

    /// Starts the job and returns immediately.
    pub fn submit(&self, job: MirrorJob) -> JoinHandle<()> {
        let mirror = self.clone();
        tokio::spawn(async move {
            let label = job.label();
            let outcome = match tokio::time::timeout(mirror.timeout, mirror.run(job)).await {
                Ok(result) => result,
                Err(_) => Err(format!("timed out after {:?}", mirror.timeout)),
            };
            match &outcome {
                Ok(url) => info!("Mirrored {} to {}", label, url),
                Err(e) => warn!("Mirror of {} failed: {}", label, e),
            }
            // Nobody listening is fine.
            let _ = mirror.reports.send(MirrorReport { label, outcome });
        })
    }

    /// Uploads without the timeout and report, for callers that need the URL.
    pub async fn upload_now(&self, job: MirrorJob) -> Result<String, String> {
        self.run(job).await
    }

    async fn run(&self, job: MirrorJob) -> Result<String, String> {
        let millis = Utc::now().timestamp_millis();
        let (pathname, body, options) = match job {
            MirrorJob::ToyBitmap { toy_key, image } => {
                let processor = self.processor;
                let bmp = tokio::task::spawn_blocking(move || processor.to_bmp(&image))
                    .await
                    .map_err(|e| e.to_string())?
                    .map_err(|e| e.to_string())?;
                (
                    format!("{toy_key}.bmp"),
                    Bytes::from(bmp),
                    PutOptions::fixed("image/bmp"),
                )
            }
            MirrorJob::Profile { user_id, profile } => (
                format!("userData-{user_id}-{millis}.json"),
                encode(&profile)?,
                PutOptions::json(),
            ),
            MirrorJob::Stories { user_id, stories } => (
                format!("stories-{user_id}-{millis}.json"),
                encode(&stories)?,
                PutOptions::json(),
            ),
        };

        self.storage
            .put(&pathname, body, options)
            .await
            .map_err(|e| e.to_string())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes, String> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| e.to_string())
}

/// Logs every report until all mirrors are dropped.
pub async fn log_reports(mut receiver: mpsc::UnboundedReceiver<MirrorReport>) {
    let (mut ok, mut failed) = (0u64, 0u64);
    while let Some(report) = receiver.recv().await {
        match report.outcome {
            Ok(_) => ok += 1,
            Err(_) => failed += 1,
        }
        info!("Mirror totals: {} succeeded, {} failed", ok, failed);
    }
}
