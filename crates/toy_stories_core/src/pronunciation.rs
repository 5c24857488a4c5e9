//! crates/toy_stories_core/src/pronunciation.rs
//!
//! Spoken pronunciations for vocabulary words, cached in the blob store under
//! a hash of the text, language and voice.

use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ports::{BlobStore, PortResult, PutOptions, SpeechSynthesizer};

#[derive(Debug, Clone)]
pub struct PronunciationOptions {
    pub language_code: String,
}

impl Default for PronunciationOptions {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
        }
    }
}

pub struct PronunciationCache {
    tts: Arc<dyn SpeechSynthesizer>,
    storage: Arc<dyn BlobStore>,
}

impl PronunciationCache {
    pub fn new(tts: Arc<dyn SpeechSynthesizer>, storage: Arc<dyn BlobStore>) -> Self {
        Self { tts, storage }
    }

    pub fn pathname(&self, text: &str, options: &PronunciationOptions) -> String {
        let digest = Sha256::digest(
            format!("{}-{}-{}", text, options.language_code, self.tts.voice_name()).as_bytes(),
        );
        format!("pronunciations/{}.mp3", hex::encode(digest))
    }

    /// Returns the URL of the audio for `text`, synthesizing it on a cache miss.
    pub async fn generate(&self, text: &str, options: &PronunciationOptions) -> PortResult<String> {
        let pathname = self.pathname(text, options);

        let cached = self.storage.list(&pathname).await?;
        if let Some(hit) = cached.into_iter().find(|object| object.pathname == pathname) {
            debug!("Pronunciation cache hit for {:?}", text);
            return Ok(hit.url);
        }

        let audio = self.tts.synthesize(text, &options.language_code).await?;
        self.storage
            .put(&pathname, audio.into(), PutOptions::fixed("audio/mpeg"))
            .await
    }

    /// Generates every word concurrently. Failed words map to `None`.
    pub async fn batch(
        &self,
        words: &[String],
        options: &PronunciationOptions,
    ) -> BTreeMap<String, Option<String>> {
        let mut unique: Vec<&String> = words.iter().filter(|w| !w.trim().is_empty()).collect();
        unique.sort();
        unique.dedup();

        let results = join_all(unique.iter().map(|word| async move {
            let url = match self.generate(word, options).await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Pronunciation for {:?} failed: {}", word, e);
                    None
                }
            };
            (word.to_string(), url)
        }))
        .await;

        results.into_iter().collect()
    }
}
