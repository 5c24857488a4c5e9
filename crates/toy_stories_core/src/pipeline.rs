//! crates/toy_stories_core/src/pipeline.rs
//!
//! The per-toy onboarding flow: download, identify, pick vocabulary, match
//! sound effects, persist, mirror. Every committed stage is written back to the
//! profile together with its checkpoint, so a failed or interrupted run keeps
//! what it already learned and can be resumed later.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::contracts::{
    self, generate_typed, AudioMatching, MatchedAudio, StageContract, ToyIdentification,
    VocabularySelection, AUDIO_MATCHING_INSTRUCTIONS, IDENTIFY_INSTRUCTIONS,
    VOCABULARY_INSTRUCTIONS, VOCABULARY_SIZE,
};
use crate::domain::{OnboardingState, Toy, VocabEntry};
use crate::manifest::AudioManifest;
use crate::mirror::{BackgroundMirror, MirrorJob};
use crate::persistence::ClientPersistence;
use crate::ports::{
    AiError, AiResult, Attachment, FetchedImage, GenerationRequest, GenerativeAiService,
    ImageFetcher, PortError,
};

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Onboarding is already running for toy {0}")]
    AlreadyRunning(String),
    #[error("Toy not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// A stage that failed during a run. The run may still have continued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: &'static str,
    pub message: String,
}

impl StageFailure {
    fn new(stage: &'static str, error: impl std::fmt::Display) -> Self {
        Self {
            stage,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingOutcome {
    pub toy: Toy,
    pub state: OnboardingState,
    pub failures: Vec<StageFailure>,
}

pub struct ToyOnboarding {
    ai: Arc<dyn GenerativeAiService>,
    fetcher: Arc<dyn ImageFetcher>,
    persistence: ClientPersistence,
    mirror: BackgroundMirror,
    manifest: Arc<AudioManifest>,
    default_language: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Clears the in-flight flag for a toy when the run ends, however it ends.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    slot: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.slot);
    }
}

impl ToyOnboarding {
    pub fn new(
        ai: Arc<dyn GenerativeAiService>,
        fetcher: Arc<dyn ImageFetcher>,
        persistence: ClientPersistence,
        mirror: BackgroundMirror,
        manifest: Arc<AudioManifest>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            ai,
            fetcher,
            persistence,
            mirror,
            manifest,
            default_language: default_language.into(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Records a freshly uploaded photo and runs the whole flow for it.
    pub async fn onboard(
        &self,
        owner: &str,
        key: &str,
        image_url: &str,
        file_name: Option<&str>,
    ) -> Result<OnboardingOutcome, OnboardingError> {
        let _guard = self.claim(owner, key)?;

        let toy = Toy::captured(key, image_url);
        self.commit(owner, &toy).await?;
        info!("Captured toy {} for {}", key, owner);

        self.run_stages(owner, toy, file_name).await
    }

    /// Continues an earlier run from the toy's checkpoint.
    pub async fn resume(&self, owner: &str, key: &str) -> Result<OnboardingOutcome, OnboardingError> {
        let _guard = self.claim(owner, key)?;

        let profile = self.persistence.load_profile(owner).await?.value;
        let toy = profile
            .find_toy(key)
            .cloned()
            .ok_or_else(|| OnboardingError::NotFound(key.to_string()))?;

        self.run_stages(owner, toy, None).await
    }

    /// Asks the AI to pick a manifest sound for each word. Words without a
    /// usable match come back with no `audio_file`.
    pub async fn match_audio(&self, vocab: &[VocabEntry]) -> AiResult<Vec<VocabEntry>> {
        let words = serde_json::to_string(vocab)
            .map_err(|e| AiError::InvalidResponse(format!("cannot encode vocabulary: {e}")))?;
        let request = GenerationRequest::text(format!(
            "Vocabulary: {words}\nAudio manifest: {}",
            self.manifest.source()
        ))
        .with_system_instruction(AUDIO_MATCHING_INSTRUCTIONS)
        .with_attachment(Attachment::Inline {
            mime_type: "text/plain".to_string(),
            data: self.manifest.to_text().into(),
        });

        let matching: AudioMatching = generate_typed(self.ai.as_ref(), request).await?;
        let proposed: Vec<Option<&str>> = align_matches(vocab, &matching.vocab)
            .into_iter()
            .map(|m| m.map(|m| m.audio.as_str()))
            .collect();
        let audio = self.manifest.reconcile(&proposed);

        Ok(vocab
            .iter()
            .zip(audio)
            .map(|(entry, audio_file)| VocabEntry {
                audio_file,
                ..entry.clone()
            })
            .collect())
    }

    /// Translates one word. With a toy key, the translation is also stored on
    /// that toy's matching vocab entry.
    pub async fn translate_word(
        &self,
        owner: &str,
        word: &str,
        target_language: Option<&str>,
        toy_key: Option<&str>,
    ) -> Result<String, OnboardingError> {
        let profile = self.persistence.load_profile(owner).await?;
        let language = target_language
            .map(str::to_string)
            .or_else(|| profile.value.language.clone())
            .unwrap_or_else(|| self.default_language.clone());

        let request = GenerationRequest::text(contracts::word_translation_prompt(word, &language))
            .with_temperature(0.2);
        let translation = match self.ai.generate(request).await? {
            serde_json::Value::String(text) => text.trim().to_string(),
            other => {
                return Err(AiError::InvalidResponse(format!(
                    "expected a translated word, got {other}"
                ))
                .into())
            }
        };

        if let Some(key) = toy_key {
            let mut updated = profile.value;
            let toy = updated
                .toys
                .iter_mut()
                .find(|toy| toy.key == key)
                .ok_or_else(|| OnboardingError::NotFound(key.to_string()))?;
            if let Some(entry) = toy
                .vocab
                .iter_mut()
                .flatten()
                .find(|entry| entry.word.eq_ignore_ascii_case(word))
            {
                entry.translation = Some(translation.clone());
            }
            self.persistence
                .save_profile(owner, &updated, Some(profile.version))
                .await?;
        }

        Ok(translation)
    }

    fn claim(&self, owner: &str, key: &str) -> Result<InFlightGuard, OnboardingError> {
        let slot = format!("{owner}:{key}");
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(slot.clone()) {
            return Err(OnboardingError::AlreadyRunning(key.to_string()));
        }
        Ok(InFlightGuard {
            in_flight: self.in_flight.clone(),
            slot,
        })
    }

    async fn run_stages(
        &self,
        owner: &str,
        mut toy: Toy,
        file_name: Option<&str>,
    ) -> Result<OnboardingOutcome, OnboardingError> {
        let mut failures = Vec::new();
        let start = toy.resume_state();
        if start >= OnboardingState::Persisted {
            return Ok(finished(toy, failures));
        }

        let image = match self.fetcher.fetch(&toy.image).await {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("Could not download image for toy {}: {}", toy.key, e);
                failures.push(StageFailure::new("download", e));
                None
            }
        };
        if let Some(image) = &image {
            if start < OnboardingState::Uploading {
                match self.fetcher.keep_copy(image, file_name).await {
                    Ok(path) => info!("Kept a copy of toy {} at {}", toy.key, path.display()),
                    Err(e) => warn!("Could not keep a copy of toy {}: {}", toy.key, e),
                }
                self.advance(owner, &mut toy, OnboardingState::Uploading).await?;
            }
        }

        if start < OnboardingState::Identifying {
            match self.identify(&toy, image.as_ref()).await {
                Ok(id) => {
                    info!("Identified toy {} as {} ({})", toy.key, id.item, id.name);
                    toy.title = Some(id.item);
                    toy.name = Some(id.name);
                    self.advance(owner, &mut toy, OnboardingState::Identifying).await?;
                }
                Err(e) => {
                    warn!("Identification failed for toy {}: {}", toy.key, e);
                    failures.push(StageFailure::new(ToyIdentification::STAGE, e));
                    // An unidentified toy is only a capture.
                    if toy.resume_state() > OnboardingState::ImageCaptured {
                        toy.checkpoint = Some(OnboardingState::ImageCaptured);
                        self.commit(owner, &toy).await?;
                    }
                    return Ok(finished(toy, failures));
                }
            }
        }

        if start < OnboardingState::VocabularySelected {
            match self.select_vocabulary(owner, &toy).await {
                Ok(vocab) => {
                    info!("Selected {} words for toy {}", vocab.len(), toy.key);
                    toy.vocab = Some(vocab);
                    self.advance(owner, &mut toy, OnboardingState::VocabularySelected)
                        .await?;
                }
                Err(e) => {
                    warn!("Vocabulary selection failed for toy {}: {}", toy.key, e);
                    failures.push(StageFailure::new(VocabularySelection::STAGE, e));
                    return Ok(finished(toy, failures));
                }
            }
        }

        if start < OnboardingState::AudioMatched {
            let vocab = toy.vocab.clone().unwrap_or_default();
            let matched = if self.manifest.is_empty() {
                Err(AiError::InvalidResponse("the audio manifest is empty".into()))
            } else {
                self.match_audio(&vocab).await
            };
            match matched {
                Ok(vocab) => {
                    toy.vocab = Some(vocab);
                    self.advance(owner, &mut toy, OnboardingState::AudioMatched).await?;
                }
                // Not fatal: the toy keeps its words without sounds.
                Err(e) => {
                    warn!("Audio matching failed for toy {}: {}", toy.key, e);
                    failures.push(StageFailure::new(AudioMatching::STAGE, e));
                }
            }
        }

        self.advance(owner, &mut toy, OnboardingState::Persisted).await?;
        self.mirror_toy(owner, &toy, image).await;

        Ok(finished(toy, failures))
    }

    async fn identify(
        &self,
        toy: &Toy,
        image: Option<&FetchedImage>,
    ) -> AiResult<ToyIdentification> {
        let attachment = match image {
            Some(image) => Attachment::Inline {
                mime_type: image.mime_type.clone(),
                data: image.bytes.clone(),
            },
            None => Attachment::Remote {
                mime_type: guess_image_mime(&toy.image).to_string(),
                uri: toy.image.clone(),
            },
        };
        let request = GenerationRequest::text("Identify the toy in this image.")
            .with_system_instruction(IDENTIFY_INSTRUCTIONS)
            .with_attachment(attachment);

        generate_typed(self.ai.as_ref(), request).await
    }

    async fn select_vocabulary(&self, owner: &str, toy: &Toy) -> Result<Vec<VocabEntry>, OnboardingError> {
        let language = self
            .persistence
            .load_profile(owner)
            .await?
            .value
            .language
            .unwrap_or_else(|| self.default_language.clone());
        let title = toy.title.as_deref().unwrap_or("toy");

        let request = GenerationRequest::text(contracts::vocabulary_prompt(title, &language))
            .with_system_instruction(VOCABULARY_INSTRUCTIONS);
        let selection: VocabularySelection = generate_typed(self.ai.as_ref(), request).await?;
        if selection.words.is_empty() {
            return Err(AiError::InvalidResponse("no vocabulary words returned".into()).into());
        }

        Ok(selection
            .words
            .into_iter()
            .take(VOCABULARY_SIZE)
            .map(|w| VocabEntry::new(w.word, w.translation))
            .collect())
    }

    async fn advance(
        &self,
        owner: &str,
        toy: &mut Toy,
        state: OnboardingState,
    ) -> Result<(), OnboardingError> {
        toy.checkpoint = Some(state);
        self.commit(owner, toy).await
    }

    /// Writes the toy into the profile at the version just read.
    async fn commit(&self, owner: &str, toy: &Toy) -> Result<(), OnboardingError> {
        let current = self.persistence.load_profile(owner).await?;
        let mut profile = current.value;
        profile.upsert_toy(toy.clone());
        self.persistence
            .save_profile(owner, &profile, Some(current.version))
            .await?;
        Ok(())
    }

    async fn mirror_toy(&self, owner: &str, toy: &Toy, image: Option<FetchedImage>) {
        if let Some(image) = image {
            self.mirror.submit(MirrorJob::ToyBitmap {
                toy_key: toy.key.clone(),
                image: image.bytes,
            });
        }

        let snapshot = async {
            let user_id = self.persistence.user_id(owner).await?;
            let profile = self.persistence.load_profile(owner).await?.value;
            Ok::<_, PortError>((user_id, profile))
        };
        match snapshot.await {
            Ok((user_id, profile)) => {
                self.mirror.submit(MirrorJob::Profile { user_id, profile });
            }
            Err(e) => warn!("Skipping profile mirror for {}: {}", owner, e),
        }
    }
}

fn finished(toy: Toy, failures: Vec<StageFailure>) -> OnboardingOutcome {
    OnboardingOutcome {
        state: toy.resume_state(),
        toy,
        failures,
    }
}

/// Pairs each word with at most one reply entry. Entries naming the word are
/// claimed first; the remaining words fall back to the entry at their own
/// position, else to the first entry nobody claimed.
fn align_matches<'a>(
    vocab: &[VocabEntry],
    matches: &'a [MatchedAudio],
) -> Vec<Option<&'a MatchedAudio>> {
    let mut claimed = vec![false; matches.len()];
    let mut slots: Vec<Option<usize>> = vocab
        .iter()
        .map(|entry| {
            let found = matches.iter().enumerate().position(|(i, m)| {
                !claimed[i]
                    && m.word
                        .as_deref()
                        .is_some_and(|w| w.trim().eq_ignore_ascii_case(entry.word.trim()))
            })?;
            claimed[found] = true;
            Some(found)
        })
        .collect();

    for (index, slot) in slots.iter_mut().enumerate() {
        if slot.is_some() {
            continue;
        }
        let free = if index < matches.len() && !claimed[index] {
            Some(index)
        } else {
            claimed.iter().position(|taken| !taken)
        };
        if let Some(free) = free {
            claimed[free] = true;
            *slot = Some(free);
        }
    }

    slots
        .into_iter()
        .map(|slot| slot.map(|i| &matches[i]))
        .collect()
}

fn guess_image_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ImageProcessor;
    use crate::mirror::{MirrorReport, DEFAULT_MIRROR_TIMEOUT};
    use crate::ports::ResponseFormat;
    use crate::test_support::{
        sample_png, MemoryBlobStore, MemoryDocumentStore, ScriptedAi, StaticFetcher,
    };
    use serde_json::{json, Value};
    use tokio::sync::mpsc::UnboundedReceiver;

    const MANIFEST: &str = "roar.wav\nstomp.wav\nchomp.wav\ngrowl.wav";

    struct Harness {
        onboarding: Arc<ToyOnboarding>,
        ai: Arc<ScriptedAi>,
        fetcher: Arc<StaticFetcher>,
        persistence: ClientPersistence,
        blobs: Arc<MemoryBlobStore>,
        reports: UnboundedReceiver<MirrorReport>,
    }

    fn harness(responses: Vec<AiResult<Value>>) -> Harness {
        let ai = Arc::new(ScriptedAi::new(responses));
        let blobs = Arc::new(MemoryBlobStore::default());
        let persistence = ClientPersistence::new(Arc::new(MemoryDocumentStore::default()));
        let (mirror, reports) =
            BackgroundMirror::new(blobs.clone(), ImageProcessor::default(), DEFAULT_MIRROR_TIMEOUT);
        let fetcher = Arc::new(StaticFetcher::serving(sample_png(60, 40)));
        let onboarding = ToyOnboarding::new(
            ai.clone(),
            fetcher.clone(),
            persistence.clone(),
            mirror,
            Arc::new(AudioManifest::parse("file_list.txt", MANIFEST)),
            "Spanish",
        );
        Harness {
            onboarding: Arc::new(onboarding),
            ai,
            fetcher,
            persistence,
            blobs,
            reports,
        }
    }

    fn identified() -> AiResult<Value> {
        Ok(json!({ "Item": "Dinosaur", "Name": "Azul" }))
    }

    fn dinosaur_words() -> AiResult<Value> {
        Ok(json!({ "VocabData": [
            { "word": "roar", "translation": "rugir" },
            { "word": "stomp", "translation": "pisar" },
            { "word": "chomp", "translation": "masticar" },
            { "word": "growl", "translation": "gruñir" }
        ]}))
    }

    fn matched_sounds() -> AiResult<Value> {
        Ok(json!({ "vocab": [
            { "word": "roar", "audio": "roar.wav" },
            { "word": "stomp", "audio": "stomp.wav" },
            { "word": "chomp", "audio": "chomp.wav" },
            { "word": "growl", "audio": "growl.wav" }
        ]}))
    }

    #[tokio::test]
    async fn dinosaur_gets_four_distinct_manifest_sounds() {
        let mut h = harness(vec![identified(), dinosaur_words(), matched_sounds()]);

        let outcome = h
            .onboarding
            .onboard("u", "k1", "https://img/k1.png", None)
            .await
            .unwrap();

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.state, OnboardingState::Persisted);
        let vocab = outcome.toy.vocab.clone().unwrap();
        assert_eq!(vocab.len(), 4);
        let sounds: HashSet<_> = vocab.iter().filter_map(|v| v.audio_file.clone()).collect();
        assert_eq!(sounds.len(), 4);
        assert!(sounds.iter().all(|s| MANIFEST.contains(s.as_str())));

        let stored = h.persistence.load_profile("u").await.unwrap().value;
        assert_eq!(stored.find_toy("k1"), Some(&outcome.toy));

        let mut labels = vec![
            h.reports.recv().await.unwrap().label,
            h.reports.recv().await.unwrap().label,
        ];
        labels.sort();
        assert_eq!(labels, ["bitmap k1", "profile u"]);
        assert!(h.blobs.pathnames().contains(&"k1.bmp".to_string()));
    }

    #[tokio::test]
    async fn identification_failure_leaves_only_key_and_image() {
        let h = harness(vec![Err(AiError::InvalidResponse("not json".into()))]);

        let outcome = h
            .onboarding
            .onboard("u", "k1", "https://img/k1.png", None)
            .await
            .unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].stage, "identify");
        let stored = h.persistence.load_profile("u").await.unwrap().value;
        let toy = stored.find_toy("k1").unwrap();
        assert_eq!(toy.image, "https://img/k1.png");
        assert!(toy.name.is_none() && toy.title.is_none() && toy.vocab.is_none());
        assert_eq!(toy.checkpoint, Some(OnboardingState::ImageCaptured));
        assert_eq!(outcome.state, OnboardingState::ImageCaptured);
    }

    #[tokio::test]
    async fn failed_identification_on_resume_falls_back_to_captured() {
        let h = harness(vec![Err(AiError::RateLimited)]);
        let mut toy = Toy::captured("k1", "https://img/k1.png");
        toy.checkpoint = Some(OnboardingState::Uploading);
        let mut profile = h.persistence.load_profile("u").await.unwrap().value;
        profile.upsert_toy(toy);
        h.persistence.save_profile("u", &profile, None).await.unwrap();

        let outcome = h.onboarding.resume("u", "k1").await.unwrap();

        assert_eq!(outcome.state, OnboardingState::ImageCaptured);
        let stored = h.persistence.load_profile("u").await.unwrap().value;
        assert_eq!(
            stored.find_toy("k1").unwrap().checkpoint,
            Some(OnboardingState::ImageCaptured)
        );
    }

    #[tokio::test]
    async fn first_download_keeps_one_local_copy_named_after_the_upload() {
        let h = harness(vec![identified(), dinosaur_words(), matched_sounds()]);

        h.onboarding
            .onboard("u", "k1", "https://img/k1", Some("azul.png"))
            .await
            .unwrap();

        assert_eq!(h.fetcher.fetched(), ["https://img/k1"]);
        assert_eq!(h.fetcher.kept(), [Some("azul.png".to_string())]);
    }

    #[tokio::test]
    async fn audio_failure_keeps_words_without_sounds() {
        let h = harness(vec![
            identified(),
            dinosaur_words(),
            Err(AiError::RateLimited),
        ]);

        let outcome = h
            .onboarding
            .onboard("u", "k1", "https://img/k1.png", None)
            .await
            .unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].stage, "audio");
        assert_eq!(outcome.state, OnboardingState::Persisted);
        let stored = h.persistence.load_profile("u").await.unwrap().value;
        let vocab = stored.find_toy("k1").unwrap().vocab.clone().unwrap();
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab[0].translation.as_deref(), Some("rugir"));
        assert!(vocab.iter().all(|v| v.audio_file.is_none()));
    }

    #[tokio::test]
    async fn second_run_for_the_same_toy_is_rejected() {
        let h = harness(Vec::new());

        let first = {
            let onboarding = h.onboarding.clone();
            tokio::spawn(async move {
                onboarding
                    .onboard("u", "k1", "https://img/k1.png", None)
                    .await
            })
        };
        while h.ai.requests().is_empty() {
            tokio::task::yield_now().await;
        }

        let second = h.onboarding.resume("u", "k1").await;
        assert!(matches!(second, Err(OnboardingError::AlreadyRunning(_))));

        first.abort();
        let _ = first.await;
        // The aborted run released its flag.
        assert!(h.onboarding.claim("u", "k1").is_ok());
    }

    #[tokio::test]
    async fn resume_starts_after_the_checkpoint() {
        let h = harness(vec![dinosaur_words(), matched_sounds()]);
        let mut toy = Toy::captured("k1", "https://img/k1.png");
        toy.title = Some("Dinosaur".into());
        toy.name = Some("Azul".into());
        toy.checkpoint = Some(OnboardingState::Identifying);
        let mut profile = h.persistence.load_profile("u").await.unwrap().value;
        profile.upsert_toy(toy);
        h.persistence.save_profile("u", &profile, None).await.unwrap();

        let outcome = h.onboarding.resume("u", "k1").await.unwrap();

        assert_eq!(outcome.state, OnboardingState::Persisted);
        assert_eq!(outcome.toy.name.as_deref(), Some("Azul"));
        assert!(h.fetcher.kept().is_empty());
        let requests = h.ai.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].system_instruction.as_deref(),
            Some(VOCABULARY_INSTRUCTIONS)
        );
        assert!(requests[0].prompt.contains("Spanish"));
    }

    #[tokio::test]
    async fn resume_of_unknown_toy_is_not_found() {
        let h = harness(Vec::new());
        assert!(matches!(
            h.onboarding.resume("u", "missing").await,
            Err(OnboardingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn audio_matching_sends_manifest_as_text_attachment() {
        let h = harness(vec![Ok(json!({ "vocab": [
            { "word": "stomp", "audio": "stomp.wav" },
            { "word": "roar", "audio": "thunder.wav" }
        ]}))]);
        let vocab = vec![
            VocabEntry::new("roar", Some("rugir".into())),
            VocabEntry::new("stomp", Some("pisar".into())),
        ];

        let matched = h.onboarding.match_audio(&vocab).await.unwrap();

        assert_eq!(matched[0].audio_file, None);
        assert_eq!(matched[1].audio_file.as_deref(), Some("stomp.wav"));
        let request = &h.ai.requests()[0];
        assert!(request.prompt.contains("file_list.txt"));
        assert!(matches!(request.response_format, ResponseFormat::Json(_)));
        assert!(matches!(
            &request.attachments[0],
            Attachment::Inline { mime_type, .. } if mime_type == "text/plain"
        ));
    }

    #[tokio::test]
    async fn reordered_reply_with_a_renamed_word_keeps_each_sound_on_its_word() {
        let h = harness(vec![Ok(json!({ "vocab": [
            { "word": "stomp", "audio": "stomp.wav" },
            { "word": "Roaring", "audio": "roar.wav" },
            { "word": "chomp", "audio": "chomp.wav" },
            { "word": "growl", "audio": "growl.wav" }
        ]}))]);
        let vocab: Vec<_> = ["roar", "stomp", "chomp", "growl"]
            .into_iter()
            .map(|word| VocabEntry::new(word, None))
            .collect();

        let matched = h.onboarding.match_audio(&vocab).await.unwrap();

        let files: Vec<_> = matched.iter().map(|v| v.audio_file.as_deref()).collect();
        assert_eq!(
            files,
            [
                Some("roar.wav"),
                Some("stomp.wav"),
                Some("chomp.wav"),
                Some("growl.wav")
            ]
        );
    }

    #[tokio::test]
    async fn short_reply_leaves_unanswered_words_silent() {
        let h = harness(vec![Ok(json!({ "vocab": [
            { "word": "growl", "audio": "growl.wav" }
        ]}))]);
        let vocab = vec![VocabEntry::new("roar", None), VocabEntry::new("growl", None)];

        let matched = h.onboarding.match_audio(&vocab).await.unwrap();

        assert_eq!(matched[0].audio_file, None);
        assert_eq!(matched[1].audio_file.as_deref(), Some("growl.wav"));
    }

    #[tokio::test]
    async fn translated_word_is_attached_to_the_toy() {
        let h = harness(vec![Ok(Value::String(" perro \n".into()))]);
        let mut toy = Toy::captured("k1", "https://img/k1.png");
        toy.vocab = Some(vec![VocabEntry::new("dog", None)]);
        let mut profile = h.persistence.load_profile("u").await.unwrap().value;
        profile.upsert_toy(toy);
        h.persistence.save_profile("u", &profile, None).await.unwrap();

        let translation = h
            .onboarding
            .translate_word("u", "dog", None, Some("k1"))
            .await
            .unwrap();

        assert_eq!(translation, "perro");
        assert_eq!(h.ai.requests()[0].temperature, Some(0.2));
        let stored = h.persistence.load_profile("u").await.unwrap().value;
        let vocab = stored.find_toy("k1").unwrap().vocab.clone().unwrap();
        assert_eq!(vocab[0].translation.as_deref(), Some("perro"));
    }

    #[test]
    fn remote_mime_follows_extension() {
        assert_eq!(guess_image_mime("https://x/a.PNG?v=1"), "image/png");
        assert_eq!(guess_image_mime("https://x/a"), "image/jpeg");
    }
}
