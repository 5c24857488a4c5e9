//! crates/toy_stories_core/src/story.rs
//!
//! Writes a story around the selected toys. Generation can be cancelled at any
//! point before the story is stored; a cancelled request leaves no story and
//! starts no mirror upload.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::contracts::{
    generate_typed, story_prompt, StoryDraft, StoryTranslation, STORY_INSTRUCTIONS,
    STORY_TRANSLATION_INSTRUCTIONS,
};
use crate::domain::{Story, StoryCharacter, Toy};
use crate::mirror::{BackgroundMirror, MirrorJob};
use crate::persistence::ClientPersistence;
use crate::ports::{AiError, GenerationRequest, GenerativeAiService, PortError};

#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("No toys selected for the story")]
    NoToys,
    #[error("Story not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Port(#[from] PortError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoryOutcome {
    Created(Story),
    /// The request was cancelled; nothing was stored.
    Cancelled,
}

pub struct StoryGenerator {
    ai: Arc<dyn GenerativeAiService>,
    persistence: ClientPersistence,
    mirror: BackgroundMirror,
    default_language: String,
    running: Mutex<HashMap<u64, (String, CancellationToken)>>,
    next_id: AtomicU64,
}

/// Removes a request's token from the registry when it finishes.
struct Registration<'a> {
    generator: &'a StoryGenerator,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.generator
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl StoryGenerator {
    pub fn new(
        ai: Arc<dyn GenerativeAiService>,
        persistence: ClientPersistence,
        mirror: BackgroundMirror,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            ai,
            persistence,
            mirror,
            default_language: default_language.into(),
            running: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Generates a story for `toy_keys`, or for the client's selected toys when
    /// no keys are given. Toys appear in profile order.
    pub async fn generate(
        &self,
        owner: &str,
        toy_keys: Option<Vec<String>>,
        cancel: CancellationToken,
    ) -> Result<StoryOutcome, StoryError> {
        let _registration = self.register(owner, &cancel);

        let profile = self.persistence.load_profile(owner).await?.value;
        let keys = match toy_keys {
            Some(keys) => keys,
            None => self.persistence.load_selected_toys(owner).await?,
        };
        let toys: Vec<&Toy> = profile
            .toys
            .iter()
            .filter(|toy| keys.contains(&toy.key))
            .collect();
        if toys.is_empty() {
            return Err(StoryError::NoToys);
        }

        let request = GenerationRequest::text(story_prompt(&describe_characters(&toys)))
            .with_system_instruction(STORY_INSTRUCTIONS);

        let draft = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Story generation for {} cancelled", owner);
                return Ok(StoryOutcome::Cancelled);
            }
            draft = generate_typed::<StoryDraft>(self.ai.as_ref(), request) => draft?,
        };
        let stored = self.persistence.load_stories(owner).await?;
        // Last await before the first write: a cancel that arrived while the
        // AI answered or the list loaded still wins.
        if cancel.is_cancelled() {
            info!("Story generation for {} cancelled after the AI answered", owner);
            return Ok(StoryOutcome::Cancelled);
        }

        let now = Utc::now();
        let story = Story {
            id: format!("story_{}", now.timestamp_millis()),
            created_at: now,
            characters: toys.iter().map(|toy| StoryCharacter::from(*toy)).collect(),
            content: draft.story,
        };

        let mut stories = stored.value;
        stories.insert(0, story.clone());
        self.persistence
            .save_stories(owner, &stories, Some(stored.version))
            .await?;
        self.persistence
            .save_current_story_id(owner, &story.id)
            .await?;
        info!("Stored story {} for {}", story.id, owner);

        match self.persistence.user_id(owner).await {
            Ok(user_id) => {
                self.mirror.submit(MirrorJob::Stories { user_id, stories });
            }
            Err(e) => warn!("Skipping stories mirror for {}: {}", owner, e),
        }

        Ok(StoryOutcome::Created(story))
    }

    /// Cancels every in-flight generation of the client. Returns whether
    /// anything was running.
    pub fn cancel(&self, owner: &str) -> bool {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cancelled = false;
        for (request_owner, token) in running.values() {
            if request_owner == owner {
                token.cancel();
                cancelled = true;
            }
        }
        cancelled
    }

    /// The story named by `currentStoryId`, else the newest one.
    pub async fn current_story(&self, owner: &str) -> Result<Option<Story>, StoryError> {
        let stories = self.persistence.load_stories(owner).await?.value;
        let current = self.persistence.load_current_story_id(owner).await?;
        let story = current
            .and_then(|id| stories.iter().find(|s| s.id == id).cloned())
            .or_else(|| stories.first().cloned());
        Ok(story)
    }

    /// Translates a stored story's pages and keeps them alongside the original.
    pub async fn translate_story(
        &self,
        owner: &str,
        story_id: &str,
        target_language: Option<&str>,
    ) -> Result<Story, StoryError> {
        let stored = self.persistence.load_stories(owner).await?;
        let mut stories = stored.value;
        let index = stories
            .iter()
            .position(|s| s.id == story_id)
            .ok_or_else(|| StoryError::NotFound(story_id.to_string()))?;

        let language = match target_language {
            Some(language) => language.to_string(),
            None => self
                .persistence
                .load_profile(owner)
                .await?
                .value
                .language
                .unwrap_or_else(|| self.default_language.clone()),
        };

        let pages = serde_json::to_string(&stories[index].content.pages)
            .map_err(|e| AiError::InvalidResponse(format!("cannot encode pages: {e}")))?;
        let request = GenerationRequest::text(format!(
            "Target language: {language}\nPage Contents: {pages}"
        ))
        .with_system_instruction(STORY_TRANSLATION_INSTRUCTIONS);
        let translation: StoryTranslation = generate_typed(self.ai.as_ref(), request).await?;

        let expected = stories[index].content.pages.len();
        if translation.pages.len() != expected {
            return Err(AiError::SchemaViolation(format!(
                "expected {expected} translated pages, got {}",
                translation.pages.len()
            ))
            .into());
        }

        stories[index].content.translated_pages = Some(translation.pages);
        self.persistence
            .save_stories(owner, &stories, Some(stored.version))
            .await?;
        Ok(stories.swap_remove(index))
    }

    fn register(&self, owner: &str, cancel: &CancellationToken) -> Registration<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (owner.to_string(), cancel.clone()));
        Registration {
            generator: self,
            id,
        }
    }
}

/// `"Azul the Dinosaur, Unnamed the Character"`.
fn describe_characters(toys: &[&Toy]) -> String {
    toys.iter()
        .map(|toy| {
            format!(
                "{} the {}",
                toy.name.as_deref().unwrap_or("Unnamed"),
                toy.title.as_deref().unwrap_or("Character")
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserProfile;
    use crate::imaging::ImageProcessor;
    use crate::mirror::{MirrorReport, DEFAULT_MIRROR_TIMEOUT};
    use crate::ports::{AiResult, DocumentKey, DocumentStore, PortResult, StoredDocument};
    use crate::test_support::{MemoryBlobStore, MemoryDocumentStore, ScriptedAi};
    use serde_json::{json, Value};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        generator: Arc<StoryGenerator>,
        ai: Arc<ScriptedAi>,
        persistence: ClientPersistence,
        blobs: Arc<MemoryBlobStore>,
        reports: UnboundedReceiver<MirrorReport>,
    }

    async fn harness(responses: Vec<AiResult<Value>>) -> Harness {
        let ai = Arc::new(ScriptedAi::new(responses));
        let blobs = Arc::new(MemoryBlobStore::default());
        let persistence = ClientPersistence::new(Arc::new(MemoryDocumentStore::default()));
        let (mirror, reports) =
            BackgroundMirror::new(blobs.clone(), ImageProcessor::default(), DEFAULT_MIRROR_TIMEOUT);

        let mut azul = Toy::captured("k1", "https://img/k1");
        azul.name = Some("Azul".into());
        azul.title = Some("Dinosaur".into());
        let profile = UserProfile {
            language: Some("Spanish".into()),
            reading_level: Some(2),
            toys: vec![azul, Toy::captured("k2", "https://img/k2")],
        };
        persistence.save_profile("u", &profile, None).await.unwrap();

        Harness {
            generator: Arc::new(StoryGenerator::new(
                ai.clone(),
                persistence.clone(),
                mirror,
                "Spanish",
            )),
            ai,
            persistence,
            blobs,
            reports,
        }
    }

    fn draft(title: &str) -> AiResult<Value> {
        Ok(json!({ "Story": {
            "Title": title,
            "Two Sentence Summary": "Azul gets lost. Azul finds home.",
            "Life Lesson": "Ask for help.",
            "Page Contents": ["Once upon a time.", "The end."],
            "Recommended Vocabulary Words": [
                { "Word": "home", "Definition": "Where you live", "Translated Word": "casa" }
            ]
        }}))
    }

    fn both_toys() -> Option<Vec<String>> {
        Some(vec!["k2".into(), "k1".into()])
    }

    #[tokio::test]
    async fn created_story_is_prepended_and_current() {
        let mut h = harness(vec![draft("First"), draft("Second")]).await;

        for _ in 0..2 {
            h.generator
                .generate("u", both_toys(), CancellationToken::new())
                .await
                .unwrap();
        }

        let stories = h.persistence.load_stories("u").await.unwrap().value;
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].content.title, "Second");
        assert!(stories[0].id.starts_with("story_"));
        assert_eq!(stories[0].characters.len(), 2);
        assert_eq!(stories[0].characters[0].key, "k1");
        assert_eq!(
            h.persistence.load_current_story_id("u").await.unwrap(),
            Some(stories[0].id.clone())
        );

        assert_eq!(
            h.ai.requests()[0].prompt,
            "Create a story featuring these characters: Azul the Dinosaur, Unnamed the Character"
        );
        assert_eq!(h.reports.recv().await.unwrap().label, "stories u");
    }

    #[tokio::test]
    async fn selected_toys_are_used_without_explicit_keys() {
        let h = harness(vec![draft("Only Azul")]).await;
        h.persistence
            .save_selected_toys("u", &["k1".to_string()])
            .await
            .unwrap();

        let outcome = h
            .generator
            .generate("u", None, CancellationToken::new())
            .await
            .unwrap();

        let StoryOutcome::Created(story) = outcome else {
            panic!("expected a story");
        };
        assert_eq!(story.characters.len(), 1);
    }

    #[tokio::test]
    async fn no_matching_toys_is_an_error() {
        let h = harness(Vec::new()).await;
        let result = h
            .generator
            .generate("u", Some(vec!["nope".into()]), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(StoryError::NoToys)));
        assert!(h.ai.requests().is_empty());
    }

    #[tokio::test]
    async fn cancelling_in_flight_generation_stores_nothing() {
        let h = harness(Vec::new()).await;

        let running = {
            let generator = h.generator.clone();
            tokio::spawn(async move {
                generator
                    .generate("u", both_toys(), CancellationToken::new())
                    .await
            })
        };
        while h.ai.requests().is_empty() {
            tokio::task::yield_now().await;
        }

        assert!(h.generator.cancel("u"));
        let outcome = running.await.unwrap().unwrap();

        assert_eq!(outcome, StoryOutcome::Cancelled);
        assert!(h.persistence.load_stories("u").await.unwrap().value.is_empty());
        assert!(h.blobs.pathnames().is_empty());
        // Nothing left to cancel.
        assert!(!h.generator.cancel("u"));
    }

    #[tokio::test]
    async fn pre_cancelled_token_never_reaches_storage() {
        let h = harness(vec![draft("Too late")]).await;
        let token = CancellationToken::new();
        token.cancel();

        let outcome = h.generator.generate("u", both_toys(), token).await.unwrap();

        assert_eq!(outcome, StoryOutcome::Cancelled);
        assert!(h.generator.current_story("u").await.unwrap().is_none());
        assert!(h.blobs.pathnames().is_empty());
    }

    /// Cancels the token as soon as the story list is read.
    struct CancelOnStoriesLoad {
        inner: MemoryDocumentStore,
        token: CancellationToken,
    }

    #[async_trait::async_trait]
    impl DocumentStore for CancelOnStoriesLoad {
        async fn load(&self, owner: &str, key: DocumentKey) -> PortResult<Option<StoredDocument>> {
            if key == DocumentKey::Stories {
                self.token.cancel();
            }
            self.inner.load(owner, key).await
        }

        async fn replace(
            &self,
            owner: &str,
            key: DocumentKey,
            body: &str,
            expected_version: Option<u64>,
        ) -> PortResult<u64> {
            self.inner.replace(owner, key, body, expected_version).await
        }

        async fn clear(&self, owner: &str) -> PortResult<()> {
            self.inner.clear(owner).await
        }
    }

    #[tokio::test]
    async fn cancel_arriving_while_stories_load_stores_nothing() {
        let token = CancellationToken::new();
        let persistence = ClientPersistence::new(Arc::new(CancelOnStoriesLoad {
            inner: MemoryDocumentStore::default(),
            token: token.clone(),
        }));
        let mut profile = UserProfile::default();
        profile.toys.push(Toy::captured("k1", "https://img/k1"));
        persistence.save_profile("u", &profile, None).await.unwrap();
        let blobs = Arc::new(MemoryBlobStore::default());
        let (mirror, _reports) =
            BackgroundMirror::new(blobs.clone(), ImageProcessor::default(), DEFAULT_MIRROR_TIMEOUT);
        let generator = StoryGenerator::new(
            Arc::new(ScriptedAi::new(vec![draft("Raced")])),
            persistence.clone(),
            mirror,
            "Spanish",
        );

        let outcome = generator
            .generate("u", Some(vec!["k1".into()]), token)
            .await
            .unwrap();

        assert_eq!(outcome, StoryOutcome::Cancelled);
        assert!(persistence.load_stories("u").await.unwrap().value.is_empty());
        assert!(persistence.load_current_story_id("u").await.unwrap().is_none());
        assert!(blobs.pathnames().is_empty());
    }

    #[tokio::test]
    async fn translation_is_stored_next_to_the_pages() {
        let h = harness(vec![
            draft("Azul"),
            Ok(json!({ "Page Contents": ["Había una vez.", "Fin."] })),
        ])
        .await;
        let StoryOutcome::Created(story) = h
            .generator
            .generate("u", both_toys(), CancellationToken::new())
            .await
            .unwrap()
        else {
            panic!("expected a story");
        };

        let translated = h
            .generator
            .translate_story("u", &story.id, None)
            .await
            .unwrap();

        assert_eq!(
            translated.content.translated_pages,
            Some(vec!["Había una vez.".to_string(), "Fin.".to_string()])
        );
        assert!(h.ai.requests()[1].prompt.contains("Spanish"));
        let current = h.generator.current_story("u").await.unwrap().unwrap();
        assert_eq!(current, translated);
    }

    #[tokio::test]
    async fn translating_unknown_story_is_not_found() {
        let h = harness(Vec::new()).await;
        assert!(matches!(
            h.generator.translate_story("u", "story_1", None).await,
            Err(StoryError::NotFound(_))
        ));
    }
}
