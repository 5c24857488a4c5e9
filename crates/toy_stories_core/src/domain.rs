//! crates/toy_stories_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! Field names follow the JSON documents the web client reads and writes,
//! so these types double as the persisted document format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The per-client profile: onboarding choices plus the toy collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub reading_level: Option<u8>,
    /// Insertion order is display order.
    #[serde(default)]
    pub toys: Vec<Toy>,
}

impl UserProfile {
    pub fn find_toy(&self, key: &str) -> Option<&Toy> {
        self.toys.iter().find(|toy| toy.key == key)
    }

    /// Replaces the toy with the same key in place, or appends it.
    pub fn upsert_toy(&mut self, toy: Toy) {
        match self.toys.iter_mut().find(|existing| existing.key == toy.key) {
            Some(existing) => *existing = toy,
            None => self.toys.push(toy),
        }
    }

    /// Removes a toy by key. Returns whether anything was removed.
    pub fn remove_toy(&mut self, key: &str) -> bool {
        let before = self.toys.len();
        self.toys.retain(|toy| toy.key != key);
        self.toys.len() != before
    }
}

/// A photographed toy, enriched by the onboarding stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toy {
    /// Assigned by the upload widget; never changes.
    pub key: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocab: Option<Vec<VocabEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmp_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality_traits: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<OnboardingState>,
}

impl Toy {
    /// The record produced when the upload widget acknowledges a photo.
    pub fn captured(key: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            image: image.into(),
            name: None,
            title: None,
            vocab: None,
            bmp_url: None,
            personality_traits: None,
            checkpoint: Some(OnboardingState::ImageCaptured),
        }
    }

    /// The state to resume from. Toys saved before checkpoints existed are
    /// inferred from which fields they carry.
    pub fn resume_state(&self) -> OnboardingState {
        if let Some(checkpoint) = self.checkpoint {
            return checkpoint;
        }
        match (&self.title, &self.vocab) {
            (_, Some(vocab)) if vocab.iter().any(|v| v.audio_file.is_some()) => {
                OnboardingState::AudioMatched
            }
            (_, Some(_)) => OnboardingState::VocabularySelected,
            (Some(_), None) => OnboardingState::Identifying,
            (None, None) => OnboardingState::ImageCaptured,
        }
    }
}

/// A single target-language word attached to a toy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabEntry {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronounce_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate_pronounce_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
}

impl VocabEntry {
    pub fn new(word: impl Into<String>, translation: Option<String>) -> Self {
        Self {
            word: word.into(),
            translation,
            pronounce_url: None,
            translate_pronounce_url: None,
            audio_file: None,
        }
    }
}

/// The states of the per-toy onboarding flow. A toy's checkpoint holds the
/// last one whose transition committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnboardingState {
    Idle,
    ImageCaptured,
    Uploading,
    Identifying,
    VocabularySelected,
    AudioMatched,
    Persisted,
}

/// An AI-written story plus the metadata attached when it was generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub characters: Vec<StoryCharacter>,
    #[serde(rename = "Story")]
    pub content: StoryContent,
}

/// A snapshot of a toy taken when the story was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryCharacter {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub image: String,
}

impl From<&Toy> for StoryCharacter {
    fn from(toy: &Toy) -> Self {
        Self {
            key: toy.key.clone(),
            name: toy.name.clone(),
            title: toy.title.clone(),
            image: toy.image.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryContent {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Two Sentence Summary")]
    pub summary: String,
    #[serde(rename = "Life Lesson")]
    pub life_lesson: String,
    #[serde(rename = "Page Contents")]
    pub pages: Vec<String>,
    #[serde(
        rename = "Page Contents Translated",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub translated_pages: Option<Vec<String>>,
    #[serde(
        rename = "Recommended Vocabulary Words",
        default,
        deserialize_with = "deserialize_vocabulary_words"
    )]
    pub vocabulary: Vec<VocabularyWord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyWord {
    #[serde(rename = "Word")]
    pub word: String,
    #[serde(rename = "Definition")]
    pub definition: String,
    #[serde(rename = "Translated Word")]
    pub translated_word: String,
}

/// Older stories wrap the word list as `{"Vocabulary Word": [...]}`.
fn deserialize_vocabulary_words<'de, D>(deserializer: D) -> Result<Vec<VocabularyWord>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        List(Vec<VocabularyWord>),
        Wrapped {
            #[serde(rename = "Vocabulary Word")]
            words: Vec<VocabularyWord>,
        },
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::List(words) => words,
        Repr::Wrapped { words } => words,
    })
}
