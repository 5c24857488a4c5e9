//! crates/toy_stories_core/src/contracts.rs
//!
//! Typed request/response contracts for each AI stage. Every stage owns its
//! system instruction and response schema, and `generate_typed` turns the
//! vendor's JSON into the stage's struct or an `AiError`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::domain::StoryContent;
use crate::ports::{AiError, AiResult, GenerationRequest, GenerativeAiService, ResponseFormat};
use crate::schema::ResponseSchema;

/// A JSON stage of the pipeline.
pub trait StageContract: DeserializeOwned + Send {
    /// Stage name used in logs and failure reports.
    const STAGE: &'static str;

    fn schema() -> ResponseSchema;
}

/// Sends the request with the contract's schema and decodes the answer.
pub async fn generate_typed<C: StageContract>(
    ai: &dyn GenerativeAiService,
    mut request: GenerationRequest,
) -> AiResult<C> {
    request.response_format = ResponseFormat::Json(C::schema());
    let value = ai.generate(request).await?;
    serde_json::from_value(value)
        .map_err(|e| AiError::SchemaViolation(format!("{} response: {}", C::STAGE, e)))
}

//=========================================================================================
// Toy Identification
//=========================================================================================

pub const IDENTIFY_INSTRUCTIONS: &str = r#"You are a toy identification system. For each image you see:
1. Identify the toy in the image.
2. Give ONLY the essential item or character in 1-2 words.
3. Do not add descriptions, explanations or qualifiers.
4. Give the toy a creative name.

Examples:
- A blue dinosaur plush: Item "Dinosaur" or "Blue Dino", Name "Azul".
- A LEGO Darth Vader figure: Item "Sith", Name "Darth Vader"."#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToyIdentification {
    #[serde(rename = "Item")]
    pub item: String,
    #[serde(rename = "Name")]
    pub name: String,
}

impl StageContract for ToyIdentification {
    const STAGE: &'static str = "identify";

    fn schema() -> ResponseSchema {
        ResponseSchema::new(json!({
            "type": "object",
            "properties": {
                "Item": { "type": "string" },
                "Name": { "type": "string" }
            },
            "required": ["Item", "Name"]
        }))
    }
}

//=========================================================================================
// Vocabulary Selection
//=========================================================================================

pub const VOCABULARY_INSTRUCTIONS: &str = r#"This is part of a prompt chain helping bilingual parents teach their children new words.
You will receive the kind of toy a child owns and a target language.
Choose exactly 4 simple words closely related to that toy (sounds it makes, what it does, what it looks like) that suit a reading level of 3-6 years old.
Use the present tense. Translate each word into the target language."#;

/// Words per toy the vocabulary stage asks for.
pub const VOCABULARY_SIZE: usize = 4;

pub fn vocabulary_prompt(title: &str, language: &str) -> String {
    format!("Toy: {title}\nTarget language: {language}")
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectedWord {
    pub word: String,
    #[serde(default)]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VocabularySelection {
    #[serde(rename = "VocabData")]
    pub words: Vec<SelectedWord>,
}

impl StageContract for VocabularySelection {
    const STAGE: &'static str = "vocabulary";

    fn schema() -> ResponseSchema {
        ResponseSchema::new(json!({
            "type": "object",
            "properties": {
                "VocabData": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "word": { "type": "string" },
                            "translation": { "type": "string" }
                        },
                        "required": ["word", "translation"]
                    }
                }
            },
            "required": ["VocabData"]
        }))
    }
}

//=========================================================================================
// Audio Matching
//=========================================================================================

pub const AUDIO_MATCHING_INSTRUCTIONS: &str = r#"AUDIO MATCHING GUIDELINES:
You receive a JSON list of vocabulary words and a manifest listing every available sound file.
1. Be literal first: match "dog" with a dog bark file before any metaphorical match.
2. For animals, prefer the specific animal, else the closest relative.
3. For actions, match the sound of the action (e.g. "splash" to a water splash).
4. For technology or magic words use science-fiction sounds; for weather use environment sounds.
5. When nothing matches directly, choose the conceptually closest sound.
6. Give each word a different file whenever the manifest has enough files.
Return ONLY paths exactly as written in the manifest. Do not modify the word or translation fields."#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MatchedAudio {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub translation: Option<String>,
    pub audio: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioMatching {
    #[serde(default)]
    pub vocab: Vec<MatchedAudio>,
}

impl StageContract for AudioMatching {
    const STAGE: &'static str = "audio";

    fn schema() -> ResponseSchema {
        ResponseSchema::new(json!({
            "type": "object",
            "properties": {
                "vocab": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "word": { "type": "string" },
                            "translation": { "type": "string" },
                            "audio": { "type": "string" }
                        },
                        "required": ["audio"]
                    }
                }
            },
            "required": ["vocab"]
        }))
    }
}

//=========================================================================================
// Story Creation and Translation
//=========================================================================================

pub const STORY_INSTRUCTIONS: &str = r#"You are a natural storyteller helping bilingual parents connect with their children and learn new words.
You will receive the names and kinds of one or more toys. Write an original 3-minute children's story (ages 0-5) with those toys as the main characters.

Requirements:
- Title: a short, playful title.
- Two Sentence Summary: two sentences for parents to read before the story.
- Page Contents: the story split into pages, one string per page.
- Life Lesson: a clear, gentle moral teaching a social or emotional skill.
- Recommended Vocabulary Words: 4 words from the story suited to ages 3-6, each with a simple definition and its translation. Keep the same tense as the story.

Storytelling principles:
1. A lovable main character, a small relatable problem, an emotional journey, a heartwarming resolution.
2. Emotions young children recognise: joy, worry, frustration, curiosity.
3. Short rhythmic sentences, repetition, onomatopoeia and rhyme that are fun to read aloud.
4. Simple but vivid descriptions.
5. A reassuring closing message.

The story must be 100% original: no existing copyrighted characters, settings or plots.
Only write children's stories. If the input is unrelated, kindly ask for toys instead."#;

pub fn story_prompt(character_descriptions: &str) -> String {
    format!("Create a story featuring these characters: {character_descriptions}")
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoryDraft {
    #[serde(rename = "Story")]
    pub story: StoryContent,
}

impl StageContract for StoryDraft {
    const STAGE: &'static str = "story";

    fn schema() -> ResponseSchema {
        ResponseSchema::new(json!({
            "type": "object",
            "properties": {
                "Story": {
                    "type": "object",
                    "properties": {
                        "Title": { "type": "string" },
                        "Two Sentence Summary": { "type": "string" },
                        "Life Lesson": { "type": "string" },
                        "Page Contents": { "type": "array", "items": { "type": "string" } },
                        "Recommended Vocabulary Words": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "Word": { "type": "string" },
                                    "Definition": { "type": "string" },
                                    "Translated Word": { "type": "string" }
                                },
                                "required": ["Word", "Definition", "Translated Word"]
                            }
                        }
                    },
                    "required": [
                        "Title",
                        "Two Sentence Summary",
                        "Life Lesson",
                        "Page Contents",
                        "Recommended Vocabulary Words"
                    ]
                }
            },
            "required": ["Story"]
        }))
    }
}

pub const STORY_TRANSLATION_INSTRUCTIONS: &str = r#"This is part of a prompt chain helping bilingual parents teach their children new words.
You will receive a target language and the pages of a children's story as a JSON list.
Translate every page into the target language, keeping the page count and order. Return the translated pages only."#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoryTranslation {
    #[serde(rename = "Page Contents")]
    pub pages: Vec<String>,
}

impl StageContract for StoryTranslation {
    const STAGE: &'static str = "story-translation";

    fn schema() -> ResponseSchema {
        ResponseSchema::new(json!({
            "type": "object",
            "properties": {
                "Page Contents": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["Page Contents"]
        }))
    }
}

//=========================================================================================
// Single-word Translation
//=========================================================================================

pub fn word_translation_prompt(word: &str, target_language: &str) -> String {
    format!(
        "Translate this word \"{word}\" to {target_language}. Provide ONLY the translated word without any explanation or formatting, just one single word as the translation."
    )
}
