pub mod backup;
pub mod contracts;
pub mod domain;
pub mod imaging;
pub mod manifest;
pub mod mirror;
pub mod persistence;
pub mod pipeline;
pub mod ports;
pub mod pronunciation;
pub mod schema;
pub mod story;

#[cfg(test)]
mod test_support;

pub use backup::{CloudBackup, DemoData, DemoDataListing, DualWriteReport, SoundboardEntry};
pub use domain::{
    OnboardingState, Story, StoryCharacter, StoryContent, Toy, UserProfile, VocabEntry,
    VocabularyWord,
};
pub use imaging::{ImageError, ImageProcessor};
pub use manifest::AudioManifest;
pub use mirror::{BackgroundMirror, MirrorJob, MirrorReport};
pub use persistence::{ClientPersistence, Versioned};
pub use pipeline::{OnboardingError, OnboardingOutcome, StageFailure, ToyOnboarding};
pub use ports::{
    AiError, AiResult, BackgroundRemover, BlobStore, DocumentStore, GenerativeAiService,
    ImageFetcher, KeyValueStore, PortError, PortResult, SpeechSynthesizer,
};
pub use pronunciation::{PronunciationCache, PronunciationOptions};
pub use schema::ResponseSchema;
pub use story::{StoryError, StoryGenerator, StoryOutcome};
