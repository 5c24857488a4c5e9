//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use toy_stories_core::{
    ClientPersistence, CloudBackup, GenerativeAiService, PronunciationCache, StoryGenerator,
    ToyOnboarding,
};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ai: Arc<dyn GenerativeAiService>,
    pub persistence: ClientPersistence,
    pub onboarding: Arc<ToyOnboarding>,
    pub stories: Arc<StoryGenerator>,
    pub backup: Arc<CloudBackup>,
    /// `None` when no text-to-speech key is configured.
    pub pronunciations: Option<Arc<PronunciationCache>>,
}
