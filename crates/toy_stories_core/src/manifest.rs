//! crates/toy_stories_core/src/manifest.rs
//!
//! The list of sound files the audio-matching stage may choose from.

use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioManifest {
    /// Where the listing came from; quoted to the AI as the file name.
    source: String,
    entries: Vec<String>,
}

impl AudioManifest {
    /// One path per line. Blank lines and `#` comments are skipped.
    pub fn parse(source: impl Into<String>, text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self {
            source: source.into(),
            entries,
        }
    }

    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(path.display().to_string(), &text))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| entry == path)
    }

    /// The listing as sent to the AI.
    pub fn to_text(&self) -> String {
        self.entries.join("\n")
    }

    /// Takes one proposed path per word and keeps only paths that exist in the
    /// manifest. A path already given to an earlier word is dropped, unless the
    /// manifest is too short to give every word its own file.
    pub fn reconcile(&self, proposed: &[Option<&str>]) -> Vec<Option<String>> {
        let allow_repeats = self.entries.len() < proposed.len();
        let mut used = HashSet::new();

        proposed
            .iter()
            .map(|path| {
                let audio = (*path)?.trim();
                if !self.contains(audio) {
                    return None;
                }
                if used.insert(audio.to_string()) || allow_repeats {
                    Some(audio.to_string())
                } else {
                    None
                }
            })
            .collect()
    }
}
