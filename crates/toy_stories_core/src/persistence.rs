//! crates/toy_stories_core/src/persistence.rs
//!
//! Typed, whole-document access to a client's stored state. Callers read a
//! document together with its version and hand the version back on write, so a
//! concurrent writer shows up as `PortError::Conflict` instead of a silent overwrite.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{Story, UserProfile};
use crate::ports::{DocumentKey, DocumentStore, PortError, PortResult};

/// A document value plus the version it was read at (`0` when absent).
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[derive(Clone)]
pub struct ClientPersistence {
    store: Arc<dyn DocumentStore>,
}

impl ClientPersistence {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn load_profile(&self, owner: &str) -> PortResult<Versioned<UserProfile>> {
        self.load_or_default(owner, DocumentKey::UserData).await
    }

    pub async fn save_profile(
        &self,
        owner: &str,
        profile: &UserProfile,
        expected_version: Option<u64>,
    ) -> PortResult<u64> {
        self.save(owner, DocumentKey::UserData, profile, expected_version)
            .await
    }

    /// Newest first.
    pub async fn load_stories(&self, owner: &str) -> PortResult<Versioned<Vec<Story>>> {
        self.load_or_default(owner, DocumentKey::Stories).await
    }

    pub async fn save_stories(
        &self,
        owner: &str,
        stories: &[Story],
        expected_version: Option<u64>,
    ) -> PortResult<u64> {
        self.save(owner, DocumentKey::Stories, &stories, expected_version)
            .await
    }

    pub async fn load_selected_toys(&self, owner: &str) -> PortResult<Vec<String>> {
        Ok(self
            .load_or_default::<Vec<String>>(owner, DocumentKey::SelectedToys)
            .await?
            .value)
    }

    pub async fn save_selected_toys(&self, owner: &str, keys: &[String]) -> PortResult<u64> {
        self.save(owner, DocumentKey::SelectedToys, &keys, None).await
    }

    pub async fn load_current_story_id(&self, owner: &str) -> PortResult<Option<String>> {
        Ok(self
            .load_or_default::<Option<String>>(owner, DocumentKey::CurrentStoryId)
            .await?
            .value)
    }

    pub async fn save_current_story_id(&self, owner: &str, story_id: &str) -> PortResult<u64> {
        self.save(owner, DocumentKey::CurrentStoryId, &story_id, None)
            .await
    }

    /// The id used to name this client's cloud backups. Stored on first use.
    pub async fn user_id(&self, owner: &str) -> PortResult<String> {
        let stored = self
            .load_or_default::<Option<String>>(owner, DocumentKey::UserId)
            .await?;
        if let Some(id) = stored.value.filter(|id| !id.is_empty()) {
            return Ok(id);
        }

        let id = owner.to_string();
        match self
            .save(owner, DocumentKey::UserId, &id, Some(stored.version))
            .await
        {
            Ok(_) => Ok(id),
            // Another request stored it first; use theirs.
            Err(PortError::Conflict(_)) => {
                let stored = self
                    .load_or_default::<Option<String>>(owner, DocumentKey::UserId)
                    .await?;
                Ok(stored.value.unwrap_or(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Removes every document the client owns.
    pub async fn reset(&self, owner: &str) -> PortResult<()> {
        self.store.clear(owner).await
    }

    async fn load_or_default<T>(&self, owner: &str, key: DocumentKey) -> PortResult<Versioned<T>>
    where
        T: DeserializeOwned + Default,
    {
        let Some(document) = self.store.load(owner, key).await? else {
            return Ok(Versioned {
                value: T::default(),
                version: 0,
            });
        };

        let value = match serde_json::from_str(&document.body) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "Stored {} for {} is unreadable, using an empty default: {}",
                    key.as_str(),
                    owner,
                    e
                );
                T::default()
            }
        };

        Ok(Versioned {
            value,
            version: document.version,
        })
    }

    async fn save<T>(
        &self,
        owner: &str,
        key: DocumentKey,
        value: &T,
        expected_version: Option<u64>,
    ) -> PortResult<u64>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_string(value)
            .map_err(|e| PortError::Unexpected(format!("Cannot encode {}: {}", key.as_str(), e)))?;
        self.store.replace(owner, key, &body, expected_version).await
    }
}
