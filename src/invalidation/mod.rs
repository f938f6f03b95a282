//! Invalidation engine.
//!
//! Turns "what changed since the last flush" into a deduplicated set of CDN
//! paths and submits it as one provider batch:
//!
//! - **Detection**: items modified strictly after the checkpoint
//! - **Expansion**: slash variants, ancestor chain, registered rules
//! - **Planning**: ordered accumulation and a single final dedup
//! - **Submission**: idempotent provider batch; the checkpoint advances only
//!   on confirmed acceptance
//!
//! The engine touches its collaborators (content store, settings store, CDN
//! provider) only through the traits in [`crate::application::repos`] and
//! [`provider`], so the whole pipeline runs against fakes in tests.

mod checkpoint;
mod detect;
mod expand;
mod planner;
mod provider;
mod queue;
mod rules;
mod submit;
pub mod url;

pub use checkpoint::{CHECKPOINT_KEY, Checkpoint};
pub use detect::ChangeDetector;
pub use expand::{ExpansionRegistry, ExpansionRule, RuleFailure, SeedRule};
pub use planner::{InvalidationPlan, InvalidationPlanner};
pub use provider::{InvalidationBatch, InvalidationProvider, InvalidationReceipt, ProviderError};
pub use queue::UrlQueue;
pub use rules::{AssetEnumerator, AssetTreeRule, ListingQueryRule, registry_from_settings};
pub use submit::{FlushReceipt, InvalidationSubmitter, SubmitError, parse_paths};

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fakes shared by the subsystem's unit tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use crate::application::repos::{ContentRepo, RepoError, SettingsRepo};
    use crate::domain::content::{ContentId, ContentItem, ContentKind};

    use super::provider::{
        InvalidationBatch, InvalidationProvider, InvalidationReceipt, ProviderError,
    };

    pub(crate) fn item(
        id: i64,
        parent: Option<i64>,
        kind: &str,
        modified_at: Option<OffsetDateTime>,
        permalink: &str,
    ) -> ContentItem {
        ContentItem {
            id: ContentId::new(id),
            parent_id: parent.map(ContentId::new),
            kind: ContentKind::new(kind),
            modified_at,
            permalink: permalink.to_string(),
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryContent {
        items: Vec<ContentItem>,
    }

    impl MemoryContent {
        pub(crate) fn new(items: Vec<ContentItem>) -> Self {
            Self { items }
        }
    }

    #[async_trait]
    impl ContentRepo for MemoryContent {
        async fn list_kinds(&self) -> Result<Vec<ContentKind>, RepoError> {
            let mut kinds: Vec<ContentKind> = Vec::new();
            for item in &self.items {
                if !kinds.contains(&item.kind) {
                    kinds.push(item.kind.clone());
                }
            }
            Ok(kinds)
        }

        async fn list_items(&self, kind: &ContentKind) -> Result<Vec<ContentItem>, RepoError> {
            Ok(self
                .items
                .iter()
                .filter(|item| &item.kind == kind)
                .cloned()
                .collect())
        }

        async fn find_item(&self, id: ContentId) -> Result<Option<ContentItem>, RepoError> {
            Ok(self.items.iter().find(|item| item.id == id).cloned())
        }
    }

    #[derive(Default)]
    pub(crate) struct MemorySettings {
        values: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SettingsRepo for MemorySettings {
        async fn get(&self, key: &str) -> Result<Option<String>, RepoError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), RepoError> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    /// Provider fake that records every batch and either accepts or rejects.
    pub(crate) struct ScriptedProvider {
        reject_with: Option<String>,
        batches: Mutex<Vec<InvalidationBatch>>,
        domain: String,
    }

    impl ScriptedProvider {
        pub(crate) fn accepting() -> Self {
            Self {
                reject_with: None,
                batches: Mutex::new(Vec::new()),
                domain: "d123example.cloudfront.net".to_string(),
            }
        }

        pub(crate) fn rejecting(message: &str) -> Self {
            Self {
                reject_with: Some(message.to_string()),
                batches: Mutex::new(Vec::new()),
                domain: "d123example.cloudfront.net".to_string(),
            }
        }

        pub(crate) fn batches(&self) -> Vec<InvalidationBatch> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InvalidationProvider for ScriptedProvider {
        async fn submit_batch(
            &self,
            batch: &InvalidationBatch,
        ) -> Result<InvalidationReceipt, ProviderError> {
            self.batches.lock().unwrap().push(batch.clone());
            match &self.reject_with {
                Some(message) => Err(ProviderError::Rejected(message.clone())),
                None => Ok(InvalidationReceipt {
                    invalidation_id: "I2J0V9WXYZ".to_string(),
                    status: "InProgress".to_string(),
                }),
            }
        }

        async fn distribution_domain(
            &self,
            _distribution_id: &str,
        ) -> Result<String, ProviderError> {
            match &self.reject_with {
                Some(message) => Err(ProviderError::Rejected(message.clone())),
                None => Ok(self.domain.clone()),
            }
        }
    }
}
