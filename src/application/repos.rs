//! Collaborator traits describing the stores the engine depends on.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::content::{ContentId, ContentItem, ContentKind};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Read-only view of the host system's published content.
///
/// The engine never writes here; items are created, edited, and deleted by
/// the host system.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Enumerate every content kind the store knows about.
    async fn list_kinds(&self) -> Result<Vec<ContentKind>, RepoError>;

    /// List all items of one kind.
    async fn list_items(&self, kind: &ContentKind) -> Result<Vec<ContentItem>, RepoError>;

    /// Fetch a single item by id. `Ok(None)` when the id is unknown.
    async fn find_item(&self, id: ContentId) -> Result<Option<ContentItem>, RepoError>;
}

/// Scalar key/value settings persisted across invocations.
///
/// Holds the flush checkpoint and the provider distribution details. Plain
/// string values, no schema versioning.
#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepoError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), RepoError>;
}
