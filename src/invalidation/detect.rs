//! Change detection against the flush checkpoint.

use std::sync::Arc;

use futures::future;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::repos::{ContentRepo, RepoError};
use crate::domain::content::ContentItem;

/// Scans the content store for items modified after a checkpoint.
pub struct ChangeDetector {
    content: Arc<dyn ContentRepo>,
}

impl ChangeDetector {
    pub fn new(content: Arc<dyn ContentRepo>) -> Self {
        Self { content }
    }

    /// Every item whose modification timestamp is strictly after
    /// `checkpoint`, across all content kinds.
    ///
    /// Kind scans are read-only and independent and run concurrently; no
    /// ordering is guaranteed across kinds. Items without a usable timestamp
    /// are skipped.
    pub async fn changed_since(
        &self,
        checkpoint: OffsetDateTime,
    ) -> Result<Vec<ContentItem>, RepoError> {
        let kinds = self.content.list_kinds().await?;
        let scans = kinds.iter().map(|kind| self.content.list_items(kind));
        let listings = future::try_join_all(scans).await?;

        let mut changed = Vec::new();
        for items in listings {
            for item in items {
                match item.modified_at {
                    Some(modified) if modified > checkpoint => changed.push(item),
                    Some(_) => {}
                    None => {
                        debug!(item = %item.id, "item has no parsable modification timestamp, treated as unchanged");
                    }
                }
            }
        }

        debug!(changed = changed.len(), kinds = kinds.len(), "change scan finished");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::content::ContentId;
    use crate::invalidation::testing::{item, MemoryContent};

    const T: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    #[tokio::test]
    async fn strictly_newer_items_are_included_across_kinds() {
        let content = Arc::new(MemoryContent::new(vec![
            item(1, None, "post", Some(T + time::Duration::seconds(10)), "/posts/a/"),
            item(2, None, "page", Some(T + time::Duration::seconds(1)), "/about/"),
        ]));

        let changed = ChangeDetector::new(content).changed_since(T).await.unwrap();

        let ids: Vec<ContentId> = changed.iter().map(|i| i.id).collect();
        assert!(ids.contains(&ContentId::new(1)));
        assert!(ids.contains(&ContentId::new(2)));
    }

    #[tokio::test]
    async fn items_at_or_before_the_checkpoint_are_excluded() {
        let content = Arc::new(MemoryContent::new(vec![
            item(1, None, "post", Some(T), "/posts/a/"),
            item(2, None, "post", Some(T - time::Duration::seconds(5)), "/posts/b/"),
        ]));

        let changed = ChangeDetector::new(content).changed_since(T).await.unwrap();

        assert!(changed.is_empty());
    }

    #[tokio::test]
    async fn items_without_a_timestamp_are_excluded_not_errors() {
        let content = Arc::new(MemoryContent::new(vec![
            item(1, None, "post", None, "/posts/a/"),
            item(2, None, "post", Some(T + time::Duration::seconds(1)), "/posts/b/"),
        ]));

        let changed = ChangeDetector::new(content).changed_since(T).await.unwrap();

        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, ContentId::new(2));
    }
}
