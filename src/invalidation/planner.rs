//! Invalidation plan generation.
//!
//! Drives detection and expansion into one deduplicated, reviewable path
//! list.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::info;

use crate::application::repos::{ContentRepo, RepoError};

use super::checkpoint::Checkpoint;
use super::detect::ChangeDetector;
use super::expand::ExpansionRegistry;
use super::queue::UrlQueue;

const METRIC_PLAN_BUILD_MS: &str = "spurgo_plan_build_ms";
const METRIC_CHANGED_ITEMS: &str = "spurgo_changed_items_total";
const METRIC_QUEUED_URLS: &str = "spurgo_queued_urls_total";

/// The reviewable outcome of one planning pass.
///
/// Ephemeral: built fresh per invocation and discarded after submission or
/// abort.
#[derive(Debug, Clone)]
pub struct InvalidationPlan {
    /// Unique purge paths in first-occurrence order.
    pub paths: Vec<String>,
    /// Checkpoint the plan was computed against.
    pub checkpoint: Checkpoint,
    /// Number of changed items behind the paths.
    pub changed_items: usize,
}

impl InvalidationPlan {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Line-delimited form shown to the operator for review and editing.
    pub fn as_text(&self) -> String {
        let mut text = String::new();
        for path in &self.paths {
            text.push_str(path);
            text.push('\n');
        }
        text
    }
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ paths: {}, changed_items: {}, checkpoint: {} }}",
            self.paths.len(),
            self.changed_items,
            self.checkpoint,
        )
    }
}

/// Builds invalidation plans from the content store and the registry.
pub struct InvalidationPlanner {
    content: Arc<dyn ContentRepo>,
    detector: ChangeDetector,
    registry: Arc<ExpansionRegistry>,
}

impl InvalidationPlanner {
    pub fn new(content: Arc<dyn ContentRepo>, registry: Arc<ExpansionRegistry>) -> Self {
        Self {
            detector: ChangeDetector::new(content.clone()),
            content,
            registry,
        }
    }

    /// Seed, detect, expand, dedup.
    pub async fn build(&self, checkpoint: Checkpoint) -> Result<InvalidationPlan, RepoError> {
        let started_at = Instant::now();
        let mut queue = UrlQueue::new();

        self.registry.seed(&mut queue).await;

        let changed = self.detector.changed_since(checkpoint.as_datetime()).await?;
        counter!(METRIC_CHANGED_ITEMS).increment(changed.len() as u64);

        for item in &changed {
            self.registry
                .expand_item(&mut queue, item, self.content.as_ref())
                .await?;
        }

        let paths = queue.into_unique();
        counter!(METRIC_QUEUED_URLS).increment(paths.len() as u64);
        histogram!(METRIC_PLAN_BUILD_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        info!(
            changed_items = changed.len(),
            paths = paths.len(),
            checkpoint = %checkpoint,
            "invalidation plan built"
        );

        Ok(InvalidationPlan {
            paths,
            checkpoint,
            changed_items: changed.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::invalidation::testing::{item, MemoryContent};

    const T: time::OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    fn checkpoint() -> Checkpoint {
        Checkpoint::at(T)
    }

    #[tokio::test]
    async fn plan_expands_and_dedups_across_items() {
        // Two changed siblings under the same parent: the parent's URLs are
        // queued twice, the final plan keeps one copy of each path.
        let parent = item(2, None, "page", None, "/posts/");
        let content = Arc::new(MemoryContent::new(vec![
            parent,
            item(5, Some(2), "post", Some(T + time::Duration::seconds(10)), "/posts/foo/"),
            item(6, Some(2), "post", Some(T + time::Duration::seconds(20)), "/posts/bar/"),
        ]));

        let planner = InvalidationPlanner::new(content, Arc::new(ExpansionRegistry::new()));
        let plan = planner.build(checkpoint()).await.unwrap();

        assert_eq!(
            plan.paths,
            vec!["/posts/foo/", "/posts/foo", "/posts/", "/posts", "/posts/bar/", "/posts/bar"]
        );
        assert_eq!(plan.changed_items, 2);
    }

    #[tokio::test]
    async fn unchanged_store_yields_an_empty_plan() {
        let content = Arc::new(MemoryContent::new(vec![item(
            1,
            None,
            "post",
            Some(T - time::Duration::seconds(60)),
            "/posts/old/",
        )]));

        let planner = InvalidationPlanner::new(content, Arc::new(ExpansionRegistry::new()));
        let plan = planner.build(checkpoint()).await.unwrap();

        assert!(plan.is_empty());
        assert_eq!(plan.changed_items, 0);
    }

    #[tokio::test]
    async fn plan_text_is_line_delimited() {
        let content = Arc::new(MemoryContent::new(vec![item(
            5,
            None,
            "post",
            Some(T + time::Duration::seconds(10)),
            "/posts/foo/",
        )]));

        let planner = InvalidationPlanner::new(content, Arc::new(ExpansionRegistry::new()));
        let plan = planner.build(checkpoint()).await.unwrap();

        assert_eq!(plan.as_text(), "/posts/foo/\n/posts/foo\n");
    }
}
