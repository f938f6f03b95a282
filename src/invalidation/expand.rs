//! Pluggable URL expansion.
//!
//! For one changed item the registry computes every URL that must be purged:
//! the item's own slash variants, the ancestor chain, and whatever the
//! registered rules add on top.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::repos::{ContentRepo, RepoError};
use crate::domain::content::ContentItem;

use super::queue::UrlQueue;
use super::url;

const METRIC_RULE_FAILURES: &str = "spurgo_rule_failures_total";

/// Failure local to one rule and one item.
///
/// Caught by the registry: the batch continues without the rule's URLs and
/// the failure is logged and counted.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RuleFailure {
    message: String,
}

impl RuleFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for RuleFailure {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Adds URLs for one changed item.
///
/// Rules see the queue built so far and return what to append. The API shape
/// makes additivity structural: a rule cannot remove or reorder existing
/// entries.
#[async_trait]
pub trait ExpansionRule: Send + Sync {
    fn name(&self) -> &str;

    async fn expand(
        &self,
        queue: &UrlQueue,
        item: &ContentItem,
    ) -> Result<Vec<String>, RuleFailure>;
}

/// Contributes URLs to a plan before any changed item is inspected.
#[async_trait]
pub trait SeedRule: Send + Sync {
    fn name(&self) -> &str;

    async fn seed(&self, queue: &UrlQueue) -> Result<Vec<String>, RuleFailure>;
}

/// Registry of expansion hooks, owned by the engine instance.
///
/// Registration is explicit; there is no ambient global hook state. Rules
/// run in registration order, and every registration fires.
#[derive(Default)]
pub struct ExpansionRegistry {
    seeds: Vec<Arc<dyn SeedRule>>,
    rules: Vec<Arc<dyn ExpansionRule>>,
}

impl ExpansionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rule: Arc<dyn ExpansionRule>) {
        self.rules.push(rule);
    }

    pub fn register_seed(&mut self, rule: Arc<dyn SeedRule>) {
        self.seeds.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Run every seed rule, appending its URLs to the queue.
    pub async fn seed(&self, queue: &mut UrlQueue) {
        for rule in &self.seeds {
            match rule.seed(queue).await {
                Ok(urls) => queue.extend(urls),
                Err(failure) => report_rule_failure(rule.name(), &failure),
            }
        }
    }

    /// Expand one changed item into every URL that must be purged.
    ///
    /// Appends the item's own variants, walks the ancestor chain, then runs
    /// the registered rules in order. Rule failures are isolated; content
    /// store failures propagate.
    pub async fn expand_item(
        &self,
        queue: &mut UrlQueue,
        item: &ContentItem,
        content: &dyn ContentRepo,
    ) -> Result<(), RepoError> {
        queue.extend(url::variants(&item.permalink));

        self.walk_ancestors(queue, item, content).await?;

        for rule in &self.rules {
            match rule.expand(queue, item).await {
                Ok(urls) => queue.extend(urls),
                Err(failure) => report_rule_failure(rule.name(), &failure),
            }
        }

        Ok(())
    }

    /// Enqueue the slash variants of every ancestor of `item`.
    ///
    /// A visited set over item ids guarantees termination when the store
    /// reports a parent cycle; a dangling parent id ends the walk.
    async fn walk_ancestors(
        &self,
        queue: &mut UrlQueue,
        item: &ContentItem,
        content: &dyn ContentRepo,
    ) -> Result<(), RepoError> {
        let mut visited = HashSet::from([item.id]);
        let mut next = item.parent_id;

        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                warn!(
                    item = %item.id,
                    parent = %parent_id,
                    "content store reported a parent cycle, stopping ancestor walk"
                );
                break;
            }

            match content.find_item(parent_id).await? {
                Some(parent) => {
                    queue.extend(url::variants(&parent.permalink));
                    next = parent.parent_id;
                }
                None => {
                    debug!(item = %item.id, parent = %parent_id, "ancestor not found, stopping walk");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn report_rule_failure(rule: &str, failure: &RuleFailure) {
    warn!(rule, error = %failure, "expansion rule failed, continuing without its URLs");
    counter!(METRIC_RULE_FAILURES, "rule" => rule.to_string()).increment(1);
}
