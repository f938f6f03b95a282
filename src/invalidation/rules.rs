//! Shipped expansion rules.
//!
//! Config-driven counterparts of the expansions a host theme typically
//! registers: listing pages that embed a single item via a query parameter,
//! and per-item asset directory trees.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ExpansionSettings;
use crate::domain::content::ContentItem;

use super::expand::{ExpansionRegistry, ExpansionRule, RuleFailure};
use super::queue::UrlQueue;

/// Enumerates asset files under a directory.
///
/// The filesystem-backed implementation lives in `infra::assets`; tests use
/// fakes so no real directory tree is required.
pub trait AssetEnumerator: Send + Sync {
    /// Every asset file below `root`, already filtered of hidden files, OS
    /// metadata, and archive-extraction artifacts.
    fn enumerate(&self, root: &Path) -> Result<Vec<PathBuf>, RuleFailure>;
}

/// Appends `{listing_root}/?{param}={slug}` for items of the configured
/// kinds: the listing page variant that embeds the single item.
pub struct ListingQueryRule {
    name: String,
    kinds: Vec<String>,
    listing_root: String,
    param: String,
}

impl ListingQueryRule {
    pub fn new(
        kinds: Vec<String>,
        listing_root: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        let listing_root = listing_root.into().trim_end_matches('/').to_string();
        Self {
            name: format!("listing-query:{listing_root}"),
            kinds,
            listing_root,
            param: param.into(),
        }
    }
}

#[async_trait]
impl ExpansionRule for ListingQueryRule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn expand(
        &self,
        _queue: &UrlQueue,
        item: &ContentItem,
    ) -> Result<Vec<String>, RuleFailure> {
        if !self.kinds.iter().any(|kind| kind == item.kind.as_str()) {
            return Ok(Vec::new());
        }
        let Some(slug) = item.slug() else {
            return Ok(Vec::new());
        };
        Ok(vec![format!(
            "{}/?{}={slug}",
            self.listing_root, self.param
        )])
    }
}

/// Appends the site-relative URL of every file beneath the item's asset
/// directory (`{directory}/{slug}`), for items of the configured kind.
pub struct AssetTreeRule {
    name: String,
    kind: String,
    directory: PathBuf,
    site_root: PathBuf,
    enumerator: Arc<dyn AssetEnumerator>,
}

impl AssetTreeRule {
    pub fn new(
        kind: impl Into<String>,
        directory: impl Into<PathBuf>,
        site_root: impl Into<PathBuf>,
        enumerator: Arc<dyn AssetEnumerator>,
    ) -> Self {
        let kind = kind.into();
        Self {
            name: format!("asset-tree:{kind}"),
            kind,
            directory: directory.into(),
            site_root: site_root.into(),
            enumerator,
        }
    }
}

#[async_trait]
impl ExpansionRule for AssetTreeRule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn expand(
        &self,
        _queue: &UrlQueue,
        item: &ContentItem,
    ) -> Result<Vec<String>, RuleFailure> {
        if item.kind.as_str() != self.kind {
            return Ok(Vec::new());
        }
        let Some(slug) = item.slug() else {
            return Ok(Vec::new());
        };

        let root = self.directory.join(slug);
        let files = self.enumerator.enumerate(&root)?;

        let mut urls = Vec::with_capacity(files.len());
        for file in files {
            let relative = file.strip_prefix(&self.site_root).map_err(|_| {
                RuleFailure::new(format!(
                    "asset `{}` is outside the site root `{}`",
                    file.display(),
                    self.site_root.display()
                ))
            })?;
            urls.push(format!("/{}", relative.display()));
        }
        Ok(urls)
    }
}

/// Build a registry carrying the rules declared under `[expansion]`.
pub fn registry_from_settings(
    settings: &ExpansionSettings,
    assets: Arc<dyn AssetEnumerator>,
) -> ExpansionRegistry {
    let mut registry = ExpansionRegistry::new();

    for listing in &settings.listings {
        registry.register(Arc::new(ListingQueryRule::new(
            listing.kinds.clone(),
            listing.listing_root.clone(),
            listing.param.clone(),
        )));
    }

    for tree in &settings.asset_trees {
        registry.register(Arc::new(AssetTreeRule::new(
            tree.kind.clone(),
            tree.directory.clone(),
            tree.site_root.clone(),
            assets.clone(),
        )));
    }

    registry
}
