//! spurgo: change-aware CDN cache invalidation.
//!
//! Detects content modified since the last flush checkpoint, expands each
//! change into the full set of paths to purge (slash variants, ancestor
//! chain, pluggable rules), and submits the deduplicated batch to the CDN
//! provider. The checkpoint advances only on confirmed acceptance, so a
//! failed flush can always be retried without losing pending changes.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod invalidation;
