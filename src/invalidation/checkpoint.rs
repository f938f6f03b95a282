//! Flush checkpoint persistence.

use std::fmt;

use time::OffsetDateTime;
use tracing::warn;

use crate::application::repos::{RepoError, SettingsRepo};

/// Settings key holding the checkpoint as unix seconds.
pub const CHECKPOINT_KEY: &str = "checkpoint";

/// Boundary between already-invalidated and pending changes.
///
/// The only engine state that persists across invocations. Advances only
/// after the provider confirms a batch, never speculatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(OffsetDateTime);

impl Checkpoint {
    pub fn at(instant: OffsetDateTime) -> Self {
        Self(instant)
    }

    pub fn as_datetime(self) -> OffsetDateTime {
        self.0
    }

    pub fn unix_timestamp(self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Idempotency token for a batch submitted against this checkpoint.
    ///
    /// Deterministic: resubmitting before the checkpoint advances reuses the
    /// same reference, which the provider treats as a replay.
    pub fn caller_reference(self, prefix: &str) -> String {
        format!("{prefix}-{}", self.0.unix_timestamp())
    }

    /// Load the persisted checkpoint. An unparsable stored value is reported
    /// and treated as absent.
    pub async fn load(settings: &dyn SettingsRepo) -> Result<Option<Self>, RepoError> {
        let Some(raw) = settings.get(CHECKPOINT_KEY).await? else {
            return Ok(None);
        };

        let parsed = raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|seconds| OffsetDateTime::from_unix_timestamp(seconds).ok());

        match parsed {
            Some(instant) => Ok(Some(Self(instant))),
            None => {
                warn!(value = %raw, "stored checkpoint is not a unix timestamp, treating as absent");
                Ok(None)
            }
        }
    }

    /// Persist `instant` as the new checkpoint and return it.
    pub async fn store(
        settings: &dyn SettingsRepo,
        instant: OffsetDateTime,
    ) -> Result<Self, RepoError> {
        settings
            .set(CHECKPOINT_KEY, &instant.unix_timestamp().to_string())
            .await?;
        Ok(Self(instant))
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.unix_timestamp())
    }
}
