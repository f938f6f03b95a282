//! Batch submission and checkpoint advancement.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::application::repos::{RepoError, SettingsRepo};

use super::checkpoint::Checkpoint;
use super::provider::{InvalidationBatch, InvalidationProvider, ProviderError};

const METRIC_BATCHES_SUBMITTED: &str = "spurgo_batches_submitted_total";
const METRIC_BATCHES_REJECTED: &str = "spurgo_batches_rejected_total";

/// Split operator-edited text into purge paths: line-delimited, trimmed,
/// empty lines dropped.
pub fn parse_paths(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Nothing to purge; the provider is never called.
    #[error("invalidation queue is empty")]
    EmptyQueue,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Outcome of an accepted flush.
#[derive(Debug, Clone)]
pub struct FlushReceipt {
    pub invalidation_id: String,
    pub status: String,
    pub path_count: usize,
    /// Checkpoint value after the advance.
    pub checkpoint: Checkpoint,
}

/// Packages path lists into provider batches and advances the checkpoint on
/// confirmed acceptance.
pub struct InvalidationSubmitter {
    provider: Arc<dyn InvalidationProvider>,
    settings: Arc<dyn SettingsRepo>,
    reference_prefix: String,
}

impl InvalidationSubmitter {
    pub fn new(
        provider: Arc<dyn InvalidationProvider>,
        settings: Arc<dyn SettingsRepo>,
        reference_prefix: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            settings,
            reference_prefix: reference_prefix.into(),
        }
    }

    /// Submit `paths` against `checkpoint` as one atomic batch.
    ///
    /// The full list is submitted without truncation; an oversize batch is
    /// the provider's error to report. On acceptance the checkpoint advances
    /// to now. On any provider error it stays untouched and the identical
    /// submission can be retried, with the same caller reference.
    pub async fn submit(
        &self,
        distribution_id: &str,
        paths: Vec<String>,
        checkpoint: Checkpoint,
    ) -> Result<FlushReceipt, SubmitError> {
        if paths.is_empty() {
            return Err(SubmitError::EmptyQueue);
        }

        let batch = InvalidationBatch {
            distribution_id: distribution_id.to_string(),
            caller_reference: checkpoint.caller_reference(&self.reference_prefix),
            paths,
        };

        let receipt = match self.provider.submit_batch(&batch).await {
            Ok(receipt) => receipt,
            Err(err) => {
                counter!(METRIC_BATCHES_REJECTED).increment(1);
                error!(
                    distribution = %batch.distribution_id,
                    error = %err,
                    "invalidation batch not accepted, checkpoint unchanged"
                );
                return Err(err.into());
            }
        };

        let advanced = Checkpoint::store(self.settings.as_ref(), OffsetDateTime::now_utc()).await?;
        counter!(METRIC_BATCHES_SUBMITTED).increment(1);
        info!(
            invalidation = %receipt.invalidation_id,
            status = %receipt.status,
            paths = batch.paths.len(),
            checkpoint = %advanced,
            "invalidation batch accepted"
        );

        Ok(FlushReceipt {
            invalidation_id: receipt.invalidation_id,
            status: receipt.status,
            path_count: batch.paths.len(),
            checkpoint: advanced,
        })
    }
}
