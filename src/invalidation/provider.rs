//! CDN provider seam.

use async_trait::async_trait;
use thiserror::Error;

/// One batched invalidation request, submitted atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationBatch {
    pub distribution_id: String,
    /// The full path list. The engine never truncates it; an oversize batch
    /// is a provider-reported error.
    pub paths: Vec<String>,
    /// Idempotency key; the provider treats a repeated reference as a
    /// replay, not a new invalidation.
    pub caller_reference: String,
}

/// Provider acknowledgement of an accepted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReceipt {
    pub invalidation_id: String,
    pub status: String,
}

/// Provider-side failure. The message reaches the operator verbatim.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the request: bad credentials, unknown
    /// distribution, too many paths in one batch.
    #[error("{0}")]
    Rejected(String),
    /// The request never produced a provider response.
    #[error("provider request failed: {0}")]
    Transport(String),
}

/// CDN provider capable of purging paths from a distribution.
#[async_trait]
pub trait InvalidationProvider: Send + Sync {
    /// Submit one batch. `Ok` means the provider durably accepted the
    /// invalidation; anything else leaves the engine free to retry the
    /// identical submission.
    async fn submit_batch(
        &self,
        batch: &InvalidationBatch,
    ) -> Result<InvalidationReceipt, ProviderError>;

    /// Resolve the public domain name of a distribution. Used during
    /// configuration to validate credentials and the distribution id.
    async fn distribution_domain(&self, distribution_id: &str) -> Result<String, ProviderError>;
}
