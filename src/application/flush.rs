//! Whole-workflow flush orchestration.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::info;

use crate::invalidation::{
    Checkpoint, ExpansionRegistry, FlushReceipt, InvalidationPlan, InvalidationPlanner,
    InvalidationProvider, InvalidationSubmitter, ProviderError, SubmitError, parse_paths,
};

use super::repos::{ContentRepo, RepoError, SettingsRepo};

/// Settings key holding the provider distribution id.
pub const DISTRIBUTION_KEY: &str = "distribution";
/// Settings key holding the distribution's resolved domain name.
pub const DOMAIN_KEY: &str = "domain";

#[derive(Debug, Error)]
pub enum FlushError {
    /// Fatal before any queue work: the workflow cannot run unconfigured.
    #[error("configuration missing: `{key}` is not set, run `spurgo configure` first")]
    ConfigurationMissing { key: &'static str },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Outcome of `spurgo configure`.
#[derive(Debug, Clone)]
pub struct ConfigureOutcome {
    pub distribution_id: String,
    pub domain: String,
    /// True when this call initialized the checkpoint for the first time.
    pub checkpoint_initialized: bool,
}

/// Drives the full invalidation workflow: read checkpoint, build the plan,
/// submit, advance.
///
/// The read-then-conditionally-write sequence around the checkpoint is
/// single-writer: a mutex serializes whole invocations, so two overlapping
/// runs can never both act on the same stale checkpoint. Aborting before
/// submission has no side effects.
pub struct FlushService {
    settings: Arc<dyn SettingsRepo>,
    provider: Arc<dyn InvalidationProvider>,
    planner: InvalidationPlanner,
    submitter: InvalidationSubmitter,
    workflow: Mutex<()>,
}

impl FlushService {
    pub fn new(
        content: Arc<dyn ContentRepo>,
        settings: Arc<dyn SettingsRepo>,
        provider: Arc<dyn InvalidationProvider>,
        registry: ExpansionRegistry,
        reference_prefix: impl Into<String>,
    ) -> Self {
        let registry = Arc::new(registry);
        Self {
            planner: InvalidationPlanner::new(content, registry),
            submitter: InvalidationSubmitter::new(
                provider.clone(),
                settings.clone(),
                reference_prefix,
            ),
            settings,
            provider,
            workflow: Mutex::new(()),
        }
    }

    /// Build the current plan for operator review. No side effects.
    pub async fn preview(&self) -> Result<InvalidationPlan, FlushError> {
        let _workflow = self.workflow.lock().await;
        let checkpoint = self.require_checkpoint().await?;
        Ok(self.planner.build(checkpoint).await?)
    }

    /// Build the plan (or accept an operator-edited list) and submit it as
    /// one batch.
    ///
    /// The checkpoint advances only when the provider confirms acceptance;
    /// any provider error leaves it untouched so the identical submission
    /// can be retried.
    pub async fn flush(&self, edited: Option<&str>) -> Result<FlushReceipt, FlushError> {
        let _workflow = self.workflow.lock().await;
        let distribution_id = self.require_setting(DISTRIBUTION_KEY).await?;
        let checkpoint = self.require_checkpoint().await?;

        let paths = match edited {
            Some(text) => parse_paths(text),
            None => self.planner.build(checkpoint).await?.paths,
        };

        Ok(self
            .submitter
            .submit(&distribution_id, paths, checkpoint)
            .await?)
    }

    /// Resolve and persist the distribution details; initialize the
    /// checkpoint on first configuration.
    pub async fn configure(&self, distribution_id: &str) -> Result<ConfigureOutcome, FlushError> {
        let _workflow = self.workflow.lock().await;
        let domain = self.provider.distribution_domain(distribution_id).await?;

        self.settings.set(DISTRIBUTION_KEY, distribution_id).await?;
        self.settings.set(DOMAIN_KEY, &domain).await?;

        let checkpoint_initialized = match Checkpoint::load(self.settings.as_ref()).await? {
            Some(_) => false,
            None => {
                Checkpoint::store(self.settings.as_ref(), OffsetDateTime::now_utc()).await?;
                true
            }
        };

        info!(
            distribution = distribution_id,
            domain = %domain,
            checkpoint_initialized,
            "provider configured"
        );

        Ok(ConfigureOutcome {
            distribution_id: distribution_id.to_string(),
            domain,
            checkpoint_initialized,
        })
    }

    async fn require_checkpoint(&self) -> Result<Checkpoint, FlushError> {
        Checkpoint::load(self.settings.as_ref())
            .await?
            .ok_or(FlushError::ConfigurationMissing { key: "checkpoint" })
    }

    async fn require_setting(&self, key: &'static str) -> Result<String, FlushError> {
        self.settings
            .get(key)
            .await?
            .filter(|value| !value.trim().is_empty())
            .ok_or(FlushError::ConfigurationMissing { key })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::invalidation::testing::{MemoryContent, MemorySettings, ScriptedProvider, item};

    const T: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    async fn configured_settings() -> Arc<MemorySettings> {
        let settings = Arc::new(MemorySettings::default());
        settings.set(DISTRIBUTION_KEY, "E2EXAMPLE").await.unwrap();
        Checkpoint::store(settings.as_ref(), T).await.unwrap();
        settings
    }

    fn service(
        content: MemoryContent,
        settings: Arc<MemorySettings>,
        provider: Arc<ScriptedProvider>,
    ) -> FlushService {
        FlushService::new(
            Arc::new(content),
            settings,
            provider,
            ExpansionRegistry::new(),
            "spurgo",
        )
    }

    #[tokio::test]
    async fn preview_requires_a_checkpoint() {
        let settings = Arc::new(MemorySettings::default());
        let svc = service(
            MemoryContent::default(),
            settings,
            Arc::new(ScriptedProvider::accepting()),
        );

        let err = svc.preview().await.unwrap_err();
        assert!(matches!(
            err,
            FlushError::ConfigurationMissing { key: "checkpoint" }
        ));
    }

    #[tokio::test]
    async fn flush_requires_a_distribution() {
        let settings = Arc::new(MemorySettings::default());
        Checkpoint::store(settings.as_ref(), T).await.unwrap();
        let svc = service(
            MemoryContent::default(),
            settings,
            Arc::new(ScriptedProvider::accepting()),
        );

        let err = svc.flush(None).await.unwrap_err();
        assert!(matches!(
            err,
            FlushError::ConfigurationMissing { key: "distribution" }
        ));
    }

    #[tokio::test]
    async fn flush_submits_the_built_plan() {
        let settings = configured_settings().await;
        let provider = Arc::new(ScriptedProvider::accepting());
        let content = MemoryContent::new(vec![item(
            5,
            None,
            "post",
            Some(T + time::Duration::seconds(10)),
            "/posts/foo/",
        )]);

        let svc = service(content, settings, provider.clone());
        let receipt = svc.flush(None).await.unwrap();

        assert_eq!(receipt.path_count, 2);
        let batches = provider.batches();
        assert_eq!(batches[0].paths, vec!["/posts/foo/", "/posts/foo"]);
        assert_eq!(batches[0].distribution_id, "E2EXAMPLE");
    }

    #[tokio::test]
    async fn operator_edited_text_overrides_the_plan() {
        let settings = configured_settings().await;
        let provider = Arc::new(ScriptedProvider::accepting());

        let svc = service(MemoryContent::default(), settings, provider.clone());
        svc.flush(Some("/only-this\r\n/and-this\n")).await.unwrap();

        assert_eq!(provider.batches()[0].paths, vec!["/only-this", "/and-this"]);
    }

    #[tokio::test]
    async fn configure_persists_distribution_domain_and_checkpoint() {
        let settings = Arc::new(MemorySettings::default());
        let svc = service(
            MemoryContent::default(),
            settings.clone(),
            Arc::new(ScriptedProvider::accepting()),
        );

        let outcome = svc.configure("E2EXAMPLE").await.unwrap();

        assert!(outcome.checkpoint_initialized);
        assert_eq!(outcome.domain, "d123example.cloudfront.net");
        assert_eq!(
            settings.get(DISTRIBUTION_KEY).await.unwrap().as_deref(),
            Some("E2EXAMPLE")
        );
        assert_eq!(
            settings.get(DOMAIN_KEY).await.unwrap().as_deref(),
            Some("d123example.cloudfront.net")
        );
        assert!(Checkpoint::load(settings.as_ref()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn configure_keeps_an_existing_checkpoint() {
        let settings = configured_settings().await;
        let svc = service(
            MemoryContent::default(),
            settings.clone(),
            Arc::new(ScriptedProvider::accepting()),
        );

        let outcome = svc.configure("E2EXAMPLE").await.unwrap();

        assert!(!outcome.checkpoint_initialized);
        let checkpoint = Checkpoint::load(settings.as_ref()).await.unwrap().unwrap();
        assert_eq!(checkpoint.as_datetime(), T);
    }

    #[tokio::test]
    async fn configure_surfaces_provider_rejection_verbatim() {
        let settings = Arc::new(MemorySettings::default());
        let svc = service(
            MemoryContent::default(),
            settings.clone(),
            Arc::new(ScriptedProvider::rejecting("NoSuchDistribution: E2TYPO")),
        );

        let err = svc.configure("E2TYPO").await.unwrap_err();
        assert_eq!(err.to_string(), "NoSuchDistribution: E2TYPO");
        assert!(settings.get(DISTRIBUTION_KEY).await.unwrap().is_none());
    }
}
