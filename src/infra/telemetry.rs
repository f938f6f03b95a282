use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "spurgo_changed_items_total",
            Unit::Count,
            "Total number of changed items picked up by change detection."
        );
        describe_counter!(
            "spurgo_queued_urls_total",
            Unit::Count,
            "Total number of unique purge paths produced by planning runs."
        );
        describe_counter!(
            "spurgo_rule_failures_total",
            Unit::Count,
            "Total number of expansion rule failures (isolated, never fatal)."
        );
        describe_counter!(
            "spurgo_batches_submitted_total",
            Unit::Count,
            "Total number of invalidation batches accepted by the provider."
        );
        describe_counter!(
            "spurgo_batches_rejected_total",
            Unit::Count,
            "Total number of invalidation batches the provider did not accept."
        );
        describe_histogram!(
            "spurgo_plan_build_ms",
            Unit::Milliseconds,
            "Invalidation plan build latency in milliseconds."
        );
    });
}
