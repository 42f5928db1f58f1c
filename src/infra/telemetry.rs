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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
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

/// Registers descriptions for every metric the crate emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "vitrine_cache_local_hit_total",
            Unit::Count,
            "Total number of in-process cache hits."
        );
        describe_counter!(
            "vitrine_cache_local_miss_total",
            Unit::Count,
            "Total number of in-process cache misses, expired entries included."
        );
        describe_counter!(
            "vitrine_cache_local_evict_total",
            Unit::Count,
            "Total number of in-process cache evictions due to capacity."
        );
        describe_counter!(
            "vitrine_cache_local_stale_total",
            Unit::Count,
            "Total number of in-process entries dropped after another process invalidated them."
        );
        describe_counter!(
            "vitrine_cache_remote_hit_total",
            Unit::Count,
            "Total number of remote cache hits."
        );
        describe_counter!(
            "vitrine_cache_remote_miss_total",
            Unit::Count,
            "Total number of remote cache misses."
        );
        describe_counter!(
            "vitrine_cache_remote_error_total",
            Unit::Count,
            "Total number of failed or timed-out remote cache calls, by operation."
        );
        describe_counter!(
            "vitrine_cache_compute_total",
            Unit::Count,
            "Total number of values computed after missing both tiers."
        );
        describe_histogram!(
            "vitrine_cache_invalidation_ms",
            Unit::Milliseconds,
            "Invalidation latency per mutation event in milliseconds."
        );
        describe_counter!(
            "vitrine_cache_invalidation_failed_total",
            Unit::Count,
            "Total number of invalidations that left a tier inconsistent."
        );
        describe_histogram!(
            "vitrine_price_lookup_ms",
            Unit::Milliseconds,
            "Price lookup latency in milliseconds."
        );
        describe_counter!(
            "vitrine_price_fallback_total",
            Unit::Count,
            "Total number of lookups answered with the undiscounted price after an error."
        );
    });
}
