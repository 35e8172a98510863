// Prometheus metrics for the modelquota service
//
// Exposed on the /metrics HTTP endpoint:
// - Requests and tokens tracked per model (counters)
// - Track and select outcomes (counters)
// - Models returned by selection (histogram)
// - Usage store failures per operation (counter)
// - Remaining-quota queries per model (counter)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounterVec, Registry, TextEncoder};
use std::sync::Arc;

use crate::error::QuotaError;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Consumption metrics
    pub static ref TRACKED_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("modelquota_tracked_requests_total", "Requests recorded against each model"),
        &["model"]
    ).expect("Failed to create tracked requests metric");

    pub static ref TRACKED_TOKENS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("modelquota_tracked_tokens_total", "Tokens recorded against each model"),
        &["model"]
    ).expect("Failed to create tracked tokens metric");

    // Operation outcomes
    pub static ref TRACK_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("modelquota_track_calls_total", "Track operations by outcome"),
        &["outcome"]
    ).expect("Failed to create track calls metric");

    pub static ref SELECT_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("modelquota_select_calls_total", "Selection queries by outcome"),
        &["outcome"]
    ).expect("Failed to create select calls metric");

    pub static ref SELECTED_MODELS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("modelquota_selected_models", "Models returned by one selection query")
            .buckets(vec![0.0, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0]),
    ).expect("Failed to create selected models metric");

    pub static ref REMAINING_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("modelquota_remaining_queries_total", "Remaining-quota queries per model"),
        &["model"]
    ).expect("Failed to create remaining queries metric");

    // Store metrics
    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("modelquota_store_errors_total", "Usage store failures per operation"),
        &["operation", "kind"]
    ).expect("Failed to create store errors metric");
}

/// Register every metric; safe to call more than once
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(TRACKED_REQUESTS_TOTAL.clone()),
        Box::new(TRACKED_TOKENS_TOTAL.clone()),
        Box::new(TRACK_CALLS_TOTAL.clone()),
        Box::new(SELECT_CALLS_TOTAL.clone()),
        Box::new(SELECTED_MODELS.clone()),
        Box::new(REMAINING_QUERIES_TOTAL.clone()),
        Box::new(STORE_ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Outcome label for an operation result
pub fn outcome<T>(result: &Result<T, QuotaError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) if e.is_client_error() => "rejected",
        Err(QuotaError::Timeout(_)) => "timeout",
        Err(_) => "failed",
    }
}

/// Count a store-side failure of `operation`
pub fn record_store_error(operation: &str, error: &QuotaError) {
    let kind = match error {
        QuotaError::Timeout(_) => "timeout",
        QuotaError::StoreRejected { .. } => "rejected",
        QuotaError::PersistenceUnavailable(_) => "unavailable",
        _ => return,
    };
    STORE_ERRORS_TOTAL.with_label_values(&[operation, kind]).inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
