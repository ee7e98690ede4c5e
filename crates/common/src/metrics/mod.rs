//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions covering the
//! HTTP surface, provider searches, library writes, and LLM calls.

use metrics::{
    counter, describe_counter, describe_histogram, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all PlasmaHub metrics
pub const METRICS_PREFIX: &str = "plasmahub";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
];

/// Buckets for LLM completion latency (typically much slower)
pub const LLM_BUCKETS: &[f64] = &[
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 60s
    120.0, // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Provider search metrics
    describe_counter!(
        format!("{}_provider_searches_total", METRICS_PREFIX),
        Unit::Count,
        "Total upstream provider searches"
    );

    describe_histogram!(
        format!("{}_provider_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Provider search latency in seconds"
    );

    // Library metrics
    describe_counter!(
        format!("{}_papers_saved_total", METRICS_PREFIX),
        Unit::Count,
        "Total papers saved to the library"
    );

    describe_counter!(
        format!("{}_papers_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Total papers skipped as duplicates"
    );

    // LLM metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM completion requests"
    );

    describe_counter!(
        format!("{}_llm_tokens_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM tokens consumed"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM completion latency in seconds"
    );

    describe_counter!(
        format!("{}_llm_parse_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "LLM responses that failed JSON parsing"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a provider search
pub fn record_provider_search(provider: &str, duration_secs: f64, result_count: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_provider_searches_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_provider_search_duration_seconds", METRICS_PREFIX),
            "provider" => provider.to_string()
        )
        .record(duration_secs);

        tracing::debug!(provider, result_count, "Provider search recorded");
    }
}

/// Helper to record library save outcomes
pub fn record_papers_saved(saved: usize, skipped: usize) {
    counter!(format!("{}_papers_saved_total", METRICS_PREFIX)).increment(saved as u64);
    counter!(format!("{}_papers_skipped_total", METRICS_PREFIX)).increment(skipped as u64);
}

/// Helper to record an LLM completion
pub fn record_llm(operation: &str, model: &str, duration_secs: f64, tokens: u64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        counter!(
            format!("{}_llm_tokens_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(tokens);

        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "operation" => operation.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record an LLM parse fallback
pub fn record_llm_parse_fallback(operation: &str) {
    counter!(
        format!("{}_llm_parse_fallbacks_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, LLM_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/api/scholar");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(200);
        // Just verify it runs without panic
    }

    #[test]
    fn test_record_helpers_do_not_panic() {
        record_provider_search("pubmed", 0.2, 10, true);
        record_papers_saved(3, 1);
        record_llm("analyze_papers", "sonar-pro", 4.2, 1200, true);
        record_llm_parse_fallback("analyze_papers");
    }
}
