use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all server metrics
const PREFIX: &str = "noise";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Waveform Metrics
    pub static ref WAVEFORM_CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_waveform_cache_lookups_total"), "Waveform cache lookups"),
        &["result"]
    ).expect("Failed to create waveform_cache_lookups_total metric");

    pub static ref WAVEFORM_CACHE_ENTRIES: Gauge = Gauge::new(
        format!("{PREFIX}_waveform_cache_entries"),
        "Number of persisted waveform curves"
    ).expect("Failed to create waveform_cache_entries metric");

    pub static ref WAVEFORM_CACHE_PERSIST_ERRORS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_waveform_cache_persist_errors_total"),
        "Failed writes of the waveform cache document"
    ).expect("Failed to create waveform_cache_persist_errors_total metric");

    pub static ref WAVEFORM_COMPUTE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_waveform_compute_duration_seconds"),
            "Time spent producing a waveform on a cache miss"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0])
    ).expect("Failed to create waveform_compute_duration_seconds metric");

    pub static ref WAVEFORM_FALLBACKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_waveform_fallbacks_total"), "Synthetic waveforms served instead of analyzed ones"),
        &["reason"]
    ).expect("Failed to create waveform_fallbacks_total metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(WAVEFORM_CACHE_LOOKUPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WAVEFORM_CACHE_ENTRIES.clone()));
    let _ = REGISTRY.register(Box::new(WAVEFORM_CACHE_PERSIST_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WAVEFORM_COMPUTE_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(WAVEFORM_FALLBACKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

/// Maps a request path to a bounded label for HTTP metrics
pub fn categorize_endpoint(path: &str) -> &'static str {
    if path == "/" {
        "home"
    } else if path == "/api/v1/listening-session" {
        "listening_session"
    } else if path.starts_with("/api/v1/") {
        "documents"
    } else if path.starts_with("/data/") {
        "data"
    } else if path.starts_with("/assets/") {
        "assets"
    } else {
        "other"
    }
}

/// Record a waveform cache lookup
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    WAVEFORM_CACHE_LOOKUPS_TOTAL
        .with_label_values(&[result])
        .inc();
}

pub fn set_cache_entries(count: usize) {
    WAVEFORM_CACHE_ENTRIES.set(count as f64);
}

pub fn record_cache_persist_error() {
    WAVEFORM_CACHE_PERSIST_ERRORS_TOTAL.inc();
}

/// Record the duration of a waveform computation
pub fn record_waveform_compute(duration: Duration) {
    WAVEFORM_COMPUTE_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record that a synthetic waveform was served, and why
pub fn record_waveform_fallback(reason: &str) {
    WAVEFORM_FALLBACKS_TOTAL
        .with_label_values(&[reason])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // VmRSS is reported in kB
                    if let Some(kb) = line
                        .split_whitespace()
                        .nth(1)
                        .and_then(|kb| kb.parse::<f64>().ok())
                    {
                        PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                        return;
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
