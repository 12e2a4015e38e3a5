use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // Run lifecycle
    pub static ref CHALLENGE_RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "challenge_runs_total",
        "Total number of challenge runs by lifecycle status",
        &["status"]
    )
    .unwrap();

    pub static ref CHALLENGE_ANSWERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "challenge_answers_total",
        "Total number of graded answers",
        &["challenge_type", "correct"]
    )
    .unwrap();

    pub static ref CHALLENGE_SKIPS_TOTAL: IntCounter = register_int_counter!(
        "challenge_skips_total",
        "Total number of skipped questions"
    )
    .unwrap();

    // Settlement
    pub static ref ATTEMPT_RESULTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_results_total",
        "Attempt results by the path that produced them",
        &["source"]
    )
    .unwrap();

    pub static ref POINTS_AWARDED_TOTAL: IntCounter = register_int_counter!(
        "points_awarded_total",
        "Total points credited to user progress"
    )
    .unwrap();

    // Remote API
    pub static ref REMOTE_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "remote_requests_total",
        "Total number of requests to the challenge API",
        &["endpoint", "status"]
    )
    .unwrap();

    pub static ref REMOTE_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "remote_request_duration_seconds",
        "Challenge API request duration in seconds",
        &["endpoint"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    pub static ref CATALOGUE_FALLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "catalogue_fallbacks_total",
        "Challenge catalogue reads served from the bundled dataset",
        &["query"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a challenge API call with metrics
pub async fn track_remote_call<F, T>(endpoint: &str, future: F) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    REMOTE_REQUESTS_TOTAL
        .with_label_values(&[endpoint, status])
        .inc();

    REMOTE_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint])
        .observe(duration);

    result
}
