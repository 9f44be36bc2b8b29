//! Prometheus metrics for the recovery pipeline

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, CounterVec,
    HistogramVec, IntCounterVec,
};

/// Pipeline metrics
pub struct PipelineMetrics {
    /// Messages received from DLQs
    pub messages_received: IntCounterVec,

    /// Enriched events published to the bus
    pub messages_published: IntCounterVec,

    /// Messages dropped as runaway loops at the ledger gate
    pub messages_dropped: IntCounterVec,

    /// Per-message monitor failures
    pub monitor_failures: IntCounterVec,

    /// Classifications by category and model tag
    pub classifications: CounterVec,

    /// Executor actions by action and outcome
    pub actions: CounterVec,

    /// LLM call latency
    pub llm_latency: HistogramVec,
}

lazy_static! {
    pub static ref PIPELINE_METRICS: PipelineMetrics = PipelineMetrics {
        messages_received: register_int_counter_vec!(
            "dlq_messages_received_total",
            "Messages received from dead-letter queues",
            &["queue"]
        )
        .unwrap(),

        messages_published: register_int_counter_vec!(
            "dlq_messages_published_total",
            "Enriched events accepted by the event bus",
            &["queue"]
        )
        .unwrap(),

        messages_dropped: register_int_counter_vec!(
            "dlq_messages_dropped_total",
            "Messages dropped at the ledger hard cap",
            &["queue"]
        )
        .unwrap(),

        monitor_failures: register_int_counter_vec!(
            "dlq_monitor_failures_total",
            "Per-message monitor failures",
            &["queue", "stage"]
        )
        .unwrap(),

        classifications: register_counter_vec!(
            "dlq_classifications_total",
            "Classification decisions",
            &["category", "model"]
        )
        .unwrap(),

        actions: register_counter_vec!(
            "dlq_actions_total",
            "Executor actions",
            &["action", "outcome"]
        )
        .unwrap(),

        llm_latency: register_histogram_vec!(
            "dlq_llm_latency_seconds",
            "LLM classification call latency in seconds",
            &["model"],
            vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )
        .unwrap(),
    };
}

/// Export all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
