// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_histogram};

/// Register all Mirrorline metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "mirrorline_messages_total",
        "Inbound messages by pipeline disposition"
    );
    describe_counter!("mirrorline_flushes_total", "Flush attempts by outcome");
    describe_counter!(
        "mirrorline_items_delivered_total",
        "Relay items delivered to review threads"
    );
    describe_counter!(
        "mirrorline_threads_created_total",
        "Remote discussion threads created"
    );
    describe_counter!(
        "mirrorline_recovered_total",
        "Orphan buffers re-armed by the recovery sweeper"
    );
    describe_histogram!(
        "mirrorline_flush_latency_seconds",
        "Time from drain to confirmed delivery"
    );
}

/// Record an inbound message and what the pipeline did with it.
pub fn record_message(disposition: &'static str) {
    metrics::counter!("mirrorline_messages_total", "disposition" => disposition).increment(1);
}

/// Record the outcome of a flush.
pub fn record_flush(outcome: &'static str) {
    metrics::counter!("mirrorline_flushes_total", "outcome" => outcome).increment(1);
}

pub fn record_items_delivered(count: u64) {
    metrics::counter!("mirrorline_items_delivered_total").increment(count);
}

pub fn record_thread_created() {
    metrics::counter!("mirrorline_threads_created_total").increment(1);
}

/// Record recovered buffers; `source` is `cache` or `durable`.
pub fn record_recovered(source: &'static str, count: u64) {
    if count > 0 {
        metrics::counter!("mirrorline_recovered_total", "source" => source).increment(count);
    }
}

pub fn record_flush_latency(seconds: f64) {
    metrics::histogram!("mirrorline_flush_latency_seconds").record(seconds);
}
