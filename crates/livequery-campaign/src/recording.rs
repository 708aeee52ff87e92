// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Nothing is recorded unless the embedding
//! binary installs a recorder.

use livequery_core::CloseReason;
use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all livequery metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "livequery_campaigns_created_total",
        "Total campaigns created"
    );
    describe_counter!(
        "livequery_campaigns_closed_total",
        "Total campaigns closed, by reason"
    );
    describe_counter!(
        "livequery_results_ingested_total",
        "Host results offered for ingestion, by outcome"
    );
    describe_counter!(
        "livequery_results_dropped_total",
        "Results discarded because a subscriber queue was full"
    );
    describe_gauge!(
        "livequery_active_sessions",
        "Currently streaming viewer sessions"
    );
    describe_histogram!(
        "livequery_operation_latency_seconds",
        "Campaign service operation latency in seconds"
    );
}

/// Record a created campaign.
pub fn record_campaign_created() {
    metrics::counter!("livequery_campaigns_created_total").increment(1);
}

/// Record a closed campaign.
pub fn record_campaign_closed(reason: CloseReason) {
    metrics::counter!("livequery_campaigns_closed_total", "reason" => reason.to_string())
        .increment(1);
}

/// Record one ingestion attempt.
pub fn record_ingest(outcome: &'static str) {
    metrics::counter!("livequery_results_ingested_total", "outcome" => outcome).increment(1);
}

/// Record results dropped on full subscriber queues.
pub fn record_dropped(count: u64) {
    if count > 0 {
        metrics::counter!("livequery_results_dropped_total").increment(count);
    }
}

pub fn session_started() {
    metrics::gauge!("livequery_active_sessions").increment(1.0);
}

pub fn session_ended() {
    metrics::gauge!("livequery_active_sessions").decrement(1.0);
}

/// Record latency of one service operation.
pub fn record_latency(method: &'static str, seconds: f64) {
    metrics::histogram!("livequery_operation_latency_seconds", "method" => method)
        .record(seconds);
}
