//! Softphone metrics
//!
//! Recorded through the `metrics` facade. No recorder is installed by the
//! crate; embedders pick their own exporter.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Register metric descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(
        "softphone_calls_placed_total",
        "Total number of outbound calls placed"
    );
    describe_counter!(
        "softphone_calls_received_total",
        "Total number of inbound offers received"
    );
    describe_counter!(
        "softphone_calls_rejected_busy_total",
        "Inbound offers rejected because every line was busy"
    );
    describe_counter!(
        "softphone_calls_failed_total",
        "Total number of calls that ended in failure"
    );
    describe_counter!(
        "softphone_transfers_total",
        "Transfers finalized, by kind and disposition"
    );
    describe_counter!(
        "softphone_keepalive_misses_total",
        "Keep-alive probes that went unanswered"
    );
    describe_counter!(
        "softphone_transport_lost_total",
        "Times the signaling transport was declared lost"
    );
    describe_counter!(
        "softphone_reconnect_attempts_total",
        "Reconnection attempts, by outcome"
    );
    describe_gauge!(
        "softphone_active_sessions",
        "Number of live call sessions"
    );
    describe_gauge!(
        "softphone_monitored_extensions",
        "Number of extensions monitored through BLF"
    );
}

pub fn record_call_placed() {
    counter!("softphone_calls_placed_total").increment(1);
}

pub fn record_call_received() {
    counter!("softphone_calls_received_total").increment(1);
}

pub fn record_call_rejected_busy() {
    counter!("softphone_calls_rejected_busy_total").increment(1);
}

pub fn record_call_failed(reason: &str) {
    counter!("softphone_calls_failed_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_transfer(kind: &str, disposition: &str) {
    counter!(
        "softphone_transfers_total",
        "kind" => kind.to_string(),
        "disposition" => disposition.to_string()
    )
    .increment(1);
}

pub fn record_keepalive_miss() {
    counter!("softphone_keepalive_misses_total").increment(1);
}

pub fn record_transport_lost() {
    counter!("softphone_transport_lost_total").increment(1);
}

pub fn record_reconnect_attempt(success: bool) {
    counter!("softphone_reconnect_attempts_total", "success" => success.to_string()).increment(1);
}

pub fn update_active_sessions(count: usize) {
    gauge!("softphone_active_sessions").set(count as f64);
}

pub fn update_monitored_extensions(count: usize) {
    gauge!("softphone_monitored_extensions").set(count as f64);
}
