//! Prometheus metrics for staffing observability.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record an assignment action (assign, replace, unassign, claim, drop).
pub fn assignment_action(action: &str) {
    counter!("staffing_assignment_actions_total", "action" => action.to_string()).increment(1);
}

/// Record a clock event (clock_in, clock_out, end_shift, break_start).
pub fn clock_event(event: &str) {
    counter!("staffing_clock_events_total", "event" => event.to_string()).increment(1);
}

/// Record a timesheet state transition.
pub fn timesheet_status_changed(status: &str) {
    counter!("staffing_timesheets_total", "status" => status.to_string()).increment(1);
}

/// Record conflicts surfaced by the conflict detector.
pub fn conflicts_detected(count: usize) {
    counter!("staffing_conflicts_detected_total").increment(count as u64);
}

/// Record a failed best-effort delivery (notification, broadcast, document).
pub fn delivery_failed(channel: &str) {
    counter!("staffing_delivery_failures_total", "channel" => channel.to_string()).increment(1);
}

/// Record the rounded length of a closed time entry.
pub fn worked_minutes(minutes: i64) {
    histogram!("staffing_entry_worked_minutes").record(minutes as f64);
}
