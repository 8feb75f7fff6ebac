//! Metrics collection and export for chatbridge.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "chatbridge_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "chatbridge_connections_active";
    pub const COMMANDS_TOTAL: &str = "chatbridge_commands_total";
    pub const COMMAND_SECONDS: &str = "chatbridge_command_seconds";
    pub const NOTIFICATIONS_TOTAL: &str = "chatbridge_notifications_total";
    pub const FRAME_BYTES: &str = "chatbridge_frame_bytes";
    pub const CHANNELS_REGISTERED: &str = "chatbridge_channels_registered";
    pub const ERRORS_TOTAL: &str = "chatbridge_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of host connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of host connections"
    );
    metrics::describe_counter!(names::COMMANDS_TOTAL, "Commands dispatched, by name and outcome");
    metrics::describe_histogram!(names::COMMAND_SECONDS, "Command latency in seconds");
    metrics::describe_counter!(
        names::NOTIFICATIONS_TOTAL,
        "Notifications forwarded to hosts, by event"
    );
    metrics::describe_counter!(names::FRAME_BYTES, "Encoded frame bytes, by direction");
    metrics::describe_gauge!(
        names::CHANNELS_REGISTERED,
        "Channels currently in the registry"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors, by type");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new host connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a host disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a dispatched command.
pub fn record_command(command: &'static str, ok: bool, seconds: f64) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(names::COMMANDS_TOTAL, "command" => command, "outcome" => outcome).increment(1);
    histogram!(names::COMMAND_SECONDS, "command" => command).record(seconds);
}

/// Record a forwarded notification.
pub fn record_notification(event: &'static str) {
    counter!(names::NOTIFICATIONS_TOTAL, "event" => event).increment(1);
}

/// Record encoded frame bytes.
pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAME_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Update the registered channel count.
pub fn set_registered_channels(count: usize) {
    gauge!(names::CHANNELS_REGISTERED).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_guard() {
        // No recorder installed; recording is a no-op.
        let _guard = ConnectionMetricsGuard::new();
        record_command("listChannels", true, 0.001);
        record_notification("messageAdded");
    }
}
