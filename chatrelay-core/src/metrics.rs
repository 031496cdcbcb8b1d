// ABOUTME: Prometheus metrics for the relay pipeline via the metrics facade.
// ABOUTME: Thin record_* helpers keep metric names and labels in one place.

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter serving /metrics on `port`
pub fn init_metrics(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

/// Inbound update, labelled "message", "command" or "empty"
pub fn record_update_received(kind: &'static str) {
    counter!("chatrelay_updates_received_total", "kind" => kind).increment(1);
}

/// Dispatcher decision: "enqueued", "discarded", "refused", "dropped"
pub fn record_dispatch(outcome: &'static str) {
    counter!("chatrelay_dispatch_total", "outcome" => outcome).increment(1);
}

pub fn record_command(name: &str) {
    counter!("chatrelay_commands_total", "command" => name.to_string()).increment(1);
}

/// One completion call: "ok", "empty" or "error"
pub fn record_completion_attempt(outcome: &'static str) {
    counter!("chatrelay_completion_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_turn_duration(elapsed: Duration) {
    histogram!("chatrelay_turn_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_message_sent() {
    counter!("chatrelay_messages_sent_total").increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!("chatrelay_errors_total", "kind" => kind).increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!("chatrelay_queue_depth").set(depth as f64);
}
