//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::connection_manager::CloseReason;
use crate::websocket::MessageKind;

use super::{
    HANDLER_PANICS_TOTAL, MESSAGES_DROPPED_TOTAL, MESSAGES_SENT_TOTAL, WS_CONNECTIONS_CLOSED,
    WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION, WS_MESSAGES_RECEIVED, WS_UPGRADE_FAILURES,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    pub fn record_closed(reason: CloseReason, duration_secs: f64) {
        WS_CONNECTIONS_CLOSED
            .with_label_values(&[reason.as_str()])
            .inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn record_upgrade_failed() {
        WS_UPGRADE_FAILURES.inc();
    }

    pub fn record_inbound(kind: MessageKind) {
        let label = match kind {
            MessageKind::Text => "text",
            MessageKind::Binary => "binary",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Close => "close",
        };
        WS_MESSAGES_RECEIVED.with_label_values(&[label]).inc();
    }

    pub fn record_handler_panic() {
        HANDLER_PANICS_TOTAL.inc();
    }
}

/// Helper struct for recording delivery metrics
pub struct MessageMetrics;

impl MessageMetrics {
    /// Record a delivery request; `target` is "connection", "user" or "broadcast"
    pub fn record_sent(target: &str) {
        MESSAGES_SENT_TOTAL.with_label_values(&[target]).inc();
    }

    pub fn record_dropped() {
        MESSAGES_DROPPED_TOTAL.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_metrics() {
        MessageMetrics::record_sent("broadcast");
        ConnectionMetrics::record_upgrade_failed();

        let output = encode_metrics().unwrap();
        assert!(output.contains("ara_messages_sent_total"));
        assert!(output.contains("ara_ws_upgrade_failures_total"));
    }

    #[test]
    fn test_lifecycle_leaves_active_gauge_to_scrape() {
        // The gauge is set from the registry when /metrics is scraped
        crate::metrics::CONNECTIONS_ACTIVE.set(5);
        ConnectionMetrics::record_opened();
        ConnectionMetrics::record_closed(CloseReason::PeerClosed, 1.0);
        assert_eq!(crate::metrics::CONNECTIONS_ACTIVE.get(), 5);
    }
}
