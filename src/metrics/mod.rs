//! Prometheus metrics for the connection manager.
//!
//! - Connection metrics (opened, closed by reason, active, lifetime)
//! - Message metrics (sent by target, dropped, received by kind)
//! - Handler health (panics caught on the reader task)

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, MessageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of registered WebSocket connections, set from the registry on scrape
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of registered WebSocket connections"
    ).unwrap();

    /// Number of unique connected users
    pub static ref USERS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_users_connected", METRIC_PREFIX),
        "Number of unique connected users"
    ).unwrap();

    /// Total connections accepted
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// Total connections torn down, by close reason
    pub static ref WS_CONNECTIONS_CLOSED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed",
        &["reason"]
    ).unwrap();

    /// Failed protocol upgrades
    pub static ref WS_UPGRADE_FAILURES: IntCounter = register_int_counter!(
        format!("{}_ws_upgrade_failures_total", METRIC_PREFIX),
        "Total failed WebSocket upgrades"
    ).unwrap();

    /// Connection lifetime in seconds
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0, 86400.0]
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Delivery requests by target type
    pub static ref MESSAGES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_sent_total", METRIC_PREFIX),
        "Total delivery requests",
        &["target"]
    ).unwrap();

    /// Frames dropped because the target was gone or its queue was full
    pub static ref MESSAGES_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_dropped_total", METRIC_PREFIX),
        "Total outbound frames dropped"
    ).unwrap();

    /// Inbound data frames by kind
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total inbound data frames",
        &["kind"]
    ).unwrap();

    /// Panics caught while running message handlers
    pub static ref HANDLER_PANICS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_handler_panics_total", METRIC_PREFIX),
        "Total message handler panics"
    ).unwrap();
}
