//! Per-connection duplex I/O.
//!
//! Each connection runs two tasks. The writer drains the outbound queue and
//! emits pings on the heartbeat interval; the reader waits for inbound
//! frames under a read deadline that every pong pushes forward, and feeds
//! data frames to the connection's handlers. Both tasks watch the
//! connection's cancellation token, and whichever side stops first runs
//! [`teardown`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::config::WebSocketConfig;
use crate::metrics::{ConnectionMetrics, MessageMetrics};
use crate::websocket::transport::{FrameSink, FrameStream};
use crate::websocket::{Message, MessageKind, Transport};

use super::connection::Connection;
use super::registry::Registry;
use super::types::CloseReason;

/// Start the writer and reader tasks for a registered connection
pub(crate) fn spawn(
    connection: Arc<Connection>,
    registry: Arc<Registry>,
    config: Arc<WebSocketConfig>,
    transport: Transport,
    outbound: mpsc::Receiver<Message>,
) {
    let Transport { sink, stream } = transport;

    let writer = {
        let connection = connection.clone();
        let registry = registry.clone();
        let config = config.clone();
        let span = tracing::debug_span!("ws.writer", connection_id = %connection.id());
        async move {
            let outcome = AssertUnwindSafe(write_loop(&connection, sink, outbound, &config))
                .catch_unwind()
                .await;
            finish(&registry, &connection, "writer", outcome);
        }
        .instrument(span)
    };

    let reader = {
        let span = tracing::debug_span!("ws.reader", connection_id = %connection.id());
        async move {
            let outcome = AssertUnwindSafe(read_loop(&connection, stream, &config))
                .catch_unwind()
                .await;
            finish(&registry, &connection, "reader", outcome);
        }
        .instrument(span)
    };

    tokio::spawn(writer);
    tokio::spawn(reader);
}

/// Every exit of an I/O task ends here, panics included, so a dead task
/// never leaves its connection registered.
fn finish(
    registry: &Registry,
    connection: &Connection,
    task: &'static str,
    outcome: std::thread::Result<Option<CloseReason>>,
) {
    let reason = match outcome {
        Ok(Some(reason)) => reason,
        Ok(None) => return,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(
                connection_id = %connection.id(),
                task,
                panic = %detail,
                "Connection I/O task panicked"
            );
            CloseReason::TaskFailed
        }
    };
    teardown(registry, connection, reason);
}

/// Tear a connection down. Only the first caller per connection gets past
/// the liveness gate; it fires the shared cancellation and unregisters.
pub(crate) fn teardown(registry: &Registry, connection: &Connection, reason: CloseReason) -> bool {
    if !connection.shutdown() {
        return false;
    }

    registry.remove(connection.id());

    let lifetime = (Utc::now() - connection.created_at())
        .to_std()
        .unwrap_or_default();
    ConnectionMetrics::record_closed(reason, lifetime.as_secs_f64());

    tracing::info!(
        connection_id = %connection.id(),
        user_id = connection.user_id().unwrap_or(""),
        reason = %reason,
        duration_secs = lifetime.as_secs_f64(),
        "Connection unregistered"
    );
    true
}

/// Returns the close reason when the writer itself hit a fatal condition,
/// `None` when it stopped because the connection was cancelled.
async fn write_loop(
    connection: &Connection,
    mut sink: FrameSink,
    mut outbound: mpsc::Receiver<Message>,
    config: &WebSocketConfig,
) -> Option<CloseReason> {
    let write_timeout = config.write_timeout();
    let period = config.heartbeat_interval();
    let cancel = connection.cancellation().clone();

    let mut heartbeat = time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                close_sink(&mut sink, write_timeout, connection.id()).await;
                return None;
            }
            next = outbound.recv() => match next {
                Some(message) => message,
                None => return None,
            },
            _ = heartbeat.tick() => Message::ping(),
        };

        if frame.kind == MessageKind::Text && frame.as_text().is_none() {
            MessageMetrics::record_dropped();
            tracing::warn!(
                connection_id = %connection.id(),
                len = frame.len(),
                "Dropping text frame with invalid UTF-8 payload"
            );
            continue;
        }

        let kind = frame.kind;
        match time::timeout(write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    error = %e,
                    kind = ?kind,
                    "WebSocket send error"
                );
                return Some(CloseReason::WriteError);
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    timeout_ms = write_timeout.as_millis() as u64,
                    kind = ?kind,
                    "WebSocket send timed out"
                );
                return Some(CloseReason::WriteTimeout);
            }
        }
    }
}

/// Best-effort close frame, then close the sink. Nothing is drained.
async fn close_sink(sink: &mut FrameSink, limit: Duration, connection_id: &str) {
    let closing = async {
        sink.send(Message::close()).await?;
        sink.close().await
    };

    match time::timeout(limit, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(connection_id = %connection_id, error = %e, "Close frame not delivered");
        }
        Err(_) => {
            tracing::debug!(connection_id = %connection_id, "Close frame timed out");
        }
    }
}

async fn read_loop(
    connection: &Arc<Connection>,
    mut stream: FrameStream,
    config: &WebSocketConfig,
) -> Option<CloseReason> {
    let read_timeout = config.read_timeout();
    let max_message_size = config.max_message_size;
    let cancel = connection.cancellation().clone();
    let mut deadline = Instant::now() + read_timeout;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            next = time::timeout_at(deadline, stream.next()) => next,
        };

        let message = match next {
            Err(_) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    timeout_ms = read_timeout.as_millis() as u64,
                    "No pong within read deadline"
                );
                return Some(CloseReason::ReadTimeout);
            }
            Ok(None) => return Some(CloseReason::PeerClosed),
            Ok(Some(Err(e))) => {
                tracing::warn!(connection_id = %connection.id(), error = %e, "WebSocket receive error");
                return Some(CloseReason::ReadError);
            }
            Ok(Some(Ok(message))) => message,
        };

        match message.kind {
            MessageKind::Pong => {
                deadline = Instant::now() + read_timeout;
            }
            // Answered by the transport
            MessageKind::Ping => {}
            MessageKind::Close => {
                tracing::debug!(connection_id = %connection.id(), "Received close frame");
                return Some(CloseReason::PeerClosed);
            }
            MessageKind::Text | MessageKind::Binary => {
                if message.len() > max_message_size {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        len = message.len(),
                        max = max_message_size,
                        "Inbound frame exceeds max message size"
                    );
                    return Some(CloseReason::FrameTooLarge);
                }

                ConnectionMetrics::record_inbound(message.kind);
                if connection.is_alive() {
                    connection.dispatch(&message);
                }
            }
        }
    }
}
