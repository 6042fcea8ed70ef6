//! Connection handle and inbound handler dispatch

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::metrics::{ConnectionMetrics, MessageMetrics};
use crate::websocket::Message;

/// Callback invoked for every inbound data frame on a connection.
///
/// Handlers run synchronously on the connection's reader task, in
/// registration order. Use [`Connection::try_send`] or spawn a task to
/// reply without stalling the reader.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, connection: &Arc<Connection>, message: &Message);
}

impl<F> MessageHandler for F
where
    F: Fn(&Arc<Connection>, &Message) + Send + Sync + 'static,
{
    fn handle(&self, connection: &Arc<Connection>, message: &Message) {
        self(connection, message)
    }
}

pub type SharedHandler = Arc<dyn MessageHandler>;

/// Handle for a single upgraded connection
pub struct Connection {
    id: String,
    user_id: Option<String>,
    app_tag: Option<String>,
    created_at: DateTime<Utc>,
    /// Flips true -> false once, by whichever teardown path wins
    alive: AtomicBool,
    cancel: CancellationToken,
    sender: mpsc::Sender<Message>,
    handlers: RwLock<Vec<SharedHandler>>,
}

impl Connection {
    pub(crate) fn new(
        id: String,
        user_id: Option<String>,
        app_tag: Option<String>,
        handlers: Vec<SharedHandler>,
        sender: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            id,
            user_id,
            app_tag,
            created_at: Utc::now(),
            alive: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            sender,
            handlers: RwLock::new(handlers),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn app_tag(&self) -> Option<&str> {
        self.app_tag.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Queue a frame for the writer task.
    ///
    /// Dropped silently when the connection is no longer alive. Waits while
    /// the outbound queue is full, and gives up if the connection is torn
    /// down during that wait.
    pub async fn send(&self, message: Message) {
        if !self.is_alive() {
            MessageMetrics::record_dropped();
            return;
        }

        tokio::select! {
            result = self.sender.send(message) => {
                if result.is_err() {
                    MessageMetrics::record_dropped();
                }
            }
            _ = self.cancel.cancelled() => {
                MessageMetrics::record_dropped();
            }
        }
    }

    /// Best-effort enqueue that never waits. Returns false when the frame
    /// was dropped because the queue is full or the connection is gone.
    pub fn try_send(&self, message: Message) -> bool {
        if self.is_alive() && self.sender.try_send(message).is_ok() {
            return true;
        }
        MessageMetrics::record_dropped();
        false
    }

    /// Serialize `value` to JSON and queue it as a text frame.
    /// Encoding errors are returned before anything is queued.
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let message = Message::json(value)?;
        self.send(message).await;
        Ok(())
    }

    /// Append handlers after the existing ones
    pub fn add_handlers<I>(&self, handlers: I)
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.handlers.write().extend(handlers);
    }

    /// Replace the whole handler list
    pub fn set_handlers<I>(&self, handlers: I)
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        *self.handlers.write() = handlers.into_iter().collect();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Run every handler against an inbound frame. A panicking handler is
    /// logged and skipped; the rest still run.
    pub(crate) fn dispatch(self: &Arc<Self>, message: &Message) {
        // Snapshot so handlers may register further handlers without deadlocking
        let handlers: Vec<SharedHandler> = self.handlers.read().clone();

        for (index, handler) in handlers.iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(self, message)));
            if let Err(panic) = outcome {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                ConnectionMetrics::record_handler_panic();
                tracing::error!(
                    connection_id = %self.id,
                    handler_index = index,
                    panic = %detail,
                    "Message handler panicked"
                );
            }
        }
    }

    /// Teardown gate. Returns true for exactly one caller, which also fires
    /// the cancellation shared with both I/O tasks.
    pub(crate) fn shutdown(&self) -> bool {
        let won = self
            .alive
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.cancel.cancel();
        }
        won
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            app_tag: self.app_tag.clone(),
            created_at: self.created_at,
            alive: self.is_alive(),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("app_tag", &self.app_tag)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Point-in-time view of a connection, for the admin API
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub user_id: Option<String>,
    pub app_tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub alive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::websocket::MessageKind;

    fn make_connection(capacity: usize) -> (Arc<Connection>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Connection::new(
            "conn_1".into(),
            Some("user1".into()),
            Some("web".into()),
            vec![],
            tx,
        );
        (Arc::new(conn), rx)
    }

    #[tokio::test]
    async fn test_send_enqueues_in_order() {
        let (conn, mut rx) = make_connection(8);
        for i in 0..5 {
            conn.send(Message::text(format!("msg_{i}"))).await;
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.as_text(), Some(format!("msg_{i}").as_str()));
        }
    }

    #[tokio::test]
    async fn test_send_after_shutdown_is_dropped() {
        let (conn, mut rx) = make_connection(8);
        assert!(conn.shutdown());
        conn.send(Message::text("late")).await;
        assert!(rx.try_recv().is_err());
        assert!(!conn.try_send(Message::text("late")));
    }

    #[tokio::test]
    async fn test_blocked_send_released_by_shutdown() {
        let (conn, _rx) = make_connection(1);
        conn.send(Message::text("fills queue")).await;

        let blocked = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send(Message::text("waits")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        conn.shutdown();
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("send should stop waiting once the connection is torn down")
            .unwrap();
    }

    #[test]
    fn test_try_send_full_queue() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.try_send(Message::text("first")));
        assert!(!conn.try_send(Message::text("second")));
    }

    #[test]
    fn test_shutdown_only_once() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.is_alive());
        assert!(conn.shutdown());
        assert!(!conn.shutdown());
        assert!(!conn.is_alive());
        assert!(conn.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn test_send_json_serialization_error() {
        let (conn, mut rx) = make_connection(4);
        // Non-string map keys cannot be encoded as JSON
        let mut bad = HashMap::new();
        bad.insert(vec![1u8], 1);

        let result = conn.send_json(&bad).await;
        assert!(matches!(result, Err(crate::error::AppError::Serialization(_))));
        assert!(rx.try_recv().is_err());
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn test_send_json_queues_text_frame() {
        let (conn, mut rx) = make_connection(4);
        conn.send_json(&serde_json::json!({"key": "value"})).await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        let parsed: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(parsed["key"], "value");
    }

    #[test]
    fn test_dispatch_runs_handlers_in_order() {
        let (conn, _rx) = make_connection(1);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let first = order.clone();
        let second = order.clone();
        conn.add_handlers([
            Arc::new(move |_: &Arc<Connection>, _: &Message| first.lock().push(1)) as SharedHandler,
            Arc::new(move |_: &Arc<Connection>, _: &Message| second.lock().push(2)) as SharedHandler,
        ]);

        conn.dispatch(&Message::text("hi"));
        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[test]
    fn test_dispatch_survives_panicking_handler() {
        let (conn, _rx) = make_connection(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        conn.set_handlers([
            Arc::new(|_: &Arc<Connection>, _: &Message| panic!("handler bug")) as SharedHandler,
            Arc::new(move |_: &Arc<Connection>, _: &Message| {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as SharedHandler,
        ]);

        conn.dispatch(&Message::text("one"));
        conn.dispatch(&Message::text("two"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_set_handlers_replaces() {
        let (conn, _rx) = make_connection(1);
        conn.add_handlers([Arc::new(|_: &Arc<Connection>, _: &Message| {}) as SharedHandler]);
        conn.add_handlers([Arc::new(|_: &Arc<Connection>, _: &Message| {}) as SharedHandler]);
        assert_eq!(conn.handler_count(), 2);

        conn.set_handlers(Vec::new());
        assert_eq!(conn.handler_count(), 0);
    }

    #[test]
    fn test_info_snapshot() {
        let (conn, _rx) = make_connection(1);
        let info = conn.info();
        assert_eq!(info.id, "conn_1");
        assert_eq!(info.user_id.as_deref(), Some("user1"));
        assert_eq!(info.app_tag.as_deref(), Some("web"));
        assert!(info.alive);
    }
}
