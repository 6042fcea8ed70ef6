use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::WebSocketConfig;
use crate::error::Result;
use crate::metrics::{ConnectionMetrics, MessageMetrics};
use crate::websocket::{Message, Transport};

use super::connection::Connection;
use super::driver;
use super::options::ConnectOptions;
use super::registry::Registry;
use super::stats::ConnectionStats;
use super::types::CloseReason;

type OriginCheck = dyn Fn(Option<&str>) -> bool + Send + Sync;

/// Owns the connection registry and the delivery API.
///
/// Construct one per service and share it (`Arc<ConnectionManager>`); every
/// method is safe to call from any number of tasks.
pub struct ConnectionManager {
    registry: Arc<Registry>,
    config: Arc<WebSocketConfig>,
    origin_check: Option<Arc<OriginCheck>>,
}

impl ConnectionManager {
    /// Build a manager. Fails if `config` does not pass
    /// [`WebSocketConfig::validate`].
    pub fn new(config: WebSocketConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    fn with_validated(config: WebSocketConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            config: Arc::new(config),
            origin_check: None,
        }
    }

    /// Replace the configured origin allow-list with a custom predicate
    pub fn with_origin_check<F>(mut self, check: F) -> Self
    where
        F: Fn(Option<&str>) -> bool + Send + Sync + 'static,
    {
        self.origin_check = Some(Arc::new(check));
        self
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn check_origin(&self, origin: Option<&str>) -> bool {
        match &self.origin_check {
            Some(check) => check(origin),
            None => self.config.origin_allowed(origin),
        }
    }

    /// Run the upgrade and register the resulting connection.
    ///
    /// `upgrade` produces the transport. If it fails its error is returned
    /// and nothing is registered. Otherwise the connection is inserted and
    /// its I/O tasks are running by the time this returns.
    pub async fn upgrade<F, Fut>(&self, upgrade: F, options: ConnectOptions) -> Result<Arc<Connection>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Transport>>,
    {
        let transport = match upgrade().await {
            Ok(transport) => transport,
            Err(e) => {
                ConnectionMetrics::record_upgrade_failed();
                tracing::warn!(error = %e, "WebSocket upgrade failed");
                return Err(e);
            }
        };

        Ok(self.accept(transport, options))
    }

    fn accept(&self, transport: Transport, options: ConnectOptions) -> Arc<Connection> {
        let ConnectOptions {
            user_id,
            app_tag,
            handlers,
            queue_capacity,
        } = options;

        let capacity = queue_capacity.unwrap_or(self.config.queue_capacity).max(1);
        let (tx, rx) = mpsc::channel::<Message>(capacity);

        let connection = Arc::new(Connection::new(
            Uuid::new_v4().to_string(),
            user_id,
            app_tag,
            handlers,
            tx,
        ));

        self.registry.insert(connection.clone());
        driver::spawn(
            connection.clone(),
            self.registry.clone(),
            self.config.clone(),
            transport,
            rx,
        );
        ConnectionMetrics::record_opened();

        tracing::info!(
            connection_id = %connection.id(),
            user_id = connection.user_id().unwrap_or(""),
            app_tag = connection.app_tag().unwrap_or(""),
            queue_capacity = capacity,
            "Connection registered"
        );

        connection
    }

    /// Send to one connection; no-op if it is not registered
    pub async fn send_to_connection(&self, connection_id: &str, message: Message) -> bool {
        let Some(connection) = self.registry.lookup(connection_id) else {
            MessageMetrics::record_dropped();
            return false;
        };
        MessageMetrics::record_sent("connection");
        connection.send(message).await;
        true
    }

    /// Send to every connection of a user. Returns how many were targeted.
    pub async fn send_to_user(&self, user_id: &str, message: Message) -> usize {
        let connections = self.registry.lookup_user(user_id).unwrap_or_default();
        self.fan_out("user", connections, message).await
    }

    /// Send to every connection registered at call time
    pub async fn broadcast(&self, message: Message) -> usize {
        let connections = self.registry.all();
        self.fan_out("broadcast", connections, message).await
    }

    /// Sends run concurrently so one full queue does not hold up the others
    async fn fan_out(&self, target: &str, connections: Vec<Arc<Connection>>, message: Message) -> usize {
        let targeted = connections.len();
        if targeted == 0 {
            return 0;
        }
        MessageMetrics::record_sent(target);
        let sends = connections.iter().map(|connection| connection.send(message.clone()));
        join_all(sends).await;
        targeted
    }

    /// Tear a connection down administratively. Returns true only for the
    /// call that actually performed the teardown.
    pub fn remove(&self, connection_id: &str) -> bool {
        match self.registry.lookup(connection_id) {
            Some(connection) => driver::teardown(&self.registry, &connection, CloseReason::Removed),
            None => false,
        }
    }

    pub fn get_connection(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.registry.lookup(connection_id)
    }

    pub fn get_user_connections(&self, user_id: &str) -> Option<Vec<Arc<Connection>>> {
        self.registry.lookup_user(user_id)
    }

    pub fn get_user_connection_by_tag(&self, user_id: &str, app_tag: &str) -> Option<Arc<Connection>> {
        self.registry.lookup_user_by_tag(user_id, app_tag)
    }

    pub fn get_all_connections(&self) -> Vec<Arc<Connection>> {
        self.registry.all()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.registry.stats()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::with_validated(WebSocketConfig::default())
    }
}
