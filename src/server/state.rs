use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::connection_manager::{ConnectionManager, SharedHandler};
use crate::error::Result;
use crate::websocket::protocol::default_handlers;

#[derive(Clone)]
pub struct AppState {
    pub connection_manager: Arc<ConnectionManager>,
    /// Installed on every connection accepted by `/ws`
    pub handlers: Arc<Vec<SharedHandler>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::with_handlers(settings, default_handlers())
    }

    /// Fails when the WebSocket settings do not validate
    pub fn with_handlers(settings: &Settings, handlers: Vec<SharedHandler>) -> Result<Self> {
        let connection_manager = Arc::new(ConnectionManager::new(settings.websocket.clone())?);

        Ok(Self {
            connection_manager,
            handlers: Arc::new(handlers),
            started_at: Instant::now(),
        })
    }
}
