use std::sync::Arc;

use super::connection::{MessageHandler, SharedHandler};

/// Per-connection settings applied at upgrade time
#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub(crate) user_id: Option<String>,
    pub(crate) app_tag: Option<String>,
    pub(crate) handlers: Vec<SharedHandler>,
    pub(crate) queue_capacity: Option<usize>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the connection under this user. Empty ids are ignored.
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = non_empty(user_id.into());
        self
    }

    /// Classify the connection, e.g. "web" or "ios". Empty tags are ignored.
    pub fn app_tag(mut self, tag: impl Into<String>) -> Self {
        self.app_tag = non_empty(tag.into());
        self
    }

    pub fn handler<H: MessageHandler>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn handlers<I>(mut self, handlers: I) -> Self
    where
        I: IntoIterator<Item = SharedHandler>,
    {
        self.handlers.extend(handlers);
        self
    }

    /// Override the configured outbound queue capacity (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::Connection;
    use crate::websocket::Message;

    #[test]
    fn test_builder_sets_fields() {
        let options = ConnectOptions::new()
            .user("42")
            .app_tag("web")
            .handler(|_: &Arc<Connection>, _: &Message| {})
            .queue_capacity(0);

        assert_eq!(options.user_id.as_deref(), Some("42"));
        assert_eq!(options.app_tag.as_deref(), Some("web"));
        assert_eq!(options.handlers.len(), 1);
        assert_eq!(options.queue_capacity, Some(1));
    }

    #[test]
    fn test_empty_tags_are_ignored() {
        let options = ConnectOptions::new().user("").app_tag("");
        assert!(options.user_id.is_none());
        assert!(options.app_tag.is_none());
    }
}
