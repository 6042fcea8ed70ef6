//! Minimal JSON protocol spoken on the `/ws` endpoint.
//!
//! Clients may send `{"type":"ping"}` and get `{"type":"pong"}` back. A JSON
//! object with any other `type` gets an `{"type":"error",...}` reply; frames
//! without a `type` field are left to the remaining handlers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::connection_manager::{Connection, SharedHandler};

use super::message::{Message, MessageKind};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Pong,
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

fn reply(connection: &Connection, message: &ServerMessage) {
    match Message::json(message) {
        Ok(frame) => {
            if !connection.try_send(frame) {
                tracing::debug!(connection_id = %connection.id(), "Reply dropped, queue full or closed");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize reply"),
    }
}

/// Answers application-level pings and rejects unknown message types
pub fn handle_client_message(connection: &Arc<Connection>, message: &Message) {
    if message.kind != MessageKind::Text {
        return;
    }

    let value = match serde_json::from_slice::<serde_json::Value>(&message.payload) {
        Ok(value) if value.get("type").is_some_and(|t| t.is_string()) => value,
        _ => {
            tracing::debug!(connection_id = %connection.id(), "Frame is not a protocol message");
            return;
        }
    };

    match serde_json::from_value::<ClientMessage>(value) {
        Ok(ClientMessage::Ping) => reply(connection, &ServerMessage::Pong),
        Err(e) => {
            tracing::debug!(connection_id = %connection.id(), error = %e, "Unsupported protocol message");
            reply(connection, &ServerMessage::error("UNSUPPORTED_MESSAGE", e.to_string()));
        }
    }
}

/// Logs every inbound data frame
pub fn log_inbound(connection: &Arc<Connection>, message: &Message) {
    tracing::debug!(
        connection_id = %connection.id(),
        user_id = connection.user_id().unwrap_or(""),
        kind = ?message.kind,
        len = message.len(),
        "Inbound frame"
    );
}

/// Handler set installed on connections accepted by the `/ws` endpoint
pub fn default_handlers() -> Vec<SharedHandler> {
    vec![
        Arc::new(log_inbound) as SharedHandler,
        Arc::new(handle_client_message) as SharedHandler,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ping_parses() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::Ping));
    }

    #[test]
    fn test_server_error_serializes() {
        let json = serde_json::to_value(ServerMessage::error("BAD", "nope")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "BAD");
        assert_eq!(json["message"], "nope");
    }

    #[test]
    fn test_default_handlers() {
        assert_eq!(default_handlers().len(), 2);
    }

    fn make_connection() -> (Arc<Connection>, tokio::sync::mpsc::Receiver<Message>) {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let conn = Connection::new("conn_1".into(), None, None, vec![], tx);
        (Arc::new(conn), rx)
    }

    fn reply_json(rx: &mut tokio::sync::mpsc::Receiver<Message>) -> serde_json::Value {
        let frame = rx.try_recv().expect("a reply should be queued");
        serde_json::from_slice(&frame.payload).unwrap()
    }

    #[test]
    fn test_ping_gets_pong() {
        let (conn, mut rx) = make_connection();
        handle_client_message(&conn, &Message::text(r#"{"type":"ping"}"#));
        assert_eq!(reply_json(&mut rx)["type"], "pong");
    }

    #[test]
    fn test_unknown_type_gets_error_reply() {
        let (conn, mut rx) = make_connection();
        handle_client_message(&conn, &Message::text(r#"{"type":"subscribe"}"#));

        let reply = reply_json(&mut rx);
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], "UNSUPPORTED_MESSAGE");
    }

    #[test]
    fn test_application_frames_are_ignored() {
        let (conn, mut rx) = make_connection();
        handle_client_message(&conn, &Message::text("plain text"));
        handle_client_message(&conn, &Message::text(r#"{"event":"typing"}"#));
        handle_client_message(&conn, &Message::binary(vec![1u8, 2]));
        assert!(rx.try_recv().is_err());
    }
}
