use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage};
use bytes::Bytes;
use serde::Serialize;

use crate::error::{AppError, Result};

/// Frame kind, passed through to the transport verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}

impl MessageKind {
    pub fn is_data(self) -> bool {
        matches!(self, Self::Text | Self::Binary)
    }
}

/// A single frame travelling to or from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Text, payload)
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Binary, payload)
    }

    pub fn ping() -> Self {
        Self::new(MessageKind::Ping, Bytes::new())
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Pong, payload)
    }

    pub fn close() -> Self {
        Self::new(MessageKind::Close, Bytes::new())
    }

    /// Serialize a value into a JSON text frame
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(value)?;
        Ok(Self::text(encoded))
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as UTF-8, if it is valid
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Convert into an axum frame. Text payloads must be valid UTF-8.
    pub fn into_ws(self) -> Result<WsMessage> {
        let frame = match self.kind {
            MessageKind::Text => {
                let text = String::from_utf8(self.payload.to_vec()).map_err(|e| {
                    AppError::Validation(format!("text frame is not valid UTF-8: {}", e))
                })?;
                WsMessage::Text(text.into())
            }
            MessageKind::Binary => WsMessage::Binary(self.payload),
            MessageKind::Ping => WsMessage::Ping(self.payload),
            MessageKind::Pong => WsMessage::Pong(self.payload),
            MessageKind::Close => {
                let reason = String::from_utf8_lossy(&self.payload).into_owned();
                WsMessage::Close(Some(CloseFrame {
                    code: close_code::NORMAL,
                    reason: reason.into(),
                }))
            }
        };
        Ok(frame)
    }
}

impl From<WsMessage> for Message {
    fn from(frame: WsMessage) -> Self {
        match frame {
            WsMessage::Text(text) => Self::text(Bytes::copy_from_slice(text.as_str().as_bytes())),
            WsMessage::Binary(data) => Self::binary(data),
            WsMessage::Ping(data) => Self::new(MessageKind::Ping, data),
            WsMessage::Pong(data) => Self::pong(data),
            WsMessage::Close(frame) => {
                let reason = frame
                    .map(|f| Bytes::copy_from_slice(f.reason.as_str().as_bytes()))
                    .unwrap_or_default();
                Self::new(MessageKind::Close, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_converts_to_ws_text() {
        let frame = Message::text("hello").into_ws().unwrap();
        match frame {
            WsMessage::Text(text) => assert_eq!(text.as_str(), "hello"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_text_is_rejected() {
        let result = Message::text(vec![0xff, 0xfe]).into_ws();
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_close_frame_carries_reason() {
        let message = Message::from(WsMessage::Close(Some(CloseFrame {
            code: close_code::AWAY,
            reason: "bye".into(),
        })));
        assert_eq!(message.kind, MessageKind::Close);
        assert_eq!(message.as_text(), Some("bye"));
    }

    #[test]
    fn test_json_builds_text_frame() {
        let message = Message::json(&serde_json::json!({"hello": "world"})).unwrap();
        assert_eq!(message.kind, MessageKind::Text);
        assert_eq!(message.as_text(), Some(r#"{"hello":"world"}"#));
    }

    #[test]
    fn test_data_kinds() {
        assert!(MessageKind::Text.is_data());
        assert!(MessageKind::Binary.is_data());
        assert!(!MessageKind::Ping.is_data());
        assert!(!MessageKind::Close.is_data());
    }
}
