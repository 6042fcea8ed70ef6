use axum::{
    extract::{ws::rejection::WebSocketUpgradeRejection, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::connection_manager::ConnectOptions;
use crate::metrics::ConnectionMetrics;
use crate::server::AppState;

use super::transport::Transport;

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
    pub app: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The origin is checked before the upgrade extractor is consulted, so a
/// rejected origin gets a 403 regardless of the handshake headers.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(state, query, headers, ws),
    fields(user_id = query.user_id.as_deref().unwrap_or(""))
)]
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    if !state.connection_manager.check_origin(origin) {
        tracing::warn!(origin = origin.unwrap_or(""), "Rejected WebSocket origin");
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Not a WebSocket upgrade request");
            return rejection.into_response();
        }
    };

    let options = connect_options(&state, query);
    let config = state.connection_manager.config();

    ws.read_buffer_size(config.read_buffer_size)
        .write_buffer_size(config.write_buffer_size)
        .max_message_size(config.max_message_size)
        .on_failed_upgrade(|e| {
            ConnectionMetrics::record_upgrade_failed();
            tracing::warn!(error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            let manager = state.connection_manager.clone();
            let upgraded = manager
                .upgrade(move || async move { Ok(Transport::from_websocket(socket)) }, options)
                .await;
            if let Err(e) = upgraded {
                tracing::warn!(error = %e, "Failed to register WebSocket connection");
            }
        })
}

fn connect_options(state: &AppState, query: WsQuery) -> ConnectOptions {
    let mut options = ConnectOptions::new().handlers(state.handlers.iter().cloned());
    if let Some(user_id) = query.user_id {
        options = options.user(user_id);
    }
    if let Some(app) = query.app {
        options = options.app_tag(app);
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_connect_options_from_query() {
        let state = AppState::new(&Settings::default()).unwrap();
        let options = connect_options(
            &state,
            WsQuery {
                user_id: Some("42".into()),
                app: Some("ios".into()),
            },
        );
        assert_eq!(options.user_id.as_deref(), Some("42"));
        assert_eq!(options.app_tag.as_deref(), Some("ios"));
        assert_eq!(options.handlers.len(), state.handlers.len());
    }

    #[test]
    fn test_connect_options_anonymous() {
        let state = AppState::new(&Settings::default()).unwrap();
        let options = connect_options(&state, WsQuery::default());
        assert!(options.user_id.is_none());
        assert!(options.app_tag.is_none());
    }
}
