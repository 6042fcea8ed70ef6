//! Connection administration and delivery endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::connection_manager::ConnectionInfo;
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::websocket::Message;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// Delivered to the peer as a JSON text frame
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub targeted: usize,
}

#[derive(Debug, Serialize)]
pub struct UserConnectionsResponse {
    pub user_id: String,
    pub connections: Vec<ConnectionInfo>,
}

// ============================================================================
// Connection Endpoints
// ============================================================================

/// GET /api/v1/connections/{id}
pub async fn get_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> Result<Json<ConnectionInfo>> {
    state
        .connection_manager
        .get_connection(&connection_id)
        .map(|connection| Json(connection.info()))
        .ok_or_else(|| AppError::NotFound(format!("connection '{}'", connection_id)))
}

/// DELETE /api/v1/connections/{id} - administrative teardown
pub async fn remove_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> Result<StatusCode> {
    if state.connection_manager.remove(&connection_id) {
        tracing::info!(connection_id = %connection_id, "Connection removed via API");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("connection '{}'", connection_id)))
    }
}

/// POST /api/v1/connections/{id}/messages
pub async fn send_to_connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>> {
    let message = Message::json(&request.payload)?;
    if !state
        .connection_manager
        .send_to_connection(&connection_id, message)
        .await
    {
        return Err(AppError::NotFound(format!("connection '{}'", connection_id)));
    }
    Ok(Json(SendResponse { targeted: 1 }))
}

// ============================================================================
// User Endpoints
// ============================================================================

/// GET /api/v1/users/{id}/connections
pub async fn get_user_connections(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserConnectionsResponse>> {
    let connections = state
        .connection_manager
        .get_user_connections(&user_id)
        .ok_or_else(|| AppError::NotFound(format!("user '{}' has no connections", user_id)))?;

    Ok(Json(UserConnectionsResponse {
        user_id,
        connections: connections.iter().map(|c| c.info()).collect(),
    }))
}

/// POST /api/v1/users/{id}/messages
pub async fn send_to_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>> {
    let message = Message::json(&request.payload)?;
    let targeted = state.connection_manager.send_to_user(&user_id, message).await;
    Ok(Json(SendResponse { targeted }))
}

/// POST /api/v1/broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>> {
    let message = Message::json(&request.payload)?;
    let targeted = state.connection_manager.broadcast(message).await;
    Ok(Json(SendResponse { targeted }))
}
