use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::connection::{
    broadcast, get_connection, get_user_connections, remove_connection, send_to_connection,
    send_to_user,
};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                // Point-to-point
                .route(
                    "/connections/{id}",
                    get(get_connection).delete(remove_connection),
                )
                .route("/connections/{id}/messages", post(send_to_connection))
                // Per user
                .route("/users/{id}/connections", get(get_user_connections))
                .route("/users/{id}/messages", post(send_to_user))
                // Broadcast
                .route("/broadcast", post(broadcast)),
        )
}
