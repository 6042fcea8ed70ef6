//! API layer - HTTP endpoint handlers organized by domain.

mod connection;
mod health;
mod metrics;
mod routes;

pub use connection::{
    broadcast, get_connection, get_user_connections, remove_connection, send_to_connection,
    send_to_user, SendRequest, SendResponse, UserConnectionsResponse,
};
pub use health::{health, stats, HealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
