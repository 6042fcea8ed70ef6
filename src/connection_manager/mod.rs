//! Connection tracking and delivery.
//!
//! - `Connection`: one upgraded peer with its outbound queue and handlers
//! - `Registry`: connection-id and user-id indices over live connections
//! - `ConnectionManager`: upgrade entry point and fan-out API
//! - `driver`: the reader/writer task pair behind every connection

mod connection;
mod driver;
mod manager;
mod options;
mod registry;
mod stats;
mod types;

pub use connection::{Connection, ConnectionInfo, MessageHandler, SharedHandler};
pub use manager::ConnectionManager;
pub use options::ConnectOptions;
pub use registry::Registry;
pub use stats::ConnectionStats;
pub use types::CloseReason;
