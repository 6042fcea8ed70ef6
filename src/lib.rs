// Infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Core
pub mod connection_manager;
pub mod websocket;

// Application layer
pub mod api;
pub mod server;
