//! Connection statistics structures

use serde::Serialize;
use std::collections::HashMap;

/// Connection statistics
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
    pub anonymous_connections: usize,
    /// app_tag -> connection count
    pub apps: HashMap<String, usize>,
}
