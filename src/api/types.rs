//! Response bodies of the query server

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    /// Seconds since startup
    pub uptime: u64,
    /// Connected push subscribers
    pub subscribers: usize,
    /// Timestamp of the latest snapshot, absent before the first cycle
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_cycle: Option<i64>,
}

/// Returned by the metrics endpoint until the first cycle has completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingResponse {
    pub status: String,
    pub message: String,
}

impl Default for PendingResponse {
    fn default() -> Self {
        Self {
            status: "pending".to_string(),
            message: "No metrics collected yet".to_string(),
        }
    }
}
