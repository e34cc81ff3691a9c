// Dashboard summary computed from hourly rollups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSummary {
    pub component_id: String,
    pub hours: u32,
    pub total_requests: i64,
    pub total_cost: f64,
    /// Request-weighted mean across hours that reported a response time.
    pub avg_response_time: Option<f64>,
    /// Request-weighted error rate across hours.
    pub error_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_requests: i64,
    pub total_cost: f64,
    pub avg_response_time: Option<f64>,
    pub error_rate: Option<f64>,
    pub components: Vec<ComponentSummary>,
}
