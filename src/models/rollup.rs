// Hourly rollup models and the UTC hour bucketer

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Truncates `ts` to the top of its UTC hour (minutes, seconds and sub-seconds zeroed).
pub fn normalize_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let past_hour = TimeDelta::seconds(i64::from(ts.minute() * 60 + ts.second()))
        + TimeDelta::nanoseconds(i64::from(ts.nanosecond()));
    ts - past_hour
}

/// Same bucketing on epoch milliseconds (the storage representation).
pub fn hour_bucket_ms(ts_ms: i64) -> i64 {
    ts_ms.div_euclid(MS_PER_HOUR) * MS_PER_HOUR
}

/// Per-hour summary for one component. Every field is optional so producers can roll out
/// metrics incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_response_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_requests: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    /// Fraction of failed requests in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
}

impl Aggregates {
    /// Rejects non-finite values and negative counts, costs or latencies; clamps error_rate into [0, 1].
    pub fn normalized(self) -> Result<Self> {
        for (name, v) in [
            ("avgResponseTime", self.avg_response_time),
            ("totalCost", self.total_cost),
            ("errorRate", self.error_rate),
        ] {
            if let Some(v) = v
                && !v.is_finite()
            {
                return Err(Error::invalid(format!(
                    "aggregates.{} must be a finite number",
                    name
                )));
            }
        }
        for (name, v) in [
            ("avgResponseTime", self.avg_response_time),
            ("totalCost", self.total_cost),
        ] {
            if let Some(v) = v
                && v < 0.0
            {
                return Err(Error::invalid(format!(
                    "aggregates.{} must be >= 0, got {}",
                    name, v
                )));
            }
        }
        if let Some(n) = self.total_requests
            && n < 0
        {
            return Err(Error::invalid(format!(
                "aggregates.totalRequests must be >= 0, got {}",
                n
            )));
        }
        Ok(Self {
            error_rate: self.error_rate.map(|r| r.clamp(0.0, 1.0)),
            ..self
        })
    }
}

/// Write-side payload. `hour` and `component_id` are required; missing values are
/// reported as InvalidArgument by the store rather than by deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupPayload {
    #[serde(default)]
    pub hour: Option<DateTime<Utc>>,
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub aggregates: Option<Aggregates>,
}

impl RollupPayload {
    pub fn new(hour: DateTime<Utc>, component_id: impl Into<String>, aggregates: Aggregates) -> Self {
        Self {
            hour: Some(hour),
            component_id: Some(component_id.into()),
            aggregates: Some(aggregates),
        }
    }
}

/// One stored row of `metricshourlies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyRollup {
    pub id: i64,
    pub hour: DateTime<Utc>,
    pub component_id: String,
    pub aggregates: Aggregates,
}
