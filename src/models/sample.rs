// Raw metric samples: the source stream hourly rollups are computed from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Subsystem or external dependency a sample describes; serializes lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Ollama,
    Agentx,
    Dataapi,
    Qdrant,
    N8n,
    Mongodb,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Ollama => "ollama",
            ComponentType::Agentx => "agentx",
            ComponentType::Dataapi => "dataapi",
            ComponentType::Qdrant => "qdrant",
            ComponentType::N8n => "n8n",
            ComponentType::Mongodb => "mongodb",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ollama" => Ok(ComponentType::Ollama),
            "agentx" => Ok(ComponentType::Agentx),
            "dataapi" => Ok(ComponentType::Dataapi),
            "qdrant" => Ok(ComponentType::Qdrant),
            "n8n" => Ok(ComponentType::N8n),
            "mongodb" => Ok(ComponentType::Mongodb),
            other => Err(Error::invalid(format!("unknown component type '{}'", other))),
        }
    }
}

/// Workflow or trigger that emitted a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    HealthCheck,
    AnalyticsJob,
    ChatCompletion,
    WorkflowExecution,
}

impl SampleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleSource::HealthCheck => "health_check",
            SampleSource::AnalyticsJob => "analytics_job",
            SampleSource::ChatCompletion => "chat_completion",
            SampleSource::WorkflowExecution => "workflow_execution",
        }
    }
}

impl FromStr for SampleSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "health_check" => Ok(SampleSource::HealthCheck),
            "analytics_job" => Ok(SampleSource::AnalyticsJob),
            "chat_completion" => Ok(SampleSource::ChatCompletion),
            "workflow_execution" => Ok(SampleSource::WorkflowExecution),
            other => Err(Error::invalid(format!("unknown sample source '{}'", other))),
        }
    }
}

/// Reported health of a component at sample time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
        }
    }
}

impl FromStr for HealthStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "down" => Ok(HealthStatus::Down),
            other => Err(Error::invalid(format!("unknown health status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub component_id: String,
    pub component_type: ComponentType,
    pub source: SampleSource,
    /// Milliseconds; absent for samples that carry no latency signal.
    #[serde(default)]
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub request_count: i64,
    #[serde(default)]
    pub failure_count: i64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_status: Option<HealthStatus>,
}

impl MetricSample {
    pub fn validate(&self) -> Result<()> {
        if self.component_id.trim().is_empty() {
            return Err(Error::invalid("componentId is required for a metric sample"));
        }
        if let Some(rt) = self.response_time_ms
            && !rt.is_finite()
        {
            return Err(Error::invalid("responseTimeMs must be a finite number"));
        }
        if !self.total_cost.is_finite() {
            return Err(Error::invalid("totalCost must be a finite number"));
        }
        if self.request_count < 0 || self.failure_count < 0 {
            return Err(Error::invalid("requestCount and failureCount must be >= 0"));
        }
        Ok(())
    }
}

/// Registry row for a component seen in the sample stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInfo {
    pub component_id: String,
    pub component_type: ComponentType,
    pub last_seen: DateTime<Utc>,
}

/// Numeric sample field that can be charted as a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SampleMetric {
    ResponseTimeMs,
    RequestCount,
    FailureCount,
    TotalCost,
}

impl SampleMetric {
    /// Column in `metric_samples` holding this metric.
    pub fn column(&self) -> &'static str {
        match self {
            SampleMetric::ResponseTimeMs => "response_time_ms",
            SampleMetric::RequestCount => "request_count",
            SampleMetric::FailureCount => "failure_count",
            SampleMetric::TotalCost => "total_cost",
        }
    }
}

impl FromStr for SampleMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "responseTimeMs" => Ok(SampleMetric::ResponseTimeMs),
            "requestCount" => Ok(SampleMetric::RequestCount),
            "failureCount" => Ok(SampleMetric::FailureCount),
            "totalCost" => Ok(SampleMetric::TotalCost),
            other => Err(Error::invalid(format!("cannot chart metric '{}'", other))),
        }
    }
}

/// Chart point: `x` is the sample time, `y` is null when the sample has no value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub x: DateTime<Utc>,
    pub y: Option<f64>,
}
