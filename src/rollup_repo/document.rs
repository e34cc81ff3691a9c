// Query-language side of the rollup Collection: typed filter, whitelisted sort/select/populate
// fields, and JSON document projection.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{Error, Result};
use crate::models::{ComponentInfo, HourlyRollup, SortDirection, SortKey};

/// A rollup rendered as a JSON object (the shape pagination returns).
pub type Document = serde_json::Map<String, Value>;

const POPULATE_COMPONENT: &str = "component";

const SELECTABLE: &[&str] = &["id", "hour", "componentId", "aggregates", POPULATE_COMPONENT];

/// Filter for `metricshourlies`; every field narrows the match when set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupFilter {
    pub component_id: Option<String>,
    /// Inclusive lower bound on the hour bucket.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the hour bucket.
    pub to: Option<DateTime<Utc>>,
    pub min_error_rate: Option<f64>,
}

impl RollupFilter {
    pub fn component(component_id: impl Into<String>) -> Self {
        Self {
            component_id: Some(component_id.into()),
            ..Self::default()
        }
    }
}

pub(super) fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &RollupFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(id) = &filter.component_id {
        qb.push(" AND component_id = ").push_bind(id.clone());
    }
    if let Some(from) = filter.from {
        qb.push(" AND hour >= ").push_bind(from.timestamp_millis());
    }
    if let Some(to) = filter.to {
        qb.push(" AND hour < ").push_bind(to.timestamp_millis());
    }
    if let Some(rate) = filter.min_error_rate {
        qb.push(" AND error_rate >= ").push_bind(rate);
    }
}

fn sort_column(field: &str) -> Option<&'static str> {
    let field = field.strip_prefix("aggregates.").unwrap_or(field);
    match field {
        "id" => Some("id"),
        "hour" => Some("hour"),
        "componentId" => Some("component_id"),
        "avgResponseTime" => Some("avg_response_time"),
        "totalRequests" => Some("total_requests"),
        "totalCost" => Some("total_cost"),
        "errorRate" => Some("error_rate"),
        _ => None,
    }
}

/// ORDER BY from whitelisted fields; `id` breaks ties so pages never overlap.
pub(super) fn push_order_by(qb: &mut QueryBuilder<'_, Sqlite>, sort: &[SortKey]) -> Result<()> {
    qb.push(" ORDER BY ");
    for key in sort {
        let column = sort_column(&key.field)
            .ok_or_else(|| Error::invalid(format!("cannot sort by '{}'", key.field)))?;
        let dir = match key.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        qb.push(column).push(" ").push(dir).push(", ");
    }
    qb.push("id ASC");
    Ok(())
}

pub(super) fn validate_select(select: Option<&[String]>) -> Result<Option<Vec<String>>> {
    let Some(fields) = select else {
        return Ok(None);
    };
    if let Some(bad) = fields.iter().find(|f| !SELECTABLE.contains(&f.as_str())) {
        return Err(Error::invalid(format!("cannot select '{}'", bad)));
    }
    Ok(Some(fields.to_vec()))
}

/// True when the related component should be expanded.
pub(super) fn validate_populate(populate: Option<&[String]>) -> Result<bool> {
    let Some(paths) = populate else {
        return Ok(false);
    };
    if let Some(bad) = paths.iter().find(|p| p.as_str() != POPULATE_COMPONENT) {
        return Err(Error::invalid(format!("cannot populate '{}'", bad)));
    }
    Ok(!paths.is_empty())
}

/// Renders a rollup; `populated` is Some when expansion was requested (inner None: unknown
/// component). `id` survives any projection.
pub(super) fn to_document(
    rollup: HourlyRollup,
    populated: Option<Option<&ComponentInfo>>,
    select: Option<&[String]>,
) -> Result<Document> {
    let Value::Object(mut doc) = serde_json::to_value(&rollup)? else {
        return Err(Error::Permanent("rollup did not serialize to an object".into()));
    };
    if let Some(component) = populated {
        doc.insert(
            POPULATE_COMPONENT.to_string(),
            serde_json::to_value(component)?,
        );
    }
    if let Some(fields) = select {
        doc.retain(|k, _| k == "id" || fields.iter().any(|f| f == k));
    }
    Ok(doc)
}
