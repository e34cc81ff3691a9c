// Raw metric samples and the component registry.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use tracing::instrument;

use super::RollupRepo;
use crate::error::{Error, Result};
use crate::models::{ComponentInfo, HealthStatus, MetricSample, SampleMetric, SeriesPoint};

const SAMPLE_COLUMNS: &str = "timestamp, component_id, component_type, source, response_time_ms, request_count, failure_count, total_cost, health_status";

impl RollupRepo {
    /// Upserts a sample keyed on (component_id, timestamp) so a retried producer window
    /// overwrites instead of duplicating. Also refreshes the component registry.
    #[instrument(skip(self, sample), fields(repo = "rollup", operation = "record_sample", component_id = %sample.component_id))]
    pub async fn record_sample(&self, sample: &MetricSample) -> Result<()> {
        sample.validate()?;
        let ts = sample.timestamp.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO metric_samples
            (timestamp, component_id, component_type, source, response_time_ms, request_count, failure_count, total_cost, health_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (component_id, timestamp) DO UPDATE SET
                component_type = excluded.component_type,
                source = excluded.source,
                response_time_ms = excluded.response_time_ms,
                request_count = excluded.request_count,
                failure_count = excluded.failure_count,
                total_cost = excluded.total_cost,
                health_status = excluded.health_status
            "#,
        )
        .bind(ts)
        .bind(&sample.component_id)
        .bind(sample.component_type.as_str())
        .bind(sample.source.as_str())
        .bind(sample.response_time_ms)
        .bind(sample.request_count)
        .bind(sample.failure_count)
        .bind(sample.total_cost)
        .bind(sample.health_status.map(|h| h.as_str()))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO components (component_id, component_type, last_seen) VALUES ($1, $2, $3)
            ON CONFLICT (component_id) DO UPDATE SET
                component_type = excluded.component_type,
                last_seen = MAX(last_seen, excluded.last_seen)
            "#,
        )
        .bind(&sample.component_id)
        .bind(sample.component_type.as_str())
        .bind(ts)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Samples in [from, to). Order: ascending by timestamp.
    #[instrument(skip(self), fields(repo = "rollup", operation = "get_samples_by_time_range"))]
    pub async fn get_samples_by_time_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM metric_samples WHERE timestamp >= $1 AND timestamp < $2 ORDER BY timestamp ASC",
            SAMPLE_COLUMNS
        ))
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_sample_row).collect()
    }

    /// One metric of one component as chart points with x in [from, to] (both inclusive),
    /// ascending by time.
    #[instrument(skip(self), fields(repo = "rollup", operation = "get_sample_series"))]
    pub async fn get_sample_series(
        &self,
        component_id: &str,
        metric: SampleMetric,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SeriesPoint>> {
        // Column comes from the SampleMetric whitelist, never from caller text.
        let rows = sqlx::query(&format!(
            "SELECT timestamp, CAST({} AS REAL) AS value FROM metric_samples
             WHERE component_id = $1 AND timestamp >= $2 AND timestamp <= $3 ORDER BY timestamp ASC",
            metric.column()
        ))
        .bind(component_id)
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<SeriesPoint> {
                let ts: i64 = row.try_get("timestamp")?;
                Ok(SeriesPoint {
                    x: millis_to_utc(ts)?,
                    y: row.try_get("value")?,
                })
            })
            .collect()
    }

    pub async fn latest_sample(&self, component_id: &str) -> Result<Option<MetricSample>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM metric_samples WHERE component_id = $1 ORDER BY timestamp DESC LIMIT 1",
            SAMPLE_COLUMNS
        ))
        .bind(component_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_sample_row).transpose()
    }

    /// Delete samples older than `cutoff`. Rollups are never pruned here.
    #[instrument(skip(self), fields(repo = "rollup", operation = "prune_samples_before"))]
    pub async fn prune_samples_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let r = sqlx::query("DELETE FROM metric_samples WHERE timestamp < $1")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Prune samples past the configured retention window.
    pub async fn prune_old_samples(&self) -> Result<u64> {
        let cutoff_ms = Utc::now().timestamp_millis() - self.sample_retention_ms;
        let cutoff = DateTime::from_timestamp_millis(cutoff_ms)
            .ok_or_else(|| Error::Permanent(format!("retention cutoff out of range: {}", cutoff_ms)))?;
        self.prune_samples_before(cutoff).await
    }

    pub async fn list_components(&self) -> Result<Vec<ComponentInfo>> {
        let rows = sqlx::query(
            "SELECT component_id, component_type, last_seen FROM components ORDER BY component_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_component_row).collect()
    }

    pub(super) async fn components_by_id(
        &self,
        ids: &[&str],
    ) -> Result<HashMap<String, ComponentInfo>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT component_id, component_type, last_seen FROM components WHERE component_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| parse_component_row(row).map(|c| (c.component_id.clone(), c)))
            .collect()
    }
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::Permanent(format!("timestamp out of range: {}", ms)))
}

fn parse_sample_row(row: &sqlx::sqlite::SqliteRow) -> Result<MetricSample> {
    let ts: i64 = row.try_get("timestamp")?;
    let component_type: String = row.try_get("component_type")?;
    let source: String = row.try_get("source")?;
    let health_status: Option<String> = row.try_get("health_status")?;
    Ok(MetricSample {
        timestamp: millis_to_utc(ts)?,
        component_id: row.try_get("component_id")?,
        component_type: component_type.parse()?,
        source: source.parse()?,
        response_time_ms: row.try_get("response_time_ms")?,
        request_count: row.try_get("request_count")?,
        failure_count: row.try_get("failure_count")?,
        total_cost: row.try_get("total_cost")?,
        health_status: health_status
            .as_deref()
            .map(str::parse::<HealthStatus>)
            .transpose()?,
    })
}

fn parse_component_row(row: &sqlx::sqlite::SqliteRow) -> Result<ComponentInfo> {
    let component_type: String = row.try_get("component_type")?;
    let last_seen: i64 = row.try_get("last_seen")?;
    Ok(ComponentInfo {
        component_id: row.try_get("component_id")?,
        component_type: component_type.parse()?,
        last_seen: millis_to_utc(last_seen)?,
    })
}
