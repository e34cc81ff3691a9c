// SQLite rollup store. `metricshourlies` holds one row per (hour, component_id); the
// UNIQUE constraint plus a single INSERT .. ON CONFLICT statement keeps that true under
// concurrent writers, including other processes sharing the file.

pub mod aggregation;
mod document;
mod samples;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::models::{Aggregates, FindOptions, HourlyRollup, RollupPayload, SortKey, normalize_hour};
use crate::query::Collection;

pub use document::{Document, RollupFilter};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

const ROLLUP_COLUMNS: &str =
    "id, hour, component_id, avg_response_time, total_requests, total_cost, error_rate";

pub struct RollupRepo {
    pool: SqlitePool,
    sample_retention_ms: i64,
}

impl RollupRepo {
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        sample_retention_days: u32,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        let sample_retention_ms = (sample_retention_days as i64) * DAY_MS;
        Ok(Self {
            pool,
            sample_retention_ms,
        })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metricshourlies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hour INTEGER NOT NULL,
                component_id TEXT NOT NULL,
                avg_response_time REAL,
                total_requests INTEGER,
                total_cost REAL,
                error_rate REAL,
                UNIQUE (hour, component_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Newest hours first for dashboards; also serves per-component lookups.
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_metricshourlies_hour_component ON metricshourlies(hour DESC, component_id ASC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS components (component_id TEXT PRIMARY KEY, component_type TEXT NOT NULL, last_seen INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        aggregation::init_samples_table(&self.pool).await?;

        Ok(())
    }

    /// Insert or overwrite the rollup for the payload's (hour bucket, component).
    ///
    /// Aggregates are replaced wholesale (last write wins); a payload without aggregates
    /// leaves existing ones untouched.
    #[instrument(skip(self, payload), fields(repo = "rollup", operation = "upsert_rollup"))]
    pub async fn upsert_rollup(&self, payload: &RollupPayload) -> Result<HourlyRollup> {
        let (Some(hour), Some(component_id)) = (
            payload.hour,
            payload
                .component_id
                .as_deref()
                .filter(|c| !c.trim().is_empty()),
        ) else {
            return Err(Error::invalid(
                "hour and componentId are required for upsertRollup",
            ));
        };
        let hour_ms = normalize_hour(hour).timestamp_millis();

        let row = match payload.aggregates {
            Some(aggregates) => {
                let a = aggregates.normalized()?;
                sqlx::query(&format!(
                    r#"
                    INSERT INTO metricshourlies
                    (hour, component_id, avg_response_time, total_requests, total_cost, error_rate)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (hour, component_id) DO UPDATE SET
                        avg_response_time = excluded.avg_response_time,
                        total_requests = excluded.total_requests,
                        total_cost = excluded.total_cost,
                        error_rate = excluded.error_rate
                    RETURNING {}
                    "#,
                    ROLLUP_COLUMNS
                ))
                .bind(hour_ms)
                .bind(component_id)
                .bind(a.avg_response_time)
                .bind(a.total_requests)
                .bind(a.total_cost)
                .bind(a.error_rate)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO metricshourlies (hour, component_id) VALUES ($1, $2)
                    ON CONFLICT (hour, component_id) DO UPDATE SET hour = excluded.hour
                    RETURNING {}
                    "#,
                    ROLLUP_COLUMNS
                ))
                .bind(hour_ms)
                .bind(component_id)
                .fetch_one(&self.pool)
                .await?
            }
        };

        parse_rollup_row(&row)
    }

    /// Rollups for one component with hour in [from, to). Ascending by hour.
    #[instrument(skip(self), fields(repo = "rollup", operation = "get_rollups"))]
    pub async fn get_rollups(
        &self,
        component_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HourlyRollup>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM metricshourlies WHERE component_id = $1 AND hour >= $2 AND hour < $3 ORDER BY hour ASC",
            ROLLUP_COLUMNS
        ))
        .bind(component_id)
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_rollup_row).collect()
    }

    /// Rollups of every component with hour in [from, to). Ascending by hour, then component.
    #[instrument(skip(self), fields(repo = "rollup", operation = "rollups_in_range"))]
    pub async fn rollups_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HourlyRollup>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM metricshourlies WHERE hour >= $1 AND hour < $2 ORDER BY hour ASC, component_id ASC",
            ROLLUP_COLUMNS
        ))
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_rollup_row).collect()
    }

    pub async fn latest_rollup(&self, component_id: &str) -> Result<Option<HourlyRollup>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM metricshourlies WHERE component_id = $1 ORDER BY hour DESC LIMIT 1",
            ROLLUP_COLUMNS
        ))
        .bind(component_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_rollup_row).transpose()
    }

    /// Reclaim space after sample pruning.
    #[instrument(skip(self), fields(repo = "rollup", operation = "vacuum"))]
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

impl Collection for RollupRepo {
    type Filter = RollupFilter;
    type Record = Document;

    fn default_sort(&self) -> Vec<SortKey> {
        vec![SortKey::desc("hour"), SortKey::asc("componentId")]
    }

    async fn count(&self, filter: &RollupFilter) -> Result<u64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM metricshourlies");
        document::push_filter(&mut qb, filter);
        let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn find(&self, filter: &RollupFilter, options: &FindOptions) -> Result<Vec<Document>> {
        let select = document::validate_select(options.select.as_deref())?;
        let populate_component = document::validate_populate(options.populate.as_deref())?;

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM metricshourlies", ROLLUP_COLUMNS));
        document::push_filter(&mut qb, filter);
        document::push_order_by(&mut qb, &options.sort)?;
        qb.push(" LIMIT ");
        qb.push_bind(options.limit.map(|l| l.min(i64::MAX as u64) as i64).unwrap_or(-1));
        qb.push(" OFFSET ");
        qb.push_bind(options.skip.min(i64::MAX as u64) as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let rollups = rows
            .iter()
            .map(parse_rollup_row)
            .collect::<Result<Vec<_>>>()?;

        let components = if populate_component {
            let ids: Vec<&str> = rollups.iter().map(|r| r.component_id.as_str()).collect();
            self.components_by_id(&ids).await?
        } else {
            Default::default()
        };

        rollups
            .into_iter()
            .map(|r| {
                let populated = populate_component.then(|| components.get(&r.component_id));
                document::to_document(r, populated, select.as_deref())
            })
            .collect()
    }
}

fn parse_rollup_row(row: &sqlx::sqlite::SqliteRow) -> Result<HourlyRollup> {
    let id: i64 = row.try_get("id")?;
    let hour_ms: i64 = row.try_get("hour")?;
    let component_id: String = row.try_get("component_id")?;
    let hour = DateTime::from_timestamp_millis(hour_ms)
        .ok_or_else(|| Error::Permanent(format!("hour out of range: {}", hour_ms)))?;
    Ok(HourlyRollup {
        id,
        hour,
        component_id,
        aggregates: Aggregates {
            avg_response_time: row.try_get("avg_response_time")?,
            total_requests: row.try_get("total_requests")?,
            total_cost: row.try_get("total_cost")?,
            error_rate: row.try_get("error_rate")?,
        },
    })
}
