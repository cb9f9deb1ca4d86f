use crate::models::{
    now_nanos, Event, EventQuery, EventRow, GeoLocation, GeoRow, NewEvent, RepairReport,
};
use crate::storage::{EventStore, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Connections are never recycled so that `sqlite::memory:` keeps its data.
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        self.pool.as_ref()
    }
}

#[async_trait]
impl EventStore for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                name TEXT NOT NULL,
                destination TEXT NOT NULL,
                request_address TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                continent TEXT,
                country TEXT,
                region TEXT,
                city TEXT,
                postal_code TEXT,
                latitude REAL,
                longitude REAL,
                access_scope TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_address_time ON events(request_address, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_scope_time ON events(access_scope, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert(&self, event: NewEvent) -> StorageResult<Event> {
        let created_at = now_nanos();
        let geo = event.geolocation.as_ref();

        let result = sqlx::query(
            r#"
            INSERT INTO events (
                id, created_at, name, destination, request_address, user_agent,
                continent, country, region, city, postal_code, latitude, longitude,
                access_scope
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&event.id)
        .bind(created_at)
        .bind(&event.name)
        .bind(&event.destination)
        .bind(&event.request_address)
        .bind(&event.user_agent)
        .bind(geo.and_then(|g| g.continent.as_deref()))
        .bind(geo.and_then(|g| g.country.as_deref()))
        .bind(geo.and_then(|g| g.region.as_deref()))
        .bind(geo.and_then(|g| g.city.as_deref()))
        .bind(geo.and_then(|g| g.postal_code.as_deref()))
        .bind(geo.map(|g| g.latitude))
        .bind(geo.map(|g| g.longitude))
        .bind(event.access_scope.as_str())
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        Ok(event.into_event(created_at))
    }

    async fn query_by_scope(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, created_at, name, destination, request_address, user_agent,
                   continent, country, region, city, postal_code, latitude, longitude,
                   access_scope
            FROM events
            WHERE access_scope = ?
              AND created_at > ?
              AND created_at <= ?
              AND latitude IS NOT NULL
              AND longitude IS NOT NULL
              AND (? IS NULL OR name = ?)
              AND (? IS NULL OR request_address = ?)
            ORDER BY seq ASC
            "#,
        )
        .bind(query.scope.as_str())
        .bind(query.from)
        .bind(query.to)
        .bind(query.name.as_deref())
        .bind(query.name.as_deref())
        .bind(query.address.as_deref())
        .bind(query.address.as_deref())
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn count_by_address(&self, address: &str, from: i64, to: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT id) FROM events
            WHERE request_address = ?
              AND created_at > ?
              AND created_at <= ?
            "#,
        )
        .bind(address)
        .bind(from)
        .bind(to)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn latest_geolocation(&self, address: &str) -> Result<Option<GeoLocation>> {
        let row = sqlx::query_as::<_, GeoRow>(
            r#"
            SELECT continent, country, region, city, postal_code, latitude, longitude
            FROM events
            WHERE request_address = ?
              AND latitude IS NOT NULL
              AND longitude IS NOT NULL
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(address)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.and_then(GeoRow::into_location))
    }

    async fn repair(&self) -> Result<RepairReport> {
        let mut report = RepairReport::default();
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM events WHERE access_scope IS NULL OR access_scope = ''")
            .execute(&mut *tx)
            .await?;
        report.deleted = deleted.rows_affected();

        let missing = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT seq, request_address FROM events
            WHERE postal_code IS NULL OR postal_code = ''
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut sources: HashMap<String, Option<GeoLocation>> = HashMap::new();

        for (seq, address) in missing {
            if !sources.contains_key(&address) {
                let source = sqlx::query_as::<_, GeoRow>(
                    r#"
                    SELECT continent, country, region, city, postal_code, latitude, longitude
                    FROM events
                    WHERE request_address = ?
                      AND latitude IS NOT NULL
                      AND longitude IS NOT NULL
                      AND postal_code IS NOT NULL
                      AND postal_code <> ''
                    ORDER BY seq DESC
                    LIMIT 1
                    "#,
                )
                .bind(&address)
                .fetch_optional(&mut *tx)
                .await?
                .and_then(GeoRow::into_location);
                sources.insert(address.clone(), source);
            }

            let Some(Some(geo)) = sources.get(&address) else {
                warn!(seq, address = %address, "no resolved location to backfill from");
                report.unresolved += 1;
                continue;
            };

            sqlx::query(
                r#"
                UPDATE events
                SET continent = ?, country = ?, region = ?, city = ?, postal_code = ?,
                    latitude = ?, longitude = ?
                WHERE seq = ?
                "#,
            )
            .bind(geo.continent.as_deref())
            .bind(geo.country.as_deref())
            .bind(geo.region.as_deref())
            .bind(geo.city.as_deref())
            .bind(geo.postal_code.as_deref())
            .bind(geo.latitude)
            .bind(geo.longitude)
            .bind(seq)
            .execute(&mut *tx)
            .await?;
            report.backfilled += 1;
        }

        tx.commit().await?;

        info!(
            deleted = report.deleted,
            backfilled = report.backfilled,
            unresolved = report.unresolved,
            "repair pass finished"
        );

        Ok(report)
    }
}
