use crate::models::{
    now_nanos, Event, EventQuery, EventRow, GeoLocation, GeoRow, NewEvent, RepairReport,
};
use crate::storage::{EventStore, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl EventStore for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq BIGSERIAL PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                created_at BIGINT NOT NULL,
                name TEXT NOT NULL,
                destination TEXT NOT NULL,
                request_address TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                continent TEXT,
                country TEXT,
                region TEXT,
                city TEXT,
                postal_code TEXT,
                latitude DOUBLE PRECISION,
                longitude DOUBLE PRECISION,
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO NOTHING
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
            WHERE access_scope = $1
              AND created_at > $2
              AND created_at <= $3
              AND latitude IS NOT NULL
              AND longitude IS NOT NULL
              AND ($4::TEXT IS NULL OR name = $4)
              AND ($5::TEXT IS NULL OR request_address = $5)
            ORDER BY seq ASC
            "#,
        )
        .bind(query.scope.as_str())
        .bind(query.from)
        .bind(query.to)
        .bind(query.name.as_deref())
        .bind(query.address.as_deref())
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn count_by_address(&self, address: &str, from: i64, to: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT id) FROM events
            WHERE request_address = $1
              AND created_at > $2
              AND created_at <= $3
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
            WHERE request_address = $1
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
                    WHERE request_address = $1
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
                SET continent = $1, country = $2, region = $3, city = $4, postal_code = $5,
                    latitude = $6, longitude = $7
                WHERE seq = $8
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
