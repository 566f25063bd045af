use std::sync::Arc;

use async_trait::async_trait;
use saver_ingestor_core::{Event, Repository, RepositoryError};
use snafu::ResultExt;
use sqlx::{PgPool, Postgres, QueryBuilder, migrate::Migrator, postgres::PgPoolOptions};
use tracing::{debug, info};

use crate::{
    error::{ConnectSnafu, MigrateSnafu, Result},
    options::PostgresOptions,
};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Postgres only allows this many bind parameters per statement.
const MAX_BIND_PARAMETERS: usize = u16::MAX as usize;
const COLUMNS_PER_EVENT: usize = 3;
const MAX_EVENTS_PER_STATEMENT: usize = MAX_BIND_PARAMETERS / COLUMNS_PER_EVENT;

/// Repository backed by the postgres `events` table.
///
/// Rows whose id already exists are skipped with `ON CONFLICT DO NOTHING`.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Connects to postgres and brings the schema up to date.
    pub async fn connect(options: &PostgresOptions) -> Result<Self> {
        let address = options.address();
        info!(%address, ssl = options.ssl, "connecting to postgres");

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(options.connect_options())
            .await
            .context(ConnectSnafu { address })?;

        MIGRATOR.run(&pool).await.context(MigrateSnafu)?;

        Ok(Self::from_pool(pool))
    }

    /// Uses an existing pool. The schema is assumed to be up to date.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_events(&self, events: &[Event]) -> Result<u64, sqlx::Error> {
        let mut builder =
            QueryBuilder::<Postgres>::new("INSERT INTO events (id, group_id, data) ");

        builder.push_values(events, |mut row, event| {
            row.push_bind(event.id.as_str())
                .push_bind(event.group_id.as_str())
                .push_bind(&event.data[..]);
        });
        builder.push(" ON CONFLICT (id) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn save_batch(&self, events: &[Event]) -> Result<(), RepositoryError> {
        for chunk in events.chunks(MAX_EVENTS_PER_STATEMENT) {
            let inserted = self.insert_events(chunk).await.map_err(|err| {
                RepositoryError::Storage {
                    message: format!("failed to insert {} events", chunk.len()),
                    source: Arc::new(err),
                }
            })?;

            debug!(size = chunk.len(), inserted, "inserted events");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use bytes::Bytes;

    use super::*;

    const DATABASE_URL: &str = "SAVER_TEST_DATABASE_URL";

    async fn test_repository() -> Option<PostgresRepository> {
        let Ok(url) = std::env::var(DATABASE_URL) else {
            eprintln!("{DATABASE_URL} not set, skipping");
            return None;
        };

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap();
        MIGRATOR.run(&pool).await.unwrap();

        Some(PostgresRepository::from_pool(pool))
    }

    async fn count_with_prefix(repository: &PostgresRepository, prefix: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT count(*) FROM events WHERE id LIKE $1")
            .bind(format!("{prefix}%"))
            .fetch_one(&repository.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires SAVER_TEST_DATABASE_URL"]
    async fn test_save_batch_skips_existing_ids() {
        let Some(repository) = test_repository().await else {
            return;
        };

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let prefix = format!("test-{nanos}-");

        // Spans more than one insert statement.
        let size = MAX_EVENTS_PER_STATEMENT + 10;
        let events = (0..size)
            .map(|i| {
                Event::new(format!("{prefix}{i}"), "1", Bytes::from(format!("data{i}"))).unwrap()
            })
            .collect::<Vec<_>>();

        repository.save_batch(&events).await.unwrap();
        assert_eq!(count_with_prefix(&repository, &prefix).await, size as i64);

        // Replaying overlapping events is a silent no-op for the existing ids.
        let replay = vec![
            events[0].clone(),
            Event::new(format!("{prefix}new"), "1", Bytes::from_static(b"new")).unwrap(),
            events[0].clone(),
        ];
        repository.save_batch(&replay).await.unwrap();
        assert_eq!(count_with_prefix(&repository, &prefix).await, size as i64 + 1);

        let data = sqlx::query_scalar::<_, Vec<u8>>("SELECT data FROM events WHERE id = $1")
            .bind(format!("{prefix}0"))
            .fetch_one(&repository.pool)
            .await
            .unwrap();
        assert_eq!(data, b"data0");
    }
}
