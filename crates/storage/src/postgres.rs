//! PostgreSQL-backed [`ExploitStore`].
//!
//! Bulk inserts use a multi-row `INSERT ... VALUES` per chunk inside one
//! transaction. With `skip_duplicates` the statement carries
//! `ON CONFLICT (protocol, hack_date, amount_stolen) DO NOTHING`, so only
//! dedup-key collisions are absorbed; any other constraint still fails.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, info};

use hackwatch_core::config::PostgresConfig;
use hackwatch_core::NewExploit;

use crate::error::PersistenceError;
use crate::store::ExploitStore;

/// Postgres caps bind parameters at 65535; 10 columns per row.
const MAX_ROWS_PER_STATEMENT: usize = 5000;

const INSERT_PREFIX: &str = "INSERT INTO exploits \
    (protocol, hack_date, amount_stolen, exploit_type, technique, \
     related_entity, recovered, resolution, audited_by, notes) ";

const DEDUP_CONFLICT_CLAUSE: &str =
    " ON CONFLICT (protocol, hack_date, amount_stolen) DO NOTHING";

pub struct PgExploitStore {
    pool: PgPool,
}

impl PgExploitStore {
    /// Open a connection pool from config.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url())
            .await?;
        info!(host = %config.host, database = %config.database, "PostgreSQL connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations from `migrations/`.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Database migrations applied successfully");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ExploitStore for PgExploitStore {
    async fn count(&self) -> Result<u64, PersistenceError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exploits")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn create_many(
        &self,
        records: &[NewExploit],
        skip_duplicates: bool,
    ) -> Result<u64, PersistenceError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Postgres>::new(INSERT_PREFIX);
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.protocol.clone())
                    .push_bind(record.hack_date)
                    .push_bind(record.amount_stolen)
                    .push_bind(record.exploit_type.clone())
                    .push_bind(record.technique.clone())
                    .push_bind(record.related_entity.clone())
                    .push_bind(record.recovered)
                    .push_bind(record.resolution.clone())
                    .push_bind(record.audited_by.clone())
                    .push_bind(record.notes.clone());
            });
            if skip_duplicates {
                builder.push(DEDUP_CONFLICT_CLAUSE);
            }

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_unique_violation)?;
            inserted += result.rows_affected();
            debug!(
                chunk_rows = chunk.len(),
                written = result.rows_affected(),
                "exploit chunk written"
            );
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

/// Map a dedup-key unique violation (23505) to [`PersistenceError::Duplicate`].
fn map_unique_violation(e: sqlx::Error) -> PersistenceError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            return PersistenceError::Duplicate(format!("unique constraint {constraint}"));
        }
    }
    error!("exploit store database error: {}", e);
    PersistenceError::Database(e)
}
