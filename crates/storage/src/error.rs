use thiserror::Error;

/// Storage-layer faults. Dedup-key collisions under `skip_duplicates` are not errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("duplicate exploit record: {0}")]
    Duplicate(String),

    #[error("{0}")]
    Other(String),
}
