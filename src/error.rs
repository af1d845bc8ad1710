//! Error types for worktrack.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("work store error: {0}")]
    WorkStore(#[from] sqlx::Error),

    #[error("counter store error: {0}")]
    CounterStore(#[from] redis::RedisError),

    /// Creation wrote the counter, failed on the record, and could not
    /// remove the counter again. Operators must reconcile `work_id`.
    #[error("work {work_id} left a dangling counter: {source}")]
    OrphanRisk {
        work_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures raised by either backing store.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::WorkStore(_) | Error::CounterStore(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
