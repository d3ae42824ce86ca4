use thiserror::Error;

use crate::batch::BatchError;
use crate::cancel::Interrupted;
use crate::config::ConfigError;
use crate::schema::SchemaError;

/// Errors returned by the `MediaDb` engine.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Batch insert error: {0}")]
    Batch(#[from] BatchError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("transaction already in progress")]
    TransactionInProgress,
    /// No row matched. Kept apart from `Sqlite` so callers can tell
    /// "no match" from "query failed".
    #[error("no matching rows")]
    NotFound,
    #[error("no systems provided for {0}")]
    NoSystems(&'static str),
    #[error("not enough fields set to look up {0}")]
    MissingLookupKey(&'static str),
    #[error("database lock poisoned")]
    LockPoisoned,
    #[error("commit failed: {commit}; rollback also failed: {rollback}")]
    CommitFailed {
        commit: rusqlite::Error,
        rollback: rusqlite::Error,
    },
}

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Map an empty single-row result to `DbError::NotFound`.
pub(crate) fn found<T>(result: rusqlite::Result<T>) -> Result<T, DbError> {
    match result {
        Ok(value) => Ok(value),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DbError::NotFound),
        Err(e) => Err(e.into()),
    }
}
