//! SQLite storage engine for the media index.
//!
//! [`MediaDb`] wraps one writer connection and a pool of readers. Writes
//! go through a single-active-transaction gate, optionally buffering rows
//! in batch inserters until commit. Derived caches (slug resolutions,
//! per-system tags, query statistics) are invalidated once per commit.

pub mod batch;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod operations;
pub mod queries;
pub mod random;
pub mod schema;
pub mod search;
mod sql;
pub mod transaction;
pub mod value;

pub use batch::{BatchError, BatchInserter, BatchSet, ConflictPolicy, InserterId, SAFE_PARAMETER_LIMIT};
pub use cache::query_stats::MediaStats;
pub use cache::slug::SlugResolution;
pub use cache::CacheScope;
pub use cancel::{CancelToken, Interrupted};
pub use config::{ConfigError, DbConfig, PragmaConfig, PragmaSet, Synchronous, TempStore};
pub use db::MediaDb;
pub use error::DbError;
pub use filter::{build_media_where, media_query_where, TitleMatch, WhereClause};
pub use schema::{open_database, open_memory, open_reader, SchemaError};
pub use transaction::CatalogBatch;
pub use value::SqlValue;
