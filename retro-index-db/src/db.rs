//! The `MediaDb` engine handle.
//!
//! One writer connection sits behind a mutex; reads go round-robin over a
//! pool of read-only connections so they never wait on a write transaction.
//! In-memory databases cannot share data across connections, so they run
//! everything on the writer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::cancel::CancelToken;
use crate::config::DbConfig;
use crate::error::DbError;
use crate::schema;
use crate::transaction::CatalogBatch;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, DbError> {
    mutex.lock().map_err(|_| DbError::LockPoisoned)
}

pub struct MediaDb {
    pub(crate) writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    read_cursor: AtomicUsize,
    pub(crate) in_transaction: AtomicBool,
    /// Inserters of the active batch-mode transaction. Locked before the
    /// writer whenever both are needed.
    pub(crate) batch: Mutex<Option<CatalogBatch>>,
    pub(crate) cancel: CancelToken,
    pub(crate) config: DbConfig,
    path: Option<PathBuf>,
}

impl MediaDb {
    /// Open (creating if needed) the database at `path` with a reader pool
    /// of `config.read_pool_size` connections.
    pub fn open(path: &Path, config: DbConfig) -> Result<Self, DbError> {
        config.validate()?;
        let writer = schema::open_database(path, &config)?;

        let mut readers = Vec::with_capacity(config.read_pool_size);
        for _ in 0..config.read_pool_size {
            readers.push(Mutex::new(schema::open_reader(path, &config)?));
        }
        log::info!(
            "Opened media database {} with {} readers",
            path.display(),
            readers.len()
        );

        Ok(Self::from_parts(writer, readers, config, Some(path.to_path_buf())))
    }

    /// An in-memory database on a single connection.
    pub fn open_memory() -> Result<Self, DbError> {
        let conn = schema::open_memory()?;
        Ok(Self::from_parts(conn, Vec::new(), DbConfig::default(), None))
    }

    fn from_parts(
        writer: Connection,
        readers: Vec<Mutex<Connection>>,
        config: DbConfig,
        path: Option<PathBuf>,
    ) -> Self {
        Self {
            writer: Mutex::new(writer),
            readers,
            read_cursor: AtomicUsize::new(0),
            in_transaction: AtomicBool::new(false),
            batch: Mutex::new(None),
            cancel: CancelToken::new(),
            config,
            path,
        }
    }

    /// Replace the cancellation token checked by every engine call.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> Result<(), DbError> {
        self.cancel.check()?;
        Ok(())
    }

    pub(crate) fn writer(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        lock(&self.writer)
    }

    /// Next pooled reader, or the writer when there is no pool. Never hold
    /// this guard while taking the writer.
    pub(crate) fn reader(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        if self.readers.is_empty() {
            return self.writer();
        }
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        lock(&self.readers[index])
    }

    /// Connection for lookups that must see the active transaction's own
    /// writes: the writer while a transaction is open, a reader otherwise.
    pub(crate) fn lookup_conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        if self.in_transaction() {
            self.writer()
        } else {
            self.reader()
        }
    }
}

impl std::fmt::Debug for MediaDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaDb")
            .field("path", &self.path)
            .field("readers", &self.readers.len())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}
