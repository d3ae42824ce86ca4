//! Buffered multi-row inserts with parameter-limit chunking.
//!
//! A [`BatchInserter`] collects rows for one table and writes them as a
//! single `INSERT ... VALUES (...), (...)` statement on flush. Rows are
//! never flushed implicitly: a child table must not reach the database
//! before its parent, so flushing happens only when the caller asks for it,
//! through a [`BatchSet`] that knows the dependency order.
//!
//! Flush degrades in steps rather than failing outright:
//!
//! 1. one multi-row statement for the whole buffer;
//! 2. if SQLite rejects it for having too many bound variables, successive
//!    statements of at most [`SAFE_PARAMETER_LIMIT`] parameters;
//! 3. if the multi-row statement fails to execute, one statement per row,
//!    logging and skipping rows that fail individually.

use std::collections::HashSet;

use rusqlite::{params_from_iter, Connection};
use thiserror::Error;

use crate::cancel::{CancelToken, Interrupted};
use crate::value::SqlValue;

/// Upper bound on bound parameters per chunked statement. SQLite's
/// compiled-in default is 32766.
pub const SAFE_PARAMETER_LIMIT: usize = 32_000;

const TOO_MANY_VARIABLES: &str = "too many SQL variables";

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("batch inserter requires an active transaction")]
    NoActiveTransaction,
    #[error("table name cannot be empty")]
    EmptyTableName,
    #[error("columns cannot be empty")]
    NoColumns,
    #[error("batch size must be positive")]
    InvalidBatchSize,
    #[error("expected {expected} values for columns [{columns}], got {got}")]
    ArityMismatch {
        expected: usize,
        got: usize,
        columns: String,
    },
    #[error("dependency cycle detected involving table {table}")]
    DependencyCycle { table: String },
    #[error("unknown batch inserter {0:?}")]
    UnknownInserter(InserterId),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// What to do when a row violates a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Fail,
    Ignore,
}

impl ConflictPolicy {
    fn insert_keyword(self) -> &'static str {
        match self {
            Self::Fail => "INSERT",
            Self::Ignore => "INSERT OR IGNORE",
        }
    }
}

// ── BatchInserter ───────────────────────────────────────────────────────────

/// Row buffer for a single table. Owned by one caller; not for concurrent `add`.
#[derive(Debug)]
pub struct BatchInserter {
    table: String,
    columns: Vec<String>,
    policy: ConflictPolicy,
    /// Row-major values, `columns.len()` per row.
    values: Vec<SqlValue>,
    cancel: CancelToken,
}

impl BatchInserter {
    /// Create an inserter bound to the transaction open on `conn`.
    ///
    /// `batch_size` is the expected number of rows and only sizes the buffer.
    pub fn new(
        conn: &Connection,
        table: &str,
        columns: &[&str],
        batch_size: usize,
        policy: ConflictPolicy,
    ) -> Result<Self, BatchError> {
        if conn.is_autocommit() {
            return Err(BatchError::NoActiveTransaction);
        }
        if table.trim().is_empty() {
            return Err(BatchError::EmptyTableName);
        }
        if columns.is_empty() {
            return Err(BatchError::NoColumns);
        }
        if batch_size == 0 {
            return Err(BatchError::InvalidBatchSize);
        }

        Ok(Self {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            policy,
            values: Vec::with_capacity(batch_size.saturating_mul(columns.len())),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.values.len() / self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Buffer one row. The buffer is left untouched on an arity mismatch.
    pub fn add(&mut self, row: Vec<SqlValue>) -> Result<(), BatchError> {
        if row.len() != self.columns.len() {
            return Err(BatchError::ArityMismatch {
                expected: self.columns.len(),
                got: row.len(),
                columns: self.columns.join(", "),
            });
        }
        self.values.extend(row);
        Ok(())
    }

    /// Write all buffered rows of this table. Dependencies are not
    /// consulted here; use [`BatchSet::flush`] for ordered flushing.
    pub fn flush(&mut self, conn: &Connection) -> Result<(), BatchError> {
        if self.is_empty() {
            return Ok(());
        }
        self.cancel.check()?;

        let rows = self.len();
        let mut stmt = match conn.prepare(&self.multi_row_sql(rows)) {
            Ok(stmt) => stmt,
            Err(e) if is_too_many_variables(&e) => {
                log::info!(
                    "Batch of {} rows x {} columns for {} exceeds the SQLite variable limit, chunking",
                    rows,
                    self.columns.len(),
                    self.table
                );
                return self.flush_chunked(conn);
            }
            Err(e) => return Err(e.into()),
        };

        let result = stmt.execute(params_from_iter(self.values.iter()));
        drop(stmt);

        match result {
            Ok(_) => {
                self.values.clear();
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "Batch insert into {} failed ({} rows, {:?}): {}; falling back to single-row inserts",
                    self.table,
                    rows,
                    self.policy,
                    e
                );
                self.flush_single_row(conn)
            }
        }
    }

    /// Alias for [`flush`](Self::flush).
    pub fn close(&mut self, conn: &Connection) -> Result<(), BatchError> {
        self.flush(conn)
    }

    fn flush_chunked(&mut self, conn: &Connection) -> Result<(), BatchError> {
        let max_rows_per_chunk = SAFE_PARAMETER_LIMIT / self.columns.len();
        if max_rows_per_chunk == 0 {
            return self.flush_single_row(conn);
        }
        self.flush_in_chunks(conn, max_rows_per_chunk, |_| {})
    }

    /// Write the buffer `max_rows_per_chunk` rows at a time, calling
    /// `after_chunk` with the running row count after each chunk.
    ///
    /// On error the rows already written are dropped from the buffer and
    /// the rest stay for the caller to retry or discard.
    fn flush_in_chunks(
        &mut self,
        conn: &Connection,
        max_rows_per_chunk: usize,
        mut after_chunk: impl FnMut(usize),
    ) -> Result<(), BatchError> {
        let column_count = self.columns.len();
        let total = self.len();
        let mut done = 0;
        while done < total {
            if let Err(e) = self.cancel.check() {
                // Executed chunks belong to the open transaction now.
                self.values.drain(..done * column_count);
                return Err(e.into());
            }

            let chunk_rows = (total - done).min(max_rows_per_chunk);
            let start = done * column_count;
            let end = start + chunk_rows * column_count;
            if let Err(e) = self.execute_chunk(conn, chunk_rows, start, end) {
                self.values.drain(..start);
                return Err(e);
            }
            done += chunk_rows;

            log::debug!(
                "Flushed chunk of {} rows into {} ({} remaining)",
                chunk_rows,
                self.table,
                total - done
            );
            after_chunk(done);
        }

        self.values.clear();
        Ok(())
    }

    fn execute_chunk(
        &self,
        conn: &Connection,
        rows: usize,
        start: usize,
        end: usize,
    ) -> Result<(), BatchError> {
        let mut stmt = conn.prepare(&self.multi_row_sql(rows))?;
        stmt.execute(params_from_iter(self.values[start..end].iter()))
            .map_err(|e| {
                log::error!("Chunked insert of {} rows into {} failed: {}", rows, self.table, e);
                e
            })?;
        Ok(())
    }

    fn flush_single_row(&mut self, conn: &Connection) -> Result<(), BatchError> {
        let mut stmt = conn.prepare(&self.single_row_sql())?;
        let column_count = self.columns.len();
        let total = self.len();
        let mut skipped = 0;

        for row in 0..total {
            if let Err(e) = self.cancel.check() {
                drop(stmt);
                self.values.drain(..row * column_count);
                return Err(e.into());
            }
            let values = &self.values[row * column_count..(row + 1) * column_count];
            if let Err(e) = stmt.execute(params_from_iter(values.iter())) {
                log::error!("Failed to insert row {} into {} in fallback mode: {}", row, self.table, e);
                skipped += 1;
            }
        }
        drop(stmt);

        if skipped > 0 {
            log::warn!("Skipped {} of {} rows for {}", skipped, total, self.table);
        }
        self.values.clear();
        Ok(())
    }

    fn multi_row_sql(&self, rows: usize) -> String {
        let row = format!("({})", vec!["?"; self.columns.len()].join(", "));
        format!(
            "{} INTO {} ({}) VALUES\n    {}",
            self.policy.insert_keyword(),
            self.table,
            self.columns.join(", "),
            vec![row.as_str(); rows].join(",\n    ")
        )
    }

    fn single_row_sql(&self) -> String {
        self.multi_row_sql(1)
    }
}

fn is_too_many_variables(err: &rusqlite::Error) -> bool {
    err.to_string().contains(TOO_MANY_VARIABLES)
}

// ── BatchSet ────────────────────────────────────────────────────────────────

/// Handle to an inserter registered in a [`BatchSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InserterId(usize);

/// A group of inserters plus the parent lists that order their flushes.
///
/// The dependency graph is kept acyclic: a declaration that would close a
/// cycle is rejected and the previous parent list is kept.
#[derive(Debug, Default)]
pub struct BatchSet {
    inserters: Vec<BatchInserter>,
    dependencies: Vec<Vec<InserterId>>,
}

impl BatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, inserter: BatchInserter) -> InserterId {
        self.inserters.push(inserter);
        self.dependencies.push(Vec::new());
        InserterId(self.inserters.len() - 1)
    }

    pub fn get(&self, id: InserterId) -> Result<&BatchInserter, BatchError> {
        self.inserters.get(id.0).ok_or(BatchError::UnknownInserter(id))
    }

    pub fn add(&mut self, id: InserterId, row: Vec<SqlValue>) -> Result<(), BatchError> {
        self.inserters
            .get_mut(id.0)
            .ok_or(BatchError::UnknownInserter(id))?
            .add(row)
    }

    /// Declare the inserters that must be flushed, in this order, before `child`.
    pub fn set_dependencies(
        &mut self,
        child: InserterId,
        parents: &[InserterId],
    ) -> Result<(), BatchError> {
        let child_table = self.get(child)?.table().to_string();
        for &parent in parents {
            self.get(parent)?;
        }

        let previous = std::mem::replace(&mut self.dependencies[child.0], parents.to_vec());
        let mut visited = HashSet::new();
        if parents
            .iter()
            .any(|&parent| self.reaches(parent, child, &mut visited))
        {
            self.dependencies[child.0] = previous;
            return Err(BatchError::DependencyCycle { table: child_table });
        }
        Ok(())
    }

    pub fn dependencies(&self, id: InserterId) -> &[InserterId] {
        self.dependencies.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    fn reaches(&self, from: InserterId, target: InserterId, visited: &mut HashSet<usize>) -> bool {
        if from == target {
            return true;
        }
        if !visited.insert(from.0) {
            return false;
        }
        self.dependencies[from.0]
            .iter()
            .any(|&next| self.reaches(next, target, visited))
    }

    /// Flush `id`, flushing its declared parents first. No-op when `id`
    /// has nothing buffered.
    pub fn flush(&mut self, conn: &Connection, id: InserterId) -> Result<(), BatchError> {
        if self.get(id)?.is_empty() {
            return Ok(());
        }

        let parents = self.dependencies[id.0].clone();
        for parent in parents {
            log::debug!(
                "Flushing dependency {} before {}",
                self.inserters[parent.0].table(),
                self.inserters[id.0].table()
            );
            self.flush(conn, parent)?;
        }

        self.inserters[id.0].flush(conn)
    }

    /// Flush every inserter, in registration order, each after its parents.
    pub fn flush_all(&mut self, conn: &Connection) -> Result<(), BatchError> {
        for index in 0..self.inserters.len() {
            self.flush(conn, InserterId(index))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_in_tx() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER, b TEXT); BEGIN;")
            .unwrap();
        conn
    }

    #[test]
    fn multi_row_sql_shape() {
        let conn = conn_in_tx();
        let ins = BatchInserter::new(&conn, "t", &["a", "b"], 10, ConflictPolicy::Ignore).unwrap();
        assert_eq!(
            ins.multi_row_sql(2),
            "INSERT OR IGNORE INTO t (a, b) VALUES\n    (?, ?),\n    (?, ?)"
        );
        assert_eq!(ins.single_row_sql(), "INSERT OR IGNORE INTO t (a, b) VALUES\n    (?, ?)");
    }

    #[test]
    fn construction_checks() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            BatchInserter::new(&conn, "t", &["a"], 1, ConflictPolicy::Fail),
            Err(BatchError::NoActiveTransaction)
        ));

        let conn = conn_in_tx();
        assert!(matches!(
            BatchInserter::new(&conn, " ", &["a"], 1, ConflictPolicy::Fail),
            Err(BatchError::EmptyTableName)
        ));
        assert!(matches!(
            BatchInserter::new(&conn, "t", &[], 1, ConflictPolicy::Fail),
            Err(BatchError::NoColumns)
        ));
        assert!(matches!(
            BatchInserter::new(&conn, "t", &["a"], 0, ConflictPolicy::Fail),
            Err(BatchError::InvalidBatchSize)
        ));
    }

    #[test]
    fn arity_mismatch_leaves_buffer() {
        let conn = conn_in_tx();
        let mut ins = BatchInserter::new(&conn, "t", &["a", "b"], 10, ConflictPolicy::Fail).unwrap();
        ins.add(vec![SqlValue::Integer(1), "x".into()]).unwrap();
        let err = ins.add(vec![SqlValue::Integer(2)]).unwrap_err();
        assert_eq!(err.to_string(), "expected 2 values for columns [a, b], got 1");
        assert_eq!(ins.len(), 1);
    }

    fn rows_in(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn fill(ins: &mut BatchInserter, rows: i64) {
        for i in 0..rows {
            ins.add(vec![SqlValue::Integer(i), format!("row {i}").into()]).unwrap();
        }
    }

    #[test]
    fn cancel_between_chunks_keeps_written_chunks() {
        let conn = conn_in_tx();
        let cancel = CancelToken::new();
        let mut ins = BatchInserter::new(&conn, "t", &["a", "b"], 10, ConflictPolicy::Fail)
            .unwrap()
            .with_cancel(cancel.clone());
        fill(&mut ins, 10);

        let err = ins
            .flush_in_chunks(&conn, 4, |written| {
                if written == 4 {
                    cancel.cancel();
                }
            })
            .unwrap_err();

        assert!(matches!(err, BatchError::Interrupted(Interrupted::Cancelled)));
        assert_eq!(rows_in(&conn, "t"), 4);
        assert_eq!(ins.len(), 6);
        assert_eq!(ins.values[0], SqlValue::Integer(4));
    }

    #[test]
    fn failed_chunk_keeps_unwritten_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE u (a INTEGER UNIQUE, b TEXT); BEGIN;")
            .unwrap();
        let mut ins = BatchInserter::new(&conn, "u", &["a", "b"], 10, ConflictPolicy::Fail).unwrap();
        fill(&mut ins, 4);
        // Collides with row 0 from the first chunk.
        ins.add(vec![SqlValue::Integer(0), "again".into()]).unwrap();

        let mut chunks = 0;
        let err = ins.flush_in_chunks(&conn, 4, |_| chunks += 1).unwrap_err();

        assert!(matches!(err, BatchError::Sqlite(_)));
        assert_eq!(chunks, 1);
        assert_eq!(rows_in(&conn, "u"), 4);
        assert_eq!(ins.len(), 1);
    }

    #[test]
    fn chunked_flush_writes_everything() {
        let conn = conn_in_tx();
        let mut ins = BatchInserter::new(&conn, "t", &["a", "b"], 10, ConflictPolicy::Fail).unwrap();
        fill(&mut ins, 10);

        let mut chunks = 0;
        ins.flush_in_chunks(&conn, 4, |_| chunks += 1).unwrap();

        assert_eq!(chunks, 3);
        assert_eq!(rows_in(&conn, "t"), 10);
        assert!(ins.is_empty());
    }

    #[test]
    fn too_many_variables_detection() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some("too many SQL variables".to_string()),
        );
        assert!(is_too_many_variables(&err));
        assert!(!is_too_many_variables(&rusqlite::Error::QueryReturnedNoRows));
    }
}
