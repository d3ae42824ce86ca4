//! Single-writer transactions.
//!
//! At most one transaction is active at a time. `begin_transaction` claims
//! the slot with a compare-and-set and fails fast with
//! `TransactionInProgress` instead of waiting. Write pragmas are applied
//! before `BEGIN` and the defaults restored after the transaction ends.
//! Caches are invalidated once per successful commit, never on rollback.

use std::sync::atomic::Ordering;

use retro_index_core::{Media, MediaTag, MediaTitle, System, Tag, TagType};
use rusqlite::Connection;

use crate::batch::{BatchError, BatchInserter, BatchSet, ConflictPolicy, InserterId};
use crate::cache::{invalidate_caches, CacheScope};
use crate::cancel::CancelToken;
use crate::db::{lock, MediaDb};
use crate::error::DbError;
use crate::operations::{
    media_row, media_tag_row, media_title_row, system_row, tag_row, tag_type_row, MEDIA_COLUMNS,
    MEDIA_TAG_COLUMNS, MEDIA_TITLE_COLUMNS, SYSTEM_COLUMNS, TAG_COLUMNS, TAG_TYPE_COLUMNS,
};

// ── Catalog batch ───────────────────────────────────────────────────────────

/// Inserters for all six catalog tables, wired so parents always flush
/// before the rows that reference them.
#[derive(Debug)]
pub struct CatalogBatch {
    set: BatchSet,
    systems: InserterId,
    media_titles: InserterId,
    media: InserterId,
    tag_types: InserterId,
    tags: InserterId,
    media_tags: InserterId,
}

impl CatalogBatch {
    pub fn new(conn: &Connection, batch_size: usize, cancel: &CancelToken) -> Result<Self, BatchError> {
        let mut set = BatchSet::new();
        let mut register = |table: &str, columns: &[&str], policy: ConflictPolicy| {
            BatchInserter::new(conn, table, columns, batch_size, policy)
                .map(|inserter| set.register(inserter.with_cancel(cancel.clone())))
        };

        let systems = register("Systems", SYSTEM_COLUMNS, ConflictPolicy::Fail)?;
        let media_titles = register("MediaTitles", MEDIA_TITLE_COLUMNS, ConflictPolicy::Fail)?;
        let media = register("Media", MEDIA_COLUMNS, ConflictPolicy::Fail)?;
        let tag_types = register("TagTypes", TAG_TYPE_COLUMNS, ConflictPolicy::Fail)?;
        let tags = register("Tags", TAG_COLUMNS, ConflictPolicy::Fail)?;
        let media_tags = register("MediaTags", MEDIA_TAG_COLUMNS, ConflictPolicy::Ignore)?;

        set.set_dependencies(media_titles, &[systems])?;
        set.set_dependencies(tags, &[tag_types])?;
        set.set_dependencies(media, &[media_titles])?;
        set.set_dependencies(media_tags, &[media, tags])?;

        Ok(Self {
            set,
            systems,
            media_titles,
            media,
            tag_types,
            tags,
            media_tags,
        })
    }

    pub fn add_system(&mut self, row: &System) -> Result<(), BatchError> {
        self.set.add(self.systems, system_row(row))
    }

    pub fn add_media_title(&mut self, row: &MediaTitle) -> Result<(), BatchError> {
        self.set.add(self.media_titles, media_title_row(row))
    }

    pub fn add_media(&mut self, row: &Media) -> Result<(), BatchError> {
        self.set.add(self.media, media_row(row))
    }

    pub fn add_tag_type(&mut self, row: &TagType) -> Result<(), BatchError> {
        self.set.add(self.tag_types, tag_type_row(row))
    }

    pub fn add_tag(&mut self, row: &Tag) -> Result<(), BatchError> {
        self.set.add(self.tags, tag_row(row))
    }

    pub fn add_media_tag(&mut self, row: &MediaTag) -> Result<(), BatchError> {
        self.set.add(self.media_tags, media_tag_row(row))
    }

    /// Rows buffered across all tables.
    pub fn pending(&self) -> usize {
        [
            self.systems,
            self.media_titles,
            self.media,
            self.tag_types,
            self.tags,
            self.media_tags,
        ]
        .iter()
        .filter_map(|&id| self.set.get(id).ok())
        .map(BatchInserter::len)
        .sum()
    }

    pub fn flush_all(&mut self, conn: &Connection) -> Result<(), BatchError> {
        self.set.flush_all(conn)
    }
}

// ── MediaDb facade ──────────────────────────────────────────────────────────

impl MediaDb {
    /// Start the single write transaction. With `batch`, catalog inserts
    /// are buffered until commit.
    pub fn begin_transaction(&self, batch: bool) -> Result<(), DbError> {
        self.check()?;
        if self
            .in_transaction
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Rejected begin: transaction already in progress");
            return Err(DbError::TransactionInProgress);
        }

        match self.begin_locked(batch) {
            Ok(()) => {
                log::info!("Began {} transaction", if batch { "batch" } else { "write" });
                Ok(())
            }
            Err(e) => {
                self.in_transaction.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn begin_locked(&self, batch_mode: bool) -> Result<(), DbError> {
        let mut batch = lock(&self.batch)?;
        let conn = self.writer()?;

        conn.execute_batch(&self.config.pragmas.write.to_sql())?;
        if let Err(e) = conn.execute_batch("BEGIN IMMEDIATE") {
            self.restore_pragmas(&conn);
            return Err(e.into());
        }

        if batch_mode {
            match CatalogBatch::new(&conn, self.config.batch_size, &self.cancel) {
                Ok(catalog_batch) => *batch = Some(catalog_batch),
                Err(e) => {
                    if let Err(rb) = conn.execute_batch("ROLLBACK") {
                        log::warn!("Failed to roll back after batch setup error: {}", rb);
                    }
                    self.restore_pragmas(&conn);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Flush buffered rows and commit. No-op without an active transaction.
    ///
    /// If a flush fails the transaction stays active and the caller should
    /// roll it back.
    pub fn commit_transaction(&self) -> Result<(), DbError> {
        if !self.in_transaction() {
            return Ok(());
        }
        self.check()?;

        let mut batch = lock(&self.batch)?;
        let conn = self.writer()?;

        if let Some(catalog_batch) = batch.as_mut() {
            log::debug!("Flushing {} buffered rows before commit", catalog_batch.pending());
            catalog_batch.flush_all(&conn)?;
        }

        if let Err(commit) = conn.execute_batch("COMMIT") {
            log::error!("Commit failed: {}", commit);
            let rollback = if conn.is_autocommit() {
                Ok(())
            } else {
                conn.execute_batch("ROLLBACK")
            };
            if conn.is_autocommit() {
                *batch = None;
                self.restore_pragmas(&conn);
                self.in_transaction.store(false, Ordering::Release);
            }
            return Err(match rollback {
                Ok(()) => commit.into(),
                Err(rollback) => DbError::CommitFailed { commit, rollback },
            });
        }

        *batch = None;
        self.in_transaction.store(false, Ordering::Release);
        log::info!("Committed transaction");

        if let Err(e) = invalidate_caches(&conn, &CacheScope::AllSystems) {
            log::error!("Failed to invalidate caches after commit: {}", e);
        }
        self.restore_pragmas(&conn);
        if self.config.checkpoint_after_commit {
            if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)") {
                log::warn!("WAL checkpoint after commit failed: {}", e);
            }
        }
        Ok(())
    }

    /// Discard the active transaction and any buffered rows. No-op without
    /// an active transaction. Caches are left untouched.
    pub fn rollback_transaction(&self) -> Result<(), DbError> {
        if !self.in_transaction() {
            return Ok(());
        }

        let mut batch = lock(&self.batch)?;
        let conn = self.writer()?;
        *batch = None;

        let result = if conn.is_autocommit() {
            Ok(())
        } else {
            conn.execute_batch("ROLLBACK")
        };
        self.restore_pragmas(&conn);
        self.in_transaction.store(false, Ordering::Release);
        log::info!("Rolled back transaction");
        result.map_err(Into::into)
    }

    fn restore_pragmas(&self, conn: &Connection) {
        if let Err(e) = conn.execute_batch(&self.config.pragmas.default.to_sql()) {
            log::warn!("Failed to restore default pragmas: {}", e);
        }
    }
}
