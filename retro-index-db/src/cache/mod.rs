//! Derived caches over the catalog tables.
//!
//! All three caches are disposable: dropping any of them loses only speed.
//! Invalidation happens once per committed transaction, or right away for
//! writes made outside a transaction.

pub mod query_stats;
pub mod slug;
pub mod system_tags;

use rusqlite::Connection;

use crate::db::MediaDb;
use crate::error::DbError;

/// Which part of the catalog a write may have touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheScope {
    AllSystems,
    /// External system codes (`Systems.SystemID`).
    Systems(Vec<String>),
}

/// Drop every cache entry that could depend on `scope`.
///
/// Query statistics are always cleared; a count can span any systems.
pub fn invalidate_caches(conn: &Connection, scope: &CacheScope) -> Result<(), DbError> {
    query_stats::invalidate_count_cache(conn)?;
    match scope {
        CacheScope::AllSystems => {
            system_tags::invalidate_all_system_tags(conn)?;
            slug::invalidate_slug_cache(conn)?;
        }
        CacheScope::Systems(system_ids) => {
            system_tags::invalidate_system_tags_cache(conn, system_ids)?;
            slug::invalidate_slug_cache_for_systems(conn, system_ids)?;
        }
    }
    log::debug!("Invalidated caches for {:?}", scope);
    Ok(())
}

// ── MediaDb facade ──────────────────────────────────────────────────────────

impl MediaDb {
    /// Drop cache entries for `scope` on the writer.
    pub fn invalidate_caches(&self, scope: &CacheScope) -> Result<(), DbError> {
        self.check()?;
        let conn = self.writer()?;
        invalidate_caches(&conn, scope)
    }

    /// Cache writes made inside a transaction would be wiped by the commit.
    pub(crate) fn skip_cache_write(&self, what: &str) -> bool {
        if self.in_transaction() {
            log::debug!("Skipping {} cache write during transaction", what);
            return true;
        }
        false
    }
}
