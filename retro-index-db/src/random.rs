//! Random selection by id range.
//!
//! A random target id is drawn between the minimum and maximum matching
//! ids, and the nearest matching row at or above it is returned, wrapping
//! downward when the target falls past the last row. Gaps left by deleted
//! rows make the pick slightly non-uniform; it never returns a row that no
//! longer matches.

use rand::Rng;
use retro_index_core::{filename_from_path, MediaQuery, SearchResult};
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::cache::query_stats::{self, MediaStats};
use crate::db::MediaDb;
use crate::error::DbError;
use crate::filter::{media_query_where, WhereClause};
use crate::value::SqlValue;

const MEDIA_JOIN: &str = "FROM Media
    INNER JOIN MediaTitles ON MediaTitles.DBID = Media.MediaTitleDBID
    INNER JOIN Systems ON Systems.DBID = MediaTitles.SystemDBID";

/// Count and id bounds of the media matching `filter`.
pub fn media_stats(conn: &Connection, filter: &WhereClause) -> Result<MediaStats, DbError> {
    let sql = format!(
        "SELECT COUNT(*), COALESCE(MIN(Media.DBID), 0), COALESCE(MAX(Media.DBID), 0) {MEDIA_JOIN} {}",
        filter.to_sql()
    );
    let stats = conn.query_row(&sql, params_from_iter(filter.params.iter()), |row| {
        Ok(MediaStats {
            count: row.get(0)?,
            min_dbid: row.get(1)?,
            max_dbid: row.get(2)?,
        })
    })?;
    Ok(stats)
}

/// Pick one matching row using precomputed `stats`.
pub fn pick_random(
    conn: &Connection,
    filter: &WhereClause,
    stats: &MediaStats,
) -> Result<SearchResult, DbError> {
    if stats.count == 0 {
        return Err(DbError::NotFound);
    }

    let span = (stats.max_dbid - stats.min_dbid).max(0);
    let target = stats.min_dbid + rand::thread_rng().gen_range(0..=span);

    let forward = filter.and("Media.DBID >= ?", SqlValue::Integer(target));
    if let Some(hit) = first_match(conn, &forward, "ASC")? {
        return Ok(hit);
    }

    let backward = filter.and("Media.DBID < ?", SqlValue::Integer(target));
    first_match(conn, &backward, "DESC")?.ok_or(DbError::NotFound)
}

fn first_match(
    conn: &Connection,
    filter: &WhereClause,
    order: &str,
) -> Result<Option<SearchResult>, DbError> {
    let sql = format!(
        "SELECT Systems.SystemID, Media.Path {MEDIA_JOIN} {} ORDER BY Media.DBID {order} LIMIT 1",
        filter.to_sql()
    );
    let row = conn
        .query_row(&sql, params_from_iter(filter.params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .optional()?;
    Ok(row.map(|(system_id, path)| SearchResult {
        system_id,
        name: filename_from_path(&path),
        path,
    }))
}

/// A random game from one system.
pub fn random_game(conn: &Connection, system_id: &str) -> Result<SearchResult, DbError> {
    let query = MediaQuery {
        systems: vec![system_id.to_string()],
        ..Default::default()
    };
    random_game_with_query_and_stats(conn, &query).map(|(game, _)| game)
}

/// A random game matching `query`, with the statistics computed for it so
/// the caller can cache them.
pub fn random_game_with_query_and_stats(
    conn: &Connection,
    query: &MediaQuery,
) -> Result<(SearchResult, MediaStats), DbError> {
    let filter = media_query_where(query);
    let stats = media_stats(conn, &filter)?;
    let game = pick_random(conn, &filter, &stats)?;
    Ok((game, stats))
}

// ── MediaDb facade ──────────────────────────────────────────────────────────

impl MediaDb {
    pub fn random_game(&self, system_id: &str) -> Result<SearchResult, DbError> {
        self.check()?;
        let conn = self.reader()?;
        random_game(&conn, system_id)
    }

    /// A random game matching `query`, reusing cached statistics when
    /// present and caching freshly computed ones.
    pub fn random_game_with_query(&self, query: &MediaQuery) -> Result<SearchResult, DbError> {
        self.check()?;
        let filter = media_query_where(query);

        let cached = {
            let conn = self.reader()?;
            query_stats::get_cached_stats(&conn, query)
        };
        let stats = match cached {
            Ok(Some(stats)) => {
                log::debug!("Using cached media stats: {:?}", stats);
                stats
            }
            Ok(None) => self.compute_and_cache_stats(query, &filter)?,
            Err(e) => {
                log::warn!("Failed to read cached media stats: {}", e);
                self.compute_and_cache_stats(query, &filter)?
            }
        };

        let conn = self.reader()?;
        pick_random(&conn, &filter, &stats)
    }

    /// Compute stats for `query` and cache them.
    ///
    /// Counting and storing share one writer guard: a commit invalidates
    /// under the same lock, so stats read before it cannot land after it.
    fn compute_and_cache_stats(&self, query: &MediaQuery, filter: &WhereClause) -> Result<MediaStats, DbError> {
        if !self.skip_cache_write("query stats") {
            let conn = self.writer()?;
            if !self.in_transaction() {
                let stats = media_stats(&conn, filter)?;
                if let Err(e) = query_stats::set_cached_stats(&conn, query, &stats) {
                    log::warn!("Failed to cache media stats: {}", e);
                }
                return Ok(stats);
            }
        }
        let conn = self.reader()?;
        media_stats(&conn, filter)
    }

    /// A random game matching `query` plus the statistics it was drawn
    /// from. Bypasses the statistics cache.
    pub fn random_game_with_query_and_stats(
        &self,
        query: &MediaQuery,
    ) -> Result<(SearchResult, MediaStats), DbError> {
        self.check()?;
        let conn = self.reader()?;
        random_game_with_query_and_stats(&conn, query)
    }
}
