//! Row count and id range per normalized media query, feeding range-based
//! random selection.

use retro_index_core::MediaQuery;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

use crate::db::MediaDb;
use crate::error::DbError;

/// Count and id bounds of the media matching a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaStats {
    pub count: i64,
    pub min_dbid: i64,
    pub max_dbid: i64,
}

/// Canonical form of a query: sorted systems, trimmed lowercase path
/// filters, tags sorted by type then value.
pub fn normalize_query(query: &MediaQuery) -> MediaQuery {
    let mut systems = query.systems.clone();
    systems.sort();
    let mut tags = query.tags.clone();
    tags.sort_by(|a, b| (&a.tag_type, &a.value).cmp(&(&b.tag_type, &b.value)));
    MediaQuery {
        systems,
        path_glob: query.path_glob.trim().to_lowercase(),
        path_prefix: query.path_prefix.trim().to_lowercase(),
        tags,
    }
}

/// SHA-256 hex of the normalized query's JSON.
pub fn query_fingerprint(query: &MediaQuery) -> Result<String, DbError> {
    let json = serde_json::to_vec(&normalize_query(query))?;
    Ok(format!("{:x}", Sha256::digest(&json)))
}

pub fn get_cached_stats(conn: &Connection, query: &MediaQuery) -> Result<Option<MediaStats>, DbError> {
    let hash = query_fingerprint(query)?;
    let result = conn.query_row(
        "SELECT Count, MinDBID, MaxDBID FROM MediaCountCache WHERE QueryHash = ?1",
        params![hash],
        |row| {
            Ok(MediaStats {
                count: row.get(0)?,
                min_dbid: row.get(1)?,
                max_dbid: row.get(2)?,
            })
        },
    );
    match result {
        Ok(stats) => Ok(Some(stats)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn set_cached_stats(conn: &Connection, query: &MediaQuery, stats: &MediaStats) -> Result<(), DbError> {
    let normalized = normalize_query(query);
    let params_json = serde_json::to_string(&normalized)?;
    let hash = query_fingerprint(query)?;
    conn.execute(
        "INSERT OR REPLACE INTO MediaCountCache
             (QueryHash, QueryParams, Count, MinDBID, MaxDBID, LastUpdated)
         VALUES (?1, ?2, ?3, ?4, ?5, strftime('%s', 'now'))",
        params![hash, params_json, stats.count, stats.min_dbid, stats.max_dbid],
    )?;
    Ok(())
}

pub fn invalidate_count_cache(conn: &Connection) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM MediaCountCache", [])?)
}

// ── MediaDb facade ──────────────────────────────────────────────────────────

impl MediaDb {
    pub fn get_cached_stats(&self, query: &MediaQuery) -> Result<Option<MediaStats>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        get_cached_stats(&conn, query)
    }

    /// Store stats for `query`. Skipped while a transaction is active.
    pub fn set_cached_stats(&self, query: &MediaQuery, stats: &MediaStats) -> Result<(), DbError> {
        self.check()?;
        if self.skip_cache_write("query stats") {
            return Ok(());
        }
        let conn = self.writer()?;
        set_cached_stats(&conn, query, stats)
    }

    pub fn invalidate_count_cache(&self) -> Result<usize, DbError> {
        self.check()?;
        let conn = self.writer()?;
        invalidate_count_cache(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_index_core::{TagFilter, TagOperator};

    #[test]
    fn fingerprint_is_order_and_case_insensitive() {
        let a = MediaQuery {
            systems: vec!["SNES".into(), "NES".into()],
            path_glob: " *Mario* ".into(),
            path_prefix: String::new(),
            tags: vec![
                TagFilter::new("region", "usa", TagOperator::And),
                TagFilter::new("lang", "en", TagOperator::And),
            ],
        };
        let b = MediaQuery {
            systems: vec!["NES".into(), "SNES".into()],
            path_glob: "*mario*".into(),
            path_prefix: String::new(),
            tags: vec![
                TagFilter::new("lang", "en", TagOperator::And),
                TagFilter::new("region", "usa", TagOperator::And),
            ],
        };
        assert_eq!(query_fingerprint(&a).unwrap(), query_fingerprint(&b).unwrap());
    }

    #[test]
    fn fingerprint_separates_systems() {
        let nes = MediaQuery {
            systems: vec!["NES".into()],
            ..Default::default()
        };
        let snes = MediaQuery {
            systems: vec!["SNES".into()],
            ..Default::default()
        };
        assert_ne!(query_fingerprint(&nes).unwrap(), query_fingerprint(&snes).unwrap());
    }
}
