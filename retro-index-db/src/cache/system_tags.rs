//! Per-system tag sets, precomputed from the six-table join so tag listings
//! for a system do not have to walk every media row.

use retro_index_core::TagInfo;
use rusqlite::{params_from_iter, Connection};

use crate::db::MediaDb;
use crate::error::DbError;
use crate::queries;
use crate::sql::{placeholders, with_savepoint};

const TAGS_JOIN: &str = "
    SELECT DISTINCT Systems.DBID, Tags.DBID, TagTypes.Type, Tags.Tag
    FROM Systems
    INNER JOIN MediaTitles ON MediaTitles.SystemDBID = Systems.DBID
    INNER JOIN Media ON Media.MediaTitleDBID = MediaTitles.DBID
    INNER JOIN MediaTags ON MediaTags.MediaDBID = Media.DBID
    INNER JOIN Tags ON Tags.DBID = MediaTags.TagDBID
    INNER JOIN TagTypes ON TagTypes.DBID = Tags.TypeDBID";

/// Rebuild the whole cache from the base tables.
pub fn populate_system_tags_cache(conn: &Connection) -> Result<usize, DbError> {
    let inserted = with_savepoint(conn, "system_tags_populate", || {
        conn.execute("DELETE FROM SystemTagsCache", [])?;
        let sql = format!(
            "INSERT INTO SystemTagsCache (SystemDBID, TagDBID, TagType, Tag) {TAGS_JOIN}"
        );
        Ok(conn.execute(&sql, [])?)
    })?;
    log::info!("Populated system tags cache with {} entries", inserted);
    Ok(inserted)
}

/// Rebuild the cache rows of the given systems only. Unknown systems are
/// skipped.
pub fn populate_system_tags_cache_for_systems(
    conn: &Connection,
    system_ids: &[String],
) -> Result<usize, DbError> {
    let dbids = resolve_system_dbids(conn, system_ids)?;
    if dbids.is_empty() {
        return Ok(0);
    }

    let marks = placeholders(dbids.len());
    let inserted = with_savepoint(conn, "system_tags_populate", || {
        conn.execute(
            &format!("DELETE FROM SystemTagsCache WHERE SystemDBID IN ({marks})"),
            params_from_iter(dbids.iter()),
        )?;
        let sql = format!(
            "INSERT INTO SystemTagsCache (SystemDBID, TagDBID, TagType, Tag) {TAGS_JOIN} WHERE Systems.DBID IN ({marks})"
        );
        Ok(conn.execute(&sql, params_from_iter(dbids.iter()))?)
    })?;
    log::debug!("Populated {} system tag entries for {:?}", inserted, system_ids);
    Ok(inserted)
}

/// Distinct tags across the given systems, sorted by type then tag.
///
/// An empty system list is a caller error. Unknown systems are skipped, and
/// if none are known the result is empty.
pub fn get_system_tags_cached(
    conn: &Connection,
    system_ids: &[String],
) -> Result<Vec<TagInfo>, DbError> {
    if system_ids.is_empty() {
        return Err(DbError::NoSystems("cached tag search"));
    }
    let dbids = resolve_system_dbids(conn, system_ids)?;
    if dbids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT DISTINCT TagType, Tag FROM SystemTagsCache
         WHERE SystemDBID IN ({})
         ORDER BY TagType, Tag",
        placeholders(dbids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(dbids.iter()), |row| {
        Ok(TagInfo {
            tag_type: row.get(0)?,
            tag: row.get(1)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Drop the cache rows of the given systems. Empty input and unknown
/// systems are no-ops, not errors.
pub fn invalidate_system_tags_cache(conn: &Connection, system_ids: &[String]) -> Result<usize, DbError> {
    if system_ids.is_empty() {
        return Ok(0);
    }
    let dbids = resolve_system_dbids(conn, system_ids)?;
    if dbids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM SystemTagsCache WHERE SystemDBID IN ({})",
        placeholders(dbids.len())
    );
    Ok(conn.execute(&sql, params_from_iter(dbids.iter()))?)
}

pub fn invalidate_all_system_tags(conn: &Connection) -> Result<usize, DbError> {
    Ok(conn.execute("DELETE FROM SystemTagsCache", [])?)
}

// ── MediaDb facade ──────────────────────────────────────────────────────────

impl MediaDb {
    pub fn populate_system_tags_cache(&self) -> Result<usize, DbError> {
        self.check()?;
        let conn = self.writer()?;
        populate_system_tags_cache(&conn)
    }

    pub fn populate_system_tags_cache_for_systems(&self, system_ids: &[String]) -> Result<usize, DbError> {
        self.check()?;
        let conn = self.writer()?;
        populate_system_tags_cache_for_systems(&conn, system_ids)
    }

    pub fn get_system_tags_cached(&self, system_ids: &[String]) -> Result<Vec<TagInfo>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        get_system_tags_cached(&conn, system_ids)
    }

    pub fn invalidate_system_tags_cache(&self, system_ids: &[String]) -> Result<usize, DbError> {
        self.check()?;
        let conn = self.writer()?;
        invalidate_system_tags_cache(&conn, system_ids)
    }

    /// Tags for the given systems, served from the cache.
    ///
    /// An empty cache read is retried once after repopulating those systems
    /// (outside transactions only), and falls back to the direct join if the
    /// cache still has nothing.
    pub fn get_tags_for_systems(&self, system_ids: &[String]) -> Result<Vec<TagInfo>, DbError> {
        let cached = self.get_system_tags_cached(system_ids)?;
        if !cached.is_empty() {
            return Ok(cached);
        }

        if !self.skip_cache_write("system tags") {
            let populated = {
                let conn = self.writer()?;
                populate_system_tags_cache_for_systems(&conn, system_ids)
            };
            match populated {
                Ok(0) => {}
                Ok(_) => {
                    let cached = self.get_system_tags_cached(system_ids)?;
                    if !cached.is_empty() {
                        return Ok(cached);
                    }
                }
                Err(e) => log::warn!("Failed to populate system tags cache for {:?}: {}", system_ids, e),
            }
        }

        log::debug!("System tags cache empty for {:?}, querying tags directly", system_ids);
        let conn = self.reader()?;
        queries::get_tags(&conn, system_ids)
    }
}

fn resolve_system_dbids(conn: &Connection, system_ids: &[String]) -> Result<Vec<i64>, DbError> {
    if system_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT DBID FROM Systems WHERE SystemID IN ({})",
        placeholders(system_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(system_ids.iter()), |row| row.get(0))?;
    rows.collect::<Result<Vec<i64>, _>>().map_err(Into::into)
}
