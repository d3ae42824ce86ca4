//! Slug resolution cache: remembers which media a (system, slug, tags)
//! lookup resolved to, and by which strategy.

use retro_index_core::TagFilter;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::db::MediaDb;
use crate::error::DbError;
use crate::sql::placeholders;

/// A cached resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugResolution {
    pub media_dbid: i64,
    pub strategy: String,
}

#[derive(Serialize)]
struct CacheKeyInput<'a> {
    #[serde(rename = "systemId")]
    system_id: String,
    slug: String,
    tags: Vec<&'a TagFilter>,
}

/// System id as stored in the `SystemID` column and hashed into the key.
fn normalize_system_id(system_id: &str) -> String {
    system_id.trim().to_lowercase()
}

/// Stable key for a lookup: SHA-256 hex of the normalized inputs.
///
/// System id and slug are trimmed and lowercased; tag filters are sorted by
/// type, value, then operator so their order does not matter.
pub fn slug_cache_key(system_id: &str, slug: &str, tags: &[TagFilter]) -> Result<String, DbError> {
    let mut sorted: Vec<&TagFilter> = tags.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.tag_type, &a.value, a.operator).cmp(&(&b.tag_type, &b.value, b.operator))
    });

    let input = CacheKeyInput {
        system_id: normalize_system_id(system_id),
        slug: slug.trim().to_lowercase(),
        tags: sorted,
    };
    let bytes = serde_json::to_vec(&input)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

pub fn get_cached_slug_resolution(
    conn: &Connection,
    system_id: &str,
    slug: &str,
    tags: &[TagFilter],
) -> Result<Option<SlugResolution>, DbError> {
    let key = slug_cache_key(system_id, slug, tags)?;
    let result = conn.query_row(
        "SELECT MediaDBID, Strategy FROM SlugResolutionCache WHERE CacheKey = ?1",
        params![key],
        |row| {
            Ok(SlugResolution {
                media_dbid: row.get(0)?,
                strategy: row.get(1)?,
            })
        },
    );
    match result {
        Ok(hit) => {
            log::debug!(
                "Slug cache hit for {}/{}: media {} via {}",
                system_id,
                slug,
                hit.media_dbid,
                hit.strategy
            );
            Ok(Some(hit))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn set_cached_slug_resolution(
    conn: &Connection,
    system_id: &str,
    slug: &str,
    tags: &[TagFilter],
    media_dbid: i64,
    strategy: &str,
) -> Result<(), DbError> {
    let key = slug_cache_key(system_id, slug, tags)?;
    let tags_json = serde_json::to_string(tags)?;
    conn.execute(
        "INSERT OR REPLACE INTO SlugResolutionCache
             (CacheKey, SystemID, Slug, TagFilters, MediaDBID, Strategy, LastUpdated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, strftime('%s', 'now'))",
        params![key, normalize_system_id(system_id), slug, tags_json, media_dbid, strategy],
    )?;
    log::debug!("Cached slug resolution {}/{} -> {} ({})", system_id, slug, media_dbid, strategy);
    Ok(())
}

pub fn invalidate_slug_cache(conn: &Connection) -> Result<usize, DbError> {
    let removed = conn.execute("DELETE FROM SlugResolutionCache", [])?;
    Ok(removed)
}

/// Remove entries for the given systems only. Empty input is a no-op.
pub fn invalidate_slug_cache_for_systems(
    conn: &Connection,
    system_ids: &[String],
) -> Result<usize, DbError> {
    if system_ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM SlugResolutionCache WHERE SystemID IN ({})",
        placeholders(system_ids.len())
    );
    let removed = conn.execute(
        &sql,
        params_from_iter(system_ids.iter().map(|id| normalize_system_id(id))),
    )?;
    Ok(removed)
}

// ── MediaDb facade ──────────────────────────────────────────────────────────

impl MediaDb {
    pub fn get_cached_slug_resolution(
        &self,
        system_id: &str,
        slug: &str,
        tags: &[TagFilter],
    ) -> Result<Option<SlugResolution>, DbError> {
        self.check()?;
        let conn = self.reader()?;
        get_cached_slug_resolution(&conn, system_id, slug, tags)
    }

    /// Remember a resolution. Skipped while a transaction is active.
    pub fn set_cached_slug_resolution(
        &self,
        system_id: &str,
        slug: &str,
        tags: &[TagFilter],
        media_dbid: i64,
        strategy: &str,
    ) -> Result<(), DbError> {
        self.check()?;
        if self.skip_cache_write("slug resolution") {
            return Ok(());
        }
        let conn = self.writer()?;
        set_cached_slug_resolution(&conn, system_id, slug, tags, media_dbid, strategy)
    }

    pub fn invalidate_slug_cache(&self) -> Result<usize, DbError> {
        self.check()?;
        let conn = self.writer()?;
        invalidate_slug_cache(&conn)
    }

    pub fn invalidate_slug_cache_for_systems(&self, system_ids: &[String]) -> Result<usize, DbError> {
        self.check()?;
        let conn = self.writer()?;
        invalidate_slug_cache_for_systems(&conn, system_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retro_index_core::TagOperator;

    #[test]
    fn key_ignores_case_whitespace_and_tag_order() {
        let a = vec![
            TagFilter::new("region", "usa", TagOperator::And),
            TagFilter::new("lang", "en", TagOperator::Or),
        ];
        let b = vec![a[1].clone(), a[0].clone()];
        assert_eq!(
            slug_cache_key(" NES ", "SuperMario", &a).unwrap(),
            slug_cache_key("nes", "supermario", &b).unwrap()
        );
    }

    #[test]
    fn key_distinguishes_inputs() {
        let base = slug_cache_key("nes", "mario", &[]).unwrap();
        assert_eq!(base.len(), 64);
        assert_ne!(base, slug_cache_key("snes", "mario", &[]).unwrap());
        assert_ne!(
            base,
            slug_cache_key("nes", "mario", &[TagFilter::new("region", "usa", TagOperator::Not)])
                .unwrap()
        );
        assert_ne!(
            slug_cache_key("nes", "mario", &[TagFilter::new("region", "usa", TagOperator::And)])
                .unwrap(),
            slug_cache_key("nes", "mario", &[TagFilter::new("region", "usa", TagOperator::Not)])
                .unwrap()
        );
    }
}
