//! Read queries for catalog listings, tags and counts.

use retro_index_core::{Media, MediaTitle, System, Tag, TagInfo, TagType};
use rusqlite::{params_from_iter, Connection, Row};

use crate::db::MediaDb;
use crate::error::DbError;
use crate::operations::{
    list, row_to_media, row_to_media_title, row_to_system, row_to_tag, row_to_tag_type,
    MEDIA_SELECT, MEDIA_TITLE_SELECT, SYSTEM_SELECT, TAG_SELECT, TAG_TYPE_SELECT,
};
use crate::sql::placeholders;

// ── Listings ────────────────────────────────────────────────────────────────

pub fn get_all_systems(conn: &Connection) -> Result<Vec<System>, DbError> {
    list(conn, &format!("{SYSTEM_SELECT} ORDER BY DBID"), row_to_system)
}

pub fn get_all_media_titles(conn: &Connection) -> Result<Vec<MediaTitle>, DbError> {
    list(conn, &format!("{MEDIA_TITLE_SELECT} ORDER BY DBID"), row_to_media_title)
}

pub fn get_all_media(conn: &Connection) -> Result<Vec<Media>, DbError> {
    list(conn, &format!("{MEDIA_SELECT} ORDER BY DBID"), row_to_media)
}

pub fn get_all_tag_types(conn: &Connection) -> Result<Vec<TagType>, DbError> {
    list(conn, &format!("{TAG_TYPE_SELECT} ORDER BY DBID"), row_to_tag_type)
}

pub fn get_all_tags(conn: &Connection) -> Result<Vec<Tag>, DbError> {
    list(conn, &format!("{TAG_SELECT} ORDER BY DBID"), row_to_tag)
}

// ── Tags ────────────────────────────────────────────────────────────────────

fn row_to_tag_info(row: &Row) -> rusqlite::Result<TagInfo> {
    Ok(TagInfo {
        tag_type: row.get(0)?,
        tag: row.get(1)?,
    })
}

/// Every tag linked to at least one media row, sorted by type then tag.
pub fn get_all_used_tags(conn: &Connection) -> Result<Vec<TagInfo>, DbError> {
    list(
        conn,
        "SELECT TagTypes.Type, Tags.Tag
         FROM Tags
         INNER JOIN TagTypes ON TagTypes.DBID = Tags.TypeDBID
         WHERE EXISTS (SELECT 1 FROM MediaTags WHERE MediaTags.TagDBID = Tags.DBID)
         ORDER BY TagTypes.Type, Tags.Tag",
        row_to_tag_info,
    )
}

/// Distinct tags used by media of the given systems, computed from the base
/// tables rather than the system tags cache.
pub fn get_tags(conn: &Connection, system_ids: &[String]) -> Result<Vec<TagInfo>, DbError> {
    if system_ids.is_empty() {
        return Err(DbError::NoSystems("tag search"));
    }
    let sql = format!(
        "SELECT DISTINCT TagTypes.Type, Tags.Tag
         FROM Systems
         INNER JOIN MediaTitles ON MediaTitles.SystemDBID = Systems.DBID
         INNER JOIN Media ON Media.MediaTitleDBID = MediaTitles.DBID
         INNER JOIN MediaTags ON MediaTags.MediaDBID = Media.DBID
         INNER JOIN Tags ON Tags.DBID = MediaTags.TagDBID
         INNER JOIN TagTypes ON TagTypes.DBID = Tags.TypeDBID
         WHERE Systems.SystemID IN ({})
         ORDER BY TagTypes.Type, Tags.Tag",
        placeholders(system_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(system_ids.iter()), row_to_tag_info)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

// ── Counts ──────────────────────────────────────────────────────────────────

fn max_dbid(conn: &Connection, table: &str) -> Result<i64, DbError> {
    let max = conn.query_row(&format!("SELECT COALESCE(MAX(DBID), 0) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(max)
}

pub fn get_max_system_id(conn: &Connection) -> Result<i64, DbError> {
    max_dbid(conn, "Systems")
}

pub fn get_max_media_title_id(conn: &Connection) -> Result<i64, DbError> {
    max_dbid(conn, "MediaTitles")
}

pub fn get_max_media_id(conn: &Connection) -> Result<i64, DbError> {
    max_dbid(conn, "Media")
}

pub fn get_max_tag_type_id(conn: &Connection) -> Result<i64, DbError> {
    max_dbid(conn, "TagTypes")
}

pub fn get_max_tag_id(conn: &Connection) -> Result<i64, DbError> {
    max_dbid(conn, "Tags")
}

pub fn get_total_media_count(conn: &Connection) -> Result<i64, DbError> {
    let count = conn.query_row("SELECT COUNT(*) FROM Media", [], |row| row.get(0))?;
    Ok(count)
}

/// SystemIDs of every system with a `Systems` row.
pub fn indexed_systems(conn: &Connection) -> Result<Vec<String>, DbError> {
    list(conn, "SELECT SystemID FROM Systems ORDER BY SystemID", |row| row.get(0))
}

pub fn system_indexed(conn: &Connection, system_id: &str) -> Result<bool, DbError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM Systems WHERE SystemID = ?1)",
        [system_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

// ── MediaDb facade ──────────────────────────────────────────────────────────

impl MediaDb {
    fn read_with<T>(&self, query: impl FnOnce(&Connection) -> Result<T, DbError>) -> Result<T, DbError> {
        self.check()?;
        let conn = self.reader()?;
        query(&conn)
    }

    pub fn get_all_systems(&self) -> Result<Vec<System>, DbError> {
        self.read_with(get_all_systems)
    }

    pub fn get_all_media_titles(&self) -> Result<Vec<MediaTitle>, DbError> {
        self.read_with(get_all_media_titles)
    }

    pub fn get_all_media(&self) -> Result<Vec<Media>, DbError> {
        self.read_with(get_all_media)
    }

    pub fn get_all_tag_types(&self) -> Result<Vec<TagType>, DbError> {
        self.read_with(get_all_tag_types)
    }

    pub fn get_all_tags(&self) -> Result<Vec<Tag>, DbError> {
        self.read_with(get_all_tags)
    }

    pub fn get_all_used_tags(&self) -> Result<Vec<TagInfo>, DbError> {
        self.read_with(get_all_used_tags)
    }

    pub fn get_tags(&self, system_ids: &[String]) -> Result<Vec<TagInfo>, DbError> {
        self.read_with(|conn| get_tags(conn, system_ids))
    }

    pub fn get_max_system_id(&self) -> Result<i64, DbError> {
        self.read_with(get_max_system_id)
    }

    pub fn get_max_media_title_id(&self) -> Result<i64, DbError> {
        self.read_with(get_max_media_title_id)
    }

    pub fn get_max_media_id(&self) -> Result<i64, DbError> {
        self.read_with(get_max_media_id)
    }

    pub fn get_max_tag_type_id(&self) -> Result<i64, DbError> {
        self.read_with(get_max_tag_type_id)
    }

    pub fn get_max_tag_id(&self) -> Result<i64, DbError> {
        self.read_with(get_max_tag_id)
    }

    pub fn get_total_media_count(&self) -> Result<i64, DbError> {
        self.read_with(get_total_media_count)
    }

    pub fn indexed_systems(&self) -> Result<Vec<String>, DbError> {
        self.read_with(indexed_systems)
    }

    pub fn system_indexed(&self, system_id: &str) -> Result<bool, DbError> {
        self.read_with(|conn| system_indexed(conn, system_id))
    }
}
