//! Lookups, inserts and truncation for the six catalog tables.
//!
//! Inserts here execute immediately. Buffered inserts for batch-mode
//! transactions go through `transaction::CatalogBatch`, which shares the
//! column lists and row encodings below.

use retro_index_core::{Media, MediaTag, MediaTitle, System, Tag, TagType};
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::batch::{BatchError, ConflictPolicy};
use crate::cache::{invalidate_caches, CacheScope};
use crate::db::{lock, MediaDb};
use crate::error::{found, DbError};
use crate::sql::{placeholders, with_savepoint};
use crate::transaction::CatalogBatch;
use crate::value::SqlValue;

// ── Row encodings ───────────────────────────────────────────────────────────

pub(crate) const SYSTEM_COLUMNS: &[&str] = &["DBID", "SystemID", "Name"];
pub(crate) const MEDIA_TITLE_COLUMNS: &[&str] = &[
    "DBID",
    "SystemDBID",
    "Slug",
    "SecondarySlug",
    "Name",
    "SlugLength",
    "SlugWordCount",
];
pub(crate) const MEDIA_COLUMNS: &[&str] = &["DBID", "MediaTitleDBID", "SystemDBID", "Path"];
pub(crate) const TAG_TYPE_COLUMNS: &[&str] = &["DBID", "Type"];
pub(crate) const TAG_COLUMNS: &[&str] = &["DBID", "TypeDBID", "Tag"];
pub(crate) const MEDIA_TAG_COLUMNS: &[&str] = &["MediaDBID", "TagDBID"];

pub(crate) fn system_row(row: &System) -> Vec<SqlValue> {
    vec![
        SqlValue::dbid(row.dbid),
        row.system_id.as_str().into(),
        row.name.as_str().into(),
    ]
}

pub(crate) fn media_title_row(row: &MediaTitle) -> Vec<SqlValue> {
    vec![
        SqlValue::dbid(row.dbid),
        row.system_dbid.into(),
        row.slug.as_str().into(),
        row.secondary_slug.clone().into(),
        row.name.as_str().into(),
        row.slug_length.into(),
        row.slug_word_count.into(),
    ]
}

pub(crate) fn media_row(row: &Media) -> Vec<SqlValue> {
    vec![
        SqlValue::dbid(row.dbid),
        row.media_title_dbid.into(),
        row.system_dbid.into(),
        row.path.as_str().into(),
    ]
}

pub(crate) fn tag_type_row(row: &TagType) -> Vec<SqlValue> {
    vec![SqlValue::dbid(row.dbid), row.tag_type.as_str().into()]
}

pub(crate) fn tag_row(row: &Tag) -> Vec<SqlValue> {
    vec![
        SqlValue::dbid(row.dbid),
        row.type_dbid.into(),
        row.tag.as_str().into(),
    ]
}

pub(crate) fn media_tag_row(row: &MediaTag) -> Vec<SqlValue> {
    vec![row.media_dbid.into(), row.tag_dbid.into()]
}

/// Execute a single-row insert and return the new row id.
fn insert_row(
    conn: &Connection,
    table: &str,
    columns: &[&str],
    values: &[SqlValue],
    policy: ConflictPolicy,
) -> Result<i64, DbError> {
    let keyword = match policy {
        ConflictPolicy::Fail => "INSERT",
        ConflictPolicy::Ignore => "INSERT OR IGNORE",
    };
    let sql = format!(
        "{keyword} INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders(columns.len())
    );
    conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(conn.last_insert_rowid())
}

// ── Row mapping ─────────────────────────────────────────────────────────────

pub(crate) fn row_to_system(row: &Row) -> rusqlite::Result<System> {
    Ok(System {
        dbid: row.get(0)?,
        system_id: row.get(1)?,
        name: row.get(2)?,
    })
}

pub(crate) fn row_to_media_title(row: &Row) -> rusqlite::Result<MediaTitle> {
    Ok(MediaTitle {
        dbid: row.get(0)?,
        system_dbid: row.get(1)?,
        slug: row.get(2)?,
        secondary_slug: row.get(3)?,
        name: row.get(4)?,
        slug_length: row.get(5)?,
        slug_word_count: row.get(6)?,
    })
}

pub(crate) fn row_to_media(row: &Row) -> rusqlite::Result<Media> {
    Ok(Media {
        dbid: row.get(0)?,
        media_title_dbid: row.get(1)?,
        system_dbid: row.get(2)?,
        path: row.get(3)?,
    })
}

pub(crate) fn row_to_tag_type(row: &Row) -> rusqlite::Result<TagType> {
    Ok(TagType {
        dbid: row.get(0)?,
        tag_type: row.get(1)?,
    })
}

pub(crate) fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        dbid: row.get(0)?,
        type_dbid: row.get(1)?,
        tag: row.get(2)?,
    })
}

pub(crate) fn row_to_media_tag(row: &Row) -> rusqlite::Result<MediaTag> {
    Ok(MediaTag {
        dbid: row.get(0)?,
        media_dbid: row.get(1)?,
        tag_dbid: row.get(2)?,
    })
}

pub(crate) const SYSTEM_SELECT: &str = "SELECT DBID, SystemID, Name FROM Systems";
pub(crate) const MEDIA_TITLE_SELECT: &str =
    "SELECT DBID, SystemDBID, Slug, SecondarySlug, Name, SlugLength, SlugWordCount FROM MediaTitles";
pub(crate) const MEDIA_SELECT: &str = "SELECT DBID, MediaTitleDBID, SystemDBID, Path FROM Media";
pub(crate) const TAG_TYPE_SELECT: &str = "SELECT DBID, Type FROM TagTypes";
pub(crate) const TAG_SELECT: &str = "SELECT DBID, TypeDBID, Tag FROM Tags";

pub(crate) fn list<T>(
    conn: &Connection,
    sql: &str,
    map: fn(&Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

// ── Systems ─────────────────────────────────────────────────────────────────

/// Find a system by DBID, or by SystemID when no DBID is set.
pub fn find_system(conn: &Connection, system: &System) -> Result<System, DbError> {
    if system.dbid != 0 {
        found(conn.query_row(&format!("{SYSTEM_SELECT} WHERE DBID = ?1"), [system.dbid], row_to_system))
    } else if !system.system_id.is_empty() {
        found(conn.query_row(
            &format!("{SYSTEM_SELECT} WHERE SystemID = ?1"),
            [&system.system_id],
            row_to_system,
        ))
    } else {
        Err(DbError::MissingLookupKey("system"))
    }
}

pub fn insert_system(conn: &Connection, system: &System) -> Result<System, DbError> {
    let dbid = insert_row(conn, "Systems", SYSTEM_COLUMNS, &system_row(system), ConflictPolicy::Fail)?;
    Ok(System {
        dbid,
        ..system.clone()
    })
}

// ── Media titles ────────────────────────────────────────────────────────────

/// Find a title by DBID, else by system and slug, else by slug alone.
pub fn find_media_title(conn: &Connection, title: &MediaTitle) -> Result<MediaTitle, DbError> {
    if title.dbid != 0 {
        found(conn.query_row(
            &format!("{MEDIA_TITLE_SELECT} WHERE DBID = ?1"),
            [title.dbid],
            row_to_media_title,
        ))
    } else if title.system_dbid != 0 && !title.slug.is_empty() {
        found(conn.query_row(
            &format!("{MEDIA_TITLE_SELECT} WHERE SystemDBID = ?1 AND Slug = ?2 LIMIT 1"),
            params![title.system_dbid, title.slug],
            row_to_media_title,
        ))
    } else if !title.slug.is_empty() {
        found(conn.query_row(
            &format!("{MEDIA_TITLE_SELECT} WHERE Slug = ?1 LIMIT 1"),
            [&title.slug],
            row_to_media_title,
        ))
    } else {
        Err(DbError::MissingLookupKey("media title"))
    }
}

pub fn insert_media_title(conn: &Connection, title: &MediaTitle) -> Result<MediaTitle, DbError> {
    let dbid = insert_row(
        conn,
        "MediaTitles",
        MEDIA_TITLE_COLUMNS,
        &media_title_row(title),
        ConflictPolicy::Fail,
    )?;
    Ok(MediaTitle {
        dbid,
        ..title.clone()
    })
}

// ── Media ───────────────────────────────────────────────────────────────────

/// Find media by DBID, else by title, system and path, else by system and
/// path.
pub fn find_media(conn: &Connection, media: &Media) -> Result<Media, DbError> {
    if media.dbid != 0 {
        found(conn.query_row(&format!("{MEDIA_SELECT} WHERE DBID = ?1"), [media.dbid], row_to_media))
    } else if media.media_title_dbid != 0 && media.system_dbid != 0 && !media.path.is_empty() {
        found(conn.query_row(
            &format!("{MEDIA_SELECT} WHERE MediaTitleDBID = ?1 AND SystemDBID = ?2 AND Path = ?3 LIMIT 1"),
            params![media.media_title_dbid, media.system_dbid, media.path],
            row_to_media,
        ))
    } else if media.system_dbid != 0 && !media.path.is_empty() {
        found(conn.query_row(
            &format!("{MEDIA_SELECT} WHERE SystemDBID = ?1 AND Path = ?2 LIMIT 1"),
            params![media.system_dbid, media.path],
            row_to_media,
        ))
    } else {
        Err(DbError::MissingLookupKey("media"))
    }
}

pub fn insert_media(conn: &Connection, media: &Media) -> Result<Media, DbError> {
    let dbid = insert_row(conn, "Media", MEDIA_COLUMNS, &media_row(media), ConflictPolicy::Fail)?;
    Ok(Media {
        dbid,
        ..media.clone()
    })
}

// ── Tags ────────────────────────────────────────────────────────────────────

/// Find a tag type by DBID or by its type name.
pub fn find_tag_type(conn: &Connection, tag_type: &TagType) -> Result<TagType, DbError> {
    if tag_type.dbid != 0 {
        found(conn.query_row(
            &format!("{TAG_TYPE_SELECT} WHERE DBID = ?1"),
            [tag_type.dbid],
            row_to_tag_type,
        ))
    } else if !tag_type.tag_type.is_empty() {
        found(conn.query_row(
            &format!("{TAG_TYPE_SELECT} WHERE Type = ?1"),
            [&tag_type.tag_type],
            row_to_tag_type,
        ))
    } else {
        Err(DbError::MissingLookupKey("tag type"))
    }
}

pub fn insert_tag_type(conn: &Connection, tag_type: &TagType) -> Result<TagType, DbError> {
    let dbid = insert_row(conn, "TagTypes", TAG_TYPE_COLUMNS, &tag_type_row(tag_type), ConflictPolicy::Fail)?;
    Ok(TagType {
        dbid,
        ..tag_type.clone()
    })
}

/// Find a tag by DBID, else by type and value, else by value alone.
pub fn find_tag(conn: &Connection, tag: &Tag) -> Result<Tag, DbError> {
    if tag.dbid != 0 {
        found(conn.query_row(&format!("{TAG_SELECT} WHERE DBID = ?1"), [tag.dbid], row_to_tag))
    } else if tag.type_dbid != 0 && !tag.tag.is_empty() {
        found(conn.query_row(
            &format!("{TAG_SELECT} WHERE TypeDBID = ?1 AND Tag = ?2"),
            params![tag.type_dbid, tag.tag],
            row_to_tag,
        ))
    } else if !tag.tag.is_empty() {
        found(conn.query_row(&format!("{TAG_SELECT} WHERE Tag = ?1 LIMIT 1"), [&tag.tag], row_to_tag))
    } else {
        Err(DbError::MissingLookupKey("tag"))
    }
}

pub fn insert_tag(conn: &Connection, tag: &Tag) -> Result<Tag, DbError> {
    let dbid = insert_row(conn, "Tags", TAG_COLUMNS, &tag_row(tag), ConflictPolicy::Fail)?;
    Ok(Tag { dbid, ..tag.clone() })
}

/// Find a media tag link by DBID or by its (media, tag) pair.
pub fn find_media_tag(conn: &Connection, media_tag: &MediaTag) -> Result<MediaTag, DbError> {
    const SELECT: &str = "SELECT DBID, MediaDBID, TagDBID FROM MediaTags";
    if media_tag.dbid != 0 {
        found(conn.query_row(&format!("{SELECT} WHERE DBID = ?1"), [media_tag.dbid], row_to_media_tag))
    } else if media_tag.media_dbid != 0 && media_tag.tag_dbid != 0 {
        found(conn.query_row(
            &format!("{SELECT} WHERE MediaDBID = ?1 AND TagDBID = ?2"),
            params![media_tag.media_dbid, media_tag.tag_dbid],
            row_to_media_tag,
        ))
    } else {
        Err(DbError::MissingLookupKey("media tag"))
    }
}

/// Link a tag to media. Linking an already linked pair is not an error and
/// returns the existing link.
pub fn insert_media_tag(conn: &Connection, media_tag: &MediaTag) -> Result<MediaTag, DbError> {
    insert_row(
        conn,
        "MediaTags",
        MEDIA_TAG_COLUMNS,
        &media_tag_row(media_tag),
        ConflictPolicy::Ignore,
    )?;
    find_media_tag(
        conn,
        &MediaTag {
            dbid: 0,
            ..media_tag.clone()
        },
    )
}

// ── Truncation ──────────────────────────────────────────────────────────────

/// Delete every catalog and cache row.
pub fn truncate(conn: &Connection) -> Result<(), DbError> {
    with_savepoint(conn, "truncate_all", || {
        conn.execute_batch(
            "DELETE FROM MediaTags;
             DELETE FROM Media;
             DELETE FROM MediaTitles;
             DELETE FROM Tags;
             DELETE FROM TagTypes;
             DELETE FROM Systems;
             DELETE FROM SlugResolutionCache;
             DELETE FROM SystemTagsCache;
             DELETE FROM MediaCountCache;",
        )?;
        Ok(())
    })?;
    log::info!("Truncated media database");
    Ok(())
}

/// Delete the given systems with all their titles, media and tag links,
/// then any tags and tag types no longer in use. Caches are left alone.
pub fn truncate_systems(conn: &Connection, system_ids: &[String]) -> Result<(), DbError> {
    if system_ids.is_empty() {
        return Ok(());
    }
    let marks = placeholders(system_ids.len());
    let ids = || params_from_iter(system_ids.iter());

    with_savepoint(conn, "truncate_systems", || {
        let media_tags = conn.execute(
            &format!(
                "DELETE FROM MediaTags WHERE MediaDBID IN (
                     SELECT Media.DBID FROM Media
                     INNER JOIN Systems ON Systems.DBID = Media.SystemDBID
                     WHERE Systems.SystemID IN ({marks}))"
            ),
            ids(),
        )?;
        let media = conn.execute(
            &format!(
                "DELETE FROM Media WHERE SystemDBID IN (
                     SELECT DBID FROM Systems WHERE SystemID IN ({marks}))"
            ),
            ids(),
        )?;
        let titles = conn.execute(
            &format!(
                "DELETE FROM MediaTitles WHERE SystemDBID IN (
                     SELECT DBID FROM Systems WHERE SystemID IN ({marks}))"
            ),
            ids(),
        )?;
        let systems = conn.execute(&format!("DELETE FROM Systems WHERE SystemID IN ({marks})"), ids())?;

        let tags = conn.execute(
            "DELETE FROM Tags WHERE DBID NOT IN (SELECT DISTINCT TagDBID FROM MediaTags)",
            [],
        )?;
        let tag_types = conn.execute(
            "DELETE FROM TagTypes WHERE DBID NOT IN (SELECT DISTINCT TypeDBID FROM Tags)",
            [],
        )?;

        log::info!(
            "Truncated {:?}: {} systems, {} titles, {} media, {} media tags, {} orphan tags, {} orphan tag types",
            system_ids,
            systems,
            titles,
            media,
            media_tags,
            tags,
            tag_types
        );
        Ok(())
    })
}

// ── MediaDb facade ──────────────────────────────────────────────────────────

type FindFn<T> = fn(&Connection, &T) -> Result<T, DbError>;
type BufferFn<T> = fn(&mut CatalogBatch, &T) -> Result<(), BatchError>;

impl MediaDb {
    fn find_with<T>(&self, row: &T, find: FindFn<T>) -> Result<T, DbError> {
        self.check()?;
        let conn = self.lookup_conn()?;
        find(&conn, row)
    }

    /// Buffer `row` in a batch-mode transaction and return it as given, or
    /// insert it now and return it with its assigned DBID. Writes outside a
    /// transaction invalidate the caches right away.
    fn insert_with<T: Clone>(&self, row: &T, buffer: BufferFn<T>, insert: FindFn<T>) -> Result<T, DbError> {
        self.check()?;
        {
            let mut batch = lock(&self.batch)?;
            if let Some(catalog_batch) = batch.as_mut() {
                buffer(catalog_batch, row)?;
                return Ok(row.clone());
            }
        }

        let conn = self.writer()?;
        let inserted = insert(&conn, row)?;
        if !self.in_transaction() {
            invalidate_caches(&conn, &CacheScope::AllSystems)?;
        }
        Ok(inserted)
    }

    fn find_or_insert_with<T: Clone>(
        &self,
        row: &T,
        find: FindFn<T>,
        buffer: BufferFn<T>,
        insert: FindFn<T>,
    ) -> Result<T, DbError> {
        match self.find_with(row, find) {
            Err(DbError::NotFound) => self.insert_with(row, buffer, insert),
            other => other,
        }
    }

    pub fn find_system(&self, system: &System) -> Result<System, DbError> {
        self.find_with(system, find_system)
    }

    pub fn insert_system(&self, system: &System) -> Result<System, DbError> {
        self.insert_with(system, CatalogBatch::add_system, insert_system)
    }

    pub fn find_or_insert_system(&self, system: &System) -> Result<System, DbError> {
        self.find_or_insert_with(system, find_system, CatalogBatch::add_system, insert_system)
    }

    pub fn find_media_title(&self, title: &MediaTitle) -> Result<MediaTitle, DbError> {
        self.find_with(title, find_media_title)
    }

    pub fn insert_media_title(&self, title: &MediaTitle) -> Result<MediaTitle, DbError> {
        self.insert_with(title, CatalogBatch::add_media_title, insert_media_title)
    }

    pub fn find_or_insert_media_title(&self, title: &MediaTitle) -> Result<MediaTitle, DbError> {
        self.find_or_insert_with(title, find_media_title, CatalogBatch::add_media_title, insert_media_title)
    }

    pub fn find_media(&self, media: &Media) -> Result<Media, DbError> {
        self.find_with(media, find_media)
    }

    pub fn insert_media(&self, media: &Media) -> Result<Media, DbError> {
        self.insert_with(media, CatalogBatch::add_media, insert_media)
    }

    pub fn find_or_insert_media(&self, media: &Media) -> Result<Media, DbError> {
        self.find_or_insert_with(media, find_media, CatalogBatch::add_media, insert_media)
    }

    pub fn find_tag_type(&self, tag_type: &TagType) -> Result<TagType, DbError> {
        self.find_with(tag_type, find_tag_type)
    }

    pub fn insert_tag_type(&self, tag_type: &TagType) -> Result<TagType, DbError> {
        self.insert_with(tag_type, CatalogBatch::add_tag_type, insert_tag_type)
    }

    pub fn find_or_insert_tag_type(&self, tag_type: &TagType) -> Result<TagType, DbError> {
        self.find_or_insert_with(tag_type, find_tag_type, CatalogBatch::add_tag_type, insert_tag_type)
    }

    pub fn find_tag(&self, tag: &Tag) -> Result<Tag, DbError> {
        self.find_with(tag, find_tag)
    }

    pub fn insert_tag(&self, tag: &Tag) -> Result<Tag, DbError> {
        self.insert_with(tag, CatalogBatch::add_tag, insert_tag)
    }

    pub fn find_or_insert_tag(&self, tag: &Tag) -> Result<Tag, DbError> {
        self.find_or_insert_with(tag, find_tag, CatalogBatch::add_tag, insert_tag)
    }

    pub fn find_media_tag(&self, media_tag: &MediaTag) -> Result<MediaTag, DbError> {
        self.find_with(media_tag, find_media_tag)
    }

    pub fn insert_media_tag(&self, media_tag: &MediaTag) -> Result<MediaTag, DbError> {
        self.insert_with(media_tag, CatalogBatch::add_media_tag, insert_media_tag)
    }

    pub fn find_or_insert_media_tag(&self, media_tag: &MediaTag) -> Result<MediaTag, DbError> {
        self.find_or_insert_with(media_tag, find_media_tag, CatalogBatch::add_media_tag, insert_media_tag)
    }

    /// Delete the whole catalog and every cache.
    pub fn truncate(&self) -> Result<(), DbError> {
        self.check()?;
        let conn = self.writer()?;
        truncate(&conn)
    }

    /// Delete the given systems and their data, plus orphaned tags.
    ///
    /// Scoped caches are invalidated first, while the systems can still be
    /// resolved to their DBIDs. Inside a transaction this is left to the
    /// commit.
    pub fn truncate_systems(&self, system_ids: &[String]) -> Result<(), DbError> {
        self.check()?;
        if system_ids.is_empty() {
            return Ok(());
        }
        let conn = self.writer()?;
        if !self.in_transaction() {
            invalidate_caches(&conn, &CacheScope::Systems(system_ids.to_vec()))?;
        }
        truncate_systems(&conn, system_ids)
    }
}
