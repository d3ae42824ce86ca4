//! SQLite schema creation and connection setup.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::config::DbConfig;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Unsupported schema: expected version {expected}, found {found}")]
    VersionMismatch { expected: i32, found: i32 },
}

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Create all tables and indexes if they don't exist.
///
/// Safe to call on an existing database.
pub fn create_schema(conn: &Connection) -> Result<(), SchemaError> {
    conn.execute_batch(SCHEMA_SQL)?;
    set_schema_version(conn, CURRENT_VERSION)?;
    Ok(())
}

/// Open or create the writer connection for a media database.
pub fn open_database(path: &Path, config: &DbConfig) -> Result<Connection, SchemaError> {
    let conn = Connection::open(path)?;
    apply_connection_pragmas(&conn, config)?;

    let version = get_schema_version(&conn)?;
    if version == 0 {
        create_schema(&conn)?;
    } else if version != CURRENT_VERSION {
        return Err(SchemaError::VersionMismatch {
            expected: CURRENT_VERSION,
            found: version,
        });
    }

    Ok(conn)
}

/// Open a read-only connection to an existing database.
pub fn open_reader(path: &Path, config: &DbConfig) -> Result<Connection, SchemaError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI,
    )?;
    conn.execute_batch(&format!(
        "PRAGMA busy_timeout = {}; PRAGMA cache_size = -{};",
        config.busy_timeout_ms, config.cache_size_kib
    ))?;
    Ok(conn)
}

/// Open an in-memory database with the full schema. Useful for testing.
pub fn open_memory() -> Result<Connection, SchemaError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    create_schema(&conn)?;
    Ok(conn)
}

/// WAL journaling plus the configured timeouts, cache and default pragmas.
pub(crate) fn apply_connection_pragmas(
    conn: &Connection,
    config: &DbConfig,
) -> Result<(), rusqlite::Error> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = {}; PRAGMA cache_size = -{}; PRAGMA foreign_keys = {};",
        config.busy_timeout_ms,
        config.cache_size_kib,
        if config.foreign_keys { "ON" } else { "OFF" },
    ))?;
    conn.execute_batch(&config.pragmas.default.to_sql())
}

/// Get the current schema version, or 0 if no schema exists.
fn get_schema_version(conn: &Connection) -> Result<i32, SchemaError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), SchemaError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- ── Catalog ─────────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS Systems (
    DBID INTEGER PRIMARY KEY,
    SystemID TEXT NOT NULL UNIQUE,
    Name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS MediaTitles (
    DBID INTEGER PRIMARY KEY,
    SystemDBID INTEGER NOT NULL REFERENCES Systems(DBID) ON DELETE CASCADE,
    Slug TEXT NOT NULL,
    SecondarySlug TEXT,
    Name TEXT NOT NULL,
    SlugLength INTEGER NOT NULL DEFAULT 0,
    SlugWordCount INTEGER NOT NULL DEFAULT 0,
    UNIQUE(SystemDBID, Slug)
);

CREATE INDEX IF NOT EXISTS idx_mediatitles_slug ON MediaTitles(Slug);
CREATE INDEX IF NOT EXISTS idx_mediatitles_secondary_slug ON MediaTitles(SecondarySlug);
CREATE INDEX IF NOT EXISTS idx_mediatitles_system_length ON MediaTitles(SystemDBID, SlugLength);

CREATE TABLE IF NOT EXISTS Media (
    DBID INTEGER PRIMARY KEY,
    MediaTitleDBID INTEGER NOT NULL REFERENCES MediaTitles(DBID) ON DELETE CASCADE,
    SystemDBID INTEGER NOT NULL REFERENCES Systems(DBID) ON DELETE CASCADE,
    Path TEXT NOT NULL,
    UNIQUE(MediaTitleDBID, Path)
);

CREATE INDEX IF NOT EXISTS idx_media_system ON Media(SystemDBID);
CREATE INDEX IF NOT EXISTS idx_media_path ON Media(SystemDBID, Path);

-- A media row lives on the same system as its title.
CREATE TRIGGER IF NOT EXISTS media_system_matches_title_insert
BEFORE INSERT ON Media
WHEN EXISTS (
    SELECT 1 FROM MediaTitles
    WHERE DBID = NEW.MediaTitleDBID AND SystemDBID <> NEW.SystemDBID
)
BEGIN
    SELECT RAISE(ABORT, 'media system does not match its title');
END;

CREATE TRIGGER IF NOT EXISTS media_system_matches_title_update
BEFORE UPDATE OF MediaTitleDBID, SystemDBID ON Media
WHEN EXISTS (
    SELECT 1 FROM MediaTitles
    WHERE DBID = NEW.MediaTitleDBID AND SystemDBID <> NEW.SystemDBID
)
BEGIN
    SELECT RAISE(ABORT, 'media system does not match its title');
END;

CREATE TABLE IF NOT EXISTS TagTypes (
    DBID INTEGER PRIMARY KEY,
    Type TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS Tags (
    DBID INTEGER PRIMARY KEY,
    TypeDBID INTEGER NOT NULL REFERENCES TagTypes(DBID) ON DELETE CASCADE,
    Tag TEXT NOT NULL,
    UNIQUE(TypeDBID, Tag)
);

CREATE INDEX IF NOT EXISTS idx_tags_tag ON Tags(Tag);

CREATE TABLE IF NOT EXISTS MediaTags (
    DBID INTEGER PRIMARY KEY,
    MediaDBID INTEGER NOT NULL REFERENCES Media(DBID) ON DELETE CASCADE,
    TagDBID INTEGER NOT NULL REFERENCES Tags(DBID) ON DELETE CASCADE,
    UNIQUE(MediaDBID, TagDBID)
);

CREATE INDEX IF NOT EXISTS idx_mediatags_tag ON MediaTags(TagDBID);

-- ── Derived caches ──────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS SlugResolutionCache (
    CacheKey TEXT PRIMARY KEY,
    SystemID TEXT NOT NULL,
    Slug TEXT NOT NULL,
    TagFilters TEXT NOT NULL,
    MediaDBID INTEGER NOT NULL,
    Strategy TEXT NOT NULL,
    LastUpdated INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_slugcache_system ON SlugResolutionCache(SystemID);

CREATE TABLE IF NOT EXISTS SystemTagsCache (
    SystemDBID INTEGER NOT NULL,
    TagDBID INTEGER NOT NULL,
    TagType TEXT NOT NULL,
    Tag TEXT NOT NULL,
    PRIMARY KEY (SystemDBID, TagDBID)
);

CREATE TABLE IF NOT EXISTS MediaCountCache (
    QueryHash TEXT PRIMARY KEY,
    QueryParams TEXT NOT NULL,
    Count INTEGER NOT NULL,
    MinDBID INTEGER NOT NULL,
    MaxDBID INTEGER NOT NULL,
    LastUpdated INTEGER NOT NULL
);
"#;
