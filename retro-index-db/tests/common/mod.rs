#![allow(dead_code)]

use std::path::PathBuf;

use retro_index_core::{Media, MediaTag, MediaTitle, MediaType, System, SystemDef, Tag, TagType};
use retro_index_db::{DbConfig, MediaDb};
use rusqlite::Connection;
use tempfile::TempDir;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A file-backed database with a reader pool. Keep the `TempDir` alive for
/// the duration of the test.
pub fn file_db() -> (TempDir, MediaDb) {
    init_logging();
    let dir = TempDir::new().unwrap();
    let db = MediaDb::open(&db_path(&dir), DbConfig::default()).unwrap();
    (dir, db)
}

pub fn memory_db() -> MediaDb {
    init_logging();
    MediaDb::open_memory().unwrap()
}

pub fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("media.db")
}

/// A second, independent connection to the same file.
pub fn side_conn(dir: &TempDir) -> Connection {
    let conn = Connection::open(db_path(dir)).unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        .unwrap();
    conn
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

pub fn system(db: &MediaDb, system_id: &str) -> System {
    let name = SystemDef::lookup(system_id).map_or(system_id, |def| def.display_name());
    db.find_or_insert_system(&System {
        dbid: 0,
        system_id: system_id.to_string(),
        name: name.to_string(),
    })
    .unwrap()
}

/// Insert one game file under `/roms/<system>/<name>.zip` with the given
/// `(type, value)` tags.
pub fn add_game(db: &MediaDb, system_id: &str, name: &str, tags: &[(&str, &str)]) -> Media {
    let system = system(db, system_id);
    let media_type = SystemDef::lookup(system_id).map_or(MediaType::Game, |def| def.media_type());
    let title = db
        .find_or_insert_media_title(&MediaTitle::from_name(system.dbid, media_type, name))
        .unwrap();
    let media = db
        .find_or_insert_media(&Media {
            dbid: 0,
            media_title_dbid: title.dbid,
            system_dbid: system.dbid,
            path: format!("/roms/{system_id}/{name}.zip"),
        })
        .unwrap();
    for (tag_type, value) in tags {
        tag_media(db, &media, tag_type, value);
    }
    media
}

pub fn tag_media(db: &MediaDb, media: &Media, tag_type: &str, value: &str) -> Tag {
    let tag_type = db
        .find_or_insert_tag_type(&TagType {
            dbid: 0,
            tag_type: tag_type.to_string(),
        })
        .unwrap();
    let tag = db
        .find_or_insert_tag(&Tag {
            dbid: 0,
            type_dbid: tag_type.dbid,
            tag: value.to_string(),
        })
        .unwrap();
    db.insert_media_tag(&MediaTag {
        dbid: 0,
        media_dbid: media.dbid,
        tag_dbid: tag.dbid,
    })
    .unwrap();
    tag
}

pub fn ids(system_ids: &[&str]) -> Vec<String> {
    system_ids.iter().map(|s| s.to_string()).collect()
}
