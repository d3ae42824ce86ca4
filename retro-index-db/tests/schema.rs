mod common;

use retro_index_db::schema::{create_schema, CURRENT_VERSION};
use retro_index_db::{open_database, open_memory, DbConfig, DbError, MediaDb, SchemaError, Synchronous};

use common::{db_path, init_logging};

#[test]
fn create_schema_in_memory() {
    init_logging();
    let conn = open_memory().unwrap();
    let version: i32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, CURRENT_VERSION);
}

#[test]
fn schema_is_idempotent() {
    let conn = open_memory().unwrap();
    create_schema(&conn).unwrap();
}

#[test]
fn foreign_keys_enabled() {
    let conn = open_memory().unwrap();
    let fk: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
    assert_eq!(fk, 1);
}

#[test]
fn all_tables_exist() {
    let conn = open_memory().unwrap();
    let tables = [
        "schema_version",
        "Systems",
        "MediaTitles",
        "Media",
        "TagTypes",
        "Tags",
        "MediaTags",
        "SlugResolutionCache",
        "SystemTagsCache",
        "MediaCountCache",
    ];
    for table in tables {
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        assert!(exists, "table {table} should exist");
    }
}

#[test]
fn reopening_keeps_data() {
    init_logging();
    let dir = tempfile::TempDir::new().unwrap();
    {
        let db = MediaDb::open(&db_path(&dir), DbConfig::default()).unwrap();
        common::add_game(&db, "NES", "Metroid", &[]);
    }
    let db = MediaDb::open(&db_path(&dir), DbConfig::default()).unwrap();
    assert_eq!(db.get_total_media_count().unwrap(), 1);
    assert_eq!(db.path(), Some(db_path(&dir).as_path()));
}

#[test]
fn newer_schema_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let conn = open_database(&db_path(&dir), &DbConfig::default()).unwrap();
    conn.execute("UPDATE schema_version SET version = ?1", [CURRENT_VERSION + 1])
        .unwrap();
    drop(conn);

    let err = MediaDb::open(&db_path(&dir), DbConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        DbError::Schema(SchemaError::VersionMismatch { found, .. }) if found == CURRENT_VERSION + 1
    ));
}

#[test]
fn config_from_toml() {
    let config = DbConfig::from_toml_str(
        r#"
        batch_size = 250
        read_pool_size = 2

        [pragmas.write]
        synchronous = "NORMAL"
        temp_store = "MEMORY"
        "#,
    )
    .unwrap();
    assert_eq!(config.batch_size, 250);
    assert_eq!(config.read_pool_size, 2);
    assert_eq!(config.pragmas.write.synchronous, Synchronous::Normal);
    assert_eq!(config.pragmas.default, DbConfig::default().pragmas.default);
}

#[test]
fn invalid_config_is_rejected_on_open() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = DbConfig {
        batch_size: 0,
        ..Default::default()
    };
    assert!(matches!(
        MediaDb::open(&db_path(&dir), config),
        Err(DbError::Config(_))
    ));
}
