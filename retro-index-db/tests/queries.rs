mod common;

use retro_index_core::{TagInfo, TagType};
use retro_index_db::DbError;

use common::{add_game, ids, memory_db};

#[test]
fn listings_and_counts() {
    let db = memory_db();
    assert_eq!(db.get_total_media_count().unwrap(), 0);
    assert_eq!(db.get_max_media_id().unwrap(), 0);

    add_game(&db, "NES", "Metroid", &[("region", "usa")]);
    add_game(&db, "NES", "Kid Icarus", &[("region", "usa")]);
    let last = add_game(&db, "SNES", "Super Metroid", &[("region", "japan")]);

    assert_eq!(db.get_all_systems().unwrap().len(), 2);
    assert_eq!(db.get_all_media_titles().unwrap().len(), 3);
    assert_eq!(db.get_all_media().unwrap().len(), 3);
    assert_eq!(db.get_all_tag_types().unwrap().len(), 1);
    assert_eq!(db.get_all_tags().unwrap().len(), 2);

    assert_eq!(db.get_total_media_count().unwrap(), 3);
    assert_eq!(db.get_max_media_id().unwrap(), last.dbid);
    assert_eq!(db.get_max_media_title_id().unwrap(), last.media_title_dbid);
    assert_eq!(db.get_max_system_id().unwrap(), last.system_dbid);
    assert_eq!(db.get_max_tag_type_id().unwrap(), 1);
    assert_eq!(db.get_max_tag_id().unwrap(), 2);
}

#[test]
fn indexed_systems_are_sorted() {
    let db = memory_db();
    add_game(&db, "SNES", "Super Metroid", &[]);
    add_game(&db, "Genesis", "Sonic the Hedgehog", &[]);

    assert_eq!(db.indexed_systems().unwrap(), ids(&["Genesis", "SNES"]));
    assert!(db.system_indexed("SNES").unwrap());
    assert!(!db.system_indexed("NES").unwrap());
}

#[test]
fn used_tags_skip_unlinked_tags() {
    let db = memory_db();
    add_game(&db, "NES", "Metroid", &[("region", "usa"), ("year", "1986")]);
    db.insert_tag_type(&TagType {
        dbid: 0,
        tag_type: "lang".into(),
    })
    .unwrap();

    let used = db.get_all_used_tags().unwrap();
    assert_eq!(
        used,
        vec![
            TagInfo {
                tag_type: "region".into(),
                tag: "usa".into()
            },
            TagInfo {
                tag_type: "year".into(),
                tag: "1986".into()
            },
        ]
    );
}

#[test]
fn tags_per_system() {
    let db = memory_db();
    add_game(&db, "NES", "Metroid", &[("region", "usa")]);
    add_game(&db, "SNES", "Super Metroid", &[("region", "usa"), ("region", "japan")]);

    assert_eq!(db.get_tags(&ids(&["NES"])).unwrap().len(), 1);
    assert_eq!(db.get_tags(&ids(&["NES", "SNES"])).unwrap().len(), 2);
    assert!(db.get_tags(&ids(&["PSX"])).unwrap().is_empty());

    let err = db.get_tags(&[]).unwrap_err();
    assert!(matches!(err, DbError::NoSystems(_)));
    assert_eq!(err.to_string(), "no systems provided for tag search");
}
