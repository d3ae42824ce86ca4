mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use retro_index_core::{Media, MediaQuery, MediaTag, MediaTitle, MediaType, System, Tag, TagType};
use retro_index_db::{CancelToken, DbError, Interrupted, MediaDb, MediaStats};

use common::{add_game, count, file_db, ids, memory_db, side_conn};

fn nes() -> System {
    System {
        dbid: 1,
        system_id: "NES".into(),
        name: "Nintendo Entertainment System".into(),
    }
}

#[test]
fn second_begin_fails_fast() {
    let db = memory_db();
    db.begin_transaction(false).unwrap();

    let err = db.begin_transaction(false).unwrap_err();
    assert!(matches!(err, DbError::TransactionInProgress));
    assert_eq!(err.to_string(), "transaction already in progress");
    assert!(db.in_transaction());

    db.rollback_transaction().unwrap();
    assert!(!db.in_transaction());
    db.begin_transaction(true).unwrap();
    db.commit_transaction().unwrap();
}

#[test]
fn commit_and_rollback_without_transaction_are_noops() {
    let db = memory_db();
    db.commit_transaction().unwrap();
    db.rollback_transaction().unwrap();
    assert!(!db.in_transaction());
}

#[test]
fn concurrent_begins_admit_exactly_one() {
    let (_dir, db) = file_db();
    let db = Arc::new(db);
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                db.begin_transaction(false)
            })
        })
        .collect();
    let results: Vec<Result<(), DbError>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, DbError::TransactionInProgress)));

    db.rollback_transaction().unwrap();
    db.begin_transaction(false).unwrap();
    db.commit_transaction().unwrap();
}

#[test]
fn batch_rows_are_buffered_until_commit() {
    let (dir, db) = file_db();
    db.begin_transaction(true).unwrap();

    // Children first: the flush order comes from the declared dependencies.
    let link = db
        .insert_media_tag(&MediaTag {
            dbid: 0,
            media_dbid: 1,
            tag_dbid: 1,
        })
        .unwrap();
    assert_eq!(link.dbid, 0);
    db.insert_media(&Media {
        dbid: 1,
        media_title_dbid: 1,
        system_dbid: 1,
        path: "/roms/NES/Zelda.nes".into(),
    })
    .unwrap();
    db.insert_tag(&Tag {
        dbid: 1,
        type_dbid: 1,
        tag: "usa".into(),
    })
    .unwrap();
    db.insert_tag_type(&TagType {
        dbid: 1,
        tag_type: "region".into(),
    })
    .unwrap();
    let title = db
        .insert_media_title(&MediaTitle {
            dbid: 1,
            ..MediaTitle::from_name(1, MediaType::Game, "The Legend of Zelda")
        })
        .unwrap();
    assert_eq!(title.dbid, 1);
    db.insert_system(&nes()).unwrap();

    let side = side_conn(&dir);
    assert_eq!(count(&side, "Systems"), 0);
    assert_eq!(count(&side, "MediaTags"), 0);

    db.commit_transaction().unwrap();
    assert!(!db.in_transaction());
    for table in ["Systems", "MediaTitles", "Media", "TagTypes", "Tags", "MediaTags"] {
        assert_eq!(count(&side, table), 1, "{table}");
    }
    assert_eq!(db.get_tags(&ids(&["NES"])).unwrap().len(), 1);
}

#[test]
fn batch_skips_media_on_the_wrong_system() {
    let (dir, db) = file_db();
    db.begin_transaction(true).unwrap();
    db.insert_system(&nes()).unwrap();
    db.insert_system(&System {
        dbid: 2,
        system_id: "SNES".into(),
        name: "Super Nintendo".into(),
    })
    .unwrap();
    db.insert_media_title(&MediaTitle {
        dbid: 1,
        ..MediaTitle::from_name(1, MediaType::Game, "Metroid")
    })
    .unwrap();
    for (dbid, system_dbid) in [(1, 2), (2, 1)] {
        db.insert_media(&Media {
            dbid,
            media_title_dbid: 1,
            system_dbid,
            path: format!("/roms/{dbid}/Metroid.nes"),
        })
        .unwrap();
    }
    db.commit_transaction().unwrap();

    let side = side_conn(&dir);
    let systems: Vec<i64> = side
        .prepare("SELECT SystemDBID FROM Media")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(systems, vec![1]);
}

#[test]
fn rollback_discards_buffered_and_written_rows() {
    let (dir, db) = file_db();
    db.begin_transaction(true).unwrap();
    db.insert_system(&nes()).unwrap();
    db.rollback_transaction().unwrap();

    db.begin_transaction(false).unwrap();
    db.insert_system(&nes()).unwrap();
    db.rollback_transaction().unwrap();

    let side = side_conn(&dir);
    assert_eq!(count(&side, "Systems"), 0);
}

#[test]
fn lookups_inside_transaction_see_own_writes() {
    let (_dir, db) = file_db();
    db.begin_transaction(false).unwrap();
    let inserted = db
        .insert_system(&System {
            dbid: 0,
            system_id: "SNES".into(),
            name: "Super Nintendo Entertainment System".into(),
        })
        .unwrap();
    assert_ne!(inserted.dbid, 0);

    let found = db
        .find_system(&System {
            system_id: "SNES".into(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(found, inserted);
    db.commit_transaction().unwrap();
}

fn seed_caches(db: &MediaDb, media_dbid: i64) {
    db.populate_system_tags_cache().unwrap();
    db.set_cached_slug_resolution("NES", "zelda", &[], media_dbid, "exact")
        .unwrap();
    db.set_cached_stats(
        &MediaQuery {
            systems: ids(&["NES"]),
            ..Default::default()
        },
        &MediaStats {
            count: 1,
            min_dbid: media_dbid,
            max_dbid: media_dbid,
        },
    )
    .unwrap();
}

fn cache_rows(dir: &tempfile::TempDir) -> [i64; 3] {
    let side = side_conn(dir);
    [
        count(&side, "SlugResolutionCache"),
        count(&side, "SystemTagsCache"),
        count(&side, "MediaCountCache"),
    ]
}

#[test]
fn commit_invalidates_caches_once() {
    let (dir, db) = file_db();
    let zelda = add_game(&db, "NES", "The Legend of Zelda", &[("region", "usa")]);
    seed_caches(&db, zelda.dbid);
    assert_eq!(cache_rows(&dir), [1, 1, 1]);

    db.begin_transaction(false).unwrap();
    add_game(&db, "NES", "Metroid", &[("region", "usa")]);
    assert_eq!(cache_rows(&dir), [1, 1, 1]);
    db.commit_transaction().unwrap();

    assert_eq!(cache_rows(&dir), [0, 0, 0]);
}

#[test]
fn rollback_leaves_caches_alone() {
    let (dir, db) = file_db();
    let zelda = add_game(&db, "NES", "The Legend of Zelda", &[("region", "usa")]);
    seed_caches(&db, zelda.dbid);

    db.begin_transaction(true).unwrap();
    db.insert_system(&System {
        dbid: 99,
        system_id: "SNES".into(),
        name: "Super Nintendo Entertainment System".into(),
    })
    .unwrap();
    db.rollback_transaction().unwrap();

    assert_eq!(cache_rows(&dir), [1, 1, 1]);
    let cached = db.get_cached_slug_resolution("NES", "zelda", &[]).unwrap();
    assert_eq!(cached.map(|r| r.media_dbid), Some(zelda.dbid));
}

#[test]
fn cache_writes_are_skipped_during_transaction() {
    let db = memory_db();
    db.begin_transaction(false).unwrap();
    db.set_cached_slug_resolution("NES", "zelda", &[], 1, "exact")
        .unwrap();
    assert_eq!(db.get_cached_slug_resolution("NES", "zelda", &[]).unwrap(), None);
    db.commit_transaction().unwrap();
}

#[test]
fn writes_outside_transaction_invalidate_immediately() {
    let (dir, db) = file_db();
    let zelda = add_game(&db, "NES", "The Legend of Zelda", &[]);
    seed_caches(&db, zelda.dbid);

    add_game(&db, "SNES", "Super Metroid", &[]);
    assert_eq!(cache_rows(&dir)[0], 0);
    assert_eq!(cache_rows(&dir)[2], 0);
}

#[test]
fn cancelled_commit_leaves_transaction_for_rollback() {
    let (dir, db) = file_db();
    let cancel = CancelToken::new();
    let db = db.with_cancel(cancel.clone());

    db.begin_transaction(true).unwrap();
    db.insert_system(&nes()).unwrap();
    cancel.cancel();

    let err = db.commit_transaction().unwrap_err();
    assert!(matches!(err, DbError::Interrupted(Interrupted::Cancelled)));
    assert!(db.in_transaction());

    db.rollback_transaction().unwrap();
    assert!(!db.in_transaction());
    assert_eq!(count(&side_conn(&dir), "Systems"), 0);
}

#[test]
fn cancelled_token_rejects_new_work() {
    let cancel = CancelToken::new();
    let db = memory_db().with_cancel(cancel.clone());
    cancel.cancel();

    assert!(matches!(
        db.begin_transaction(false),
        Err(DbError::Interrupted(Interrupted::Cancelled))
    ));
    assert!(!db.in_transaction());
    assert!(matches!(
        db.get_all_systems(),
        Err(DbError::Interrupted(Interrupted::Cancelled))
    ));
}

#[test]
fn expired_deadline_reports_deadline_exceeded() {
    let db = memory_db().with_cancel(CancelToken::with_timeout(std::time::Duration::ZERO));
    let err = db.get_all_systems().unwrap_err();
    assert!(matches!(err, DbError::Interrupted(Interrupted::DeadlineExceeded)));
    assert_eq!(err.to_string(), "deadline exceeded");
}
