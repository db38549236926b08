use media_organizer_core::dedup::dedup_phase;
use media_organizer_core::planner::plan_phase;
use media_organizer_core::storage::models::*;
use media_organizer_core::storage::Database;

fn make_test_file(path: &str, media_type: MediaType, date: &str) -> NewFile {
    NewFile {
        source_path: path.to_string(),
        ext: std::path::Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default(),
        media_type,
        file_size: 1000,
        mtime: format!("{}T10:00:00+00:00", date),
        exif_datetime: None,
        chosen_date: date.to_string(),
        date_source: DateSource::Mtime,
        is_hidden: false,
        is_system: false,
        is_link: false,
    }
}

/// Seed a run with scanned files carrying pre-assigned content hashes, as
/// the hash phase would leave them. Returns the run with its options.
fn seed_run(db: &Database, options: RunOptions, files: &[(&str, MediaType, &str, &str)]) -> Run {
    let run_id = db
        .create_run("plan_test", "/src", "/dest", "/dest/Artifacts", &options)
        .unwrap();
    let rows: Vec<NewFile> = files
        .iter()
        .map(|(path, media, date, _)| make_test_file(path, *media, date))
        .collect();
    db.insert_files(run_id, &rows).unwrap();

    for (file_id, path) in db.files_for_hashing(run_id).unwrap() {
        let hash = files
            .iter()
            .find(|(p, _, _, _)| *p == path)
            .map(|(_, _, _, h)| *h)
            .unwrap();
        db.set_content_hash(file_id, hash).unwrap();
    }
    db.get_run(run_id).unwrap()
}

fn plan_rows(db: &Database, run_id: i64) -> Vec<(String, String, String, i64)> {
    db.connection()
        .prepare(
            "SELECT f.source_path, p.action, p.dest_rel_path, p.collision_suffix \
             FROM plan_items p JOIN files f ON f.file_id = p.file_id \
             WHERE p.run_id = ?1 ORDER BY p.file_id",
        )
        .unwrap()
        .query_map(rusqlite::params![run_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_duplicates_skip_by_default() {
    let db = Database::open_in_memory().unwrap();
    let run = seed_run(
        &db,
        RunOptions::default(),
        &[
            ("/src/a/IMG_0001.jpg", MediaType::Photo, "2021-05-09", "h1"),
            ("/src/b/IMG_0002.jpg", MediaType::Photo, "2021-05-09", "h1"),
            ("/src/b/IMG_0003.jpg", MediaType::Photo, "2021-06-01", "h2"),
        ],
    );
    dedup_phase(&db, &run).unwrap();
    let outcome = plan_phase(&db, &run).unwrap();
    assert_eq!(outcome.items, 3);
    assert_eq!(outcome.skipped_duplicates, 1);

    let rows = plan_rows(&db, run.run_id);
    // Lowest file_id is the group primary and copies; the later member
    // of the identical pair is skipped.
    assert_eq!(rows[0].1, "copy");
    assert_eq!(rows[0].2, "Photos/2021/2021-05-09/IMG_0001.jpg");
    assert_eq!(rows[1].1, "skip-duplicate");
    assert_eq!(rows[2].1, "copy");
    assert_eq!(rows[2].2, "Photos/2021/2021-06-01/IMG_0003.jpg");
}

#[test]
fn test_duplicates_link_when_requested() {
    let db = Database::open_in_memory().unwrap();
    let options = RunOptions {
        link_duplicates: true,
        ..RunOptions::default()
    };
    let run = seed_run(
        &db,
        options,
        &[
            ("/src/a/IMG_0001.jpg", MediaType::Photo, "2021-05-09", "h1"),
            ("/src/b/IMG_0002.jpg", MediaType::Photo, "2021-05-09", "h1"),
        ],
    );
    dedup_phase(&db, &run).unwrap();
    plan_phase(&db, &run).unwrap();

    let rows = plan_rows(&db, run.run_id);
    assert_eq!(rows[0].1, "copy");
    assert_eq!(rows[1].1, "link-duplicate");
    // The link carries its own destination; it is not a skip.
    assert_eq!(rows[1].2, "Photos/2021/2021-05-09/IMG_0002.jpg");
}

#[test]
fn test_collision_suffixes_are_ordered_by_file_id() {
    let db = Database::open_in_memory().unwrap();
    // Same name, same date, three distinct contents.
    let run = seed_run(
        &db,
        RunOptions::default(),
        &[
            ("/src/a/IMG.jpg", MediaType::Photo, "2021-05-09", "h1"),
            ("/src/b/IMG.jpg", MediaType::Photo, "2021-05-09", "h2"),
            ("/src/c/IMG.jpg", MediaType::Photo, "2021-05-09", "h3"),
        ],
    );
    dedup_phase(&db, &run).unwrap();
    let outcome = plan_phase(&db, &run).unwrap();
    assert_eq!(outcome.collisions, 2);

    let rows = plan_rows(&db, run.run_id);
    assert_eq!(rows[0].2, "Photos/2021/2021-05-09/IMG.jpg");
    assert_eq!(rows[0].3, 0);
    assert_eq!(rows[1].2, "Photos/2021/2021-05-09/IMG_1.jpg");
    assert_eq!(rows[1].3, 1);
    assert_eq!(rows[2].2, "Photos/2021/2021-05-09/IMG_2.jpg");
    assert_eq!(rows[2].3, 2);
}

#[test]
fn test_skipped_items_do_not_reserve_destinations() {
    let db = Database::open_in_memory().unwrap();
    // The first two are identical, so the second is skipped; the third is
    // distinct content under the same name and should take _1, not _2.
    let run = seed_run(
        &db,
        RunOptions::default(),
        &[
            ("/src/a/IMG.jpg", MediaType::Photo, "2021-05-09", "h1"),
            ("/src/b/IMG.jpg", MediaType::Photo, "2021-05-09", "h1"),
            ("/src/c/IMG.jpg", MediaType::Photo, "2021-05-09", "h2"),
        ],
    );
    dedup_phase(&db, &run).unwrap();
    plan_phase(&db, &run).unwrap();

    let rows = plan_rows(&db, run.run_id);
    assert_eq!(rows[1].1, "skip-duplicate");
    assert_eq!(rows[2].2, "Photos/2021/2021-05-09/IMG_1.jpg");
    assert_eq!(rows[2].3, 1);
}

#[test]
fn test_thumbnail_policies() {
    for (policy, want_action, want_rel) in [
        (ThumbsPolicy::Copy, "copy", "Photos/2021/2021-05-09/beach_thumb.jpg"),
        (ThumbsPolicy::Skip, "skip-duplicate", "Photos/2021/2021-05-09/beach_thumb.jpg"),
        (
            ThumbsPolicy::DedupSeparate,
            "copy",
            "Thumbnails/Photos/2021/2021-05-09/beach_thumb.jpg",
        ),
    ] {
        let db = Database::open_in_memory().unwrap();
        let options = RunOptions {
            thumbs_policy: policy,
            ..RunOptions::default()
        };
        let run = seed_run(
            &db,
            options,
            &[("/src/beach_thumb.jpg", MediaType::Photo, "2021-05-09", "h1")],
        );
        dedup_phase(&db, &run).unwrap();
        plan_phase(&db, &run).unwrap();

        let rows = plan_rows(&db, run.run_id);
        assert_eq!(rows[0].1, want_action, "policy {:?}", policy);
        assert_eq!(rows[0].2, want_rel, "policy {:?}", policy);
    }
}

#[test]
fn test_live_photo_motion_follows_still() {
    let db = Database::open_in_memory().unwrap();
    let options = RunOptions {
        live_photo_policy: LivePhotoPolicy::Pair,
        ..RunOptions::default()
    };
    let run = seed_run(
        &db,
        options,
        &[
            ("/src/a/IMG_1234.jpg", MediaType::Photo, "2021-05-09", "h1"),
            ("/src/a/IMG_1234.mov", MediaType::Video, "2021-05-10", "h2"),
        ],
    );
    dedup_phase(&db, &run).unwrap();
    plan_phase(&db, &run).unwrap();

    let rows = plan_rows(&db, run.run_id);
    // The motion clip lands beside its still, not in the video tree.
    assert_eq!(rows[1].1, "copy");
    assert_eq!(rows[1].2, "Photos/2021/2021-05-09/IMG_1234.mov");
}

#[test]
fn test_live_photo_pairing_requires_same_directory() {
    let db = Database::open_in_memory().unwrap();
    let options = RunOptions {
        live_photo_policy: LivePhotoPolicy::Pair,
        ..RunOptions::default()
    };
    let run = seed_run(
        &db,
        options,
        &[
            ("/src/a/IMG_1234.jpg", MediaType::Photo, "2021-05-09", "h1"),
            ("/src/b/IMG_1234.mov", MediaType::Video, "2021-05-10", "h2"),
        ],
    );
    dedup_phase(&db, &run).unwrap();
    plan_phase(&db, &run).unwrap();

    let rows = plan_rows(&db, run.run_id);
    assert_eq!(rows[1].2, "Videos/2021/2021-05-10/IMG_1234.mov");
}

#[test]
fn test_replanning_is_a_no_op() {
    let db = Database::open_in_memory().unwrap();
    let run = seed_run(
        &db,
        RunOptions::default(),
        &[
            ("/src/a/IMG_0001.jpg", MediaType::Photo, "2021-05-09", "h1"),
            ("/src/b/IMG_0002.jpg", MediaType::Photo, "2021-05-09", "h2"),
        ],
    );
    dedup_phase(&db, &run).unwrap();
    plan_phase(&db, &run).unwrap();
    let first = plan_rows(&db, run.run_id);

    // A crash between plan commit and checkpoint visibility means the
    // phase may be entered twice; the plan must not change.
    plan_phase(&db, &run).unwrap();
    let second = plan_rows(&db, run.run_id);
    assert_eq!(first, second);
}

#[test]
fn test_other_media_buckets_by_extension() {
    let db = Database::open_in_memory().unwrap();
    let run = seed_run(
        &db,
        RunOptions::default(),
        &[
            ("/src/notes.txt", MediaType::Other, "2021-05-09", "h1"),
            ("/src/README", MediaType::Other, "2021-05-09", "h2"),
        ],
    );
    dedup_phase(&db, &run).unwrap();
    plan_phase(&db, &run).unwrap();

    let rows = plan_rows(&db, run.run_id);
    assert_eq!(rows[0].2, "Other/TXT/notes.txt");
    assert_eq!(rows[1].2, "Other/NOEXT/README");
}
