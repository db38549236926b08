use media_organizer_core::storage::models::*;
use media_organizer_core::storage::Database;

fn make_test_file(path: &str, size: u64, date: &str) -> NewFile {
    NewFile {
        source_path: path.to_string(),
        ext: path.rsplit('.').next().unwrap_or_default().to_string(),
        media_type: MediaType::Photo,
        file_size: size,
        mtime: format!("{}T10:00:00+00:00", date),
        exif_datetime: None,
        chosen_date: date.to_string(),
        date_source: DateSource::Mtime,
        is_hidden: false,
        is_system: false,
        is_link: false,
    }
}

fn make_test_run(db: &Database) -> i64 {
    db.create_run(
        "test_run",
        "/src",
        "/dest",
        "/dest/Artifacts",
        &RunOptions::default(),
    )
    .unwrap()
}

#[test]
fn test_create_and_get_run() {
    let db = Database::open_in_memory().unwrap();
    let options = RunOptions {
        min_file_size: 1024,
        overwrite_policy: OverwritePolicy::Skip,
        error_policy: ErrorPolicy::Retry,
        link_duplicates: true,
        live_photo_policy: LivePhotoPolicy::Pair,
        thumbs_policy: ThumbsPolicy::DedupSeparate,
        cpu_limit_pct: Some(50),
        io_limit_mbps: Some(100),
    };
    let run_id = db
        .create_run("spring_import", "/media/card", "/library", "/library/Artifacts", &options)
        .unwrap();
    assert!(run_id > 0);

    let run = db.get_run(run_id).unwrap();
    assert_eq!(run.run_name, "spring_import");
    assert_eq!(run.status, RunStatus::Pending);
    assert_eq!(run.last_checkpoint, None);
    assert_eq!(run.options.min_file_size, 1024);
    assert_eq!(run.options.overwrite_policy, OverwritePolicy::Skip);
    assert_eq!(run.options.error_policy, ErrorPolicy::Retry);
    assert!(run.options.link_duplicates);
    assert_eq!(run.options.live_photo_policy, LivePhotoPolicy::Pair);
    assert_eq!(run.options.thumbs_policy, ThumbsPolicy::DedupSeparate);
    assert_eq!(run.options.cpu_limit_pct, Some(50));
    assert_eq!(run.options.io_limit_mbps, Some(100));
}

#[test]
fn test_latest_resumable_skips_terminal_runs() {
    let db = Database::open_in_memory().unwrap();
    let first = make_test_run(&db);
    let second = make_test_run(&db);
    let third = make_test_run(&db);

    db.set_run_status(third, RunStatus::Completed).unwrap();
    let resumable = db.latest_resumable_run().unwrap().unwrap();
    assert_eq!(resumable.run_id, second);

    db.set_run_status(second, RunStatus::RolledBack).unwrap();
    let resumable = db.latest_resumable_run().unwrap().unwrap();
    assert_eq!(resumable.run_id, first);

    db.set_run_status(first, RunStatus::Completed).unwrap();
    assert!(db.latest_resumable_run().unwrap().is_none());
}

#[test]
fn test_insert_files_is_idempotent() {
    let db = Database::open_in_memory().unwrap();
    let run_id = make_test_run(&db);

    let files = vec![
        make_test_file("/src/a.jpg", 100, "2021-05-09"),
        make_test_file("/src/b.jpg", 200, "2021-05-09"),
    ];
    assert_eq!(db.insert_files(run_id, &files).unwrap(), 2);

    // Re-inserting the same paths (an interrupted scan re-walking the
    // tree) must not create new rows.
    assert_eq!(db.insert_files(run_id, &files).unwrap(), 0);

    let counts = db.run_counts(run_id).unwrap();
    assert_eq!(counts.files_total, 2);
    assert_eq!(counts.bytes_total, 300);
}

#[test]
fn test_checkpoint_write_and_ordering() {
    let db = Database::open_in_memory().unwrap();
    let run_id = make_test_run(&db);

    db.write_checkpoint(run_id, Phase::Scan, None).unwrap();
    let run = db.get_run(run_id).unwrap();
    assert_eq!(run.last_checkpoint, Some(Phase::Scan));
    assert!(run.last_checkpoint.unwrap() < Phase::Execute);

    db.write_checkpoint(run_id, Phase::Verify, Some(RunStatus::Completed))
        .unwrap();
    let run = db.get_run(run_id).unwrap();
    assert_eq!(run.last_checkpoint, Some(Phase::Verify));
    assert_eq!(run.status, RunStatus::Completed);
}

#[test]
fn test_plan_item_claim_is_exclusive() {
    let db = Database::open_in_memory().unwrap();
    let run_id = make_test_run(&db);
    db.insert_files(run_id, &[make_test_file("/src/a.jpg", 100, "2021-05-09")])
        .unwrap();
    let (file_id, _) = db.files_for_hashing(run_id).unwrap()[0].clone();

    db.insert_plan_items(
        run_id,
        &[NewPlanItem {
            file_id,
            action: PlanAction::Copy,
            dest_path: "/dest/Photos/2021/2021-05-09/a.jpg".to_string(),
            dest_rel_path: "Photos/2021/2021-05-09/a.jpg".to_string(),
            collision_suffix: 0,
            duplicate_group_id: None,
            is_primary_in_group: false,
        }],
    )
    .unwrap();
    let item = db.exec_items(run_id).unwrap().remove(0);

    // Only one claimant may win; the loser must not touch the item.
    assert!(db.claim_plan_item(item.plan_item_id).unwrap());
    assert!(!db.claim_plan_item(item.plan_item_id).unwrap());

    // A released item can be claimed again.
    db.release_item(item.plan_item_id).unwrap();
    assert!(db.claim_plan_item(item.plan_item_id).unwrap());

    // Reconciliation returns orphaned in-progress items to the pool.
    assert_eq!(db.reconcile_in_progress(run_id).unwrap(), 1);
    assert_eq!(db.exec_items(run_id).unwrap().len(), 1);
}

#[test]
fn test_plan_items_unique_per_file() {
    let db = Database::open_in_memory().unwrap();
    let run_id = make_test_run(&db);
    db.insert_files(run_id, &[make_test_file("/src/a.jpg", 100, "2021-05-09")])
        .unwrap();
    let (file_id, _) = db.files_for_hashing(run_id).unwrap()[0].clone();

    let item = NewPlanItem {
        file_id,
        action: PlanAction::Copy,
        dest_path: "/dest/Photos/2021/2021-05-09/a.jpg".to_string(),
        dest_rel_path: "Photos/2021/2021-05-09/a.jpg".to_string(),
        collision_suffix: 0,
        duplicate_group_id: None,
        is_primary_in_group: false,
    };
    assert_eq!(db.insert_plan_items(run_id, &[item.clone()]).unwrap(), 1);
    // Replanning the same file is a no-op.
    assert_eq!(db.insert_plan_items(run_id, &[item]).unwrap(), 0);
}

#[test]
fn test_complete_item_records_rollback_entry() {
    let db = Database::open_in_memory().unwrap();
    let run_id = make_test_run(&db);
    db.insert_files(run_id, &[make_test_file("/src/a.jpg", 100, "2021-05-09")])
        .unwrap();
    let (file_id, _) = db.files_for_hashing(run_id).unwrap()[0].clone();
    db.insert_plan_items(
        run_id,
        &[NewPlanItem {
            file_id,
            action: PlanAction::Copy,
            dest_path: "/dest/Photos/2021/2021-05-09/a.jpg".to_string(),
            dest_rel_path: "Photos/2021/2021-05-09/a.jpg".to_string(),
            collision_suffix: 0,
            duplicate_group_id: None,
            is_primary_in_group: false,
        }],
    )
    .unwrap();
    let item = db.exec_items(run_id).unwrap().remove(0);
    assert!(db.claim_plan_item(item.plan_item_id).unwrap());

    db.complete_item(run_id, item.plan_item_id, 100, Some(&item.dest_path))
        .unwrap();

    let pending = db.pending_rollback_items(run_id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].created_path, item.dest_path);

    // Terminal transition: once reverted, a second mark cannot change it.
    db.mark_rollback_item(pending[0].rollback_item_id, true, None)
        .unwrap();
    db.mark_rollback_item(pending[0].rollback_item_id, false, Some("late failure"))
        .unwrap();
    assert_eq!(db.pending_rollback_count(run_id).unwrap(), 0);
    assert_eq!(db.reverted_paths(run_id).unwrap(), vec![item.dest_path]);
}

#[test]
fn test_group_primary_is_immutable() {
    let db = Database::open_in_memory().unwrap();
    let run_id = make_test_run(&db);

    let group_id = db.upsert_hash_group(run_id, "abc123").unwrap();
    // Idempotent: same hash maps to the same group.
    assert_eq!(db.upsert_hash_group(run_id, "abc123").unwrap(), group_id);

    assert!(db.set_group_primary_if_unset(group_id, 7).unwrap());
    assert!(!db.set_group_primary_if_unset(group_id, 9).unwrap());

    let primary: i64 = db
        .connection()
        .query_row(
            "SELECT primary_file_id FROM hash_groups WHERE group_id = ?1",
            rusqlite::params![group_id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(primary, 7);
}

#[test]
fn test_error_log_and_counts() {
    let db = Database::open_in_memory().unwrap();
    let run_id = make_test_run(&db);

    db.add_error(
        run_id,
        "scan",
        Some("PERMISSION_DENIED"),
        "permission denied",
        Some("/src/locked"),
        None,
        None,
    )
    .unwrap();
    db.add_error(run_id, "execute", Some("COPY_FAIL"), "disk full", None, None, None)
        .unwrap();

    let errors = db.recent_errors(run_id, 10).unwrap();
    assert_eq!(errors.len(), 2);
    // Most recent first.
    assert_eq!(errors[0].phase, "execute");
    assert_eq!(errors[1].code.as_deref(), Some("PERMISSION_DENIED"));

    let counts = db.run_counts(run_id).unwrap();
    assert_eq!(counts.errors_logged, 2);
}
