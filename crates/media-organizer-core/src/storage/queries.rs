use super::models::*;
use super::now_iso;
use super::sqlite::Database;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

fn run_from_row(row: &Row<'_>) -> Result<Run> {
    let status: String = row.get("status")?;
    let checkpoint: Option<String> = row.get("last_checkpoint")?;
    let overwrite: String = row.get("overwrite_policy")?;
    let error: String = row.get("error_policy")?;
    let duplicate: String = row.get("duplicate_policy")?;
    let live: String = row.get("live_photo_policy")?;
    let thumbs: String = row.get("thumbs_policy")?;
    let min_file_size: i64 = row.get("min_file_size")?;
    let cpu: Option<i64> = row.get("cpu_limit_pct")?;
    let io: Option<i64> = row.get("io_limit_mbps")?;

    Ok(Run {
        run_id: row.get("run_id")?,
        run_name: row.get("run_name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        source_root: row.get("source_root")?,
        dest_root: row.get("dest_root")?,
        artifacts_root: row.get("artifacts_root")?,
        status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
        last_checkpoint: checkpoint.as_deref().and_then(Phase::parse),
        options: RunOptions {
            min_file_size: min_file_size as u64,
            overwrite_policy: OverwritePolicy::parse(&overwrite)
                .unwrap_or(OverwritePolicy::Fail),
            error_policy: ErrorPolicy::parse(&error).unwrap_or(ErrorPolicy::Skip),
            link_duplicates: duplicate == "link-duplicate",
            live_photo_policy: LivePhotoPolicy::parse(&live)
                .unwrap_or(LivePhotoPolicy::Independent),
            thumbs_policy: ThumbsPolicy::parse(&thumbs).unwrap_or(ThumbsPolicy::Copy),
            cpu_limit_pct: cpu.map(|v| v as u32),
            io_limit_mbps: io.map(|v| v as u32),
        },
    })
}

const RUN_COLUMNS: &str = "run_id, run_name, created_at, updated_at, source_root, dest_root, \
     artifacts_root, status, last_checkpoint, min_file_size, overwrite_policy, \
     error_policy, duplicate_policy, live_photo_policy, thumbs_policy, \
     cpu_limit_pct, io_limit_mbps";

impl Database {
    // ── Runs ─────────────────────────────────────────────────────

    pub fn create_run(
        &self,
        run_name: &str,
        source_root: &str,
        dest_root: &str,
        artifacts_root: &str,
        options: &RunOptions,
    ) -> Result<i64> {
        let now = now_iso();
        let duplicate_policy = if options.link_duplicates {
            "link-duplicate"
        } else {
            "skip-duplicate"
        };
        self.connection().execute(
            "INSERT INTO runs (run_name, created_at, updated_at, source_root, dest_root, \
             artifacts_root, status, min_file_size, overwrite_policy, error_policy, \
             duplicate_policy, live_photo_policy, thumbs_policy, cpu_limit_pct, io_limit_mbps) \
             VALUES (?1, ?2, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                run_name,
                now,
                source_root,
                dest_root,
                artifacts_root,
                options.min_file_size as i64,
                options.overwrite_policy.as_str(),
                options.error_policy.as_str(),
                duplicate_policy,
                options.live_photo_policy.as_str(),
                options.thumbs_policy.as_str(),
                options.cpu_limit_pct.map(|v| v as i64),
                options.io_limit_mbps.map(|v| v as i64),
            ],
        )?;
        let id = self.connection().last_insert_rowid();
        debug!("created run {} ({})", id, run_name);
        Ok(id)
    }

    pub fn get_run(&self, run_id: i64) -> Result<Run> {
        self.connection().query_row(
            &format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?1"),
            params![run_id],
            run_from_row,
        )
    }

    /// Most recent run that can still make progress (not completed or
    /// rolled back).
    pub fn latest_resumable_run(&self) -> Result<Option<Run>> {
        self.connection()
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM runs \
                     WHERE status NOT IN ('completed', 'rolled_back') \
                     ORDER BY run_id DESC LIMIT 1"
                ),
                [],
                run_from_row,
            )
            .optional()
    }

    pub fn set_run_status(&self, run_id: i64, status: RunStatus) -> Result<()> {
        self.connection().execute(
            "UPDATE runs SET status = ?1, updated_at = ?2 WHERE run_id = ?3",
            params![status.as_str(), now_iso(), run_id],
        )?;
        Ok(())
    }

    /// Record a completed phase boundary. Callers invoke this inside the
    /// same transaction as the phase's final data mutation so a crash can
    /// never separate "phase marked done" from "phase data committed".
    pub fn write_checkpoint(
        &self,
        run_id: i64,
        phase: Phase,
        status: Option<RunStatus>,
    ) -> Result<()> {
        match status {
            Some(status) => self.connection().execute(
                "UPDATE runs SET last_checkpoint = ?1, status = ?2, updated_at = ?3 \
                 WHERE run_id = ?4",
                params![phase.as_str(), status.as_str(), now_iso(), run_id],
            )?,
            None => self.connection().execute(
                "UPDATE runs SET last_checkpoint = ?1, updated_at = ?2 WHERE run_id = ?3",
                params![phase.as_str(), now_iso(), run_id],
            )?,
        };
        Ok(())
    }

    // ── Files ────────────────────────────────────────────────────

    /// Insert scanned files, ignoring rows already recorded for this run.
    /// The (run_id, source_path) unique constraint makes re-scans
    /// idempotent: a conflict means "already scanned", not an error.
    pub fn insert_files(&self, run_id: i64, files: &[NewFile]) -> Result<usize> {
        let now = now_iso();
        let mut stmt = self.connection().prepare_cached(
            "INSERT OR IGNORE INTO files (run_id, source_path, ext, media_type, file_size, \
             mtime, exif_datetime, chosen_date, date_source, is_hidden, is_system, is_link, \
             created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        let mut inserted = 0;
        for f in files {
            inserted += stmt.execute(params![
                run_id,
                f.source_path,
                f.ext,
                f.media_type.as_str(),
                f.file_size as i64,
                f.mtime,
                f.exif_datetime,
                f.chosen_date,
                f.date_source.as_str(),
                f.is_hidden,
                f.is_system,
                f.is_link,
                now,
            ])?;
        }
        Ok(inserted)
    }

    pub fn files_for_hashing(&self, run_id: i64) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.connection().prepare(
            "SELECT file_id, source_path FROM files \
             WHERE run_id = ?1 AND content_hash IS NULL ORDER BY file_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_content_hash(&self, file_id: i64, hash: &str) -> Result<()> {
        self.connection().execute(
            "UPDATE files SET content_hash = ?1 WHERE file_id = ?2",
            params![hash, file_id],
        )?;
        Ok(())
    }

    /// All hashed files of a run in file_id order, for dedup grouping.
    pub fn hashed_files(&self, run_id: i64) -> Result<Vec<(i64, String, String)>> {
        let mut stmt = self.connection().prepare(
            "SELECT file_id, source_path, content_hash FROM files \
             WHERE run_id = ?1 AND content_hash IS NOT NULL ORDER BY file_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Files joined with group membership, in ascending file_id order so
    /// planning decisions are reproducible.
    pub fn files_with_groups(&self, run_id: i64) -> Result<Vec<FileWithGroup>> {
        let mut stmt = self.connection().prepare(
            "SELECT f.file_id, f.source_path, f.ext, f.media_type, f.file_size, \
                    f.chosen_date, f.content_hash, hg.group_id, hg.primary_file_id \
             FROM files f \
             LEFT JOIN hash_groups hg \
               ON hg.run_id = f.run_id AND hg.content_hash = f.content_hash \
             WHERE f.run_id = ?1 \
             ORDER BY f.file_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                let media: String = row.get(3)?;
                let size: i64 = row.get(4)?;
                Ok(FileWithGroup {
                    file_id: row.get(0)?,
                    source_path: row.get(1)?,
                    ext: row.get(2)?,
                    media_type: MediaType::parse(&media).unwrap_or(MediaType::Other),
                    file_size: size as u64,
                    chosen_date: row.get(5)?,
                    content_hash: row.get(6)?,
                    group_id: row.get(7)?,
                    primary_file_id: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Hash groups ──────────────────────────────────────────────

    pub fn upsert_hash_group(&self, run_id: i64, content_hash: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .connection()
            .query_row(
                "SELECT group_id FROM hash_groups WHERE run_id = ?1 AND content_hash = ?2",
                params![run_id, content_hash],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.connection().execute(
            "INSERT INTO hash_groups (run_id, content_hash, created_at) VALUES (?1, ?2, ?3)",
            params![run_id, content_hash, now_iso()],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    /// Elect the primary only if the group has none yet. A group's primary,
    /// once set, is immutable for the run's lifetime.
    pub fn set_group_primary_if_unset(&self, group_id: i64, file_id: i64) -> Result<bool> {
        let changed = self.connection().execute(
            "UPDATE hash_groups SET primary_file_id = ?1 \
             WHERE group_id = ?2 AND primary_file_id IS NULL",
            params![file_id, group_id],
        )?;
        Ok(changed == 1)
    }

    /// Destination and status of the primary's plan item, for link targets.
    pub fn primary_item_for_group(&self, group_id: i64) -> Result<Option<(String, String)>> {
        self.connection()
            .query_row(
                "SELECT p.dest_path, p.status \
                 FROM hash_groups hg \
                 JOIN plan_items p ON p.file_id = hg.primary_file_id \
                  AND p.run_id = hg.run_id \
                 WHERE hg.group_id = ?1",
                params![group_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
    }

    // ── Plan items ───────────────────────────────────────────────

    /// Insert plan rows, ignoring files already planned. The
    /// (run_id, file_id) unique constraint makes replanning a no-op.
    pub fn insert_plan_items(&self, run_id: i64, items: &[NewPlanItem]) -> Result<usize> {
        let mut stmt = self.connection().prepare_cached(
            "INSERT OR IGNORE INTO plan_items (run_id, file_id, action, dest_path, \
             dest_rel_path, collision_resolved, collision_suffix, duplicate_group_id, \
             is_primary_in_group, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending')",
        )?;
        let mut inserted = 0;
        for it in items {
            inserted += stmt.execute(params![
                run_id,
                it.file_id,
                it.action.as_str(),
                it.dest_path,
                it.dest_rel_path,
                it.collision_suffix > 0,
                it.collision_suffix,
                it.duplicate_group_id,
                it.is_primary_in_group,
            ])?;
        }
        Ok(inserted)
    }

    /// Executable work: pending items whose action touches the filesystem.
    pub fn exec_items(&self, run_id: i64) -> Result<Vec<ExecItem>> {
        let mut stmt = self.connection().prepare(
            "SELECT p.plan_item_id, p.file_id, p.action, f.source_path, p.dest_path, \
                    f.file_size, f.content_hash, p.duplicate_group_id \
             FROM plan_items p \
             JOIN files f ON f.file_id = p.file_id \
             WHERE p.run_id = ?1 AND p.status = 'pending' \
               AND p.action IN ('copy', 'link-duplicate') \
             ORDER BY p.plan_item_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                let action: String = row.get(2)?;
                let size: i64 = row.get(5)?;
                Ok(ExecItem {
                    plan_item_id: row.get(0)?,
                    file_id: row.get(1)?,
                    action: PlanAction::parse(&action).unwrap_or(PlanAction::SkipError),
                    source_path: row.get(3)?,
                    dest_path: row.get(4)?,
                    file_size: size as u64,
                    content_hash: row.get(6)?,
                    duplicate_group_id: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Atomically claim an item for execution. The status column is the
    /// single-writer latch: only the worker that flips pending→in-progress
    /// may touch the item.
    pub fn claim_plan_item(&self, plan_item_id: i64) -> Result<bool> {
        let changed = self.connection().execute(
            "UPDATE plan_items SET status = 'in-progress', started_at = ?1 \
             WHERE plan_item_id = ?2 AND status = 'pending'",
            params![now_iso(), plan_item_id],
        )?;
        Ok(changed == 1)
    }

    pub fn update_item_bytes(&self, plan_item_id: i64, bytes_copied: u64) -> Result<()> {
        self.connection().execute(
            "UPDATE plan_items SET bytes_copied = ?1 WHERE plan_item_id = ?2",
            params![bytes_copied as i64, plan_item_id],
        )?;
        Ok(())
    }

    /// Mark an item done and, when it created a filesystem artifact, record
    /// the rollback ledger entry in the same transaction so rollback
    /// eligibility is never ambiguous.
    pub fn complete_item(
        &self,
        run_id: i64,
        plan_item_id: i64,
        bytes_copied: u64,
        created_path: Option<&str>,
    ) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        let now = now_iso();
        self.connection().execute(
            "UPDATE plan_items SET status = 'done', bytes_copied = ?1, finished_at = ?2, \
             error_code = NULL, error_message = NULL \
             WHERE plan_item_id = ?3",
            params![bytes_copied as i64, now, plan_item_id],
        )?;
        if let Some(path) = created_path {
            self.connection().execute(
                "INSERT INTO rollback_items (run_id, plan_item_id, created_path, status, \
                 created_at) VALUES (?1, ?2, ?3, 'pending', ?4)",
                params![run_id, plan_item_id, path, now],
            )?;
        }
        tx.commit()
    }

    pub fn fail_item(&self, plan_item_id: i64, code: &str, message: &str) -> Result<()> {
        self.connection().execute(
            "UPDATE plan_items SET status = 'error', finished_at = ?1, error_code = ?2, \
             error_message = ?3 WHERE plan_item_id = ?4",
            params![now_iso(), code, message, plan_item_id],
        )?;
        Ok(())
    }

    /// Return an aborted item to the pending pool. Used when a pause lands
    /// mid-copy; the partial destination has already been removed.
    pub fn release_item(&self, plan_item_id: i64) -> Result<()> {
        self.connection().execute(
            "UPDATE plan_items SET status = 'pending', started_at = NULL, bytes_copied = 0 \
             WHERE plan_item_id = ?1",
            params![plan_item_id],
        )?;
        Ok(())
    }

    /// Items a crashed worker left claimed, with their destinations. No
    /// rollback entry means the item never completed, so whatever sits at
    /// its destination is partial output of the interrupted attempt.
    pub fn orphaned_in_progress(&self, run_id: i64) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.connection().prepare(
            "SELECT p.plan_item_id, p.dest_path FROM plan_items p \
             WHERE p.run_id = ?1 AND p.status = 'in-progress' \
               AND NOT EXISTS (SELECT 1 FROM rollback_items r \
                               WHERE r.plan_item_id = p.plan_item_id)",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Startup reconciliation: items a crashed worker left in-progress go
    /// back to pending so a resumed run can re-claim them.
    pub fn reconcile_in_progress(&self, run_id: i64) -> Result<usize> {
        let n = self.connection().execute(
            "UPDATE plan_items SET status = 'pending', started_at = NULL, bytes_copied = 0 \
             WHERE run_id = ?1 AND status = 'in-progress'",
            params![run_id],
        )?;
        Ok(n)
    }

    /// When re-entering a failed run, errored items become pending again so
    /// only unresolved work is re-attempted. Done items are never touched.
    pub fn reset_error_items(&self, run_id: i64) -> Result<usize> {
        let n = self.connection().execute(
            "UPDATE plan_items SET status = 'pending', started_at = NULL, finished_at = NULL, \
             bytes_copied = 0 \
             WHERE run_id = ?1 AND status = 'error' AND action IN ('copy', 'link-duplicate')",
            params![run_id],
        )?;
        Ok(n)
    }

    /// Completed copies eligible for post-copy verification.
    pub fn done_copy_items(&self, run_id: i64) -> Result<Vec<(i64, String, Option<String>)>> {
        let mut stmt = self.connection().prepare(
            "SELECT p.plan_item_id, p.dest_path, f.content_hash \
             FROM plan_items p \
             JOIN files f ON f.file_id = p.file_id \
             WHERE p.run_id = ?1 AND p.status = 'done' AND p.action = 'copy' \
             ORDER BY p.plan_item_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Rollback items ───────────────────────────────────────────

    pub fn pending_rollback_items(&self, run_id: i64) -> Result<Vec<RollbackItem>> {
        let mut stmt = self.connection().prepare(
            "SELECT rollback_item_id, plan_item_id, created_path, status \
             FROM rollback_items WHERE run_id = ?1 AND status = 'pending' \
             ORDER BY rollback_item_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(RollbackItem {
                    rollback_item_id: row.get(0)?,
                    plan_item_id: row.get(1)?,
                    created_path: row.get(2)?,
                    status: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Terminal transition of a rollback item: pending→reverted or
    /// pending→failed, never anything else.
    pub fn mark_rollback_item(
        &self,
        rollback_item_id: i64,
        reverted: bool,
        error_message: Option<&str>,
    ) -> Result<()> {
        let status = if reverted { "reverted" } else { "failed" };
        self.connection().execute(
            "UPDATE rollback_items SET status = ?1, error_message = ?2, reverted_at = ?3 \
             WHERE rollback_item_id = ?4 AND status = 'pending'",
            params![status, error_message, now_iso(), rollback_item_id],
        )?;
        Ok(())
    }

    pub fn pending_rollback_count(&self, run_id: i64) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM rollback_items WHERE run_id = ?1 AND status = 'pending'",
            params![run_id],
            |row| row.get(0),
        )
    }

    pub fn reverted_paths(&self, run_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.connection().prepare(
            "SELECT created_path FROM rollback_items \
             WHERE run_id = ?1 AND status = 'reverted'",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Errors ───────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn add_error(
        &self,
        run_id: i64,
        phase: &str,
        code: Option<&str>,
        message: &str,
        source_path: Option<&str>,
        dest_path: Option<&str>,
        plan_item_id: Option<i64>,
    ) -> Result<()> {
        self.connection().execute(
            "INSERT INTO errors (run_id, plan_item_id, phase, code, message, source_path, \
             dest_path, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![run_id, plan_item_id, phase, code, message, source_path, dest_path, now_iso()],
        )?;
        Ok(())
    }

    pub fn recent_errors(&self, run_id: i64, limit: i64) -> Result<Vec<ErrorRecord>> {
        let mut stmt = self.connection().prepare(
            "SELECT error_id, plan_item_id, phase, code, message, source_path, dest_path, \
             created_at FROM errors WHERE run_id = ?1 ORDER BY error_id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit], |row| {
                Ok(ErrorRecord {
                    error_id: row.get(0)?,
                    plan_item_id: row.get(1)?,
                    phase: row.get(2)?,
                    code: row.get(3)?,
                    message: row.get(4)?,
                    source_path: row.get(5)?,
                    dest_path: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Artifacts ────────────────────────────────────────────────

    pub fn add_artifact(&self, run_id: i64, kind: &str, path: &str) -> Result<()> {
        self.connection().execute(
            "INSERT INTO run_artifacts (run_id, kind, path, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, kind, path, now_iso()],
        )?;
        Ok(())
    }

    pub fn list_artifacts(&self, run_id: i64) -> Result<Vec<(String, String)>> {
        let mut stmt = self.connection().prepare(
            "SELECT kind, path FROM run_artifacts WHERE run_id = ?1 ORDER BY artifact_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Aggregates ───────────────────────────────────────────────

    pub fn run_counts(&self, run_id: i64) -> Result<RunCounts> {
        let mut counts = RunCounts::default();

        self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(file_size), 0), \
                    SUM(CASE WHEN media_type = 'photo' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN media_type = 'video' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN media_type = 'raw' THEN 1 ELSE 0 END) \
             FROM files WHERE run_id = ?1",
            params![run_id],
            |row| {
                counts.files_total = row.get::<_, i64>(0)? as u64;
                counts.bytes_total = row.get::<_, i64>(1)? as u64;
                counts.photos = row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64;
                counts.videos = row.get::<_, Option<i64>>(3)?.unwrap_or(0) as u64;
                counts.raws = row.get::<_, Option<i64>>(4)?.unwrap_or(0) as u64;
                Ok(())
            },
        )?;

        counts.duplicate_files = self.connection().query_row(
            "SELECT COALESCE(SUM(cnt - 1), 0) FROM \
             (SELECT COUNT(*) AS cnt FROM files \
              WHERE run_id = ?1 AND content_hash IS NOT NULL \
              GROUP BY content_hash HAVING cnt > 1)",
            params![run_id],
            |row| row.get::<_, i64>(0),
        )? as u64;

        self.connection().query_row(
            "SELECT SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN status = 'pending' \
                         AND action IN ('copy', 'link-duplicate') THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN action IN ('skip-duplicate', 'skip-error') \
                         THEN 1 ELSE 0 END) \
             FROM plan_items WHERE run_id = ?1",
            params![run_id],
            |row| {
                counts.items_done = row.get::<_, Option<i64>>(0)?.unwrap_or(0) as u64;
                counts.items_error = row.get::<_, Option<i64>>(1)?.unwrap_or(0) as u64;
                counts.items_pending = row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64;
                counts.items_skipped = row.get::<_, Option<i64>>(3)?.unwrap_or(0) as u64;
                Ok(())
            },
        )?;

        counts.errors_logged = self.connection().query_row(
            "SELECT COUNT(*) FROM errors WHERE run_id = ?1",
            params![run_id],
            |row| row.get::<_, i64>(0),
        )? as u64;

        Ok(counts)
    }
}
