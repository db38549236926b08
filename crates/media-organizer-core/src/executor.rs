use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::scanner::PhaseEnd;
use crate::storage::models::{ErrorPolicy, ExecItem, OverwritePolicy, Phase, PlanAction, Run};
use crate::storage::Database;
use crate::throttle::{worker_count, IoThrottle};
use rayon::prelude::*;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use sysinfo::Disks;
use tracing::{debug, warn};

const COPY_CHUNK: usize = 1024 * 1024;
// Persist bytes_copied once per this many chunks for resume visibility.
const PROGRESS_EVERY_CHUNKS: u64 = 8;
// error_policy=retry re-attempts twice before falling back to skip.
const RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Default)]
pub struct ExecOutcome {
    pub items_done: usize,
    pub items_failed: usize,
}

enum CopyEnd {
    /// Bytes written; `created` is the path to record in the rollback
    /// ledger, None when the overwrite policy skipped an existing file.
    Finished { bytes: u64, created: Option<String> },
    /// Pause landed mid-copy; the partial destination has been removed.
    Aborted,
}

struct ItemFailure {
    code: &'static str,
    message: String,
}

/// Apply every pending copy and link item against the destination tree.
///
/// Copies run on a pool sized from the run's CPU limit; links run after all
/// copies so a group primary's destination exists before anything links to
/// it. Workers claim items through the status CAS, so two workers can never
/// race on the same row, and a crashed worker's items are reset to pending
/// by the reconciliation pass on the next entry.
pub fn execute_phase(
    db: &Mutex<Database>,
    run: &Run,
    throttle: &IoThrottle,
    stop: &AtomicBool,
    reporter: &dyn ProgressReporter,
) -> Result<(PhaseEnd, ExecOutcome), Error> {
    let (copies, links) = {
        let guard = db.lock().unwrap();
        // A claimed item without a rollback entry owns whatever is at its
        // destination: the partial file must go before the item returns to
        // the pool, or the re-attempt trips over its own crash debris.
        for (plan_item_id, dest_path) in guard.orphaned_in_progress(run.run_id)? {
            match fs::remove_file(&dest_path) {
                Ok(()) => debug!(
                    "removed partial destination '{}' for item {}",
                    dest_path, plan_item_id
                ),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!("could not remove partial '{}': {}", dest_path, err),
            }
        }
        let reclaimed = guard.reconcile_in_progress(run.run_id)?;
        if reclaimed > 0 {
            debug!("reclaimed {} orphaned in-progress items", reclaimed);
        }
        let items = guard.exec_items(run.run_id)?;
        let (links, copies): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|it| it.action == PlanAction::LinkDuplicate);
        (copies, links)
    };

    let required = required_copy_bytes(&copies);
    if let Some(available) = available_bytes(Path::new(&run.dest_root)) {
        if available < required {
            let msg = format!(
                "destination needs {} bytes but only {} are free",
                required, available
            );
            warn!("run {}: {}", run.run_id, msg);
            db.lock().unwrap().add_error(
                run.run_id,
                "execute",
                Some("INSUFFICIENT_SPACE"),
                &msg,
                None,
                Some(&run.dest_root),
                None,
            )?;
            return Ok((PhaseEnd::Halted, ExecOutcome::default()));
        }
    }

    let total = copies.len() + links.len();
    let done = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let halted = AtomicBool::new(false);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count(run.options.cpu_limit_pct))
        .build()
        .map_err(|e| Error::Other(e.to_string()))?;

    let result: Result<(), Error> = pool.install(|| {
        copies.par_iter().try_for_each(|item| {
            run_item(db, run, item, throttle, stop, &halted, &done, &failed)?;
            reporter.on_execute_progress(done.load(Ordering::Relaxed), total);
            Ok(())
        })
    });
    result?;

    // Links see the primaries' final state; they are metadata-cheap and
    // run on the calling thread.
    for item in &links {
        run_item(db, run, item, throttle, stop, &halted, &done, &failed)?;
        reporter.on_execute_progress(done.load(Ordering::Relaxed), total);
    }

    let outcome = ExecOutcome {
        items_done: done.load(Ordering::Relaxed),
        items_failed: failed.load(Ordering::Relaxed),
    };

    if stop.load(Ordering::Relaxed) {
        debug!("execution paused for run {}", run.run_id);
        return Ok((PhaseEnd::Paused, outcome));
    }
    if halted.load(Ordering::Relaxed) {
        return Ok((PhaseEnd::Halted, outcome));
    }

    db.lock()
        .unwrap()
        .write_checkpoint(run.run_id, Phase::Execute, None)?;
    debug!(
        "execution complete for run {}: {} done, {} failed",
        run.run_id, outcome.items_done, outcome.items_failed
    );
    Ok((PhaseEnd::Done, outcome))
}

#[allow(clippy::too_many_arguments)]
fn run_item(
    db: &Mutex<Database>,
    run: &Run,
    item: &ExecItem,
    throttle: &IoThrottle,
    stop: &AtomicBool,
    halted: &AtomicBool,
    done: &AtomicUsize,
    failed: &AtomicUsize,
) -> Result<(), Error> {
    if stop.load(Ordering::Relaxed) || halted.load(Ordering::Relaxed) {
        return Ok(());
    }
    if !db.lock().unwrap().claim_plan_item(item.plan_item_id)? {
        return Ok(());
    }

    let attempts = match run.options.error_policy {
        ErrorPolicy::Retry => RETRY_ATTEMPTS,
        _ => 1,
    };

    let mut last_failure: Option<ItemFailure> = None;
    for attempt in 1..=attempts {
        let attempt_result = match item.action {
            PlanAction::Copy => copy_item(db, run, item, throttle, stop),
            PlanAction::LinkDuplicate => link_item(db, item, run),
            _ => return Ok(()),
        };

        match attempt_result {
            Ok(CopyEnd::Finished { bytes, created }) => {
                db.lock().unwrap().complete_item(
                    run.run_id,
                    item.plan_item_id,
                    bytes,
                    created.as_deref(),
                )?;
                done.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Ok(CopyEnd::Aborted) => {
                db.lock().unwrap().release_item(item.plan_item_id)?;
                return Ok(());
            }
            Err(failure) => {
                warn!(
                    "execute attempt {}/{} failed for '{}': {}",
                    attempt, attempts, item.source_path, failure.message
                );
                last_failure = Some(failure);
            }
        }
    }

    let failure = last_failure.unwrap_or(ItemFailure {
        code: "COPY_FAIL",
        message: "unknown failure".to_string(),
    });
    {
        let guard = db.lock().unwrap();
        guard.fail_item(item.plan_item_id, failure.code, &failure.message)?;
        guard.add_error(
            run.run_id,
            "execute",
            Some(failure.code),
            &failure.message,
            Some(&item.source_path),
            Some(&item.dest_path),
            Some(item.plan_item_id),
        )?;
    }
    failed.fetch_add(1, Ordering::Relaxed);
    if run.options.error_policy == ErrorPolicy::Halt {
        halted.store(true, Ordering::Relaxed);
    }
    Ok(())
}

/// Open the destination honouring the overwrite policy. `create_new` makes
/// the existence check and the create a single atomic operation, so two
/// workers (or a concurrent external writer) cannot race past the policy.
fn open_dest(dest: &Path, policy: OverwritePolicy) -> Result<Option<File>, ItemFailure> {
    match OpenOptions::new().write(true).create_new(true).open(dest) {
        Ok(f) => Ok(Some(f)),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => match policy {
            OverwritePolicy::Fail => Err(ItemFailure {
                code: "DEST_EXISTS",
                message: format!("destination '{}' already exists", dest.display()),
            }),
            OverwritePolicy::Skip => Ok(None),
            OverwritePolicy::Overwrite => OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(dest)
                .map(Some)
                .map_err(|e| ItemFailure {
                    code: "COPY_FAIL",
                    message: format!("open '{}': {}", dest.display(), e),
                }),
        },
        Err(err) => Err(ItemFailure {
            code: "COPY_FAIL",
            message: format!("open '{}': {}", dest.display(), err),
        }),
    }
}

fn copy_item(
    db: &Mutex<Database>,
    run: &Run,
    item: &ExecItem,
    throttle: &IoThrottle,
    stop: &AtomicBool,
) -> Result<CopyEnd, ItemFailure> {
    let dest = Path::new(&item.dest_path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| ItemFailure {
            code: "COPY_FAIL",
            message: format!("mkdir '{}': {}", parent.display(), e),
        })?;
    }

    let mut src = File::open(&item.source_path).map_err(|e| ItemFailure {
        code: "COPY_FAIL",
        message: format!("open '{}': {}", item.source_path, e),
    })?;

    let Some(mut dst) = open_dest(dest, run.options.overwrite_policy)? else {
        // Existing destination kept; nothing was created, so there is
        // nothing to roll back.
        return Ok(CopyEnd::Finished {
            bytes: 0,
            created: None,
        });
    };

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut copied: u64 = 0;
    let mut chunks: u64 = 0;
    loop {
        if stop.load(Ordering::Relaxed) {
            drop(dst);
            let _ = fs::remove_file(dest);
            return Ok(CopyEnd::Aborted);
        }

        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                drop(dst);
                let _ = fs::remove_file(dest);
                return Err(ItemFailure {
                    code: "COPY_FAIL",
                    message: format!("read '{}': {}", item.source_path, e),
                });
            }
        };

        throttle.acquire(n as u64);
        if let Err(e) = dst.write_all(&buf[..n]) {
            drop(dst);
            let _ = fs::remove_file(dest);
            return Err(ItemFailure {
                code: "COPY_FAIL",
                message: format!("write '{}': {}", dest.display(), e),
            });
        }

        copied += n as u64;
        chunks += 1;
        if chunks % PROGRESS_EVERY_CHUNKS == 0 {
            if let Ok(guard) = db.lock() {
                let _ = guard.update_item_bytes(item.plan_item_id, copied);
            }
        }
    }

    Ok(CopyEnd::Finished {
        bytes: copied,
        created: Some(item.dest_path.clone()),
    })
}

/// Hard-link a duplicate to its group primary's already-copied destination.
fn link_item(db: &Mutex<Database>, item: &ExecItem, run: &Run) -> Result<CopyEnd, ItemFailure> {
    let group_id = item.duplicate_group_id.ok_or(ItemFailure {
        code: "LINK_FAIL",
        message: "link item without a duplicate group".to_string(),
    })?;

    let primary = db
        .lock()
        .unwrap()
        .primary_item_for_group(group_id)
        .map_err(|e| ItemFailure {
            code: "LINK_FAIL",
            message: e.to_string(),
        })?;
    let (primary_dest, primary_status) = primary.ok_or(ItemFailure {
        code: "LINK_PRIMARY_MISSING",
        message: format!("group {} has no planned primary", group_id),
    })?;
    if primary_status != "done" {
        return Err(ItemFailure {
            code: "LINK_PRIMARY_MISSING",
            message: format!(
                "primary destination '{}' is not copied (status {})",
                primary_dest, primary_status
            ),
        });
    }

    let dest = Path::new(&item.dest_path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| ItemFailure {
            code: "LINK_FAIL",
            message: format!("mkdir '{}': {}", parent.display(), e),
        })?;
    }

    match fs::hard_link(&primary_dest, dest) {
        Ok(()) => Ok(CopyEnd::Finished {
            bytes: 0,
            created: Some(item.dest_path.clone()),
        }),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            match run.options.overwrite_policy {
                OverwritePolicy::Fail => Err(ItemFailure {
                    code: "DEST_EXISTS",
                    message: format!("destination '{}' already exists", dest.display()),
                }),
                OverwritePolicy::Skip => Ok(CopyEnd::Finished {
                    bytes: 0,
                    created: None,
                }),
                OverwritePolicy::Overwrite => {
                    fs::remove_file(dest).map_err(|e| ItemFailure {
                        code: "LINK_FAIL",
                        message: format!("replace '{}': {}", dest.display(), e),
                    })?;
                    fs::hard_link(&primary_dest, dest).map_err(|e| ItemFailure {
                        code: "LINK_FAIL",
                        message: format!("link '{}': {}", dest.display(), e),
                    })?;
                    Ok(CopyEnd::Finished {
                        bytes: 0,
                        created: Some(item.dest_path.clone()),
                    })
                }
            }
        }
        Err(err) => Err(ItemFailure {
            code: "LINK_FAIL",
            message: format!("link '{}': {}", dest.display(), err),
        }),
    }
}

/// Bytes the remaining copies will write. Links and skips cost nothing.
fn required_copy_bytes(items: &[ExecItem]) -> u64 {
    items
        .iter()
        .filter(|it| it.action == PlanAction::Copy)
        .map(|it| it.file_size)
        .sum()
}

/// Free space on the filesystem holding `path`: the disk with the longest
/// matching mount-point prefix. None when no disk claims the path.
fn available_bytes(path: &Path) -> Option<u64> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_item(action: PlanAction, size: u64) -> ExecItem {
        ExecItem {
            plan_item_id: 1,
            file_id: 1,
            action,
            source_path: "/src/a.jpg".to_string(),
            dest_path: "/dest/a.jpg".to_string(),
            file_size: size,
            content_hash: None,
            duplicate_group_id: None,
        }
    }

    #[test]
    fn required_bytes_counts_copies_only() {
        let items = vec![
            make_item(PlanAction::Copy, 1000),
            make_item(PlanAction::Copy, 500),
            make_item(PlanAction::LinkDuplicate, 9999),
        ];
        assert_eq!(required_copy_bytes(&items), 1500);
        assert_eq!(required_copy_bytes(&[]), 0);
    }
}
