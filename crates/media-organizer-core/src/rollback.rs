use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::storage::models::RunStatus;
use crate::storage::Database;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct RollbackOutcome {
    pub items_reverted: usize,
    pub items_failed: usize,
}

/// Undo a run's filesystem effects using only the rollback ledger.
///
/// Best-effort: a deletion failure marks that item failed and is logged,
/// but the remaining items are still processed. Items already reverted or
/// failed are skipped, so invoking rollback repeatedly is safe. When no
/// pending items remain the run becomes `rolled_back`.
pub fn rollback_run(
    db: &Database,
    run_id: i64,
    reporter: &dyn ProgressReporter,
) -> Result<RollbackOutcome, Error> {
    let run = db.get_run(run_id)?;
    let items = db.pending_rollback_items(run_id)?;
    let total = items.len();
    let mut outcome = RollbackOutcome::default();

    for item in items {
        let path = Path::new(&item.created_path);
        let removal = match fs::remove_file(path) {
            Ok(()) => Ok(()),
            // Already gone counts as reverted; the goal state holds.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        };

        match removal {
            Ok(()) => {
                prune_empty_dirs(path, Path::new(&run.dest_root));
                db.mark_rollback_item(item.rollback_item_id, true, None)?;
                outcome.items_reverted += 1;
            }
            Err(err) => {
                warn!("rollback failed for '{}': {}", item.created_path, err);
                db.mark_rollback_item(item.rollback_item_id, false, Some(&err.to_string()))?;
                db.add_error(
                    run_id,
                    "rollback",
                    Some("DELETE_FAIL"),
                    &err.to_string(),
                    None,
                    Some(&item.created_path),
                    Some(item.plan_item_id),
                )?;
                outcome.items_failed += 1;
            }
        }
        reporter.on_rollback_progress(outcome.items_reverted, total);
    }

    if db.pending_rollback_count(run_id)? == 0 {
        db.set_run_status(run_id, RunStatus::RolledBack)?;
        info!(
            "run {} rolled back: {} reverted, {} failed",
            run_id, outcome.items_reverted, outcome.items_failed
        );
    }
    Ok(outcome)
}

/// Remove now-empty date-bucket directories left behind by a deletion,
/// walking up until the destination root or a non-empty directory.
fn prune_empty_dirs(deleted: &Path, dest_root: &Path) {
    let mut dir = deleted.parent();
    while let Some(d) = dir {
        if d == dest_root || !d.starts_with(dest_root) {
            break;
        }
        let empty = fs::read_dir(d)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty {
            break;
        }
        if fs::remove_dir(d).is_err() {
            break;
        }
        debug!("pruned empty directory '{}'", d.display());
        dir = d.parent();
    }
}
