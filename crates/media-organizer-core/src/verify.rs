use crate::error::Error;
use crate::hasher::hash_file;
use crate::scanner::PhaseEnd;
use crate::storage::models::{ErrorPolicy, Phase, Run, RunStatus};
use crate::storage::Database;
use crate::throttle::IoThrottle;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct VerifyOutcome {
    pub items_verified: usize,
    pub items_mismatched: usize,
}

/// Re-hash every completed copy destination against the source content
/// hash. A mismatch flips the item to error and is logged under the verify
/// phase; unhashed sources (hash phase skipped them) cannot be checked and
/// are left alone. Safe to re-run: verification has no side effects beyond
/// item status.
///
/// The verify checkpoint carries the run's terminal `completed` status in
/// the same transaction, closing the pipeline.
pub fn verify_phase(
    db: &Database,
    run: &Run,
    throttle: &IoThrottle,
    stop: &AtomicBool,
) -> Result<(PhaseEnd, VerifyOutcome), Error> {
    let items = db.done_copy_items(run.run_id)?;
    let mut outcome = VerifyOutcome::default();

    for (plan_item_id, dest_path, expected) in items {
        if stop.load(Ordering::Relaxed) {
            debug!("verify paused for run {}", run.run_id);
            return Ok((PhaseEnd::Paused, outcome));
        }
        let Some(expected) = expected else {
            continue;
        };

        let mismatch = match hash_file(Path::new(&dest_path), throttle) {
            Ok(actual) => {
                if actual == expected {
                    outcome.items_verified += 1;
                    continue;
                }
                format!("content hash mismatch at '{}'", dest_path)
            }
            Err(err) => format!("verify read '{}': {}", dest_path, err),
        };

        warn!("{}", mismatch);
        outcome.items_mismatched += 1;
        db.fail_item(plan_item_id, "VERIFY_FAIL", &mismatch)?;
        db.add_error(
            run.run_id,
            "verify",
            Some("VERIFY_FAIL"),
            &mismatch,
            None,
            Some(&dest_path),
            Some(plan_item_id),
        )?;
        if run.options.error_policy == ErrorPolicy::Halt {
            return Ok((PhaseEnd::Halted, outcome));
        }
    }

    db.write_checkpoint(run.run_id, Phase::Verify, Some(RunStatus::Completed))?;
    debug!(
        "verify complete for run {}: {} ok, {} mismatched",
        run.run_id, outcome.items_verified, outcome.items_mismatched
    );
    Ok((PhaseEnd::Done, outcome))
}
