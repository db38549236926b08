use crate::artifacts;
use crate::classify::{ClassificationTable, MetadataExtractor, NoMetadata};
use crate::config::AppConfig;
use crate::dedup;
use crate::error::Error;
use crate::executor;
use crate::hasher;
use crate::planner;
use crate::progress::ProgressReporter;
use crate::rollback::{self, RollbackOutcome};
use crate::scanner::{self, PhaseEnd};
use crate::storage::models::{
    ErrorRecord, Phase, Run, RunCounts, RunOptions, RunStatus,
};
use crate::storage::Database;
use crate::throttle::IoThrottle;
use crate::verify;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

/// How a pipeline invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped early at the requested phase boundary (dry runs); the run
    /// stays resumable from that checkpoint.
    Stopped(Phase),
    Paused,
    Failed,
}

#[derive(Debug, Clone)]
pub struct NewRunSpec {
    pub name: String,
    pub source_root: String,
    pub dest_root: String,
    /// Defaults to `<dest_root>/Artifacts` when empty.
    pub artifacts_root: Option<String>,
    pub options: RunOptions,
}

/// The resumable run state machine. Owns the store; drives
/// scan → hash → dedup → plan → execute → verify, skipping phases the
/// checkpoint already covers. Any invocation can be killed and re-invoked:
/// each phase is idempotent and its completion commits atomically with its
/// final data mutation.
pub struct Pipeline {
    db: Mutex<Database>,
    config: AppConfig,
    table: ClassificationTable,
    extractor: Box<dyn MetadataExtractor>,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            db: Mutex::new(db),
            config,
            table: ClassificationTable::default(),
            extractor: Box::new(NoMetadata),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Shared pause flag; setting it stops the run at the next safe unit
    /// boundary (between files, or between copy chunks).
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn create_run(&self, spec: &NewRunSpec) -> Result<i64, Error> {
        let artifacts_root = spec
            .artifacts_root
            .clone()
            .unwrap_or_else(|| format!("{}/Artifacts", spec.dest_root));
        let db = self.db.lock().unwrap();
        let run_id = db.create_run(
            &spec.name,
            &spec.source_root,
            &spec.dest_root,
            &artifacts_root,
            &spec.options,
        )?;
        info!("created run {} '{}'", run_id, spec.name);
        Ok(run_id)
    }

    pub fn get_run(&self, run_id: i64) -> Result<Run, Error> {
        fetch_run(&self.db.lock().unwrap(), run_id)
    }

    pub fn latest_resumable(&self) -> Result<Option<Run>, Error> {
        Ok(self.db.lock().unwrap().latest_resumable_run()?)
    }

    pub fn counts(&self, run_id: i64) -> Result<RunCounts, Error> {
        Ok(self.db.lock().unwrap().run_counts(run_id)?)
    }

    pub fn recent_errors(&self, run_id: i64, limit: i64) -> Result<Vec<ErrorRecord>, Error> {
        Ok(self.db.lock().unwrap().recent_errors(run_id, limit)?)
    }

    /// Drive the run to completion (or pause/failure).
    pub fn run(&self, run_id: i64, reporter: &dyn ProgressReporter) -> Result<RunOutcome, Error> {
        self.advance(run_id, None, reporter)
    }

    /// Drive the run up to and including `stop_after`, then stop. Used for
    /// dry runs (`stop_after = Phase::Plan`).
    pub fn run_until(
        &self,
        run_id: i64,
        stop_after: Phase,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunOutcome, Error> {
        self.advance(run_id, Some(stop_after), reporter)
    }

    fn advance(
        &self,
        run_id: i64,
        stop_after: Option<Phase>,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunOutcome, Error> {
        let run = self.get_run(run_id)?;

        match run.status {
            // Invoking a completed run is a no-op: no filesystem writes,
            // no new plan items.
            RunStatus::Completed => return Ok(RunOutcome::Completed),
            RunStatus::RolledBack => {
                return Err(Error::InvalidRunState {
                    run_id,
                    status: "rolled_back",
                    operation: "run",
                })
            }
            RunStatus::Failed => {
                // Re-attempt only unresolved items; completed work stays.
                // Items that errored after the execute checkpoint (verify
                // mismatches) keep their terminal error record.
                if run.last_checkpoint.map_or(true, |cp| cp < Phase::Execute) {
                    let reset = self.db.lock().unwrap().reset_error_items(run_id)?;
                    if reset > 0 {
                        info!("run {}: reset {} errored items for retry", run_id, reset);
                    }
                }
            }
            _ => {}
        }

        let throttle = IoThrottle::new(run.options.io_limit_mbps);

        for phase in Phase::ALL {
            if run.last_checkpoint.map_or(false, |cp| cp >= phase) {
                continue;
            }

            self.db
                .lock()
                .unwrap()
                .set_run_status(run_id, phase.running_status())?;
            reporter.on_phase_start(phase);
            let start = Instant::now();

            let end = self.run_phase(phase, &run, &throttle, reporter)?;

            match end {
                PhaseEnd::Done => {
                    reporter.on_phase_complete(phase, start.elapsed().as_secs_f64());
                }
                PhaseEnd::Paused => {
                    self.db.lock().unwrap().set_run_status(run_id, RunStatus::Paused)?;
                    info!("run {} paused during {}", run_id, phase.as_str());
                    return Ok(RunOutcome::Paused);
                }
                PhaseEnd::Halted => {
                    self.db.lock().unwrap().set_run_status(run_id, RunStatus::Failed)?;
                    warn!("run {} failed during {}", run_id, phase.as_str());
                    return Ok(RunOutcome::Failed);
                }
            }

            if stop_after == Some(phase) {
                return Ok(RunOutcome::Stopped(phase));
            }
        }

        // The verify checkpoint already carried the terminal status; the
        // report is an opaque artifact on top.
        let db = self.db.lock().unwrap();
        let run = fetch_run(&db, run_id)?;
        artifacts::write_run_report(&db, &run)?;
        info!("run {} completed", run_id);
        Ok(RunOutcome::Completed)
    }

    fn run_phase(
        &self,
        phase: Phase,
        run: &Run,
        throttle: &IoThrottle,
        reporter: &dyn ProgressReporter,
    ) -> Result<PhaseEnd, Error> {
        match phase {
            Phase::Scan => {
                let db = self.db.lock().unwrap();
                let (end, _) = scanner::scan_phase(
                    &db,
                    run,
                    &self.config,
                    &self.table,
                    self.extractor.as_ref(),
                    &self.stop,
                    reporter,
                )?;
                Ok(end)
            }
            Phase::Hash => hasher::hash_phase(&self.db, run, throttle, &self.stop, reporter),
            Phase::Dedup => {
                let db = self.db.lock().unwrap();
                dedup::dedup_phase(&db, run)?;
                Ok(PhaseEnd::Done)
            }
            Phase::Plan => {
                let db = self.db.lock().unwrap();
                planner::plan_phase(&db, run)?;
                artifacts::write_plan_manifest(&db, run)?;
                Ok(PhaseEnd::Done)
            }
            Phase::Execute => {
                let (end, _) =
                    executor::execute_phase(&self.db, run, throttle, &self.stop, reporter)?;
                Ok(end)
            }
            Phase::Verify => {
                let db = self.db.lock().unwrap();
                let (end, _) = verify::verify_phase(&db, run, throttle, &self.stop)?;
                Ok(end)
            }
        }
    }

    /// Undo the run's filesystem effects from the rollback ledger. Valid
    /// for a run in any state; repeat invocations skip settled items.
    pub fn rollback(
        &self,
        run_id: i64,
        reporter: &dyn ProgressReporter,
    ) -> Result<RollbackOutcome, Error> {
        let db = self.db.lock().unwrap();
        fetch_run(&db, run_id)?;
        rollback::rollback_run(&db, run_id, reporter)
    }

    pub fn into_db(self) -> Database {
        self.db.into_inner().unwrap()
    }
}

fn fetch_run(db: &Database, run_id: i64) -> Result<Run, Error> {
    match db.get_run(run_id) {
        Ok(run) => Ok(run),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::RunNotFound(run_id)),
        Err(e) => Err(e.into()),
    }
}
