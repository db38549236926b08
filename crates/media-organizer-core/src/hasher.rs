use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::scanner::PhaseEnd;
use crate::storage::models::{ErrorPolicy, Phase, Run};
use crate::storage::Database;
use crate::throttle::{worker_count, IoThrottle};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

const HASH_CHUNK: usize = 1024 * 1024;

/// Stream a file through BLAKE3, paced by the shared I/O throttle.
pub fn hash_file(path: &Path, throttle: &IoThrottle) -> io::Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        throttle.acquire(n as u64);
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash every file of the run that has no content hash yet. File reads fan
/// out across the worker pool; all store writes stay on one thread at a
/// time behind the database mutex. Files whose hash fails are logged and
/// left unhashed; they are later planned individually as non-duplicates.
pub fn hash_phase(
    db: &Mutex<Database>,
    run: &Run,
    throttle: &IoThrottle,
    stop: &AtomicBool,
    reporter: &dyn ProgressReporter,
) -> Result<PhaseEnd, Error> {
    let files = db.lock().unwrap().files_for_hashing(run.run_id)?;
    let total = files.len();
    if total == 0 {
        db.lock().unwrap().write_checkpoint(run.run_id, Phase::Hash, None)?;
        return Ok(PhaseEnd::Done);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count(run.options.cpu_limit_pct))
        .build()
        .map_err(|e| Error::Other(e.to_string()))?;

    let completed = AtomicUsize::new(0);
    let halted = AtomicBool::new(false);

    let result: Result<(), Error> = pool.install(|| {
        files.par_iter().try_for_each(|(file_id, source_path)| {
            if stop.load(Ordering::Relaxed) || halted.load(Ordering::Relaxed) {
                return Ok(());
            }

            match hash_file(Path::new(source_path), throttle) {
                Ok(hash) => {
                    db.lock().unwrap().set_content_hash(*file_id, &hash)?;
                }
                Err(err) => {
                    warn!("hash failed for '{}': {}", source_path, err);
                    db.lock().unwrap().add_error(
                        run.run_id,
                        "hash",
                        Some("HASH_FAIL"),
                        &err.to_string(),
                        Some(source_path),
                        None,
                        None,
                    )?;
                    if run.options.error_policy == ErrorPolicy::Halt {
                        halted.store(true, Ordering::Relaxed);
                    }
                }
            }

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_hash_progress(done, total);
            Ok(())
        })
    });
    result?;

    if stop.load(Ordering::Relaxed) {
        debug!("hash paused for run {}", run.run_id);
        return Ok(PhaseEnd::Paused);
    }
    if halted.load(Ordering::Relaxed) {
        return Ok(PhaseEnd::Halted);
    }

    db.lock().unwrap().write_checkpoint(run.run_id, Phase::Hash, None)?;
    debug!("hash complete for run {}: {} files", run.run_id, total);
    Ok(PhaseEnd::Done)
}
