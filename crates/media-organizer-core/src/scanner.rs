use crate::classify::{self, ClassificationTable, MetadataExtractor};
use crate::config::AppConfig;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::storage::models::{ErrorPolicy, MediaType, NewFile, Phase, Run};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use walkdir::WalkDir;

const INSERT_BATCH: usize = 500;

/// How a phase ended: fully, or cut short by a pause request, or halted by
/// the run's error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEnd {
    Done,
    Paused,
    Halted,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files_recorded: usize,
    pub files_skipped: usize,
}

fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Walk the source tree and persist one `files` row per accepted entry.
///
/// Idempotent under re-entry: inserts go through the (run_id, source_path)
/// unique constraint, so a path recorded by an interrupted earlier scan is
/// silently kept, never duplicated.
pub fn scan_phase(
    db: &Database,
    run: &Run,
    filter: &AppConfig,
    table: &ClassificationTable,
    extractor: &dyn MetadataExtractor,
    stop: &AtomicBool,
    reporter: &dyn ProgressReporter,
) -> Result<(PhaseEnd, ScanOutcome), Error> {
    let mut outcome = ScanOutcome::default();
    let mut batch: Vec<NewFile> = Vec::new();
    let min_size = run.options.min_file_size.max(filter.min_file_size);

    let walker = WalkDir::new(&run.source_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !is_hidden_name(&e.file_name().to_string_lossy())
        });

    for entry in walker {
        if stop.load(Ordering::Relaxed) {
            db.insert_files(run.run_id, &batch)?;
            debug!("scan paused for run {}", run.run_id);
            return Ok((PhaseEnd::Paused, outcome));
        }

        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let io_kind = err.io_error().map(io::Error::kind);
                let path = err
                    .path()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                warn!("scan error at '{}': {}", path, err);
                db.add_error(
                    run.run_id,
                    "scan",
                    Some(error_code_for(io_kind)),
                    &err.to_string(),
                    Some(&path),
                    None,
                    None,
                )?;
                if run.options.error_policy == ErrorPolicy::Halt {
                    return Ok((PhaseEnd::Halted, outcome));
                }
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path_is_symlink() {
            outcome.files_skipped += 1;
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                db.add_error(
                    run.run_id,
                    "scan",
                    Some("STAT_FAIL"),
                    &err.to_string(),
                    Some(&entry.path().to_string_lossy()),
                    None,
                    None,
                )?;
                if run.options.error_policy == ErrorPolicy::Halt {
                    return Ok((PhaseEnd::Halted, outcome));
                }
                outcome.files_skipped += 1;
                continue;
            }
        };

        if metadata.len() < min_size {
            outcome.files_skipped += 1;
            continue;
        }

        let path = entry.path();
        let ext = classify::extension_of(path);
        if table.is_excluded(&ext) {
            outcome.files_skipped += 1;
            continue;
        }

        let media_type = table.classify(&ext);
        let included = match media_type {
            MediaType::Photo => filter.include_photos,
            MediaType::Video => filter.include_videos,
            MediaType::Raw => filter.include_raw,
            MediaType::Other => filter.include_other,
        };
        if !included {
            outcome.files_skipped += 1;
            continue;
        }

        let mtime: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        let capture = match media_type {
            MediaType::Photo | MediaType::Raw | MediaType::Video => {
                extractor.capture_datetime(path)
            }
            MediaType::Other => None,
        };
        let (chosen_date, date_source) = classify::choose_date(capture, mtime);

        batch.push(NewFile {
            source_path: path.to_string_lossy().into_owned(),
            ext,
            media_type,
            file_size: metadata.len(),
            mtime: mtime.to_rfc3339(),
            exif_datetime: capture.map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            chosen_date,
            date_source,
            is_hidden: false,
            is_system: false,
            is_link: false,
        });
        outcome.files_recorded += 1;
        reporter.on_scan_progress(outcome.files_recorded, &path.to_string_lossy());

        if batch.len() >= INSERT_BATCH {
            db.insert_files(run.run_id, &batch)?;
            batch.clear();
        }
    }

    // Final batch and the phase checkpoint commit together; a crash can
    // never observe the scan marked done without its rows present.
    let tx = db.connection().unchecked_transaction()?;
    db.insert_files(run.run_id, &batch)?;
    db.write_checkpoint(run.run_id, Phase::Scan, None)?;
    tx.commit()?;

    debug!(
        "scan complete for run {}: {} recorded, {} skipped",
        run.run_id, outcome.files_recorded, outcome.files_skipped
    );
    Ok((PhaseEnd::Done, outcome))
}

fn error_code_for(kind: Option<io::ErrorKind>) -> &'static str {
    match kind {
        Some(io::ErrorKind::PermissionDenied) => "PERMISSION_DENIED",
        Some(io::ErrorKind::NotFound) => "NOT_FOUND",
        _ => "SCAN_FAIL",
    }
}
