use crate::storage::models::Phase;

/// Trait for reporting pipeline progress.
///
/// CLI implements with indicatif bars; tests and embedders can stay silent.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_phase_start(&self, _phase: Phase) {}
    fn on_phase_complete(&self, _phase: Phase, _duration_secs: f64) {}
    fn on_scan_progress(&self, _files_found: usize, _current_path: &str) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_execute_progress(&self, _items_done: usize, _total_items: usize) {}
    fn on_rollback_progress(&self, _items_reverted: usize, _total_items: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
