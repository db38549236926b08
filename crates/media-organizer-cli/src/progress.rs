use indicatif::{ProgressBar, ProgressStyle};
use media_organizer_core::{Phase, ProgressReporter};
use std::sync::Mutex;

/// CLI progress reporter using indicatif.
///
/// - Scan: spinner (total unknown upfront)
/// - Hash / execute / rollback: progress bar with known totals
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(&self, message: String) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(message);
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn counted_bar(&self, label: &'static str) {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(&format!(
                "  {{spinner:.cyan}} {label} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} ({{eta}} remaining)"
            ))
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn bar_position(&self, pos: usize, len: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            if pb.length() != Some(len as u64) {
                pb.set_length(len as u64);
            }
            pb.set_position(pos as u64);
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_phase_start(&self, phase: Phase) {
        match phase {
            Phase::Scan => self.spinner("Scanning files...".to_string()),
            Phase::Hash => self.counted_bar("Hashing"),
            Phase::Dedup => self.spinner("Grouping duplicates...".to_string()),
            Phase::Plan => self.spinner("Planning destinations...".to_string()),
            Phase::Execute => self.counted_bar("Copying"),
            Phase::Verify => self.spinner("Verifying copies...".to_string()),
        }
    }

    fn on_phase_complete(&self, phase: Phase, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} complete in {:.2}s",
            phase.as_str(),
            duration_secs
        );
    }

    fn on_scan_progress(&self, files_found: usize, _current_path: &str) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Scanning... {} files found", files_found));
        }
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        self.bar_position(files_hashed, total_files);
    }

    fn on_execute_progress(&self, items_done: usize, total_items: usize) {
        self.bar_position(items_done, total_items);
    }

    fn on_rollback_progress(&self, items_reverted: usize, total_items: usize) {
        self.bar_position(items_reverted, total_items);
    }
}
