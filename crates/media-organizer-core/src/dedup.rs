use crate::error::Error;
use crate::storage::models::{Phase, Run};
use crate::storage::Database;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub groups: usize,
    pub duplicate_files: usize,
}

/// Group the run's hashed files and elect one primary per group.
///
/// Election is deterministic over identical input: lowest file_id wins,
/// ties broken by shortest then lexicographically smallest source path.
/// A group that already has a primary keeps it; re-running this phase
/// never re-elects. Unhashed files never enter a group.
pub fn dedup_phase(db: &Database, run: &Run) -> Result<DedupOutcome, Error> {
    let files = db.hashed_files(run.run_id)?;

    // content_hash -> members (file_id, source_path), in file_id order.
    let mut groups: BTreeMap<String, Vec<(i64, String)>> = BTreeMap::new();
    for (file_id, source_path, hash) in files {
        groups.entry(hash).or_default().push((file_id, source_path));
    }

    let mut outcome = DedupOutcome::default();

    let tx = db.connection().unchecked_transaction()?;
    for (hash, mut members) in groups {
        members.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.len().cmp(&b.1.len()))
                .then(a.1.cmp(&b.1))
        });

        let group_id = db.upsert_hash_group(run.run_id, &hash)?;
        db.set_group_primary_if_unset(group_id, members[0].0)?;

        outcome.groups += 1;
        outcome.duplicate_files += members.len().saturating_sub(1);
    }
    db.write_checkpoint(run.run_id, Phase::Dedup, None)?;
    tx.commit()?;

    debug!(
        "dedup complete for run {}: {} groups, {} duplicate files",
        run.run_id, outcome.groups, outcome.duplicate_files
    );
    Ok(outcome)
}
