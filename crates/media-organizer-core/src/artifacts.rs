use crate::error::Error;
use crate::storage::models::{Run, RunCounts};
use crate::storage::Database;
use rusqlite::params;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Write the plan manifest CSV under the run's artifacts root and register
/// it. One row per plan item, in plan order.
pub fn write_plan_manifest(db: &Database, run: &Run) -> Result<String, Error> {
    fs::create_dir_all(&run.artifacts_root)?;
    let path = Path::new(&run.artifacts_root)
        .join(format!("run_{}_plan.csv", run.run_id))
        .to_string_lossy()
        .into_owned();

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record([
        "file_id",
        "action",
        "source_path",
        "dest_rel_path",
        "collision_suffix",
        "is_primary_in_group",
    ])?;

    let mut stmt = db.connection().prepare(
        "SELECT p.file_id, p.action, f.source_path, p.dest_rel_path, p.collision_suffix, \
                p.is_primary_in_group \
         FROM plan_items p JOIN files f ON f.file_id = p.file_id \
         WHERE p.run_id = ?1 ORDER BY p.plan_item_id",
    )?;
    let rows = stmt.query_map(params![run.run_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, bool>(5)?,
        ))
    })?;
    for row in rows {
        let (file_id, action, source, rel, suffix, primary) = row?;
        writer.write_record([
            file_id.to_string(),
            action,
            source,
            rel,
            suffix.to_string(),
            primary.to_string(),
        ])?;
    }
    writer.flush()?;

    db.add_artifact(run.run_id, "plan_manifest", &path)?;
    debug!("plan manifest written to '{}'", path);
    Ok(path)
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    run_id: i64,
    run_name: &'a str,
    status: &'a str,
    source_root: &'a str,
    dest_root: &'a str,
    counts: RunCounts,
}

/// Write the end-of-run JSON report and register it.
pub fn write_run_report(db: &Database, run: &Run) -> Result<String, Error> {
    fs::create_dir_all(&run.artifacts_root)?;
    let path = Path::new(&run.artifacts_root)
        .join(format!("run_{}_report.json", run.run_id))
        .to_string_lossy()
        .into_owned();

    let current = db.get_run(run.run_id)?;
    let report = RunReport {
        run_id: run.run_id,
        run_name: &run.run_name,
        status: current.status.as_str(),
        source_root: &run.source_root,
        dest_root: &run.dest_root,
        counts: db.run_counts(run.run_id)?,
    };
    fs::write(&path, serde_json::to_string_pretty(&report)?)?;

    db.add_artifact(run.run_id, "run_report", &path)?;
    debug!("run report written to '{}'", path);
    Ok(path)
}
