use crate::classify;
use crate::error::Error;
use crate::storage::models::{
    FileWithGroup, LivePhotoPolicy, MediaType, NewPlanItem, Phase, PlanAction, Run,
    ThumbsPolicy,
};
use crate::storage::Database;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Collision suffixes stop at `_999`; past that the item is planned as a
/// skip-error and the failure is logged.
const SUFFIX_CAP: u32 = 999;

#[derive(Debug, Default)]
pub struct PlanOutcome {
    pub items: usize,
    pub collisions: usize,
    pub skipped_duplicates: usize,
}

/// Root-relative destination for a non-duplicate item: date-bucketed for
/// media, extension-bucketed for everything else.
pub fn dest_rel_path(media_type: MediaType, chosen_date: &str, filename: &str) -> PathBuf {
    let year = if chosen_date.len() >= 4 {
        &chosen_date[..4]
    } else {
        "0000"
    };
    match media_type {
        MediaType::Photo => Path::new("Photos").join(year).join(chosen_date).join(filename),
        MediaType::Video => Path::new("Videos").join(year).join(chosen_date).join(filename),
        MediaType::Raw => Path::new("RAW").join(year).join(chosen_date).join(filename),
        MediaType::Other => {
            let ext_tag = Path::new(filename)
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_uppercase())
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "NOEXT".to_string());
            Path::new("Other").join(ext_tag).join(filename)
        }
    }
}

/// `beach.jpg` + 2 → `beach_2.jpg`; extensionless names get the suffix
/// appended to the whole name.
fn with_suffix(rel: &Path, n: u32) -> PathBuf {
    let stem = rel
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match rel.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    rel.with_file_name(name)
}

struct Draft {
    file: FileWithGroup,
    action: PlanAction,
    rel: PathBuf,
    group_id: Option<i64>,
    is_primary: bool,
    suffix: u32,
}

/// Compute one plan item per file: the action from group membership and
/// run policies, the destination from the chosen date, and collision-free
/// paths among the run's active items.
///
/// Files are processed in ascending file_id order so suffix assignment is
/// reproducible; collision resolution happens here, strictly before any
/// copy begins. Replanning is a no-op for files that already have an item.
pub fn plan_phase(db: &Database, run: &Run) -> Result<PlanOutcome, Error> {
    let files = db.files_with_groups(run.run_id)?;
    let mut outcome = PlanOutcome::default();

    let mut drafts: Vec<Draft> = Vec::with_capacity(files.len());
    for file in files {
        let source = PathBuf::from(&file.source_path);
        let filename = source
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.source_path.clone());

        let is_primary =
            file.group_id.is_none() || file.primary_file_id == Some(file.file_id);
        let mut action = if is_primary {
            PlanAction::Copy
        } else if run.options.link_duplicates {
            PlanAction::LinkDuplicate
        } else {
            PlanAction::SkipDuplicate
        };
        let mut group_id = file.group_id;

        let mut rel = dest_rel_path(file.media_type, &file.chosen_date, &filename);

        if classify::is_thumbnail(&source) {
            match run.options.thumbs_policy {
                ThumbsPolicy::Copy => {}
                ThumbsPolicy::Skip => {
                    action = PlanAction::SkipDuplicate;
                    group_id = None;
                }
                ThumbsPolicy::DedupSeparate => {
                    rel = Path::new("Thumbnails").join(&rel);
                }
            }
        }

        drafts.push(Draft {
            file,
            action,
            rel,
            group_id,
            is_primary,
            suffix: 0,
        });
    }

    if run.options.live_photo_policy == LivePhotoPolicy::Pair {
        pair_live_photos(&mut drafts);
    }

    // Collision resolution against the active (non-skip) plan set. This is
    // the happens-before barrier relative to execution: every dest path is
    // unique before a single byte is copied.
    let mut active: HashSet<String> = HashSet::new();
    for draft in &mut drafts {
        if draft.action.is_skip() {
            continue;
        }
        let key = draft.rel.to_string_lossy().into_owned();
        if active.insert(key) {
            continue;
        }
        let mut resolved = false;
        for n in 1..=SUFFIX_CAP {
            let candidate = with_suffix(&draft.rel, n);
            let key = candidate.to_string_lossy().into_owned();
            if active.insert(key) {
                draft.rel = candidate;
                draft.suffix = n;
                outcome.collisions += 1;
                resolved = true;
                break;
            }
        }
        if !resolved {
            warn!(
                "collision suffixes exhausted for '{}'",
                draft.file.source_path
            );
            db.add_error(
                run.run_id,
                "plan",
                Some("COLLISION_CAP"),
                &format!(
                    "no free destination under '{}' within {} suffixes",
                    draft.rel.display(),
                    SUFFIX_CAP
                ),
                Some(&draft.file.source_path),
                Some(&draft.rel.to_string_lossy()),
                None,
            )?;
            draft.action = PlanAction::SkipError;
        }
    }

    let dest_root = Path::new(&run.dest_root);
    let items: Vec<NewPlanItem> = drafts
        .iter()
        .map(|d| NewPlanItem {
            file_id: d.file.file_id,
            action: d.action,
            dest_path: dest_root.join(&d.rel).to_string_lossy().into_owned(),
            dest_rel_path: d.rel.to_string_lossy().into_owned(),
            collision_suffix: d.suffix,
            duplicate_group_id: d.group_id,
            is_primary_in_group: d.group_id.is_some() && d.is_primary,
        })
        .collect();

    outcome.items = items.len();
    outcome.skipped_duplicates = drafts
        .iter()
        .filter(|d| d.action == PlanAction::SkipDuplicate)
        .count();

    // The whole plan and its checkpoint land in one transaction: a crash
    // during planning leaves no partial plan to reconcile on resume.
    let tx = db.connection().unchecked_transaction()?;
    db.insert_plan_items(run.run_id, &items)?;
    db.write_checkpoint(run.run_id, Phase::Plan, None)?;
    tx.commit()?;

    debug!(
        "plan complete for run {}: {} items, {} collisions",
        run.run_id, outcome.items, outcome.collisions
    );
    Ok(outcome)
}

/// Pair a motion clip with its still when they share a directory and stem.
/// The motion item follows the still: same destination directory, and it
/// is skipped whenever the still is skipped.
fn pair_live_photos(drafts: &mut [Draft]) {
    let mut stills: HashMap<(String, String), usize> = HashMap::new();
    for (idx, draft) in drafts.iter().enumerate() {
        if draft.file.media_type != MediaType::Photo {
            continue;
        }
        let source = Path::new(&draft.file.source_path);
        let parent = source
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        stills.entry((parent, stem)).or_insert(idx);
    }

    for idx in 0..drafts.len() {
        let draft = &drafts[idx];
        if draft.file.media_type != MediaType::Video
            || !classify::is_live_motion_ext(&draft.file.ext)
        {
            continue;
        }
        let source = Path::new(&draft.file.source_path);
        let parent = source
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let Some(&still_idx) = stills.get(&(parent, stem)) else {
            continue;
        };

        let still_skipped = drafts[still_idx].action.is_skip();
        let still_dir = drafts[still_idx]
            .rel
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let motion = &mut drafts[idx];
        if still_skipped {
            motion.action = PlanAction::SkipDuplicate;
        } else {
            motion.action = PlanAction::Copy;
            if let Some(name) = motion.rel.file_name() {
                motion.rel = still_dir.join(name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_bucketed_destinations() {
        assert_eq!(
            dest_rel_path(MediaType::Photo, "2021-05-09", "IMG_1.jpg"),
            Path::new("Photos/2021/2021-05-09/IMG_1.jpg")
        );
        assert_eq!(
            dest_rel_path(MediaType::Raw, "2021-05-09", "IMG_1.cr2"),
            Path::new("RAW/2021/2021-05-09/IMG_1.cr2")
        );
        assert_eq!(
            dest_rel_path(MediaType::Other, "2021-05-09", "notes.txt"),
            Path::new("Other/TXT/notes.txt")
        );
        assert_eq!(
            dest_rel_path(MediaType::Other, "2021-05-09", "README"),
            Path::new("Other/NOEXT/README")
        );
    }

    #[test]
    fn suffix_insertion_before_extension() {
        assert_eq!(
            with_suffix(Path::new("Photos/2021/2021-05-09/beach.jpg"), 1),
            Path::new("Photos/2021/2021-05-09/beach_1.jpg")
        );
        assert_eq!(
            with_suffix(Path::new("Other/NOEXT/README"), 3),
            Path::new("Other/NOEXT/README_3")
        );
    }
}
