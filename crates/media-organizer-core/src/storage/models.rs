use serde::{Deserialize, Serialize};

/// Lifecycle of a run. Advances only forward through the phase order;
/// `failed` and `rolled_back` are reachable from any non-terminal state,
/// `paused` from any in-progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Scanning,
    Hashing,
    Planning,
    Executing,
    Verifying,
    Completed,
    Paused,
    Failed,
    RolledBack,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Scanning => "scanning",
            RunStatus::Hashing => "hashing",
            RunStatus::Planning => "planning",
            RunStatus::Executing => "executing",
            RunStatus::Verifying => "verifying",
            RunStatus::Completed => "completed",
            RunStatus::Paused => "paused",
            RunStatus::Failed => "failed",
            RunStatus::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => RunStatus::Pending,
            "scanning" => RunStatus::Scanning,
            "hashing" => RunStatus::Hashing,
            "planning" => RunStatus::Planning,
            "executing" => RunStatus::Executing,
            "verifying" => RunStatus::Verifying,
            "completed" => RunStatus::Completed,
            "paused" => RunStatus::Paused,
            "failed" => RunStatus::Failed,
            "rolled_back" => RunStatus::RolledBack,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::RolledBack)
    }
}

/// A phase boundary. `runs.last_checkpoint` records the last phase whose
/// terminal data mutation fully committed; resume skips everything at or
/// before the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Scan,
    Hash,
    Dedup,
    Plan,
    Execute,
    Verify,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Scan,
        Phase::Hash,
        Phase::Dedup,
        Phase::Plan,
        Phase::Execute,
        Phase::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Scan => "scan",
            Phase::Hash => "hash",
            Phase::Dedup => "dedup",
            Phase::Plan => "plan",
            Phase::Execute => "execute",
            Phase::Verify => "verify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "scan" => Phase::Scan,
            "hash" => Phase::Hash,
            "dedup" => Phase::Dedup,
            "plan" => Phase::Plan,
            "execute" => Phase::Execute,
            "verify" => Phase::Verify,
            _ => return None,
        })
    }

    /// Run status shown while this phase is in progress.
    pub fn running_status(&self) -> RunStatus {
        match self {
            Phase::Scan => RunStatus::Scanning,
            Phase::Hash => RunStatus::Hashing,
            Phase::Dedup | Phase::Plan => RunStatus::Planning,
            Phase::Execute => RunStatus::Executing,
            Phase::Verify => RunStatus::Verifying,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwritePolicy {
    Fail,
    Skip,
    Overwrite,
}

impl OverwritePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverwritePolicy::Fail => "fail",
            OverwritePolicy::Skip => "skip",
            OverwritePolicy::Overwrite => "overwrite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "fail" => OverwritePolicy::Fail,
            "skip" => OverwritePolicy::Skip,
            "overwrite" => OverwritePolicy::Overwrite,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    Halt,
    Skip,
    Retry,
}

impl ErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPolicy::Halt => "halt",
            ErrorPolicy::Skip => "skip",
            ErrorPolicy::Retry => "retry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "halt" => ErrorPolicy::Halt,
            "skip" => ErrorPolicy::Skip,
            "retry" => ErrorPolicy::Retry,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LivePhotoPolicy {
    Pair,
    Independent,
}

impl LivePhotoPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivePhotoPolicy::Pair => "pair",
            LivePhotoPolicy::Independent => "independent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pair" => LivePhotoPolicy::Pair,
            "independent" => LivePhotoPolicy::Independent,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThumbsPolicy {
    Copy,
    Skip,
    DedupSeparate,
}

impl ThumbsPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThumbsPolicy::Copy => "copy",
            ThumbsPolicy::Skip => "skip",
            ThumbsPolicy::DedupSeparate => "dedup-separate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "copy" => ThumbsPolicy::Copy,
            "skip" => ThumbsPolicy::Skip,
            "dedup-separate" => ThumbsPolicy::DedupSeparate,
            _ => return None,
        })
    }
}

/// What execution does with a file. `skip-*` actions never touch the
/// filesystem and are excluded from destination collision checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Copy,
    LinkDuplicate,
    SkipDuplicate,
    SkipError,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanAction::Copy => "copy",
            PlanAction::LinkDuplicate => "link-duplicate",
            PlanAction::SkipDuplicate => "skip-duplicate",
            PlanAction::SkipError => "skip-error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "copy" => PlanAction::Copy,
            "link-duplicate" => PlanAction::LinkDuplicate,
            "skip-duplicate" => PlanAction::SkipDuplicate,
            "skip-error" => PlanAction::SkipError,
            _ => return None,
        })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, PlanAction::SkipDuplicate | PlanAction::SkipError)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    InProgress,
    Done,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in-progress",
            ItemStatus::Done => "done",
            ItemStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Photo,
    Video,
    Raw,
    Other,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Video => "video",
            MediaType::Raw => "raw",
            MediaType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "photo" => MediaType::Photo,
            "video" => MediaType::Video,
            "raw" => MediaType::Raw,
            "other" => MediaType::Other,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    Exif,
    Mtime,
}

impl DateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateSource::Exif => "exif",
            DateSource::Mtime => "mtime",
        }
    }
}

/// Per-run policy snapshot, persisted on the runs row so a cold resume sees
/// exactly the choices the run started with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    pub min_file_size: u64,
    pub overwrite_policy: OverwritePolicy,
    pub error_policy: ErrorPolicy,
    pub link_duplicates: bool,
    pub live_photo_policy: LivePhotoPolicy,
    pub thumbs_policy: ThumbsPolicy,
    pub cpu_limit_pct: Option<u32>,
    pub io_limit_mbps: Option<u32>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            min_file_size: 0,
            overwrite_policy: OverwritePolicy::Fail,
            error_policy: ErrorPolicy::Skip,
            link_duplicates: false,
            live_photo_policy: LivePhotoPolicy::Independent,
            thumbs_policy: ThumbsPolicy::Copy,
            cpu_limit_pct: None,
            io_limit_mbps: None,
        }
    }
}

/// One migration job and its persisted configuration.
#[derive(Debug, Clone)]
pub struct Run {
    pub run_id: i64,
    pub run_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub source_root: String,
    pub dest_root: String,
    pub artifacts_root: String,
    pub status: RunStatus,
    pub last_checkpoint: Option<Phase>,
    pub options: RunOptions,
}

/// A file record ready for insertion during scanning.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub source_path: String,
    pub ext: String,
    pub media_type: MediaType,
    pub file_size: u64,
    pub mtime: String,
    pub exif_datetime: Option<String>,
    pub chosen_date: String,
    pub date_source: DateSource,
    pub is_hidden: bool,
    pub is_system: bool,
    pub is_link: bool,
}

/// A scanned file joined with its hash-group membership, as the planner
/// consumes it.
#[derive(Debug, Clone)]
pub struct FileWithGroup {
    pub file_id: i64,
    pub source_path: String,
    pub ext: String,
    pub media_type: MediaType,
    pub file_size: u64,
    pub chosen_date: String,
    pub content_hash: Option<String>,
    pub group_id: Option<i64>,
    pub primary_file_id: Option<i64>,
}

/// A plan row ready for insertion.
#[derive(Debug, Clone)]
pub struct NewPlanItem {
    pub file_id: i64,
    pub action: PlanAction,
    pub dest_path: String,
    pub dest_rel_path: String,
    pub collision_suffix: u32,
    pub duplicate_group_id: Option<i64>,
    pub is_primary_in_group: bool,
}

/// A claimable unit of execution work, joined with its source file.
#[derive(Debug, Clone)]
pub struct ExecItem {
    pub plan_item_id: i64,
    pub file_id: i64,
    pub action: PlanAction,
    pub source_path: String,
    pub dest_path: String,
    pub file_size: u64,
    pub content_hash: Option<String>,
    pub duplicate_group_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RollbackItem {
    pub rollback_item_id: i64,
    pub plan_item_id: i64,
    pub created_path: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub error_id: i64,
    pub plan_item_id: Option<i64>,
    pub phase: String,
    pub code: Option<String>,
    pub message: String,
    pub source_path: Option<String>,
    pub dest_path: Option<String>,
    pub created_at: String,
}

/// Aggregate counts for status output and the run report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunCounts {
    pub files_total: u64,
    pub bytes_total: u64,
    pub photos: u64,
    pub videos: u64,
    pub raws: u64,
    pub duplicate_files: u64,
    pub items_done: u64,
    pub items_error: u64,
    pub items_pending: u64,
    pub items_skipped: u64,
    pub errors_logged: u64,
}
