pub mod artifacts;
pub mod classify;
pub mod config;
pub mod controller;
pub mod dedup;
pub mod error;
pub mod executor;
pub mod hasher;
pub mod planner;
pub mod progress;
pub mod rollback;
pub mod scanner;
pub mod storage;
pub mod throttle;
pub mod verify;

pub use config::AppConfig;
pub use controller::{NewRunSpec, Pipeline, RunOutcome};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
pub use storage::models::{
    ErrorPolicy, LivePhotoPolicy, OverwritePolicy, Phase, RunOptions, RunStatus, ThumbsPolicy,
};
