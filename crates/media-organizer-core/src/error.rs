use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Run {0} not found")]
    RunNotFound(i64),

    #[error("Run {run_id} is {status}; {operation} is not allowed")]
    InvalidRunState {
        run_id: i64,
        status: &'static str,
        operation: &'static str,
    },

    #[error("{0}")]
    Other(String),
}
