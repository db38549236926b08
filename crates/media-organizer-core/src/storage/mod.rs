pub mod models;
mod queries;
mod sqlite;

pub use sqlite::Database;

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
