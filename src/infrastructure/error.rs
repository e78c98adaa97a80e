use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Remote store error: {0}")]
    Remote(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}
