use thiserror::Error;

/// Errors surfaced by the extraction engine.
///
/// Recoverable conditions (a malformed payload block, a missing field, an
/// identifier no strategy can resolve, a duplicate export row) never show up
/// here; they are logged and counted instead.
#[derive(Error, Debug)]
pub enum BralnikError {
    #[error("Malformed document {file_name}: {reason}")]
    MalformedDocument { file_name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Export table error: {0}")]
    Table(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BralnikError>;
