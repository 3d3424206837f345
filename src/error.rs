use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RolecallError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Undecodable input: {0}")]
    UndecodableInput(String),

    #[error("Merge rejected: {0}")]
    MergeRejected(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}
