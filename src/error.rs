//! Named error taxonomy for failures that must reach the command handler
//! and become an exit code. Source-data errors (malformed JSONL), transient
//! lock contention, and checkpoint failures are absorbed locally elsewhere
//! in the crate and never constructed here — see SPEC_FULL.md §7.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeshdexError {
    #[error("invalid input: {0}")]
    UserInput(String),

    #[error("database at {0} failed integrity check")]
    DbCorrupted(PathBuf),

    #[error("database unavailable at {path}: {reason}")]
    DbUnavailable { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SeshdexError {
    /// Maps to the process exit code this error should produce.
    pub fn exit_code(&self) -> i32 {
        match self {
            SeshdexError::UserInput(_) => 1,
            SeshdexError::DbCorrupted(_) => 2,
            SeshdexError::DbUnavailable { .. } => 2,
            SeshdexError::Io(_) => 2,
            SeshdexError::Json { .. } => 2,
        }
    }
}
