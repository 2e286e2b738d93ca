use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TempiError {
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("failed to parse registry file {}: {source}", path.display())]
    CorruptRegistry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse pending queue {}: {source}", path.display())]
    CorruptQueue {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} is already tracked", path.display())]
    DuplicatePath { path: PathBuf },

    #[error("failed to encode registry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Deletion was blocked and the path could not be scheduled for later removal either.
    #[error("{} is locked and could not be marked for deletion: {source}", path.display())]
    Locked {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TempiError>;

impl TempiError {
    pub fn io(context: &'static str, path: &Path, source: io::Error) -> Self {
        TempiError::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn invalid_duration(input: &str, reason: impl Into<String>) -> Self {
        TempiError::InvalidDuration {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
