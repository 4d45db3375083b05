//! Error types for envinject.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token name: {0:?}")]
    InvalidToken(String),

    #[error("root directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to list {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unresolved tokens: {}", .0.join(", "))]
    Unresolved(Vec<String>),
}

pub type Result<T> = std::result::Result<T, Error>;
