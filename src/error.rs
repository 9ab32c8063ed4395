//! Typed error kinds shared across the engine.
//!
//! Library code returns [`UndrError`]; the CLI composes these with
//! `anyhow::Context` at the boundary.

use crate::path_id::PathId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UndrError {
    #[error("network error for \"{path_id}\": {source}")]
    NetworkError {
        path_id: PathId,
        #[source]
        source: reqwest::Error,
    },

    #[error("\"{path_id}\" is not installed (run install first)")]
    NotInstalled { path_id: PathId },

    #[error("manifest at \"{path}\" failed schema validation: {message}")]
    SchemaInvalid { path: String, message: String },

    #[error("hash mismatch for \"{path_id}\" (expected {expected}, got {actual})")]
    HashMismatch {
        path_id: PathId,
        expected: String,
        actual: String,
    },

    #[error("size mismatch for \"{path_id}\" (expected {expected}, got {actual})")]
    SizeMismatch {
        path_id: PathId,
        expected: u64,
        actual: u64,
    },

    #[error("trailing {remaining} byte(s) for \"{path_id}\" (word size {word_size})")]
    TrailingBytes {
        path_id: PathId,
        word_size: usize,
        remaining: usize,
    },

    #[error("duplicate name \"{name}\" in {context}")]
    DuplicateName { name: String, context: String },

    #[error("the configuration is empty or every dataset is disabled")]
    EmptyConfiguration,

    #[error("interrupted by the user")]
    UserInterrupt,

    #[error("{0} is an external collaborator of the core engine and is not implemented here")]
    OutOfScope(&'static str),

    #[error("I/O error for \"{path}\": {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker panicked: {0}")]
    WorkerPanic(String),
}

pub type Result<T> = std::result::Result<T, UndrError>;

impl UndrError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        UndrError::Io {
            path: path.into(),
            source,
        }
    }
}
