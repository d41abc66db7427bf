//! Error type for the fallible parts of the library (song files and editing).
//!
//! The alignment and flagging core never fails; only operations that take
//! caller-supplied indices or touch the filesystem return `QcError`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QcError {
    #[error("I/O error while {context} '{}': {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error while {context} '{}': {source}", .path.display())]
    Json {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("word index {index} out of range (song has {len} words)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("cannot merge {0:?}: at least two consecutive word indices are required")]
    NotConsecutive(Vec<usize>),
    #[error("split position {position} is outside word '{word}' (must be 1..{})", .word.chars().count())]
    InvalidSplit { word: String, position: usize },
    #[error("word {0} has no suggested replacement")]
    NoSuggestion(usize),
    #[error("nothing to {0}")]
    EmptyHistory(&'static str),
}

impl QcError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        context: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            context,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, QcError>;
