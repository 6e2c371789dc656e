//! Error type shared by the lexer, parser and writers.

use std::path::PathBuf;

/// Everything that can end up in [`crate::Document::error`] or come back from a writer.
///
/// Recoverable construct mismatches never show up here: the driver demotes those
/// tokens to plain text and only logs a warning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrgError {
    #[error("could not lex line: {0:?}")]
    Lex(String),
    #[error("parse was called multiple times")]
    AlreadyParsed,
    #[error("could not write output: parse was not called")]
    NotParsed,
    #[error("could not parse input: {0}")]
    Parse(String),
    #[error("could not read {path:?}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("id store: {0}")]
    Store(String),
    #[error("could not write output: {0}")]
    Write(String),
}

impl OrgError {
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
