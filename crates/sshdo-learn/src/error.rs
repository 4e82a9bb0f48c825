use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LearnError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("bad logfile glob {pattern:?}: {source}")]
    BadGlob {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("write error: {0}")]
    Write(#[from] std::io::Error),
}

pub type LearnResult<T> = Result<T, LearnError>;
