use std::path::PathBuf;

use thiserror::Error;

use crate::bencode::BencodeError;

/// Errors that can occur while building, editing or writing metafiles.
#[derive(Debug, Error)]
pub enum MetafileError {
    /// The metafile contains invalid bencode or could not be encoded.
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    /// A required field is missing from the metafile.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has an invalid value or type.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// The info hash has an invalid length (must be 20 bytes).
    #[error("invalid info hash length")]
    InvalidInfoHashLength,

    /// No tracker URL was given for a build.
    #[error("at least one tracker URL is required")]
    NoTrackers,

    /// The requested piece size bounds are not usable.
    #[error("invalid piece size bounds: {0}")]
    InvalidPieceBounds(String),

    /// An exclude pattern is not a valid glob.
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// A `--set` field edit could not be applied.
    #[error("bad assignment {key:?} ({reason})")]
    BadAssignment { key: String, reason: &'static str },

    /// Hashing found nothing to include.
    #[error("no files to hash in {}", .0.display())]
    NoFiles(PathBuf),

    /// A file changed size between being listed and being read.
    #[error("file size mismatch for {} [is {actual}, expected {expected}]", path.display())]
    SizeMismatch {
        path: PathBuf,
        actual: u64,
        expected: u64,
    },

    /// An I/O error occurred on the given path.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl MetafileError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| MetafileError::Io { path, source }
    }

    /// Returns true if this error was caused by bad input rather than by the
    /// environment (files, disk, permissions).
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            MetafileError::NoTrackers
                | MetafileError::InvalidPieceBounds(_)
                | MetafileError::InvalidPattern { .. }
                | MetafileError::BadAssignment { .. }
        )
    }
}
