//! Error types for snap-verify

use std::io;
use std::path::PathBuf;

/// Result type for snap-verify operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a validation pass.
///
/// Per-entry discrepancies are not errors; they accumulate in the
/// [`Problem`](crate::Problem) list. Only format errors, signature
/// failures, and fail-fast halts unwind.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Manifest(#[from] snap_manifest::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("signature did not validate for {algorithm} manifest hash")]
    SignatureMismatch { algorithm: String },

    #[error("validation halted at {path}: {description}")]
    Halted { path: String, description: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
