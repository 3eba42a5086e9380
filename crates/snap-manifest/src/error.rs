//! Error types for snap-manifest

use std::io;
use std::path::PathBuf;

/// Result type for snap-manifest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while producing or consuming manifests.
///
/// Format errors (`NotAManifest`, `Markup`, `UnknownEncoding`, `Codec`,
/// `Timestamp`) are fatal: they abort the whole pass. Per-entry
/// discrepancies found during validation are *not* errors; they accumulate
/// in the caller's problem list, except under fail-fast validation, which
/// surfaces the first one as [`Error::Halted`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest stream error: {0}")]
    Stream(#[from] io::Error),

    #[error("not a manifest document: root element is <{root}>")]
    NotAManifest { root: String },

    #[error("not a signature document: root element is <{root}>")]
    NotASignature { root: String },

    #[error("malformed markup: {message}")]
    Markup { message: String },

    #[error("unknown attribute encoding: {name}")]
    UnknownEncoding { name: String },

    #[error("invalid encoded value: {source}")]
    Codec {
        #[from]
        source: snap_codec::Error,
    },

    #[error("invalid timestamp '{value}'")]
    Timestamp { value: String },

    #[error("archive does not support streaming for {path}")]
    StreamingUnsupported { path: String },

    #[error("archive has no payload for {path}")]
    MissingPayload { path: String },

    #[error("signing key is not private")]
    KeyNotPrivate,

    #[error("validation halted at {path}: {message}")]
    Halted { path: String, message: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn markup(message: impl Into<String>) -> Self {
        Self::Markup {
            message: message.into(),
        }
    }
}
