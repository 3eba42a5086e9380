//! Manifest validation and repair.
//!
//! Replays a manifest against a possibly-divergent directory tree,
//! collecting a problem report and, depending on the [`FixLevel`],
//! recreating missing entries, restoring corrupted file contents from the
//! payload archive, fixing permissions and timestamps, deleting unexpected
//! items, and re-establishing symlinks whose targets did not exist yet.
//!
//! The pass is two-phase: the manifest parser dispatches each entry to
//! [`Verifier::entry`], then [`finish`](Verifier) performs the
//! globally-ordered cleanup (deferred symlinks, orphan deletion, directory
//! mtimes, read-only directories; in that order). [`validate`] wires both
//! phases together with signature verification.

pub mod error;
pub mod fsops;
pub mod level;
pub mod problem;
pub mod validate;
pub mod verifier;

pub use error::{Error, Result};
pub use level::FixLevel;
pub use problem::{Problem, ProblemLog};
pub use validate::{SignatureCheck, ValidateOptions, validate};
pub use verifier::Verifier;
