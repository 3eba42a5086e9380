//! Repair strictness levels.

use serde::{Deserialize, Serialize};

/// How invasively a validation pass treats discrepancies.
///
/// Ordered least to most invasive. The two audit levels never mutate the
/// target tree; the two repair levels differ only in when file contents
/// are re-hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FixLevel {
    /// Audit only; the first discrepancy of any kind aborts the pass.
    FailFast,
    /// Audit only; collect every discrepancy, touch nothing.
    ReportOnly,
    /// Repair structure and metadata; re-hash contents only when size or
    /// modification time already disagree.
    Repair,
    /// Repair, and always re-verify file content hashes, including files
    /// just restored from the archive.
    RepairVerify,
}

impl FixLevel {
    /// Whether this level mutates the target tree.
    pub fn repairs(self) -> bool {
        matches!(self, FixLevel::Repair | FixLevel::RepairVerify)
    }

    /// Whether content hashes are checked even when size and timestamp agree.
    pub fn verifies_content(self) -> bool {
        matches!(self, FixLevel::RepairVerify)
    }

    /// Whether the first discrepancy aborts the pass.
    pub fn fails_fast(self) -> bool {
        matches!(self, FixLevel::FailFast)
    }
}
