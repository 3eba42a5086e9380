//! Problem reporting for validation passes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One detected difference between manifest and directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Manifest-relative path of the affected item.
    pub path: String,
    /// Human-readable description of the discrepancy.
    pub description: String,
}

/// Ordered problem accumulator, deduplicated per path.
///
/// The first description recorded for a path wins; later findings about
/// the same path are usually consequences of the first.
#[derive(Debug, Default)]
pub struct ProblemLog {
    items: Vec<Problem>,
    seen: HashSet<String>,
}

impl ProblemLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a problem unless this path already has one. Returns whether
    /// the problem was newly recorded.
    pub fn record(&mut self, path: &str, description: impl Into<String>) -> bool {
        if self.seen.contains(path) {
            return false;
        }
        self.seen.insert(path.to_string());
        self.items.push(Problem {
            path: path.to_string(),
            description: description.into(),
        });
        true
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Problem] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Problem> {
        self.items
    }
}
