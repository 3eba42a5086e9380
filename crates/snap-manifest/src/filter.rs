//! Skip filters serialized at the top of a manifest.

/// The three skip lists a manifest can declare.
///
/// A relative path is skipped when any of its segments equals a skip-name
/// or ends with a skip-extension, or when its leading segments exactly
/// equal a skip-path. Skipped paths are neither snapshotted, validated,
/// nor deleted as orphans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    /// Relative path prefixes (segment-exact, e.g. `build/cache`).
    pub paths: Vec<String>,
    /// Item names matched against every path segment (e.g. `.DS_Store`).
    pub names: Vec<String>,
    /// Suffixes matched against every path segment (e.g. `.pyc`).
    pub extensions: Vec<String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.names.is_empty() && self.extensions.is_empty()
    }

    /// Whether `relative_path` (slash-separated) matches any filter.
    pub fn skip(&self, relative_path: &str) -> bool {
        let segments: Vec<&str> = relative_path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in &segments {
            if self.names.iter().any(|name| name == segment) {
                return true;
            }
            if self.extensions.iter().any(|ext| segment.ends_with(ext.as_str())) {
                return true;
            }
        }
        for path in &self.paths {
            let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            if parts.is_empty() || parts.len() > segments.len() {
                continue;
            }
            if segments[..parts.len()] == parts[..] {
                return true;
            }
        }
        false
    }
}
