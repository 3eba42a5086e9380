//! Conversions between on-disk paths and manifest path strings.
//!
//! Manifest paths always use forward slashes regardless of the host path
//! separator; conversion to platform-native form happens only at I/O
//! boundaries.

use std::path::{Component, Path, PathBuf};

/// Render a relative on-disk path as a manifest path string.
pub fn manifest_path(relative: &Path) -> String {
    let mut out = String::new();
    for component in relative.components() {
        if let Component::Normal(name) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&name.to_string_lossy());
        }
    }
    out
}

/// Convert a manifest path string to a platform-native relative path.
pub fn native_path(manifest: &str) -> PathBuf {
    manifest.split('/').filter(|s| !s.is_empty()).collect()
}

/// The manifest path of `full` relative to `base`, or `None` when `full`
/// is not under `base`.
pub fn relative_to(base: &Path, full: &Path) -> Option<String> {
    full.strip_prefix(base).ok().map(manifest_path)
}
