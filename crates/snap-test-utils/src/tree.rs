//! [`TestTree`] builder for snapshot test scenarios.

use std::fs;
use std::path::{Path, PathBuf};

use snap_manifest::meta::ItemMeta;
use tempfile::TempDir;

/// A temporary directory tree with helper methods for setup and assertion.
///
/// All paths are manifest-style relative strings.
pub struct TestTree {
    temp_dir: TempDir,
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTree {
    /// Create an empty temporary tree.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    /// Root of the tree on disk.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of a tree-relative item.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(snap_manifest::path::native_path(rel))
    }

    /// Write a file, creating parent directories as needed.
    pub fn file(&self, rel: &str, contents: &[u8]) -> &Self {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        self
    }

    /// Create a directory (and parents).
    pub fn dir(&self, rel: &str) -> &Self {
        fs::create_dir_all(self.path(rel)).unwrap();
        self
    }

    /// Create a symlink at `rel` pointing at `target`.
    #[cfg(unix)]
    pub fn symlink(&self, rel: &str, target: &str) -> &Self {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        std::os::unix::fs::symlink(target, path).unwrap();
        self
    }

    /// Set unix permission bits on an item.
    #[cfg(unix)]
    pub fn chmod(&self, rel: &str, mode: u32) -> &Self {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(self.path(rel), fs::Permissions::from_mode(mode)).unwrap();
        self
    }

    /// Set an item's modification time to `seconds` (UTC).
    pub fn set_mtime(&self, rel: &str, seconds: i64) -> &Self {
        use std::time::{Duration, UNIX_EPOCH};
        let file = fs::File::open(self.path(rel)).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(seconds as u64))
            .unwrap();
        self
    }

    pub fn exists(&self, rel: &str) -> bool {
        // symlink-aware: a dangling link still "exists"
        fs::symlink_metadata(self.path(rel)).is_ok()
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        fs::read(self.path(rel)).unwrap()
    }

    pub fn inspect(&self, rel: &str) -> ItemMeta {
        snap_manifest::meta::inspect(&self.path(rel)).unwrap()
    }

    #[cfg(unix)]
    pub fn link_target(&self, rel: &str) -> String {
        fs::read_link(self.path(rel))
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }
}
