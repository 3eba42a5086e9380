//! Filesystem mutation helpers for the repair engine.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

#[cfg(unix)]
pub use snap_manifest::meta::{EXEC_BITS, WRITE_BITS};

/// Remove a path of any kind, recursively for directories.
///
/// Symlinks are removed themselves, never followed. A path that is
/// already gone is not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if metadata.file_type().is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.is_dir() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Apply unix permission bits in one call.
#[cfg(unix)]
pub fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn apply_mode(path: &Path, _mode: u32) -> io::Result<()> {
    let _ = path;
    Ok(())
}

/// Set a file or directory modification time to `seconds` (UTC), leaving
/// the access time alone. Never follows through symlink paths' targets;
/// callers only pass files and directories here.
pub fn set_modified(path: &Path, seconds: i64) -> io::Result<()> {
    let time = if seconds >= 0 {
        UNIX_EPOCH + Duration::from_secs(seconds as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(seconds.unsigned_abs())
    };
    // A read-only handle is enough to set times, and also works for
    // directories and files already chmod'd read-only.
    let file = fs::File::open(path)?;
    file.set_modified(time)
}

/// Create a symlink at `path` pointing at `target`.
#[cfg(unix)]
pub fn make_symlink(target: &str, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(not(unix))]
pub fn make_symlink(_target: &str, _path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

/// Read a symlink's raw target as a string.
pub fn read_link_string(path: &Path) -> io::Result<String> {
    Ok(fs::read_link(path)?.to_string_lossy().into_owned())
}
