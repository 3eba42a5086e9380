//! lstat-style metadata inspection shared by generation and repair.

use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// What kind of item a path resolves to, without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskKind {
    File,
    Directory,
    Link,
    /// Sockets, fifos, devices; never snapshotted.
    Other,
}

/// Snapshot-relevant metadata of one on-disk item.
#[derive(Debug, Clone, Copy)]
pub struct ItemMeta {
    pub kind: DiskKind,
    /// Unix permission bits; zero on platforms without them.
    pub mode: u32,
    /// No write bit set for anyone.
    pub readonly: bool,
    /// Any execute bit set; forced false for directories, where execute
    /// means traversable rather than runnable.
    pub executable: bool,
    /// Modification time as UTC seconds, truncated to second precision.
    pub modified: i64,
    pub size: u64,
}

/// Execute bits for user, group, and other.
#[cfg(unix)]
pub const EXEC_BITS: u32 = 0o111;
/// Write bits for user, group, and other.
#[cfg(unix)]
pub const WRITE_BITS: u32 = 0o222;

fn system_time_seconds(time: std::time::SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs() as i64,
        Err(err) => -(err.duration().as_secs() as i64),
    }
}

/// Inspect `path` without following symlinks.
pub fn inspect(path: &Path) -> io::Result<ItemMeta> {
    let metadata = std::fs::symlink_metadata(path)?;
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        DiskKind::Link
    } else if file_type.is_dir() {
        DiskKind::Directory
    } else if file_type.is_file() {
        DiskKind::File
    } else {
        DiskKind::Other
    };

    #[cfg(unix)]
    let (mode, readonly, executable) = {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode() & 0o7777;
        (
            mode,
            mode & WRITE_BITS == 0,
            kind != DiskKind::Directory && mode & EXEC_BITS != 0,
        )
    };
    #[cfg(not(unix))]
    let (mode, readonly, executable) = (0u32, metadata.permissions().readonly(), false);

    let modified = metadata
        .modified()
        .map(system_time_seconds)
        .unwrap_or_default();

    Ok(ItemMeta {
        kind,
        mode,
        readonly,
        executable,
        modified,
        size: metadata.len(),
    })
}
