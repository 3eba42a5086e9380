//! Manifest entry model

use std::collections::BTreeMap;

use snap_hash::HashValue;

/// The three kinds of tree item a manifest records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Link,
}

impl EntryKind {
    /// The element name used for this kind in manifest markup.
    pub fn tag(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Link => "link",
        }
    }

    /// Inverse of [`EntryKind::tag`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "file" => Some(EntryKind::File),
            "directory" => Some(EntryKind::Directory),
            "link" => Some(EntryKind::Link),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One file, directory, or symlink record within a manifest.
///
/// `path` is relative to the snapshot root, always slash-separated, and
/// unique within the manifest; entry order is directory-walk order, so a
/// parent directory always precedes its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub path: String,
    /// UTC seconds; `None` when the manifest carried no timestamp.
    pub modified: Option<i64>,
    pub readonly: bool,
    /// For directories this means traversable/readable; it is never
    /// written back to disk as execute bits.
    pub executable: bool,
    /// File byte size.
    pub size: Option<u64>,
    /// Line-terminator count; present only for content classified as text.
    pub lines: Option<i64>,
    /// Raw symlink target, never hashed.
    pub target: Option<String>,
    /// `(algorithm, text-variant)` is unique within this list.
    pub hashes: Vec<HashValue>,
    /// Extended attribute name → raw value.
    pub xattrs: BTreeMap<String, Vec<u8>>,
}

impl Entry {
    pub fn new(kind: EntryKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            modified: None,
            readonly: false,
            executable: false,
            size: None,
            lines: None,
            target: None,
            hashes: Vec::new(),
            xattrs: BTreeMap::new(),
        }
    }

    pub fn file(path: impl Into<String>, size: u64) -> Self {
        let mut entry = Self::new(EntryKind::File, path);
        entry.size = Some(size);
        entry
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self::new(EntryKind::Directory, path)
    }

    pub fn link(path: impl Into<String>, target: impl Into<String>) -> Self {
        let mut entry = Self::new(EntryKind::Link, path);
        entry.target = Some(target.into());
        entry
    }

    /// Whether the recorded content classified as text at generation time.
    pub fn is_text(&self) -> bool {
        self.lines.is_some()
    }
}
