//! The payload archive collaborator interface.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::path::native_path;

/// Stores and retrieves the file payloads a manifest refers to.
///
/// Payloads are addressed by manifest path. An implementation may support
/// streaming writes, whole-file storage, or both; callers prefer streaming
/// (hash while storing in one pass) and fall back to
/// [`store`](Archive::store) plus a separate hashing read when
/// [`open_write`](Archive::open_write) reports
/// [`Error::StreamingUnsupported`].
pub trait Archive {
    /// Open an archived payload for reading.
    fn open_read(&mut self, rel_path: &str) -> Result<Box<dyn Read>>;

    /// Open a streaming writer for a payload. The payload is complete once
    /// the writer is dropped.
    fn open_write(&mut self, rel_path: &str) -> Result<Box<dyn Write>>;

    /// Store an existing local file wholesale.
    fn store(&mut self, local_path: &Path, rel_path: &str) -> Result<()>;

    /// Flush any buffered state. Must be called before the archive value
    /// is dropped on the write side.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Archive backed by a plain directory tree.
///
/// Each payload lives at its manifest path under the archive root.
/// Supports both streaming and whole-file store.
#[derive(Debug)]
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    /// Open an existing archive directory for reading.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::io(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "archive root missing"),
            ));
        }
        Ok(Self { root })
    }

    /// Create (or reuse) an archive directory for writing.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn payload_path(&self, rel_path: &str) -> PathBuf {
        self.root.join(native_path(rel_path))
    }
}

impl Archive for DirArchive {
    fn open_read(&mut self, rel_path: &str) -> Result<Box<dyn Read>> {
        let path = self.payload_path(rel_path);
        let file = fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::MissingPayload {
                    path: rel_path.to_string(),
                }
            } else {
                Error::io(&path, e)
            }
        })?;
        Ok(Box::new(file))
    }

    fn open_write(&mut self, rel_path: &str) -> Result<Box<dyn Write>> {
        let path = self.payload_path(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Box::new(file))
    }

    fn store(&mut self, local_path: &Path, rel_path: &str) -> Result<()> {
        let path = self.payload_path(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::copy(local_path, &path).map_err(|e| Error::io(local_path, e))?;
        Ok(())
    }
}
