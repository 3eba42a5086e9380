//! In-memory [`Archive`] implementation.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use snap_manifest::{Archive, Error, Result};

type Payloads = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Archive holding every payload in memory.
///
/// By default it supports streaming writes; [`store_only`](Self::store_only)
/// builds one that refuses to stream, for exercising the
/// store-then-hash-separately fallback.
#[derive(Debug, Default, Clone)]
pub struct MemArchive {
    payloads: Payloads,
    store_only: bool,
}

impl MemArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// An archive whose `open_write` always reports streaming unsupported.
    pub fn store_only() -> Self {
        Self {
            store_only: true,
            ..Self::default()
        }
    }

    /// Seed a payload directly.
    pub fn insert(&mut self, rel_path: &str, contents: &[u8]) {
        self.payloads
            .lock()
            .unwrap()
            .insert(rel_path.to_string(), contents.to_vec());
    }

    /// Read a payload back out, if present.
    pub fn payload(&self, rel_path: &str) -> Option<Vec<u8>> {
        self.payloads.lock().unwrap().get(rel_path).cloned()
    }

    pub fn len(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.lock().unwrap().is_empty()
    }
}

/// Writer that commits its buffer to the archive when dropped.
struct MemWriter {
    payloads: Payloads,
    rel_path: String,
    buffer: Vec<u8>,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        self.payloads
            .lock()
            .unwrap()
            .insert(self.rel_path.clone(), std::mem::take(&mut self.buffer));
    }
}

impl Archive for MemArchive {
    fn open_read(&mut self, rel_path: &str) -> Result<Box<dyn Read>> {
        let payload = self
            .payload(rel_path)
            .ok_or_else(|| Error::MissingPayload {
                path: rel_path.to_string(),
            })?;
        Ok(Box::new(io::Cursor::new(payload)))
    }

    fn open_write(&mut self, rel_path: &str) -> Result<Box<dyn Write>> {
        if self.store_only {
            return Err(Error::StreamingUnsupported {
                path: rel_path.to_string(),
            });
        }
        Ok(Box::new(MemWriter {
            payloads: Arc::clone(&self.payloads),
            rel_path: rel_path.to_string(),
            buffer: Vec::new(),
        }))
    }

    fn store(&mut self, local_path: &Path, rel_path: &str) -> Result<()> {
        let contents =
            std::fs::read(local_path).map_err(|e| Error::io(local_path, e))?;
        self.insert(rel_path, &contents);
        Ok(())
    }
}
