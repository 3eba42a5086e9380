//! Stream wrapper that hashes bytes as they pass through.

use std::io::{self, Read, Write};

use digest::DynDigest;

use crate::algorithm::{HashAlgorithm, HashValue, to_hex};
use crate::transfer::normalize_eol;

/// One digest being fed by a [`StreamHasher`], either the raw bytes or the
/// EOL-normalized view.
pub struct HasherSlot {
    algorithm: String,
    digest: Box<dyn DynDigest>,
    text: bool,
}

impl HasherSlot {
    pub fn new(algorithm: HashAlgorithm, text: bool) -> Self {
        Self {
            algorithm: algorithm.name().to_string(),
            digest: algorithm.digest(),
            text,
        }
    }

    /// A binary and a text slot for each algorithm, in algorithm order.
    pub fn paired(algorithms: &[HashAlgorithm]) -> Vec<Self> {
        let mut slots = Vec::with_capacity(algorithms.len() * 2);
        for &algorithm in algorithms {
            slots.push(Self::new(algorithm, false));
            slots.push(Self::new(algorithm, true));
        }
        slots
    }
}

impl std::fmt::Debug for HasherSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HasherSlot")
            .field("algorithm", &self.algorithm)
            .field("text", &self.text)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Reading,
    Writing,
}

/// Wraps a stream and feeds every transferred byte to a set of digests.
///
/// The normalized view carries a carriage-return flag across blocks, so a
/// CRLF pair split over two reads still folds to a single `\n`.
///
/// An instance is single-direction: mixing reads and writes panics, since
/// the hashes would describe neither stream.
pub struct StreamHasher<S> {
    inner: S,
    slots: Vec<HasherSlot>,
    last_ended_with_cr: bool,
    direction: Option<Direction>,
}

impl<S> StreamHasher<S> {
    pub fn new(inner: S, slots: Vec<HasherSlot>) -> Self {
        Self {
            inner,
            slots,
            last_ended_with_cr: false,
            direction: None,
        }
    }

    /// Whether any digests are attached at all.
    pub fn is_hashing(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Finalize every digest, consuming the wrapper.
    pub fn into_hashes(self) -> Vec<HashValue> {
        self.slots
            .into_iter()
            .map(|slot| HashValue::new(slot.algorithm, to_hex(&slot.digest.finalize()), slot.text))
            .collect()
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn assert_direction(&mut self, direction: Direction) {
        match self.direction {
            None => self.direction = Some(direction),
            Some(current) => assert!(
                current == direction,
                "StreamHasher cannot be used for read and write simultaneously"
            ),
        }
    }

    fn feed(&mut self, block: &[u8]) {
        if block.is_empty() {
            return;
        }
        let wants_text = self.slots.iter().any(|slot| slot.text);
        let text_block = if wants_text {
            let skip_leading_lf = self.last_ended_with_cr && block.first() == Some(&b'\n');
            let raw = if skip_leading_lf { &block[1..] } else { block };
            Some(normalize_eol(raw))
        } else {
            None
        };
        self.last_ended_with_cr = block.last() == Some(&b'\r');
        for slot in &mut self.slots {
            if slot.text {
                if let Some(text) = &text_block {
                    slot.digest.update(text);
                }
            } else {
                slot.digest.update(block);
            }
        }
    }
}

impl<S: Read> Read for StreamHasher<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.assert_direction(Direction::Reading);
        let count = self.inner.read(buf)?;
        self.feed(&buf[..count]);
        Ok(count)
    }
}

impl<S: Write> Write for StreamHasher<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.assert_direction(Direction::Writing);
        let count = self.inner.write(buf)?;
        self.feed(&buf[..count]);
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn md5_slots() -> Vec<HasherSlot> {
        HasherSlot::paired(&[HashAlgorithm::Md5])
    }

    fn md5_of(content: &[u8]) -> String {
        let mut digest = HashAlgorithm::Md5.digest();
        digest.update(content);
        to_hex(&digest.finalize())
    }

    #[test]
    fn hashes_bytes_read_through() {
        let mut hasher = StreamHasher::new(Cursor::new(b"one\r\ntwo\n".to_vec()), md5_slots());
        let mut content = Vec::new();
        hasher.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"one\r\ntwo\n");

        let hashes = hasher.into_hashes();
        assert_eq!(hashes[0].hex, md5_of(b"one\r\ntwo\n"));
        assert_eq!(hashes[1].hex, md5_of(b"one\ntwo\n"));
    }

    #[test]
    fn hashes_bytes_written_through() {
        let mut hasher = StreamHasher::new(Vec::new(), md5_slots());
        hasher.write_all(b"one\r\ntwo\n").unwrap();

        assert_eq!(hasher.get_ref(), &b"one\r\ntwo\n".to_vec());
        let hashes = hasher.into_hashes();
        assert_eq!(hashes[0].hex, md5_of(b"one\r\ntwo\n"));
        assert_eq!(hashes[1].hex, md5_of(b"one\ntwo\n"));
    }

    #[test]
    fn crlf_split_across_writes_normalizes_once() {
        let mut hasher = StreamHasher::new(Vec::new(), md5_slots());
        hasher.write_all(b"one\r").unwrap();
        hasher.write_all(b"\ntwo\n").unwrap();

        let hashes = hasher.into_hashes();
        assert_eq!(hashes[1].hex, md5_of(b"one\ntwo\n"));
    }

    #[test]
    #[should_panic(expected = "read and write simultaneously")]
    fn mixing_directions_panics() {
        let mut hasher = StreamHasher::new(Cursor::new(Vec::new()), md5_slots());
        let mut buf = [0u8; 4];
        let _ = hasher.read(&mut buf);
        let _ = hasher.write(b"nope");
    }

    #[test]
    fn no_slots_passes_through() {
        let mut hasher = StreamHasher::new(Vec::new(), Vec::new());
        hasher.write_all(b"data").unwrap();
        assert!(!hasher.is_hashing());
        assert!(hasher.into_hashes().is_empty());
    }
}
