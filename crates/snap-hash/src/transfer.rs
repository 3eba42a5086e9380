//! Block-wise transfer with hashing, text detection, and EOL rewriting.

use std::io::{self, Read, Write};

use crate::algorithm::{HashAlgorithm, HashValue, to_hex};

/// Maximum average line length for content to still classify as text.
const MAX_AVERAGE_LINE_LENGTH: f64 = 20000.0;
/// Minimum average line length (rules out zero-line streams).
const MIN_AVERAGE_LINE_LENGTH: f64 = 0.0001;
/// Maximum tolerated fraction of non-printable bytes in text.
const MAX_NON_PRINTABLE_FRACTION: f64 = 0.10;

/// Result of one [`transfer_and_hash`] pass.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Count of line terminators in the normalized stream, or `-1` when the
    /// content classified as binary.
    pub lines: i64,
    /// One binary hash per requested algorithm, followed by one
    /// EOL-normalized text hash per algorithm when text detection ran.
    pub hashes: Vec<HashValue>,
}

impl TransferOutcome {
    /// Whether the transferred content classified as text.
    pub fn is_text(&self) -> bool {
        self.lines >= 0
    }
}

/// The line ending native to the build platform.
pub fn platform_eol() -> &'static str {
    if cfg!(windows) { "\r\n" } else { "\n" }
}

/// Rewrite `\r\n` and lone `\r` to `\n`.
pub fn normalize_eol(block: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(block.len());
    let mut pos = 0;
    while pos < block.len() {
        match block[pos] {
            b'\r' => {
                out.push(b'\n');
                if block.get(pos + 1) == Some(&b'\n') {
                    pos += 1;
                }
            }
            byte => out.push(byte),
        }
        pos += 1;
    }
    out
}

/// Printable in the text-detection sense: visible ASCII plus common
/// whitespace control characters.
fn is_printable(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7e | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn read_block(input: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Copy `input` to an optional `output` while hashing and classifying it.
///
/// Reads in `block_size` chunks, with a one-byte lookahead whenever a chunk
/// ends in a lone carriage return so a CRLF pair is never split across
/// chunks. Every requested algorithm gets a raw-byte hash; with
/// `detect_text`, an additional hash of the EOL-normalized bytes.
///
/// Content classifies as text only when it contains no NUL byte, has at
/// least one line terminator, an average normalized line length strictly
/// inside (0.0001, 20000), and fewer than 10% non-printable normalized
/// bytes. `lines` is `-1` otherwise.
///
/// When `output` and `rewrite_eol` are both supplied, each raw chunk's
/// `\n` bytes are replaced with `rewrite_eol` before writing: always when
/// `detect_text` is off (the caller already knows the content is text), or
/// for as long as the stream still looks like text when it is on.
pub fn transfer_and_hash(
    input: &mut dyn Read,
    algorithms: &[HashAlgorithm],
    mut output: Option<&mut dyn Write>,
    detect_text: bool,
    rewrite_eol: Option<&str>,
    block_size: usize,
) -> io::Result<TransferOutcome> {
    let mut binary_digests: Vec<_> = algorithms.iter().map(|a| (a.name(), a.digest())).collect();
    let mut text_digests: Vec<_> = if detect_text {
        algorithms.iter().map(|a| (a.name(), a.digest())).collect()
    } else {
        Vec::new()
    };

    let mut probably_text = true;
    let mut normalized_size: u64 = 0;
    let mut eol_count: u64 = 0;
    let mut printable_count: u64 = 0;

    let mut block = vec![0u8; block_size.max(1)];
    loop {
        let filled = read_block(input, &mut block)?;
        if filled == 0 {
            break;
        }
        let mut chunk = block[..filled].to_vec();
        // A chunk ending in a lone CR might have its LF in the next chunk.
        if chunk.last() == Some(&b'\r') {
            let mut next = [0u8; 1];
            if read_block(input, &mut next)? == 1 {
                chunk.push(next[0]);
            }
        }

        if probably_text && chunk.contains(&0) {
            probably_text = false;
        }
        for (_, digest) in &mut binary_digests {
            digest.update(&chunk);
        }
        if detect_text {
            let normalized = normalize_eol(&chunk);
            for (_, digest) in &mut text_digests {
                digest.update(&normalized);
            }
            normalized_size += normalized.len() as u64;
            eol_count += normalized.iter().filter(|&&b| b == b'\n').count() as u64;
            printable_count += normalized.iter().filter(|&&b| is_printable(b)).count() as u64;
        }

        if let Some(out) = output.as_deref_mut() {
            let rewrite_text = rewrite_eol.is_some() && detect_text && probably_text;
            let rewrite_always = rewrite_eol.is_some() && !detect_text;
            if rewrite_text || rewrite_always {
                let eol = rewrite_eol.unwrap_or_default().as_bytes();
                let mut rewritten = Vec::with_capacity(chunk.len());
                for &byte in &chunk {
                    if byte == b'\n' {
                        rewritten.extend_from_slice(eol);
                    } else {
                        rewritten.push(byte);
                    }
                }
                out.write_all(&rewritten)?;
            } else {
                out.write_all(&chunk)?;
            }
        }
    }

    let non_printable_fraction = if normalized_size > 0 {
        (normalized_size - printable_count) as f64 / normalized_size as f64
    } else {
        1.0
    };
    let average_line_length = if eol_count > 0 {
        normalized_size as f64 / eol_count as f64
    } else {
        0.0
    };
    let is_text = probably_text
        && average_line_length > MIN_AVERAGE_LINE_LENGTH
        && average_line_length < MAX_AVERAGE_LINE_LENGTH
        && non_printable_fraction < MAX_NON_PRINTABLE_FRACTION;

    let mut hashes = Vec::with_capacity(binary_digests.len() + text_digests.len());
    for (name, digest) in binary_digests {
        hashes.push(HashValue::new(name, to_hex(&digest.finalize()), false));
    }
    for (name, digest) in text_digests {
        hashes.push(HashValue::new(name, to_hex(&digest.finalize()), true));
    }

    Ok(TransferOutcome {
        lines: if is_text { eol_count as i64 } else { -1 },
        hashes,
    })
}
