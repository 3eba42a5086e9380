//! Hash algorithm registry and digest comparison.

use digest::DynDigest;

/// A content hash algorithm this crate can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Every algorithm known to this build.
    pub const ALL: [HashAlgorithm; 6] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ];

    /// The name recorded in manifests for this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Look up an algorithm by its manifest name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().find(|a| a.name() == name).copied()
    }

    /// Create a fresh digest state for this algorithm.
    pub fn digest(&self) -> Box<dyn DynDigest> {
        match self {
            HashAlgorithm::Md5 => Box::new(md5::Md5::default()),
            HashAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
            HashAlgorithm::Sha224 => Box::new(sha2::Sha224::default()),
            HashAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
            HashAlgorithm::Sha384 => Box::new(sha2::Sha384::default()),
            HashAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One computed or recorded content hash.
///
/// `text` distinguishes the EOL-normalized variant from the raw byte hash;
/// `(algorithm, text)` is unique within any one entry's hash list. The
/// algorithm is kept as a string so manifests written by builds with more
/// algorithms still parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashValue {
    pub algorithm: String,
    pub hex: String,
    pub text: bool,
}

impl HashValue {
    pub fn new(algorithm: impl Into<String>, hex: impl Into<String>, text: bool) -> Self {
        Self {
            algorithm: algorithm.into(),
            hex: hex.into(),
            text,
        }
    }
}

/// Lowercase hex of a digest output.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse lowercase/uppercase hex back into bytes.
pub fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}

/// Compare two hash lists pairwise.
///
/// Hashes are comparable when they share `(algorithm, text)`. Returns
/// `false` as soon as a comparable pair disagrees, except that for text
/// content (`is_text`), disagreeing *binary* hashes are ignored, since line
/// ending translation legitimately changes the raw bytes. Returns
/// `value_if_not_found` when no comparable pair exists at all.
pub fn hash_lists_match(
    ours: &[HashValue],
    theirs: &[HashValue],
    is_text: bool,
    value_if_not_found: bool,
) -> bool {
    let mut matched = None;
    for a in ours {
        for b in theirs {
            if a.algorithm != b.algorithm || a.text != b.text {
                continue;
            }
            if a.hex == b.hex {
                matched = Some(true);
                continue;
            }
            if is_text && !a.text {
                continue;
            }
            return false;
        }
    }
    matched.unwrap_or(value_if_not_found)
}
