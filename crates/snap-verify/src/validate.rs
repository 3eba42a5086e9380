//! One-call validation: parse, verify signatures, reconcile, finish.

use std::io::Read;
use std::path::Path;

use snap_codec::ValueCodec;
use snap_hash::{HashAlgorithm, HasherSlot, StreamHasher, from_hex, platform_eol};
use snap_manifest::reader::{EntrySink, parse};
use snap_manifest::sign::{SignedDigest, Signer};
use snap_manifest::{Archive, Error as ManifestError};

use crate::error::{Error, Result};
use crate::level::FixLevel;
use crate::problem::Problem;
use crate::verifier::Verifier;

/// Settings for one validation pass.
pub struct ValidateOptions<'a> {
    pub level: FixLevel,
    /// Algorithms available for content re-hashing; intersected per entry
    /// with the hashes the manifest actually recorded.
    pub algorithms: &'a [HashAlgorithm],
    /// Codecs for decoding extended attribute values.
    pub codecs: &'a [&'a dyn ValueCodec],
    /// Line ending written when restoring text files from the archive.
    pub restore_eol: &'a str,
    pub block_size: usize,
}

impl Default for ValidateOptions<'_> {
    fn default() -> Self {
        Self {
            level: FixLevel::ReportOnly,
            algorithms: &[],
            codecs: &[],
            restore_eol: platform_eol(),
            block_size: 4096,
        }
    }
}

/// A key plus the signed digests read from the signature document.
pub struct SignatureCheck<'a> {
    pub key: &'a dyn Signer,
    pub signatures: &'a [SignedDigest],
}

fn map_halt(error: ManifestError) -> Error {
    match error {
        ManifestError::Halted { path, message } => Error::Halted {
            path,
            description: message,
        },
        other => Error::Manifest(other),
    }
}

/// Replay `manifest` against the directory at `base`.
///
/// The manifest bytes are hashed while they stream through the parser, so
/// a supplied [`SignatureCheck`] is verified without a second pass; a
/// mismatch is fatal and pre-empts `finish`. Repairs happen according to
/// `options.level`, with file contents restored from `archive` when one is
/// attached. Returns the complete problem list.
pub fn validate<R: Read>(
    manifest: R,
    base: &Path,
    options: &ValidateOptions<'_>,
    archive: Option<&mut dyn Archive>,
    signature: Option<SignatureCheck<'_>>,
) -> Result<Vec<Problem>> {
    let slots = match &signature {
        Some(check) if !options.algorithms.is_empty() && !check.signatures.is_empty() => {
            HasherSlot::paired(options.algorithms)
        }
        _ => Vec::new(),
    };
    let mut stream = StreamHasher::new(manifest, slots);

    let mut verifier = Verifier::new(
        base,
        options.level,
        archive,
        options.algorithms,
        options.restore_eol,
        options.block_size,
    );

    let filters =
        parse(&mut stream, &mut verifier, options.codecs, options.block_size).map_err(map_halt)?;

    if let Some(check) = signature {
        let manifest_hashes = stream.into_hashes();
        for hash in &manifest_hashes {
            for signed in check.signatures {
                if signed.algorithm != hash.algorithm || signed.text != hash.text {
                    continue;
                }
                let digest = from_hex(&hash.hex).unwrap_or_default();
                if !check.key.validate(&signed.value, &digest) {
                    return Err(Error::SignatureMismatch {
                        algorithm: hash.algorithm.clone(),
                    });
                }
            }
        }
    }

    verifier.finish(&filters).map_err(map_halt)?;
    Ok(verifier.into_problems())
}
