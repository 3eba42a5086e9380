//! The signing collaborator interface and the signature document.

use std::io::{Read, Write};

use snap_codec::{EntityCodec, ValueCodec};
use snap_hash::{HashValue, from_hex, to_hex};

use crate::error::{Error, Result};
use crate::reader::{MarkupEvent, MarkupScanner, flag};

/// Signs and validates manifest content digests.
///
/// The key itself (generation, storage, algorithm) is out of scope; the
/// engine only needs these four operations.
pub trait Signer {
    /// Whether this key can sign (holds private material).
    fn is_private(&self) -> bool;

    /// Serializable public identity, recorded in the signature document.
    fn public(&self) -> String;

    /// Sign a raw content digest.
    fn sign(&self, digest: &[u8]) -> Vec<u8>;

    /// Check a signature against the digest it should cover.
    fn validate(&self, signature: &[u8], digest: &[u8]) -> bool;
}

/// One signed manifest digest from a signature document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDigest {
    pub algorithm: String,
    pub value: Vec<u8>,
    /// Whether this covers the EOL-normalized manifest hash.
    pub text: bool,
}

/// Write a signature document covering `hashes` (the finalized manifest
/// content hashes) signed by `key`.
pub fn write_signature_doc(
    out: &mut dyn Write,
    key: &dyn Signer,
    hashes: &[HashValue],
) -> Result<()> {
    let attr_codec = EntityCodec;
    writeln!(
        out,
        "<signature key='{}'>",
        attr_codec.encode(key.public().as_bytes())
    )?;
    for hash in hashes {
        let digest = from_hex(&hash.hex).ok_or_else(|| Error::Markup {
            message: format!("manifest hash for {} is not hex", hash.algorithm),
        })?;
        let text_attr = if hash.text { " text='true'" } else { "" };
        writeln!(
            out,
            "\t<signed algorithm='{}' hash='{}'{}>{}</signed>",
            attr_codec.encode(hash.algorithm.as_bytes()),
            hash.hex,
            text_attr,
            to_hex(&key.sign(&digest))
        )?;
    }
    writeln!(out, "</signature>")?;
    Ok(())
}

/// Parse a signature document: the serialized public key and every signed
/// digest it records.
pub fn read_signature_doc(input: impl Read, block_size: usize) -> Result<(String, Vec<SignedDigest>)> {
    let mut scanner = MarkupScanner::new(input, block_size);
    let mut key = None;
    let mut signatures = Vec::new();
    let mut depth = 0usize;
    let mut pending: Option<(String, bool, String)> = None;

    while let Some(event) = scanner.next_event()? {
        match event {
            MarkupEvent::Start(tag) => {
                if depth == 0 {
                    if tag.name != "signature" {
                        return Err(Error::NotASignature { root: tag.name });
                    }
                    key = tag.attrs.get("key").cloned();
                } else if depth == 1 && tag.name == "signed" {
                    let algorithm = tag
                        .attrs
                        .get("algorithm")
                        .ok_or_else(|| Error::markup("<signed> without algorithm attribute"))?
                        .clone();
                    pending = Some((algorithm, flag(&tag.attrs, "text"), String::new()));
                    if tag.self_closing {
                        // Empty body; finalize immediately.
                        if let Some((algorithm, text, _)) = pending.take() {
                            signatures.push(SignedDigest {
                                algorithm,
                                value: Vec::new(),
                                text,
                            });
                        }
                        continue;
                    }
                }
                if !tag.self_closing {
                    depth += 1;
                }
            }
            MarkupEvent::End(_) => {
                if depth == 2 {
                    if let Some((algorithm, text, body)) = pending.take() {
                        let value = from_hex(body.trim()).ok_or_else(|| {
                            Error::markup(format!("signature value for {algorithm} is not hex"))
                        })?;
                        signatures.push(SignedDigest {
                            algorithm,
                            value,
                            text,
                        });
                    }
                }
                depth = depth.saturating_sub(1);
            }
            MarkupEvent::Text(text) => {
                if let Some((_, _, body)) = pending.as_mut() {
                    body.push_str(&text);
                }
            }
        }
    }

    let key = key.ok_or_else(|| Error::markup("signature document without key attribute"))?;
    Ok((key, signatures))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Toy key for round-trip tests: "signs" by xoring with a secret byte.
    struct XorKey(u8);

    impl Signer for XorKey {
        fn is_private(&self) -> bool {
            true
        }
        fn public(&self) -> String {
            format!("xor:{:02x}", self.0)
        }
        fn sign(&self, digest: &[u8]) -> Vec<u8> {
            digest.iter().map(|b| b ^ self.0).collect()
        }
        fn validate(&self, signature: &[u8], digest: &[u8]) -> bool {
            self.sign(digest) == signature
        }
    }

    #[test]
    fn signature_doc_round_trip() {
        let key = XorKey(0x5a);
        let hashes = vec![
            HashValue::new("md5", "00ff10", false),
            HashValue::new("md5", "a1b2c3", true),
        ];

        let mut doc = Vec::new();
        write_signature_doc(&mut doc, &key, &hashes).unwrap();

        let (public, signatures) = read_signature_doc(doc.as_slice(), 64).unwrap();
        assert_eq!(public, "xor:5a");
        assert_eq!(signatures.len(), 2);
        assert_eq!(signatures[0].algorithm, "md5");
        assert!(!signatures[0].text);
        assert!(signatures[1].text);

        for (signature, hash) in signatures.iter().zip(&hashes) {
            let digest = from_hex(&hash.hex).unwrap();
            assert!(key.validate(&signature.value, &digest));
        }
    }

    #[test]
    fn rejects_wrong_root() {
        let result = read_signature_doc("<manifest>\n</manifest>\n".as_bytes(), 64);
        assert!(matches!(result, Err(Error::NotASignature { .. })));
    }

    #[test]
    fn tampered_signature_fails_validation() {
        let key = XorKey(0x11);
        let digest = from_hex("deadbeef").unwrap();
        let mut signature = key.sign(&digest);
        signature[0] ^= 1;
        assert!(!key.validate(&signature, &digest));
    }
}
