//! Reversible text encodings for manifest attribute values.
//!
//! Manifest markup can only carry a restricted character set in attribute
//! values and element bodies, while extended attributes hold arbitrary
//! bytes. Each codec here maps bytes to markup-safe text and back; callers
//! pick the codec producing the shortest encoding via [`best_encoding`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding an encoded value
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid escape sequence at byte {position}")]
    InvalidEscape { position: usize },

    #[error("invalid base64 value: {source}")]
    Base64 {
        #[from]
        source: base64::DecodeError,
    },
}

/// A reversible mapping between raw bytes and markup-safe text.
///
/// `decode(encode(x)) == x` must hold for every byte string `x`.
pub trait ValueCodec {
    /// Encode raw bytes as markup-safe text.
    fn encode(&self, value: &[u8]) -> String;

    /// Decode text produced by [`ValueCodec::encode`] back to raw bytes.
    fn decode(&self, encoded: &str) -> Result<Vec<u8>>;

    /// The name recorded in the manifest alongside encoded values.
    fn name(&self) -> &'static str;
}

/// Escapes every byte outside a safe ASCII set as a numeric `&#xHH;` entity.
///
/// The safe set is wide enough that typical attribute values (paths,
/// timestamps, link targets) pass through mostly untouched. Also used for
/// all manifest attribute values, not just extended attributes.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntityCodec;

fn entity_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b';' | b' ' | b'/' | b'@' | b'=' | b':' | b'.' | b'-')
}

impl ValueCodec for EntityCodec {
    fn encode(&self, value: &[u8]) -> String {
        let mut out = String::with_capacity(value.len());
        for &byte in value {
            if entity_safe(byte) {
                out.push(byte as char);
            } else {
                out.push_str(&format!("&#x{byte:x};"));
            }
        }
        out
    }

    fn decode(&self, encoded: &str) -> Result<Vec<u8>> {
        let bytes = encoded.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut pos = 0;
        while pos < bytes.len() {
            if bytes[pos] != b'&' {
                out.push(bytes[pos]);
                pos += 1;
                continue;
            }
            // expect &#x<hex>+;
            let rest = &bytes[pos..];
            if rest.len() < 4 || &rest[..3] != b"&#x" {
                return Err(Error::InvalidEscape { position: pos });
            }
            let end = rest
                .iter()
                .position(|&b| b == b';')
                .ok_or(Error::InvalidEscape { position: pos })?;
            let hex = std::str::from_utf8(&rest[3..end])
                .ok()
                .filter(|h| !h.is_empty());
            let value = hex
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or(Error::InvalidEscape { position: pos })?;
            out.push(value);
            pos += end + 1;
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "xml"
    }
}

/// Escapes every byte outside a small safe set as `$HH` (two hex digits).
///
/// Denser than [`EntityCodec`] for values with scattered unsafe bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DollarHexCodec;

fn dollar_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b';' | b'-')
}

impl ValueCodec for DollarHexCodec {
    fn encode(&self, value: &[u8]) -> String {
        let mut out = String::with_capacity(value.len());
        for &byte in value {
            if dollar_safe(byte) {
                out.push(byte as char);
            } else {
                out.push_str(&format!("${byte:02x}"));
            }
        }
        out
    }

    fn decode(&self, encoded: &str) -> Result<Vec<u8>> {
        let bytes = encoded.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut pos = 0;
        while pos < bytes.len() {
            if bytes[pos] != b'$' {
                out.push(bytes[pos]);
                pos += 1;
                continue;
            }
            let hex = bytes
                .get(pos + 1..pos + 3)
                .and_then(|h| std::str::from_utf8(h).ok());
            let value = hex
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or(Error::InvalidEscape { position: pos })?;
            out.push(value);
            pos += 3;
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "dollarhex"
    }
}

/// Standard-alphabet base64, no line wrapping.
///
/// Wins for values that are mostly binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64Codec;

impl ValueCodec for Base64Codec {
    fn encode(&self, value: &[u8]) -> String {
        BASE64.encode(value)
    }

    fn decode(&self, encoded: &str) -> Result<Vec<u8>> {
        Ok(BASE64.decode(encoded)?)
    }

    fn name(&self) -> &'static str {
        "base64"
    }
}

/// The codecs every manifest producer and consumer knows about.
pub fn standard_codecs() -> Vec<Box<dyn ValueCodec>> {
    vec![
        Box::new(DollarHexCodec),
        Box::new(EntityCodec),
        Box::new(Base64Codec),
    ]
}

/// Pick the codec producing the shortest encoding of `value`.
///
/// Returns the winning codec's name together with the encoded text, or
/// `None` when the candidate list is empty (the value is then stored
/// verbatim, with no codec name recorded).
pub fn best_encoding(codecs: &[&dyn ValueCodec], value: &[u8]) -> Option<(&'static str, String)> {
    let mut best: Option<(&'static str, String)> = None;
    for codec in codecs {
        let encoded = codec.encode(value);
        match &best {
            Some((_, current)) if current.len() <= encoded.len() => {}
            _ => best = Some((codec.name(), encoded)),
        }
    }
    best
}

/// Look up a codec by its recorded name.
pub fn find_codec<'a>(codecs: &'a [&'a dyn ValueCodec], name: &str) -> Option<&'a dyn ValueCodec> {
    codecs.iter().find(|c| c.name() == name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_bytes() -> Vec<u8> {
        (0u8..=255).collect()
    }

    #[test]
    fn entity_round_trip_all_bytes() {
        let codec = EntityCodec;
        let value = all_bytes();
        assert_eq!(codec.decode(&codec.encode(&value)).unwrap(), value);
    }

    #[test]
    fn dollar_hex_round_trip_all_bytes() {
        let codec = DollarHexCodec;
        let value = all_bytes();
        assert_eq!(codec.decode(&codec.encode(&value)).unwrap(), value);
    }

    #[test]
    fn base64_round_trip_all_bytes() {
        let codec = Base64Codec;
        let value = all_bytes();
        assert_eq!(codec.decode(&codec.encode(&value)).unwrap(), value);
    }

    #[test]
    fn round_trip_empty() {
        for codec in standard_codecs() {
            assert_eq!(codec.decode(&codec.encode(b"")).unwrap(), b"");
        }
    }

    #[test]
    fn entity_escapes_unsafe_bytes() {
        let codec = EntityCodec;
        assert_eq!(codec.encode(b"a<b"), "a&#x3c;b");
        assert_eq!(codec.encode(b"path/to file.txt"), "path/to file.txt");
    }

    #[test]
    fn dollar_hex_escapes_unsafe_bytes() {
        let codec = DollarHexCodec;
        assert_eq!(codec.encode(b"a b"), "a$20b");
        assert_eq!(codec.encode(b"$"), "$24");
    }

    #[test]
    fn entity_rejects_truncated_escape() {
        assert!(EntityCodec.decode("abc&#x4").is_err());
        assert!(EntityCodec.decode("abc&oops;").is_err());
    }

    #[test]
    fn dollar_hex_rejects_truncated_escape() {
        assert!(DollarHexCodec.decode("$2").is_err());
        assert!(DollarHexCodec.decode("$zz").is_err());
    }

    #[test]
    fn best_encoding_prefers_shortest() {
        let dollar = DollarHexCodec;
        let entity = EntityCodec;
        let b64 = Base64Codec;
        let codecs: Vec<&dyn ValueCodec> = vec![&dollar, &entity, &b64];

        // Plain identifier text: the escape codecs leave it untouched,
        // base64 inflates it.
        let (name, encoded) = best_encoding(&codecs, b"plain_text").unwrap();
        assert_eq!(encoded, "plain_text");
        assert_eq!(name, "dollarhex");

        // Dense binary: base64 wins over per-byte escapes.
        let value: Vec<u8> = (0u8..64).collect();
        let (name, _) = best_encoding(&codecs, &value).unwrap();
        assert_eq!(name, "base64");
    }

    #[test]
    fn best_encoding_empty_candidate_list() {
        assert!(best_encoding(&[], b"anything").is_none());
    }

    #[test]
    fn find_codec_by_name() {
        let entity = EntityCodec;
        let codecs: Vec<&dyn ValueCodec> = vec![&entity];
        assert!(find_codec(&codecs, "xml").is_some());
        assert!(find_codec(&codecs, "rot13").is_none());
    }
}
