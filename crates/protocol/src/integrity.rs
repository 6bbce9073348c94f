//! Digest and codec used for the optional integrity signature.
//!
//! The signature is a tamper hint, not a security boundary: MD5 over a
//! normalized byte form of the payload, rendered as lowercase hex and then
//! base64 encoded into the `Content-MD5` header.
//!
//! Normalization works on UTF-16 code units rather than Rust `char`s so that
//! the digest of a given string is identical to what browser clients of the
//! same service compute (surrogate halves are expanded individually).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::errors::ProtocolError;
use crate::identifiers::ApplicationId;

/// Request header carrying the application id (and, on responses, its replacement).
pub const REFERER_HEADER: &str = "X-Alt-Referer";

/// Request header carrying the integrity signature.
pub const SIGNATURE_HEADER: &str = "Content-MD5";

/// Expands text into one byte per code unit below 128 and two or three
/// tagged bytes above, after folding `\r\n` into `\n`.
pub fn normalize(text: &str) -> Vec<u8> {
    let folded = text.replace("\r\n", "\n");
    let mut out = Vec::with_capacity(folded.len());
    for unit in folded.encode_utf16() {
        let c = u32::from(unit);
        if c < 0x80 {
            out.push(c as u8);
        } else if c < 0x800 {
            out.push(((c >> 6) | 0xC0) as u8);
            out.push(((c & 0x3F) | 0x80) as u8);
        } else {
            out.push(((c >> 12) | 0xE0) as u8);
            out.push((((c >> 6) & 0x3F) | 0x80) as u8);
            out.push(((c & 0x3F) | 0x80) as u8);
        }
    }
    out
}

/// MD5 of `bytes` as 32 lowercase hex characters.
pub fn digest(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// MD5 of the normalized form of `text`.
pub fn digest_text(text: &str) -> String {
    digest(&normalize(text))
}

/// Standard base64 with `=` padding.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Inverse of [`encode`].
pub fn decode(text: &str) -> Result<Vec<u8>, ProtocolError> {
    STANDARD
        .decode(text)
        .map_err(|e| ProtocolError::Codec(e.to_string()))
}

/// `Content-MD5` value for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegritySignature(String);

impl IntegritySignature {
    /// Signs already-canonical payload bytes.
    pub fn over(canonical: &[u8]) -> Self {
        Self(encode(digest(canonical).as_bytes()))
    }

    /// Signs a request without a body by digesting the application id.
    pub fn over_application(app: &ApplicationId) -> Self {
        Self::over(&normalize(app.as_str()))
    }

    /// Header value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recomputes the signature for `canonical` and compares.
    pub fn verifies(&self, canonical: &[u8]) -> bool {
        *self == Self::over(canonical)
    }
}

impl std::fmt::Display for IntegritySignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // RFC 1321 appendix A.5.
    #[test]
    fn digest_matches_reference_vectors() {
        let vectors = [
            ("", "d41d8cd98f00b204e9800998ecf8427e"),
            ("a", "0cc175b9c0f1b6a831c399e269772661"),
            ("abc", "900150983cd24fb0d6963f7d28e17f72"),
            ("message digest", "f96b697d7cb7938d525a2f31aaf161d0"),
            (
                "abcdefghijklmnopqrstuvwxyz",
                "c3fcd3d76192e4007dfb496cca67e13b",
            ),
            (
                "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789",
                "d174ab98d277d9f5a5611c2c9f419d9f",
            ),
            (
                "12345678901234567890123456789012345678901234567890123456789012345678901234567890",
                "57edf4a22be3c955ac49da2e2107b67a",
            ),
        ];
        for (input, expected) in vectors {
            assert_eq!(digest_text(input), expected, "digest({input:?})");
        }
    }

    #[test]
    fn normalize_passes_ascii_through() {
        assert_eq!(normalize("abc"), b"abc".to_vec());
    }

    #[test]
    fn normalize_folds_crlf() {
        assert_eq!(normalize("a\r\nb\rc\n"), b"a\nb\rc\n".to_vec());
    }

    #[test]
    fn normalize_expands_two_and_three_byte_ranges() {
        // U+00E9 and U+20AC agree with UTF-8.
        assert_eq!(normalize("\u{e9}"), vec![0xC3, 0xA9]);
        assert_eq!(normalize("\u{20ac}"), vec![0xE2, 0x82, 0xAC]);
        assert_eq!(normalize("\u{7ff}"), vec![0xDF, 0xBF]);
        assert_eq!(normalize("\u{800}"), vec![0xE0, 0xA0, 0x80]);
    }

    #[test]
    fn normalize_expands_surrogate_halves_individually() {
        // U+1F600 is D83D DE00 in UTF-16.
        assert_eq!(
            normalize("\u{1f600}"),
            vec![0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]
        );
    }

    #[test]
    fn codec_pads_with_equals() {
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"f"), "Zg==");
        assert_eq!(encode(b"fo"), "Zm8=");
        assert_eq!(encode(b"foo"), "Zm9v");
        assert_eq!(encode(b"foobar"), "Zm9vYmFy");
    }

    #[test]
    fn decode_rejects_invalid_text() {
        assert!(matches!(decode("Zm9v!"), Err(ProtocolError::Codec(_))));
    }

    #[test]
    fn signature_is_base64_of_hex_digest() {
        let signature = IntegritySignature::over(&normalize("abc"));
        assert_eq!(
            signature.as_str(),
            encode(b"900150983cd24fb0d6963f7d28e17f72")
        );
        assert!(signature.verifies(b"abc"));
        assert!(!signature.verifies(b"abd"));
    }

    #[test]
    fn bodyless_signature_covers_application_id() {
        let app = ApplicationId::new("relay").unwrap();
        assert_eq!(
            IntegritySignature::over_application(&app),
            IntegritySignature::over(b"relay")
        );
    }

    proptest! {
        #[test]
        fn codec_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
        }

        #[test]
        fn normalize_matches_utf8_outside_astral_planes(text in "[\\u{0}-\\u{d7ff}]*") {
            let expected = text.replace("\r\n", "\n").into_bytes();
            prop_assert_eq!(normalize(&text), expected);
        }
    }
}
