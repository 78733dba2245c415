//! Hex helpers for signatures. Pure functions, no state.

use thiserror::Error;

use crate::hashes::DIGEST_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("expected {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid hex digit in signature")]
    InvalidHex,
}

/// Lowercase hex, two digits per byte.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a 64-digit hex signature (either case) into digest bytes.
pub fn decode_digest(s: &str) -> Result<[u8; DIGEST_SIZE], EncodingError> {
    if s.len() != DIGEST_SIZE * 2 {
        return Err(EncodingError::InvalidLength {
            expected: DIGEST_SIZE * 2,
            actual: s.len(),
        });
    }
    let mut out = [0u8; DIGEST_SIZE];
    hex::decode_to_slice(s, &mut out).map_err(|_| EncodingError::InvalidHex)?;
    Ok(out)
}

/// ASCII case-insensitive equality. Returns at the first difference, so the
/// running time leaks the length of the matching prefix.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// ASCII case-insensitive equality that touches every byte when the lengths
/// match. Length itself is not treated as secret.
#[inline(never)]
pub fn ct_eq_ignore_case(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x.to_ascii_lowercase() ^ y.to_ascii_lowercase();
    }
    core::hint::black_box(diff) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hex_zero_pads() {
        assert_eq!(to_hex(&[0x00, 0x0f, 0xa0, 0xff]), "000fa0ff");
    }

    #[test]
    fn test_decode_digest_accepts_both_cases() {
        let lower = "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7";
        let upper = lower.to_ascii_uppercase();
        assert_eq!(decode_digest(lower), decode_digest(&upper));
        assert_eq!(decode_digest(lower).map(|d| d[0]), Ok(0xb0));
    }

    #[test]
    fn test_decode_digest_rejects_bad_input() {
        assert_eq!(
            decode_digest("abcd"),
            Err(EncodingError::InvalidLength { expected: 64, actual: 4 })
        );
        let bad = "zz".repeat(32);
        assert_eq!(decode_digest(&bad), Err(EncodingError::InvalidHex));
    }

    #[test]
    fn test_case_folded_comparisons_agree() {
        let cases = [
            ("deadBEEF", "DEADbeef", true),
            ("deadbeef", "deadbeee", false),
            ("deadbeef", "deadbee", false),
            ("", "", true),
        ];
        for (a, b, expected) in cases {
            assert_eq!(eq_ignore_case(a, b), expected, "{a} vs {b}");
            assert_eq!(ct_eq_ignore_case(a, b), expected, "{a} vs {b}");
        }
    }
}
