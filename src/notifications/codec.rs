//! URL-safe base64 for key material.
//!
//! Browsers hand out subscription keys and expect the application server
//! key as unpadded base64url. Input copied by hand sometimes keeps the `=`
//! padding, so decoding accepts both forms.

use base64::alphabet::URL_SAFE;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::DecodeError;

/// base64url decoder that tolerates present or absent padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as base64url without padding.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url text, with or without `=` padding.
///
/// Surrounding whitespace is ignored. Characters outside the URL-safe
/// alphabet (including `+` and `/`) are rejected.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(URL_SAFE_LENIENT.decode(text.trim())?)
}

/// Decode base64url text that must hold exactly `N` bytes.
///
/// Returns `Ok(None)` when the text decodes but has the wrong length, so
/// callers can report the length error in their own terms.
pub fn decode_array<const N: usize>(text: &str) -> Result<Option<[u8; N]>, DecodeError> {
    let bytes = decode(text)?;
    Ok(bytes.try_into().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_lengths() {
        // Every remainder mod 3 exercises a different padding length.
        for len in 0..70u8 {
            let bytes: Vec<u8> = (0..len).map(|i| i.wrapping_mul(37).wrapping_add(250)).collect();
            let text = encode(&bytes);
            assert!(!text.contains('='), "encoded text must be unpadded");
            assert_eq!(decode(&text).expect("decode"), bytes);
        }
    }

    #[test]
    fn test_encode_uses_url_safe_alphabet() {
        // 0xfb 0xff encodes to "+/8" in standard base64.
        let text = encode(&[0xfb, 0xff]);
        assert_eq!(text, "-_8");
    }

    #[test]
    fn test_decode_accepts_padding() {
        assert_eq!(decode("-_8=").expect("padded"), vec![0xfb, 0xff]);
        assert_eq!(decode("-_8").expect("unpadded"), vec![0xfb, 0xff]);
        assert_eq!(decode("  -_8\n").expect("whitespace"), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        assert!(decode("+/8").is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("not valid!").is_err());
        assert!(decode("a").is_err());
    }

    #[test]
    fn test_decode_array_length() {
        let text = encode(&[7u8; 16]);
        assert_eq!(decode_array::<16>(&text).expect("decode"), Some([7u8; 16]));
        assert_eq!(decode_array::<32>(&text).expect("decode"), None);
    }
}
