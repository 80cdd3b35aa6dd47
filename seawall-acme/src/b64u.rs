//! base64url (RFC 4648 § 5) helpers. The ACME protocol uses the unpadded form throughout.

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::engine::Engine as _;

const ENCODE: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_encode_padding(false),
);

// Decoding is lenient about padding since we may get handed data encoded by other
// implementations.
const DECODE: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as base64url without padding into a `String`.
pub fn encode(data: &[u8]) -> String {
    ENCODE.encode(data)
}

/// Decode bytes from a base64url string, with or without padding.
pub fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    DECODE.decode(data)
}

/// Our serde module for encoding bytes as base64url encoded strings.
pub mod bytes {
    use serde::{Serialize, Serializer};

    /// Serialize bytes as a base64url encoded string.
    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::encode(data).serialize(serializer)
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn round_trip() {
        let cases: &[&[u8]] = &[b"", b"f", b"fo", b"foo", b"foob", b"fooba", b"foobar", &[0xff, 0xfe, 0x00, 0x7f]];
        for case in cases {
            let encoded = super::encode(case);
            assert!(
                encoded
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
                "encoded data must use the base64url alphabet without padding: {encoded:?}"
            );
            assert_eq!(super::decode(&encoded).unwrap(), *case);
        }
    }

    #[test]
    fn url_safe_alphabet() {
        // 0xfb 0xff encodes to '+/' in standard base64
        assert_eq!(super::encode(&[0xfb, 0xff]), "-_8");
        assert_eq!(super::decode("-_8").unwrap(), &[0xfb, 0xff]);
    }

    #[test]
    fn padding_indifferent_decode() {
        assert_eq!(super::decode("Zm9v").unwrap(), b"foo");
        assert_eq!(super::decode("Zm8=").unwrap(), b"fo");
        assert_eq!(super::decode("Zm8").unwrap(), b"fo");
    }
}
