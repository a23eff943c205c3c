//! Self-describing envelope format for encrypted blobs.
//!
//! An enveloped blob names the data key its ciphertext was produced under:
//!
//! ```text
//! '#' base64(key_name) '#' ciphertext
//! ```
//!
//! The key name uses the standard base64 alphabet without padding. Blobs that
//! do not start with `#` predate the envelope and are ciphertext under the
//! static secret.

use crate::error::Error;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;

/// Delimiter around the encoded key name.
pub const DELIMITER: u8 = b'#';

/// A decoded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    key_name: Option<String>,
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Creates an envelope for ciphertext produced under the named data key.
    #[must_use]
    pub fn new(key_name: impl Into<String>, ciphertext: Vec<u8>) -> Self {
        Self { key_name: Some(key_name.into()), ciphertext }
    }

    /// Creates a legacy envelope: ciphertext under the static secret, no header.
    #[must_use]
    pub const fn legacy(ciphertext: Vec<u8>) -> Self {
        Self { key_name: None, ciphertext }
    }

    /// Returns the embedded data key name, or `None` for legacy blobs.
    ///
    /// `Some("")` is a real envelope naming the static secret and is not the
    /// same as `None`.
    #[must_use]
    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    /// Returns the ciphertext carried by the envelope.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Consumes the envelope, returning the key name and the ciphertext.
    #[must_use]
    pub fn into_parts(self) -> (Option<String>, Vec<u8>) {
        (self.key_name, self.ciphertext)
    }

    /// Serializes the envelope.
    ///
    /// Legacy envelopes serialize to their bare ciphertext.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.key_name {
            Some(name) => encode(name, &self.ciphertext),
            None => self.ciphertext.clone(),
        }
    }

    /// Parses a blob.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedEnvelope` if the blob starts with `#` and the
    /// closing delimiter is missing, or the key name is not valid unpadded
    /// base64 of a UTF-8 string.
    pub fn from_bytes(blob: &[u8]) -> Result<Self, Error> {
        decode(blob)
    }
}

/// Prefixes `ciphertext` with the envelope header for `key_name`.
///
/// An empty key name produces `"##"` followed by the ciphertext.
#[must_use]
pub fn encode(key_name: &str, ciphertext: &[u8]) -> Vec<u8> {
    let encoded_name = STANDARD_NO_PAD.encode(key_name.as_bytes());

    let mut blob = Vec::with_capacity(encoded_name.len() + 2 + ciphertext.len());
    blob.push(DELIMITER);
    blob.extend_from_slice(encoded_name.as_bytes());
    blob.push(DELIMITER);
    blob.extend_from_slice(ciphertext);
    blob
}

/// Splits a blob into its key name and ciphertext.
///
/// An empty blob decodes to an empty legacy envelope; callers decide what
/// "nothing to decrypt" means.
///
/// # Errors
///
/// See [`Envelope::from_bytes`].
pub fn decode(blob: &[u8]) -> Result<Envelope, Error> {
    let Some((&first, rest)) = blob.split_first() else {
        return Ok(Envelope::legacy(Vec::new()));
    };

    if first != DELIMITER {
        return Ok(Envelope::legacy(blob.to_vec()));
    }

    let end = rest.iter().position(|&b| b == DELIMITER).ok_or_else(|| {
        Error::MalformedEnvelope("could not find valid key in encrypted payload".to_string())
    })?;

    let name_bytes = STANDARD_NO_PAD
        .decode(&rest[..end])
        .map_err(|e| Error::MalformedEnvelope(format!("invalid key name encoding: {e}")))?;
    let key_name = String::from_utf8(name_bytes)
        .map_err(|e| Error::MalformedEnvelope(format!("invalid key name UTF-8: {e}")))?;

    Ok(Envelope::new(key_name, rest[end + 1..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let blob = encode("root", &[1, 2, 3]);
        // base64("root") == "cm9vdA" without padding
        assert_eq!(blob, b"#cm9vdA#\x01\x02\x03");
    }

    #[test]
    fn test_encode_empty_key_name() {
        let blob = encode("", b"ciphertext");
        assert_eq!(blob, b"##ciphertext");
    }

    #[test]
    fn test_decode_enveloped() {
        let envelope = decode(b"#cm9vdA#payload").unwrap();
        assert_eq!(envelope.key_name(), Some("root"));
        assert_eq!(envelope.ciphertext(), b"payload");
    }

    #[test]
    fn test_decode_empty_key_name_is_not_legacy() {
        let envelope = decode(b"##payload").unwrap();
        assert_eq!(envelope.key_name(), Some(""));
        assert_eq!(envelope.ciphertext(), b"payload");
    }

    #[test]
    fn test_decode_legacy() {
        let envelope = decode(b"\x00legacy-bytes").unwrap();
        assert_eq!(envelope.key_name(), None);
        assert_eq!(envelope.ciphertext(), b"\x00legacy-bytes");
    }

    #[test]
    fn test_decode_empty_blob() {
        let envelope = decode(&[]).unwrap();
        assert_eq!(envelope.key_name(), None);
        assert!(envelope.ciphertext().is_empty());
    }

    #[test]
    fn test_decode_missing_closing_delimiter() {
        let result = decode(b"#cm9vdA-no-end");
        assert!(matches!(result, Err(Error::MalformedEnvelope(_))));
    }

    #[test]
    fn test_decode_lone_delimiter() {
        let result = decode(b"#");
        assert!(matches!(result, Err(Error::MalformedEnvelope(_))));
    }

    #[test]
    fn test_decode_invalid_base64() {
        let result = decode(b"#not*base64#payload");
        assert!(matches!(result, Err(Error::MalformedEnvelope(_))));
    }

    #[test]
    fn test_decode_padded_base64_rejected() {
        // Only the unpadded alphabet is accepted.
        let result = decode(b"#cm9vdA==#payload");
        assert!(matches!(result, Err(Error::MalformedEnvelope(_))));
    }

    #[test]
    fn test_ciphertext_may_contain_delimiter() {
        let blob = encode("k1", b"a#b#c");
        let envelope = decode(&blob).unwrap();
        assert_eq!(envelope.key_name(), Some("k1"));
        assert_eq!(envelope.ciphertext(), b"a#b#c");
    }

    #[test]
    fn test_envelope_to_bytes() {
        let envelope = Envelope::new("data-key-2024", vec![9; 40]);
        let bytes = envelope.to_bytes();
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), envelope);

        let legacy = Envelope::legacy(vec![7, 7, 7]);
        assert_eq!(legacy.to_bytes(), vec![7, 7, 7]);
    }
}
