//! Key derivation and key generation.
//!
//! Data keys and the static secret are not used as cipher keys directly:
//! every message derives its own 256-bit cipher key with HKDF-SHA256 from the
//! resolved key bytes and a random salt. This lets a 16-byte data key and a
//! free-form configured secret feed the same AEAD.

use crate::error::Error;
use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use hkdf::Hkdf;
use secrecy::SecretVec;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Size of a freshly generated data key in bytes.
pub const DATA_KEY_SIZE: usize = 16;

/// Size of the derived cipher key in bytes (256 bits).
pub const CIPHER_KEY_SIZE: usize = 32;

/// Size of the per-message HKDF salt in bytes.
pub const SALT_SIZE: usize = 16;

const CIPHER_KEY_INFO: &[u8] = b"dekvault/aead-key/v1";

/// Derives a cipher key from key material and a per-message salt.
///
/// # Errors
///
/// Returns `Error::CipherFailure` if HKDF rejects the output length, which
/// cannot happen for [`CIPHER_KEY_SIZE`].
pub fn derive_cipher_key(
    key: &[u8],
    salt: &[u8],
) -> Result<Zeroizing<[u8; CIPHER_KEY_SIZE]>, Error> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), key);

    let mut okm = Zeroizing::new([0u8; CIPHER_KEY_SIZE]);
    hkdf.expand(CIPHER_KEY_INFO, okm.as_mut_slice()).map_err(|_| Error::CipherFailure)?;

    Ok(okm)
}

/// Fills a new buffer with bytes from the operating system random source.
///
/// # Errors
///
/// Returns `Error::RandomSource` if the random source fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, Error> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| Error::RandomSource(e.to_string()))?;
    Ok(bytes)
}

/// Generates a random data key.
///
/// The key must be encrypted by a provider before it leaves memory.
///
/// # Errors
///
/// Returns `Error::RandomSource` if the random source fails.
///
/// # Example
///
/// ```
/// use dekvault::kdf::{generate_data_key, DATA_KEY_SIZE};
/// use secrecy::ExposeSecret;
///
/// let key = generate_data_key().unwrap();
/// assert_eq!(key.expose_secret().len(), DATA_KEY_SIZE);
/// ```
pub fn generate_data_key() -> Result<SecretVec<u8>, Error> {
    random_bytes(DATA_KEY_SIZE).map(SecretVec::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_derive_cipher_key_known_answer() {
        // HKDF-SHA256(salt = 00..0f, ikm = "SW2YcwTIb9zpOOhoPsMm", info = CIPHER_KEY_INFO)
        const EXPECTED_HEX: &str =
            "7bd2a544dcf6f11d3487eaca2a700fc07af757d0b6af2228e7597a1d7f79da42";

        let salt: Vec<u8> = (0u8..16).collect();
        let key = derive_cipher_key(b"SW2YcwTIb9zpOOhoPsMm", &salt).unwrap();

        assert_eq!(hex::encode(key.as_slice()), EXPECTED_HEX);
    }

    #[test]
    fn test_derive_cipher_key_depends_on_salt() {
        let key = [5u8; DATA_KEY_SIZE];
        let a = derive_cipher_key(&key, &[1; SALT_SIZE]).unwrap();
        let b = derive_cipher_key(&key, &[2; SALT_SIZE]).unwrap();
        assert_ne!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_derive_cipher_key_depends_on_key() {
        let salt = [9u8; SALT_SIZE];
        let a = derive_cipher_key(&[1; DATA_KEY_SIZE], &salt).unwrap();
        let b = derive_cipher_key(&[2; DATA_KEY_SIZE], &salt).unwrap();
        assert_ne!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_generate_data_key() {
        let key1 = generate_data_key().unwrap();
        let key2 = generate_data_key().unwrap();

        assert_ne!(key1.expose_secret(), key2.expose_secret());
        assert_eq!(key1.expose_secret().len(), DATA_KEY_SIZE);
    }
}
