//! Authenticated encryption of payloads and data keys.
//!
//! Layout of a sealed message:
//!
//! ```text
//! [version:1][salt:16][nonce:12][ciphertext:N][tag:16]
//! ```
//!
//! The version byte is never `#`, so a sealed message is never mistaken for
//! an envelope header when it is stored bare as a legacy blob.
//!
//! The cipher key is derived from the caller's key bytes and the salt, see
//! [`crate::kdf::derive_cipher_key`].

use crate::error::Error;
use crate::kdf::{derive_cipher_key, random_bytes, SALT_SIZE};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};

/// Format version written as the first byte of every sealed message.
pub const VERSION: u8 = 0x01;

/// Nonce size for ChaCha20-Poly1305 (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Bytes added to every plaintext.
pub const OVERHEAD: usize = 1 + SALT_SIZE + NONCE_SIZE + TAG_SIZE;

/// Encrypts `plaintext` under `key`.
///
/// # Errors
///
/// Returns `Error::RandomSource` if salt or nonce generation fails and
/// `Error::CipherFailure` if encryption fails.
pub fn seal(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, Error> {
    let salt = random_bytes(SALT_SIZE)?;
    let nonce_bytes = random_bytes(NONCE_SIZE)?;

    let cipher_key = derive_cipher_key(key, &salt)?;
    let cipher =
        ChaCha20Poly1305::new_from_slice(cipher_key.as_slice()).map_err(|_| Error::CipherFailure)?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| Error::CipherFailure)?;

    let mut sealed = Vec::with_capacity(OVERHEAD + plaintext.len());
    sealed.push(VERSION);
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypts a message produced by [`seal`].
///
/// # Errors
///
/// Returns `Error::CipherFailure` if the message is truncated, has an unknown
/// version, was sealed under another key, or was modified. The cases are not
/// distinguished.
pub fn open(sealed: &[u8], key: &[u8]) -> Result<Vec<u8>, Error> {
    if sealed.len() < OVERHEAD || sealed[0] != VERSION {
        return Err(Error::CipherFailure);
    }

    let (salt, rest) = sealed[1..].split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let cipher_key = derive_cipher_key(key, salt)?;
    let cipher =
        ChaCha20Poly1305::new_from_slice(cipher_key.as_slice()).map_err(|_| Error::CipherFailure)?;

    cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext).map_err(|_| Error::CipherFailure)
}
