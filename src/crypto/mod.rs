//! AES-256-GCM sealing and PBKDF2 key derivation for enctar containers.
//!
//! Key derivation: PBKDF2-HMAC-SHA256(passphrase, salt, 100 000) → 32-byte key
//! Encryption:     AES-256-GCM with a 16-byte nonce, empty associated data,
//!                 tag detached from the ciphertext
//!
//! A 16-byte GCM nonce is hashed through GHASH to form the initial counter
//! block (NIST SP 800-38D §7.1), so this is *not* interchangeable with the
//! common 12-byte-nonce `Aes256Gcm`.

pub mod kdf;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use thiserror::Error;
use zeroize::Zeroizing;

pub use kdf::{derive_key, DerivedKey, Passphrase, KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN};

/// Byte length of the GCM nonce stored in every container.
pub const NONCE_LEN: usize = 16;
/// Byte length of the GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// AES-256-GCM parameterised for 16-byte nonces.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Authentication failed: wrong passphrase or corrupted data")]
    AuthenticationFailed,
}

/// Fresh random bytes from the OS RNG.  Used for every salt and nonce.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

/// Encrypt `plaintext` under `key` and `nonce`.
///
/// Returns `(ciphertext, tag)`; the ciphertext has the plaintext's length.
/// The caller must never reuse a nonce with the same key.
pub fn seal(
    plaintext: &[u8],
    key: &DerivedKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<(Vec<u8>, [u8; TAG_LEN]), CryptoError> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(nonce), b"", &mut buffer)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());
    Ok((buffer, tag_bytes))
}

/// Verify `tag` and decrypt `ciphertext`.
///
/// The tag is checked over the whole ciphertext before any byte is
/// decrypted; on failure nothing but the error is returned.
pub fn open(
    ciphertext: &[u8],
    key: &DerivedKey,
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(nonce),
            b"",
            buffer.as_mut_slice(),
            Tag::<U16>::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    Ok(buffer)
}
