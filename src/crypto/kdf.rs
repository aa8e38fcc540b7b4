//! Passphrase → key derivation.
//!
//! PBKDF2-HMAC-SHA256, 100 000 iterations, 16-byte salt, 32-byte output.
//! The iteration count is a fixed public parameter of the container format;
//! it is not stored in the file, so changing it breaks every existing archive.

use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

/// Number of PBKDF2 iterations.  Part of the on-disk format.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
/// Byte length of the derived AES-256 key.
pub const KEY_LEN: usize = 32;
/// Byte length of the KDF salt.
pub const SALT_LEN: usize = 16;

/// A caller-supplied passphrase.  Zeroized on drop, never printed.
pub struct Passphrase(Zeroizing<Vec<u8>>);

impl Passphrase {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<String> for Passphrase {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl From<&str> for Passphrase {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

/// A 256-bit key derived from a passphrase.
///
/// Zeroized on drop.  Lives only for the duration of one seal/open call.
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the container key for `passphrase` under `salt`.
///
/// Deterministic: the same passphrase and salt always give the same key.
pub fn derive_key(passphrase: &Passphrase, salt: &[u8; SALT_LEN]) -> DerivedKey {
    derive_with_rounds(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS)
}

pub(crate) fn derive_with_rounds(password: &[u8], salt: &[u8], rounds: u32) -> DerivedKey {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut key);
    DerivedKey::from_bytes(key)
}
