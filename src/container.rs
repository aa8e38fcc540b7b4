//! On-disk framing of an enctar container.
//!
//! ```text
//! offset  len  field
//!      0    2  magic  0x25 0x24
//!      2   16  salt   (PBKDF2)
//!     18   16  nonce  (AES-GCM)
//!     34   16  tag    (AES-GCM)
//!     50    …  ciphertext
//! ```
//!
//! Every field is an opaque byte string, so there is no endianness to agree
//! on.  The ciphertext runs to the end of the file and carries no length.

use std::io::{self, Read, Write};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{self, derive_key, DerivedKey, Passphrase, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::error::{FormatError, Result};

pub const MAGIC: [u8; 2] = [0x25, 0x24];
pub const MAGIC_LEN: usize = MAGIC.len();
/// Fixed-width prefix before the ciphertext.
pub const HEADER_LEN: usize = MAGIC_LEN + SALT_LEN + NONCE_LEN + TAG_LEN;

/// The fixed-width fields that follow the magic bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub salt:  [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub tag:   [u8; TAG_LEN],
}

impl ContainerHeader {
    /// Write magic, salt, nonce, and tag in that order.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&self.salt)?;
        writer.write_all(&self.nonce)?;
        writer.write_all(&self.tag)?;
        Ok(())
    }

    /// Read and check the magic, then the three fixed fields.
    ///
    /// The magic is validated before anything else is consumed.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; MAGIC_LEN];
        read_field(&mut reader, &mut magic, 0)?;
        if magic != MAGIC {
            return Err(FormatError::BadMagic.into());
        }
        let mut header = Self { salt: [0; SALT_LEN], nonce: [0; NONCE_LEN], tag: [0; TAG_LEN] };
        read_field(&mut reader, &mut header.salt, MAGIC_LEN)?;
        read_field(&mut reader, &mut header.nonce, MAGIC_LEN + SALT_LEN)?;
        read_field(&mut reader, &mut header.tag, MAGIC_LEN + SALT_LEN + NONCE_LEN)?;
        Ok(header)
    }
}

/// `read_exact` that reports a short read as a truncated container.
fn read_field<R: Read>(reader: &mut R, buf: &mut [u8], offset: usize) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(FormatError::Truncated { len: offset + filled, need: HEADER_LEN }.into())
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Concatenate header and ciphertext into one container image.
pub fn compose(header: &ContainerHeader, ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&header.salt);
    out.extend_from_slice(&header.nonce);
    out.extend_from_slice(&header.tag);
    out.extend_from_slice(ciphertext);
    out
}

/// Stream a container field by field into `writer`.  Not atomic.
pub fn write_container<W: Write>(mut writer: W, header: &ContainerHeader, ciphertext: &[u8]) -> io::Result<()> {
    header.write(&mut writer)?;
    writer.write_all(ciphertext)?;
    writer.flush()
}

// ── Parsed container ─────────────────────────────────────────────────────────

/// A container whose magic and header have been checked but whose contents
/// are not yet authenticated.
///
/// The only way to get plaintext out is [`Container::open`] or
/// [`Container::open_with_key`], both of which verify the tag first.
#[derive(Debug, Clone)]
pub struct Container<'a> {
    pub header: ContainerHeader,
    ciphertext: &'a [u8],
}

impl<'a> Container<'a> {
    /// Split `bytes` into header fields and ciphertext.
    ///
    /// Fails with [`FormatError::BadMagic`] or [`FormatError::Truncated`];
    /// no cryptographic work is done here.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let header = ContainerHeader::read(bytes)?;
        debug!(ciphertext_len = bytes.len() - HEADER_LEN, "container header parsed");
        Ok(Self { header, ciphertext: &bytes[HEADER_LEN..] })
    }

    /// Opaque ciphertext bytes following the header.
    pub fn ciphertext(&self) -> &'a [u8] {
        self.ciphertext
    }

    /// Derive the key from `passphrase` and this container's salt, then open.
    pub fn open(&self, passphrase: &Passphrase) -> Result<Zeroizing<Vec<u8>>> {
        let key = derive_key(passphrase, &self.header.salt);
        self.open_with_key(&key)
    }

    /// Verify the tag under `key` and return the plaintext payload.
    pub fn open_with_key(&self, key: &DerivedKey) -> Result<Zeroizing<Vec<u8>>> {
        let plaintext = crypto::open(self.ciphertext, key, &self.header.nonce, &self.header.tag)?;
        debug!("container tag verified");
        Ok(plaintext)
    }
}

/// Seal `payload` under a fresh salt and nonce and frame the result.
pub fn seal_payload(payload: &[u8], passphrase: &Passphrase) -> Result<Vec<u8>> {
    let salt: [u8; SALT_LEN] = crypto::random_bytes();
    let nonce: [u8; NONCE_LEN] = crypto::random_bytes();
    let key = derive_key(passphrase, &salt);
    let (ciphertext, tag) = crypto::seal(payload, &key, &nonce)?;
    drop(key);
    Ok(compose(&ContainerHeader { salt, nonce, tag }, &ciphertext))
}
