//! Crate-level error type.
//!
//! Every public operation fails with one of four kinds.  None of them ever
//! carries key, passphrase, or plaintext bytes.

use std::io;
use thiserror::Error;

use crate::codec::CodecError;
use crate::crypto::CryptoError;

/// The input is not a well-formed container, or its authenticated payload
/// cannot be decoded.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Not an enctar container (bad magic bytes)")]
    BadMagic,
    #[error("Container truncated: {len} bytes, header needs {need}")]
    Truncated { len: usize, need: usize },
    #[error("Undecodable payload: {0}")]
    Payload(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid container: {0}")]
    Format(#[from] FormatError),
    /// Wrong passphrase and a tampered container are indistinguishable.
    #[error("Either the passphrase was incorrect or the archive has been corrupted")]
    Authentication,
    #[error("Invalid argument: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AuthenticationFailed => Error::Authentication,
            CryptoError::EncryptionFailed => {
                Error::Io(io::Error::new(io::ErrorKind::Other, e))
            }
        }
    }
}

/// Codec failures while building a payload are local I/O trouble; failures
/// while reading one mean the authenticated bytes are not a valid stream.
impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Compression(_) => Error::Io(io::Error::new(io::ErrorKind::Other, e)),
            CodecError::Decompression(_) => Error::Format(FormatError::Payload(e.to_string())),
        }
    }
}

/// Classify an I/O error raised while walking a decrypted tar stream.
pub(crate) fn payload_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            Error::Format(FormatError::Payload(e.to_string()))
        }
        _ => Error::Io(e),
    }
}
