//! Compression filters applied to the whole serialized tree.
//!
//! # Detection
//! Nothing in the container records which filter was used.  Each compressed
//! stream starts with its own format magic, and a decoder picks the filter
//! from those leading bytes:
//!
//! | Filter | Leading bytes |
//! |--------|---------------|
//! | xz     | `FD 37 7A 58 5A 00` |
//! | zstd   | `28 B5 2F FD` |
//! | none   | a tar header (`ustar` at offset 257), or anything else |
//!
//! A raw tar stream starts with its first entry's name, which may be any
//! byte string, so the tar signature is checked before the codec magics.
//! Only self-identifying formats can be registered here.

use std::io::Cursor;
use thiserror::Error;

/// xz stream header magic.
pub const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
/// Zstandard frame magic (little-endian 0xFD2FB528).
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// ustar signature, present in both GNU and POSIX tar headers.
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

/// Default Zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// ── CodecId enum ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    None,
    Xz,
    Zstd,
}

impl CodecId {
    /// Human-readable name (for diagnostics and the CLI).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::Xz   => "xz",
            CodecId::Zstd => "zstd",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(CodecId::None),
            "xz" | "lzma" => Some(CodecId::Xz),
            "zstd" => Some(CodecId::Zstd),
            _ => None,
        }
    }

    /// Leading bytes every stream produced by this codec starts with.
    pub fn magic(self) -> &'static [u8] {
        match self {
            CodecId::None => &[],
            CodecId::Xz   => &XZ_MAGIC,
            CodecId::Zstd => &ZSTD_MAGIC,
        }
    }

    /// Identify the filter a serialized payload was written with.
    pub fn detect(data: &[u8]) -> Self {
        let tar_magic = data.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len());
        if tar_magic == Some(TAR_MAGIC) {
            CodecId::None
        } else if data.starts_with(&XZ_MAGIC) {
            CodecId::Xz
        } else if data.starts_with(&ZSTD_MAGIC) {
            CodecId::Zstd
        } else {
            CodecId::None
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec {
    fn codec_id(&self) -> CodecId;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn codec_id(&self) -> CodecId { CodecId::None }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8])        -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

/// xz container around LZMA2, the format `tar.xz` tools read and write.
pub struct XzCodec;
impl Codec for XzCodec {
    fn codec_id(&self) -> CodecId { CodecId::Xz }
    fn compress(&self, data: &[u8], _: i32) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::xz_compress(&mut Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::xz_decompress(&mut Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::None => Box::new(NoneCodec),
        CodecId::Xz   => Box::new(XzCodec),
        CodecId::Zstd => Box::new(ZstdCodec),
    }
}

/// Undo whichever filter `data` was written with.
pub fn decode_auto(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    get_codec(CodecId::detect(data)).decompress(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"a.txt\0\0\0 hello hello hello hello hello hello";

    #[test]
    fn compressed_streams_carry_their_magic() {
        for id in [CodecId::Xz, CodecId::Zstd] {
            let out = get_codec(id).compress(SAMPLE, DEFAULT_COMPRESSION_LEVEL).unwrap();
            assert!(out.starts_with(id.magic()), "{}", id.name());
            assert_eq!(CodecId::detect(&out), id);
            assert_eq!(decode_auto(&out).unwrap(), SAMPLE);
        }
    }

    #[test]
    fn raw_data_is_detected_as_uncompressed() {
        assert_eq!(CodecId::detect(SAMPLE), CodecId::None);
        assert_eq!(CodecId::detect(&[]), CodecId::None);
        assert_eq!(decode_auto(SAMPLE).unwrap(), SAMPLE);
    }

    #[test]
    fn tar_header_wins_over_a_magic_shaped_name() {
        // First entry named "\xFD7zXZ": the NUL-padded name field equals XZ_MAGIC.
        let mut header = vec![0u8; 512];
        header[..XZ_MAGIC.len()].copy_from_slice(&XZ_MAGIC);
        header[257..265].copy_from_slice(b"ustar  \0");
        assert_eq!(CodecId::detect(&header), CodecId::None);

        header[257..265].copy_from_slice(b"ustar\x0000");
        assert_eq!(CodecId::detect(&header), CodecId::None);

        header[..ZSTD_MAGIC.len()].copy_from_slice(&ZSTD_MAGIC);
        assert_eq!(CodecId::detect(&header), CodecId::None);
    }

    #[test]
    fn truncated_stream_is_a_decompression_error() {
        let out = get_codec(CodecId::Xz).compress(SAMPLE, 0).unwrap();
        let err = decode_auto(&out[..out.len() - 4]).unwrap_err();
        assert!(matches!(err, CodecError::Decompression(_)));
    }

    #[test]
    fn names_round_trip() {
        for id in [CodecId::None, CodecId::Xz, CodecId::Zstd] {
            assert_eq!(CodecId::from_name(id.name()), Some(id));
            assert_eq!(get_codec(id).codec_id(), id);
        }
        assert_eq!(CodecId::from_name("LZMA"), Some(CodecId::Xz));
        assert_eq!(CodecId::from_name("brotli"), None);
    }
}
