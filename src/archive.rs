//! High-level create / extract / list API, the main embedding surface.
//!
//! ```no_run
//! use enctar::archive::{create_container, list_container, PackOptions};
//! use enctar::crypto::Passphrase;
//!
//! let pass = Passphrase::from("correct-horse");
//! let bytes = create_container(&["notes/"], &PackOptions::new(true, true), &pass)?;
//! enctar::archive::write_container_file("notes.enctar", &bytes)?;
//!
//! for entry in list_container(&bytes, &pass)? {
//!     println!("{} {}", entry.path, entry.size);
//! }
//! # Ok::<(), enctar::Error>(())
//! ```
//!
//! Whole payloads are held in memory; archive size is bounded by RAM.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::codec::{CodecId, DEFAULT_COMPRESSION_LEVEL};
use crate::container::{compose, seal_payload, Container, ContainerHeader};
use crate::crypto::Passphrase;
use crate::error::{Error, Result};
use crate::tree::{self, EntryInfo};

// ── PackOptions ───────────────────────────────────────────────────────────────

/// Configuration for [`create_container`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Descend into sub-directories of directory roots.
    pub recursive: bool,
    /// Filter applied to the serialized tree before encryption.
    pub codec:     CodecId,
    /// Compression level (zstd only).
    pub level:     i32,
    /// Directory relative roots are resolved against.  `None` means the
    /// process working directory.
    pub base_dir:  Option<PathBuf>,
}

impl PackOptions {
    /// `compress` selects xz, the filter `tar.xz` readers expect.
    pub fn new(recursive: bool, compress: bool) -> Self {
        Self {
            recursive,
            codec: if compress { CodecId::Xz } else { CodecId::None },
            ..Self::default()
        }
    }

    pub(crate) fn resolve(&self, root: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if root.is_relative() => base.join(root),
            _ => root.to_path_buf(),
        }
    }
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            codec:     CodecId::None,
            level:     DEFAULT_COMPRESSION_LEVEL,
            base_dir:  None,
        }
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

/// Serialize `roots`, encrypt under `passphrase`, and return the container
/// image.  Salt and nonce are freshly random on every call.
pub fn create_container<P: AsRef<Path>>(
    roots: &[P],
    opts: &PackOptions,
    passphrase: &Passphrase,
) -> Result<Vec<u8>> {
    let payload = zeroize::Zeroizing::new(tree::serialize(roots, opts)?);
    let container = seal_payload(&payload, passphrase)?;
    info!(
        roots = roots.len(),
        codec = opts.codec.name(),
        container_len = container.len(),
        "container created"
    );
    Ok(container)
}

/// Verify and decrypt `container`, then restore its tree under `destination`.
///
/// `destination` is validated before any key derivation.  Nothing is written
/// unless the tag verifies.
pub fn extract_container(container: &[u8], passphrase: &Passphrase, destination: &Path) -> Result<()> {
    tree::ensure_directory(destination)?;
    let parsed = Container::parse(container)?;
    let payload = parsed.open(passphrase)?;
    tree::deserialize(&payload, destination)?;
    info!(destination = %destination.display(), "container extracted");
    Ok(())
}

/// Verify and decrypt `container` and describe its entries.  Read-only.
pub fn list_container(container: &[u8], passphrase: &Passphrase) -> Result<Vec<EntryInfo>> {
    let parsed = Container::parse(container)?;
    let payload = parsed.open(passphrase)?;
    tree::list(&payload)
}

// ── Files ─────────────────────────────────────────────────────────────────────

/// Read a container file.  The magic is checked as soon as the first two
/// bytes are in, before the rest of the file is loaded.
pub fn read_container_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let mut file = File::open(path.as_ref())?;
    let header = ContainerHeader::read(&mut file)?;
    let mut ciphertext = Vec::new();
    file.read_to_end(&mut ciphertext)?;
    Ok(compose(&header, &ciphertext))
}

/// Write `container` to `path` via a temporary file in the same directory,
/// renamed into place once fully written and synced.
pub fn write_container_file<P: AsRef<Path>>(path: P, container: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(container)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    info!(path = %path.display(), bytes = container.len(), "container written");
    Ok(())
}
