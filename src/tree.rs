//! File-tree serialization.
//!
//! A set of filesystem roots is written as a tar stream and then passed
//! through the selected compression filter from [`crate::codec`].  The
//! reverse direction detects the filter from the stream itself, so callers
//! never need to know how a payload was produced.
//!
//! # Path policy
//! - A non-directory root is stored under its base name alone.
//! - A directory root contributes its *contents*; the directory's own name
//!   never appears in the archive.
//! - Below a root, sub-directories always get their own entry; with
//!   `recursive` their contents follow, otherwise they stay empty.
//! - Symlinks below a root are stored as links and never followed.
//!
//! Relative roots are resolved against [`PackOptions::base_dir`] when set,
//! otherwise against the process working directory.  The working directory
//! is never changed.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::archive::PackOptions;
use crate::codec::{decode_auto, get_codec, CodecId};
use crate::error::{payload_error, Error, Result};

// ── EntryInfo ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    /// Hard links, device nodes, and anything else another tar writer put in.
    Other,
}

impl EntryKind {
    fn of(entry_type: tar::EntryType) -> Self {
        if entry_type.is_file() {
            EntryKind::File
        } else if entry_type.is_dir() {
            EntryKind::Directory
        } else if entry_type.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::Other
        }
    }
}

/// Descriptor for one archived entry, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// `/`-separated path relative to the extraction directory.
    pub path:        String,
    pub kind:        EntryKind,
    /// Content length in bytes; zero for directories and links.
    pub size:        u64,
    /// Permission bits (`st_mode & 0o7777`).
    pub mode:        u32,
    /// Modification time, seconds since the Unix epoch.
    pub mtime:       u64,
    pub link_target: Option<String>,
}

impl EntryInfo {
    fn from_entry<R: Read>(entry: &tar::Entry<'_, R>) -> io::Result<Self> {
        let header = entry.header();
        let kind = EntryKind::of(header.entry_type());
        let link_target = match kind {
            EntryKind::Symlink => entry
                .link_name()?
                .map(|p| p.to_string_lossy().into_owned()),
            _ => None,
        };
        Ok(EntryInfo {
            path: normalize(&entry.path()?),
            kind,
            size: entry.size(),
            mode: header.mode()? & 0o7777,
            mtime: header.mtime()?,
            link_target,
        })
    }
}

/// Drop `.` components and trailing slashes so `./a/` and `a` read the same.
fn normalize(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

// ── Serialize ─────────────────────────────────────────────────────────────────

/// Serialize `roots` into one payload, compressed per `opts.codec`.
///
/// Every root is checked for existence before the first byte is written.
pub fn serialize<P: AsRef<Path>>(roots: &[P], opts: &PackOptions) -> Result<Vec<u8>> {
    if roots.is_empty() {
        return Err(Error::Validation("no input paths given".into()));
    }
    let roots: Vec<PathBuf> = roots.iter().map(|r| opts.resolve(r.as_ref())).collect();
    for root in &roots {
        match fs::symlink_metadata(root) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::Validation(format!(
                    "The file/directory {} must exist for it to be archived",
                    root.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    for root in &roots {
        add_root(&mut builder, root, opts.recursive)?;
    }
    let tar_bytes = Zeroizing::new(builder.into_inner()?);

    let codec = get_codec(opts.codec);
    let payload = codec.compress(&tar_bytes, opts.level)?;
    debug!(
        codec = codec.codec_id().name(),
        tar_len = tar_bytes.len(),
        payload_len = payload.len(),
        "tree serialized"
    );
    Ok(payload)
}

fn add_root(builder: &mut tar::Builder<Vec<u8>>, root: &Path, recursive: bool) -> Result<()> {
    // A symlink to a directory given on the command line counts as that directory.
    let is_dir = fs::metadata(root).map(|m| m.is_dir()).unwrap_or(false);
    if is_dir {
        return add_dir_contents(builder, root, Path::new(""), recursive);
    }
    let file_type = fs::symlink_metadata(root)?.file_type();
    if !(file_type.is_file() || file_type.is_symlink()) {
        warn!(path = %root.display(), "skipping special file");
        return Ok(());
    }
    let name = root.file_name().ok_or_else(|| {
        Error::Validation(format!("{} has no file name to archive it under", root.display()))
    })?;
    debug!(path = %root.display(), "adding root entry");
    builder.append_path_with_name(root, name)?;
    Ok(())
}

fn add_dir_contents(
    builder: &mut tar::Builder<Vec<u8>>,
    dir: &Path,
    rel: &Path,
    recursive: bool,
) -> Result<()> {
    let mut children = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_by_key(|c| c.file_name());

    for child in children {
        let src = child.path();
        let name = rel.join(child.file_name());
        let file_type = child.file_type()?;

        if file_type.is_dir() {
            builder.append_path_with_name(&src, &name)?;
            if recursive {
                add_dir_contents(builder, &src, &name, recursive)?;
            }
        } else if file_type.is_file() || file_type.is_symlink() {
            builder.append_path_with_name(&src, &name)?;
        } else {
            warn!(path = %src.display(), "skipping special file");
        }
    }
    Ok(())
}

// ── Deserialize ───────────────────────────────────────────────────────────────

/// Materialize every entry of `payload` under `destination`.
///
/// `destination` must already be a directory.  Entries that would land
/// outside it (absolute paths, `..`) are not written.
pub fn deserialize(payload: &[u8], destination: &Path) -> Result<()> {
    ensure_directory(destination)?;
    let mut reader = TreeReader::new(payload)?;
    reader.archive.set_preserve_permissions(true);
    reader.archive.set_overwrite(true);
    reader.archive.unpack(destination).map_err(payload_error)?;
    debug!(destination = %destination.display(), "tree restored");
    Ok(())
}

pub(crate) fn ensure_directory(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(m) if m.is_dir() => Ok(()),
        _ => Err(Error::Validation(format!(
            "The extraction location {} must be a directory",
            path.display()
        ))),
    }
}

// ── List ──────────────────────────────────────────────────────────────────────

/// Decoded tar bytes, wiped when the reader is dropped.
struct PlainTar(Zeroizing<Vec<u8>>);

impl AsRef<[u8]> for PlainTar {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Read-only view over a decoded payload.
///
/// Decompression happens once in [`TreeReader::new`]; entries are then
/// parsed lazily as the iterator from [`TreeReader::entries`] advances.
pub struct TreeReader {
    codec:   CodecId,
    archive: tar::Archive<Cursor<PlainTar>>,
}

impl TreeReader {
    pub fn new(payload: &[u8]) -> Result<Self> {
        let codec = CodecId::detect(payload);
        let tar_bytes = Zeroizing::new(decode_auto(payload)?);
        debug!(codec = codec.name(), tar_len = tar_bytes.len(), "payload decoded");
        Ok(Self {
            codec,
            archive: tar::Archive::new(Cursor::new(PlainTar(tar_bytes))),
        })
    }

    /// Compression filter the payload was written with.
    pub fn codec(&self) -> CodecId {
        self.codec
    }

    /// Iterate over entry descriptors.  Can be called once per reader.
    pub fn entries(&mut self) -> Result<impl Iterator<Item = Result<EntryInfo>> + '_> {
        let entries = self.archive.entries().map_err(payload_error)?;
        Ok(entries.map(|entry| {
            entry
                .and_then(|e| EntryInfo::from_entry(&e))
                .map_err(payload_error)
        }))
    }
}

/// Collect every entry descriptor of `payload` without touching the disk.
pub fn list(payload: &[u8]) -> Result<Vec<EntryInfo>> {
    let mut reader = TreeReader::new(payload)?;
    let entries: Result<Vec<EntryInfo>> = reader.entries()?.collect();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), "world").unwrap();
        fs::create_dir(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("sub/deeper/c.txt"), "!").unwrap();
        dir
    }

    fn paths(entries: &[EntryInfo]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn directory_root_contributes_contents_only() {
        let tree = sample_tree();
        let payload = serialize(&[tree.path()], &PackOptions::new(true, false)).unwrap();
        let entries = list(&payload).unwrap();
        assert_eq!(
            paths(&entries),
            ["a.txt", "sub", "sub/b.txt", "sub/deeper", "sub/deeper/c.txt"]
        );
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 5);
        assert_eq!(entries[1].kind, EntryKind::Directory);
    }

    #[test]
    fn non_recursive_keeps_subdirectory_entries_only() {
        let tree = sample_tree();
        let payload = serialize(&[tree.path()], &PackOptions::new(false, false)).unwrap();
        assert_eq!(paths(&list(&payload).unwrap()), ["a.txt", "sub"]);
    }

    #[test]
    fn file_root_is_stored_under_its_base_name() {
        let tree = sample_tree();
        let payload =
            serialize(&[tree.path().join("sub/deeper/c.txt")], &PackOptions::new(false, true))
                .unwrap();
        assert_eq!(paths(&list(&payload).unwrap()), ["c.txt"]);
    }

    #[test]
    fn relative_roots_resolve_against_base_dir() {
        let tree = sample_tree();
        let opts = PackOptions { base_dir: Some(tree.path().to_path_buf()), ..PackOptions::default() };
        let payload = serialize(&["sub/b.txt", "a.txt"], &opts).unwrap();
        assert_eq!(paths(&list(&payload).unwrap()), ["b.txt", "a.txt"]);
    }

    #[test]
    fn missing_root_fails_before_serializing() {
        let tree = sample_tree();
        let roots = [tree.path().join("a.txt"), tree.path().join("nope")];
        let err = serialize(&roots, &PackOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("nope")));
        let none: [&Path; 0] = [];
        assert!(matches!(serialize(&none, &PackOptions::default()), Err(Error::Validation(_))));
    }

    #[test]
    fn compressed_and_plain_payloads_restore_identically() {
        let tree = sample_tree();
        for compress in [false, true] {
            let payload = serialize(&[tree.path()], &PackOptions::new(true, compress)).unwrap();
            let expected = if compress { CodecId::Xz } else { CodecId::None };
            assert_eq!(TreeReader::new(&payload).unwrap().codec(), expected);

            let out = TempDir::new().unwrap();
            deserialize(&payload, out.path()).unwrap();
            assert_eq!(fs::read_to_string(out.path().join("a.txt")).unwrap(), "hello");
            assert_eq!(fs::read_to_string(out.path().join("sub/b.txt")).unwrap(), "world");
            assert_eq!(fs::read_to_string(out.path().join("sub/deeper/c.txt")).unwrap(), "!");
        }
    }

    #[test]
    fn deserialize_creates_missing_parents() {
        let tree = sample_tree();
        // Only the leaf file, under a nested name, with no directory entries.
        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_path_with_name(tree.path().join("a.txt"), "x/y/z.txt")
            .unwrap();
        let payload = builder.into_inner().unwrap();

        let out = TempDir::new().unwrap();
        deserialize(&payload, out.path()).unwrap();
        assert_eq!(fs::read_to_string(out.path().join("x/y/z.txt")).unwrap(), "hello");
    }

    #[test]
    fn deserialize_requires_a_directory() {
        let tree = sample_tree();
        let payload = serialize(&[tree.path()], &PackOptions::default()).unwrap();
        let err = deserialize(&payload, &tree.path().join("a.txt")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = deserialize(&payload, &tree.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn garbage_payload_is_a_format_error() {
        let mut payload = crate::codec::XZ_MAGIC.to_vec();
        payload.extend_from_slice(b"not really xz");
        assert!(matches!(list(&payload), Err(Error::Format(_))));
    }

    #[test]
    fn normalize_strips_dot_prefix() {
        assert_eq!(normalize(Path::new("./a/b.txt")), "a/b.txt");
        assert_eq!(normalize(Path::new("sub/")), "sub");
        assert_eq!(normalize(Path::new(".")), ".");
    }

    #[cfg(unix)]
    #[test]
    fn permissions_and_symlinks_survive() {
        use std::os::unix::fs::{symlink, PermissionsExt};

        let tree = sample_tree();
        fs::set_permissions(tree.path().join("a.txt"), fs::Permissions::from_mode(0o640)).unwrap();
        fs::write(tree.path().join("run.sh"), "#!/bin/sh\n").unwrap();
        fs::set_permissions(tree.path().join("run.sh"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::set_permissions(tree.path().join("sub/deeper"), fs::Permissions::from_mode(0o750)).unwrap();
        symlink("a.txt", tree.path().join("link")).unwrap();

        let payload = serialize(&[tree.path()], &PackOptions::new(true, true)).unwrap();
        let entries = list(&payload).unwrap();
        let link = entries.iter().find(|e| e.path == "link").unwrap();
        assert_eq!(link.kind, EntryKind::Symlink);
        assert_eq!(link.link_target.as_deref(), Some("a.txt"));

        let out = TempDir::new().unwrap();
        deserialize(&payload, out.path()).unwrap();
        let mode = |p: &str| fs::metadata(out.path().join(p)).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode("a.txt"), 0o640);
        assert_eq!(mode("run.sh"), 0o755);
        assert_eq!(mode("sub/deeper"), 0o750);
        assert_eq!(fs::read_link(out.path().join("link")).unwrap(), Path::new("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn uncompressed_tree_with_xz_shaped_name_restores() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"\xFD7zXZ");
        fs::write(dir.path().join(name), "not compressed").unwrap();

        let payload = serialize(&[dir.path()], &PackOptions::new(true, false)).unwrap();
        assert!(payload.starts_with(&crate::codec::XZ_MAGIC));
        assert_eq!(TreeReader::new(&payload).unwrap().codec(), CodecId::None);

        let out = TempDir::new().unwrap();
        deserialize(&payload, out.path()).unwrap();
        assert_eq!(fs::read_to_string(out.path().join(name)).unwrap(), "not compressed");
    }

    #[cfg(unix)]
    #[test]
    fn special_file_root_is_skipped() {
        use std::os::unix::net::UnixListener;

        let tree = sample_tree();
        let socket = tree.path().join("daemon.sock");
        let _listener = UnixListener::bind(&socket).unwrap();

        let roots = [socket, tree.path().join("a.txt")];
        let payload = serialize(&roots, &PackOptions::default()).unwrap();
        assert_eq!(paths(&list(&payload).unwrap()), ["a.txt"]);
    }
}
