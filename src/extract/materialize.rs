//! Per-record reconstruction of filesystem objects.
//!
//! Each record is handled on its own; the only state that carries over from one record
//! to the next is the output tree itself (and, when only verifying, the set of regular
//! files that verified so far, which stands in for that tree).

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::archive::{Record, RecordKind};
use crate::codec::Codec;
use crate::error::CodecError;
use crate::fsx as fs;
use crate::ArchiverError;

/// How archive names map onto the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Recreate the stored directory structure.
    #[default]
    FullPaths,
    /// Drop directory names; every object lands directly in the output directory.
    Flat,
}

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Nothing to do for this record (directories in a flat extraction).
    Skipped,
}

/// Maps an archive name to a path below `root`, refusing anything that would escape it.
pub fn output_path(root: &Path, layout: Layout, name: &str) -> Result<PathBuf, ArchiverError> {
    let mut relative = PathBuf::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(ArchiverError::UnsafePath(name.to_string())),
            p => relative.push(p),
        }
    }
    // a single pushed part could still carry a prefix or root on some platforms
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(ArchiverError::UnsafePath(name.to_string()));
    }
    let relative = match layout {
        Layout::FullPaths => relative,
        Layout::Flat => relative.file_name().map(PathBuf::from).unwrap_or_default(),
    };
    if relative.as_os_str().is_empty() {
        return Err(ArchiverError::UnsafePath(name.to_string()));
    }
    Ok(root.join(relative))
}

/// Fails when a directory between `root` and `path` is a symbolic link. Anything
/// created through such a link could land outside `root`.
fn check_ancestors(root: &Path, path: &Path, name: &str) -> Result<(), ArchiverError> {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) {
            break;
        }
        match fs::symlink_metadata(d) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ArchiverError::UnsafePath(name.to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchiverError::io(d, e)),
        }
        dir = d.parent();
    }
    Ok(())
}

/// [`output_path`], also refusing names that would be reached through a symbolic link
/// already present below `root`.
pub fn resolve_output(root: &Path, layout: Layout, name: &str) -> Result<PathBuf, ArchiverError> {
    let out = output_path(root, layout, name)?;
    check_ancestors(root, &out, name)?;
    Ok(out)
}

/// Remembers every path a flat extraction wrote and warns when one comes up twice.
pub(crate) fn note_flat_target(placed: &mut HashSet<PathBuf>, out: &Path) {
    if !placed.insert(out.to_path_buf()) {
        warn!(path = %out.display(), "entries share a base name, the later one replaces the earlier");
    }
}

fn ensure_parent(path: &Path) -> Result<(), ArchiverError> {
    match path.parent() {
        Some(parent) => fs::mkdir_recursive(parent).map_err(|e| ArchiverError::io(parent, e)),
        None => Ok(()),
    }
}

/// Writes `data` to a temporary file beside `path`, then renames it into place, so a
/// failure never leaves a partially written file at `path`.
pub fn place_file(path: &Path, data: &[u8]) -> Result<(), ArchiverError> {
    ensure_parent(path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| ArchiverError::io(dir, e))?;
    temp.write_all(data).map_err(|e| ArchiverError::io(temp.path(), e))?;
    temp.persist(path).map_err(|e| ArchiverError::io(path, e.error))?;
    Ok(())
}

/// Checks the stored CRC and decompresses a Regular record.
pub fn decode_regular<C: Codec>(codec: &C, record: &Record) -> Result<Vec<u8>, ArchiverError> {
    let Record::Regular { path, size, crc32, payload } = record else {
        return Err(ArchiverError::Format(format!("'{}' is not a regular file record", record.path())));
    };
    let actual = crc32fast::hash(payload);
    if actual != *crc32 {
        return Err(ArchiverError::Integrity {
            path: path.clone(),
            expected: *crc32,
            actual,
        });
    }
    let codec_err = |source| ArchiverError::Codec { path: path.clone(), source };
    match payload.split_first() {
        Some((&property, stream)) => codec.decompress(stream, property, *size).map_err(codec_err),
        None if *size == 0 => Ok(Vec::new()),
        None => Err(codec_err(CodecError::Corrupt)),
    }
}

/// Reconstructs records below an output root, or only verifies them.
pub struct EntryMaterializer<'c, C: Codec> {
    codec: &'c C,
    /// `None` when verifying without writing.
    root: Option<PathBuf>,
    layout: Layout,
    verified: HashSet<String>,
    placed: HashSet<PathBuf>,
}

impl<'c, C: Codec> EntryMaterializer<'c, C> {
    /// Materializer that writes below `root`.
    pub fn new(codec: &'c C, root: &Path, layout: Layout) -> Self {
        Self {
            codec,
            root: Some(root.to_path_buf()),
            layout,
            verified: HashSet::new(),
            placed: HashSet::new(),
        }
    }

    /// Materializer that decodes and checks everything but writes nothing.
    pub fn verifier(codec: &'c C) -> Self {
        Self {
            codec,
            root: None,
            layout: Layout::FullPaths,
            verified: HashSet::new(),
            placed: HashSet::new(),
        }
    }

    pub fn materialize(&mut self, record: &Record) -> Result<Outcome, ArchiverError> {
        match &self.root {
            Some(root) => {
                let root = root.clone();
                self.extract(&root, record)
            }
            None => self.verify(record),
        }
    }

    fn verify(&mut self, record: &Record) -> Result<Outcome, ArchiverError> {
        match record {
            Record::Regular { path, .. } => {
                decode_regular(self.codec, record)?;
                self.verified.insert(path.clone());
            }
            Record::Hardlink { path, first_path, .. } => {
                if !self.verified.contains(first_path) {
                    return Err(ArchiverError::Link {
                        path: PathBuf::from(path),
                        source: io::Error::new(
                            io::ErrorKind::NotFound,
                            format!("'{first_path}' is not an earlier verified file"),
                        ),
                    });
                }
            }
            Record::Dir { .. } | Record::Symlink { .. } => {}
        }
        Ok(Outcome::Done)
    }

    fn extract(&mut self, root: &Path, record: &Record) -> Result<Outcome, ArchiverError> {
        let out = resolve_output(root, self.layout, record.path())?;
        if self.layout == Layout::Flat {
            if record.kind() == RecordKind::Dir {
                return Ok(Outcome::Skipped);
            }
            note_flat_target(&mut self.placed, &out);
        }
        match record {
            Record::Dir { .. } => {
                fs::mkdir_recursive(&out).map_err(|e| ArchiverError::io(&out, e))?;
            }
            Record::Symlink { target, .. } => {
                ensure_parent(&out)?;
                fs::remove_existing(&out)
                    .and_then(|_| fs::create_symlink(target, &out))
                    .map_err(|source| ArchiverError::Link { path: out.clone(), source })?;
            }
            Record::Hardlink { first_path, .. } => {
                let existing = resolve_output(root, self.layout, first_path)?;
                let present = fs::symlink_metadata(&existing)
                    .map(|m| m.is_file())
                    .unwrap_or(false);
                if !present {
                    return Err(ArchiverError::Link {
                        path: out,
                        source: io::Error::new(
                            io::ErrorKind::NotFound,
                            format!("referenced file '{first_path}' was not extracted"),
                        ),
                    });
                }
                ensure_parent(&out)?;
                fs::remove_existing(&out)
                    .and_then(|_| fs::hard_link(&existing, &out))
                    .map_err(|source| ArchiverError::Link { path: out.clone(), source })?;
            }
            Record::Regular { .. } => {
                let data = decode_regular(self.codec, record)?;
                place_file(&out, &data)?;
            }
        }
        debug!(path = %out.display(), kind = record.kind().label(), "materialized");
        Ok(Outcome::Done)
    }
}
