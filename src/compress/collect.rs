//! File discovery for the Add operation.
//!
//! Every root is walked depth-first in pre-order, so a directory is always collected
//! before anything inside it. Symbolic links are leaves. Multiply-linked regular files
//! are run through a [`HardLinkTable`] owned by this collection pass.

use std::collections::HashSet;
use std::env;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::common::{normalize_name, EntryKind, FileEntry};
use crate::fsx::{self as fs, Metadata};
use crate::hardlink::{HardLinkTable, LinkClaim};
use crate::ArchiverError;

fn not_utf8(path: &Path) -> ArchiverError {
    ArchiverError::access(
        path,
        io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
    )
}

fn walk_error(fallback: &Path, err: walkdir::Error) -> ArchiverError {
    let path = err.path().unwrap_or(fallback).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop detected"));
    ArchiverError::access(path, source)
}

/// Classifies one object from a single metadata query. Returns `None` for objects the
/// archive cannot represent (FIFOs, sockets, device nodes).
fn classify(
    path: &Path,
    name: String,
    meta: &Metadata,
    table: &mut HardLinkTable,
) -> Result<Option<FileEntry>, ArchiverError> {
    let file_type = meta.file_type();
    let id = fs::link_identity(meta);

    let (kind, size) = if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(|e| ArchiverError::access(path, e))?;
        let target = target.to_str().ok_or_else(|| not_utf8(path))?.to_string();
        let size = target.len() as u64;
        (EntryKind::Symlink { target }, size)
    } else if file_type.is_dir() {
        (EntryKind::Dir, 0)
    } else if file_type.is_file() {
        let kind = if id.links > 1 {
            match table.claim(&name, id.device, id.inode) {
                LinkClaim::First => EntryKind::Regular,
                LinkClaim::Duplicate { first_path } => EntryKind::Hardlink { first_path },
            }
        } else {
            EntryKind::Regular
        };
        (kind, meta.len())
    } else {
        warn!(path = %path.display(), "skipping special file");
        return Ok(None);
    };

    Ok(Some(FileEntry {
        source: path.to_path_buf(),
        name,
        kind,
        size,
        device: id.device,
        inode: id.inode,
    }))
}

/// Lexical absolute form of `path`, for comparing roots. Symlinks are not resolved.
fn absolute_key(path: &Path) -> String {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().unwrap_or_default().join(path)
    };
    normalize_name(&joined.to_string_lossy())
}

/// Drops roots that lie inside another root's directory tree, along with repeats.
/// Walking only the outer root keeps every directory ahead of its contents.
fn outermost_roots(roots: &[PathBuf]) -> Vec<&PathBuf> {
    let keys: Vec<String> = roots.iter().map(|r| absolute_key(r)).collect();
    let is_dir: Vec<bool> = roots
        .iter()
        .map(|r| fs::symlink_metadata(r).map(|m| m.is_dir()).unwrap_or(false))
        .collect();

    let mut kept = Vec::new();
    for (i, root) in roots.iter().enumerate() {
        let covered = keys.iter().enumerate().any(|(j, outer)| {
            if i == j {
                return false;
            }
            if keys[i] == *outer {
                // repeats: the first occurrence wins
                return j < i;
            }
            is_dir[j] && (outer.is_empty() || keys[i].starts_with(&format!("{outer}/")))
        });
        if covered {
            debug!(root = %root.display(), "root lies inside another root");
        } else {
            kept.push(root);
        }
    }
    kept
}

/// Collects every object under `roots` in pre-order.
///
/// Any metadata failure aborts the whole collection. A root inside another root's
/// directory is walked as part of that directory, and a path reached more than once is
/// collected once.
pub fn collect_entries(roots: &[PathBuf]) -> Result<Vec<FileEntry>, ArchiverError> {
    let mut table = HardLinkTable::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut entries = Vec::new();

    for root in outermost_roots(roots) {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name();
        for item in walker {
            let item = item.map_err(|e| walk_error(root, e))?;
            let path = item.path();
            let meta = item.metadata().map_err(|e| walk_error(path, e))?;

            let name = normalize_name(path.to_str().ok_or_else(|| not_utf8(path))?);
            // "." or "/" as a root: walk it, but there is nothing to name
            if name.is_empty() || !seen.insert(name.clone()) {
                continue;
            }
            if let Some(entry) = classify(path, name, &meta, &mut table)? {
                debug!(name = %entry.name, kind = ?entry.kind, size = entry.size, "collected");
                entries.push(entry);
            }
        }
    }

    info!(
        entries = entries.len(),
        linked_inodes = table.len(),
        "collection finished"
    );
    Ok(entries)
}
