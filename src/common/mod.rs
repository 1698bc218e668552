//! Common utilities and types module.
// Shared structs used by both the collection and the archive side.

use std::path::PathBuf;

/// What a collected filesystem object will be stored as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Dir,
    /// Symbolic link; the target is stored verbatim.
    Symlink { target: String },
    /// Later occurrence of a multiply-linked file; `first_path` is the archive name of
    /// the occurrence that carries the data.
    Hardlink { first_path: String },
}

/// A single filesystem object discovered during collection.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Where to read the object from.
    pub source: PathBuf,
    /// Normalized name stored in the archive.
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub device: u64,
    pub inode: u64,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Dir)
    }
}

/// Normalize a path into an archive name: forward slashes, no leading `./` or `/`,
/// no repeated or trailing separators.
/// Example: "./dir1//dir2/file.txt" becomes "dir1/dir2/file.txt"
pub fn normalize_name(path: &str) -> String {
    let s = path.replace('\\', "/");
    s.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_prefixes_and_separators() {
        assert_eq!(normalize_name("./dir1//dir2/file.txt"), "dir1/dir2/file.txt");
        assert_eq!(normalize_name("/abs/path/"), "abs/path");
        assert_eq!(normalize_name("dir\\sub\\f"), "dir/sub/f");
        assert_eq!(normalize_name("."), "");
        // parent components are kept; extraction decides whether they are safe
        assert_eq!(normalize_name("../up"), "../up");
    }
}
