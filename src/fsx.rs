//! Cross-platform filesystem wrapper.
//!
//! On Unix we transparently re-export std::fs and expose link metadata and link
//! creation. Elsewhere link identity degrades to the `(0, 0)` sentinel, which turns
//! hard-link deduplication off, and link creation reports `Unsupported`.
//!
//! The rest of zlite imports `crate::fsx::*` instead of touching `std::fs` directly,
//! keeping the call-sites identical across OSes.

use std::io;
use std::path::Path;

pub use std::fs::*;

/// The part of a metadata query that hard-link detection needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkIdentity {
    pub device: u64,
    pub inode: u64,
    pub links: u64,
}

#[cfg(unix)]
pub fn link_identity(meta: &Metadata) -> LinkIdentity {
    use std::os::unix::fs::MetadataExt;
    LinkIdentity {
        device: meta.dev(),
        inode: meta.ino(),
        links: meta.nlink(),
    }
}

#[cfg(not(unix))]
pub fn link_identity(_meta: &Metadata) -> LinkIdentity {
    LinkIdentity { device: 0, inode: 0, links: 1 }
}

#[cfg(unix)]
pub fn create_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
pub fn create_symlink(_target: &str, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

/// Removes whatever sits at `path` (file or link, never a directory) so a link can
/// take its place.
pub fn remove_existing(path: &Path) -> io::Result<()> {
    match symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => remove_file(path),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "a directory is in the way",
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Creates `dir` and every missing parent; an existing directory is fine.
pub fn mkdir_recursive(dir: &Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn remove_existing_tolerates_missing_paths() {
        let dir = tempdir().unwrap();
        remove_existing(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn remove_existing_refuses_directories() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        create_dir(&sub).unwrap();
        assert!(remove_existing(&sub).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn link_identity_sees_hard_links() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        write(&a, b"x").unwrap();
        hard_link(&a, &b).unwrap();
        let ia = link_identity(&symlink_metadata(&a).unwrap());
        let ib = link_identity(&symlink_metadata(&b).unwrap());
        assert_eq!((ia.device, ia.inode), (ib.device, ib.inode));
        assert_eq!(ia.links, 2);
    }
}
