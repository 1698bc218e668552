//! Hard-link deduplication table.
//!
//! During one collection pass every multiply-linked regular file is looked up by its
//! `(device, inode)` pair. The first path that claims a pair carries the file's data in
//! the archive; every later path becomes a back-reference to it.

use std::collections::HashMap;

/// One claimed `(device, inode)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardLinkRecord {
    pub first_path: String,
    pub ref_count: u32,
}

/// Outcome of [`HardLinkTable::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkClaim {
    /// The path owns the data.
    First,
    /// The path duplicates an earlier one.
    Duplicate { first_path: String },
}

/// Maps `(device, inode)` to the first path that claimed it.
///
/// A table lives for exactly one collection call.
#[derive(Debug, Default)]
pub struct HardLinkTable {
    entries: HashMap<(u64, u64), HardLinkRecord>,
}

impl HardLinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(0, 0)` is what platforms without link metadata report.
    pub fn is_sentinel(device: u64, inode: u64) -> bool {
        device == 0 && inode == 0
    }

    /// Looks up `(device, inode)`, inserting `path` as the first occurrence when absent
    /// and bumping the reference count when present.
    ///
    /// Returns `None` for the sentinel key, which is never tracked.
    pub fn find_or_add(&mut self, path: &str, device: u64, inode: u64) -> Option<&HardLinkRecord> {
        if Self::is_sentinel(device, inode) {
            return None;
        }
        let record = self
            .entries
            .entry((device, inode))
            .and_modify(|r| r.ref_count += 1)
            .or_insert_with(|| HardLinkRecord {
                first_path: path.to_string(),
                ref_count: 1,
            });
        Some(record)
    }

    /// Classifies `path` as the data-carrying occurrence or a duplicate.
    pub fn claim(&mut self, path: &str, device: u64, inode: u64) -> LinkClaim {
        match self.find_or_add(path, device, inode) {
            Some(record) if record.first_path != path => LinkClaim::Duplicate {
                first_path: record.first_path.clone(),
            },
            _ => LinkClaim::First,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
