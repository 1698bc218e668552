//! # Compression Pipeline
//!
//! This module implements the Add operation. It orchestrates the entire process, from
//! discovering files to writing the finished archive.
//!
//! ## Key Features:
//! - **File Discovery**: Recursively finds files in input directories ([`collect`]).
//! - **Hard-link Dedup**: Later occurrences of a multiply-linked file are stored as
//!   back-references instead of a second copy of the data.
//! - **All-or-nothing Writes**: The archive is assembled in a temporary file next to the
//!   destination and renamed into place only when every record was written.

pub mod collect;

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::archive::{ArchiveWriter, Record};
use crate::codec::{Codec, Lzma2Codec};
use crate::common::{EntryKind, FileEntry};
use crate::fsx as fs;
use crate::ArchiverError;

pub use collect::collect_entries;

/// Defines the available compression methods.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// LZMA2, the default.
    Lzma2,
    /// Plain LZMA. Accepted for compatibility; the codec rejects it.
    Lzma,
}

pub const LEVEL_MAX: u32 = 9;
pub const LEVEL_DEFAULT: u32 = 5;

/// Holds all configuration options for a compression operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressOptions {
    /// The compression level (0-9).
    pub level: u32,
    /// The compression method.
    pub method: Method,
    /// Codec threads. 0 = auto-detect based on CPU cores.
    pub threads: usize,
    /// Volume size in bytes. Parsed and carried, but archives are never split.
    pub volume_size: u64,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            level: LEVEL_DEFAULT,
            method: Method::Lzma2,
            threads: 0,
            volume_size: 0,
        }
    }
}

impl CompressOptions {
    pub fn validate(&self) -> Result<(), ArchiverError> {
        if self.level > LEVEL_MAX {
            return Err(ArchiverError::InvalidOption(format!(
                "compression level {} is outside 0-{LEVEL_MAX}",
                self.level
            )));
        }
        Ok(())
    }

    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.threads
        }
    }
}

/// Totals of a finished Add.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AddSummary {
    pub entries: usize,
    pub files: usize,
    pub hardlinks: usize,
    pub symlinks: usize,
    pub dirs: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Turns one collected entry into its archive record, compressing regular content.
fn build_record<C: Codec>(entry: &FileEntry, level: u32, codec: &C) -> Result<Record, ArchiverError> {
    let record = match &entry.kind {
        EntryKind::Dir => Record::Dir { path: entry.name.clone() },
        EntryKind::Symlink { target } => Record::Symlink {
            path: entry.name.clone(),
            target: target.clone(),
        },
        EntryKind::Hardlink { first_path } => Record::Hardlink {
            path: entry.name.clone(),
            first_path: first_path.clone(),
            size: entry.size,
        },
        EntryKind::Regular => {
            let data = fs::read(&entry.source).map_err(|e| ArchiverError::access(&entry.source, e))?;
            let packed = codec.compress(&data, level).map_err(|source| ArchiverError::Codec {
                path: entry.name.clone(),
                source,
            })?;
            Record::regular(entry.name.clone(), data.len() as u64, packed.property, &packed.data)
        }
    };
    Ok(record)
}

/// Writes `entries` as a complete archive at `output`.
///
/// Any failure, a codec failure included, aborts the whole operation and leaves no
/// file at `output`.
pub fn write_archive<C: Codec>(
    entries: &[FileEntry],
    output: &Path,
    level: u32,
    codec: &C,
) -> Result<AddSummary, ArchiverError> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = NamedTempFile::new_in(&parent).map_err(|e| ArchiverError::io(&parent, e))?;

    // use 1 MiB buffer to reduce syscall overhead while streaming records
    let mut archive = ArchiveWriter::new(BufWriter::with_capacity(1 << 20, temp), entries.len())?;
    let mut summary = AddSummary::default();

    for entry in entries {
        let record = build_record(entry, level, codec)?;
        archive.write_record(&record)?;

        summary.entries += 1;
        summary.bytes_out += record.compressed_size();
        match record {
            Record::Regular { size, .. } => {
                summary.files += 1;
                summary.bytes_in += size;
            }
            Record::Hardlink { .. } => summary.hardlinks += 1,
            Record::Symlink { .. } => summary.symlinks += 1,
            Record::Dir { .. } => summary.dirs += 1,
        }
    }

    let temp = archive
        .finish()?
        .into_inner()
        .map_err(|e| ArchiverError::io(output, e.into_error()))?;
    temp.persist(output).map_err(|e| ArchiverError::io(output, e.error))?;
    debug!(output = %output.display(), "archive persisted");
    Ok(summary)
}

/// Runs the entire Add operation: collection, compression and archive generation.
pub fn run(inputs: &[PathBuf], output: &Path, options: &CompressOptions) -> Result<AddSummary, ArchiverError> {
    options.validate()?;
    let codec = Lzma2Codec::new(options.method, options.resolved_threads());
    if options.volume_size > 0 {
        info!(volume_size = options.volume_size, "volume splitting is not supported, writing a single archive");
    }

    let entries = collect_entries(inputs)?;
    let summary = write_archive(&entries, output, options.level, &codec)?;
    info!(
        entries = summary.entries,
        files = summary.files,
        hardlinks = summary.hardlinks,
        bytes_in = summary.bytes_in,
        bytes_out = summary.bytes_out,
        "archive written to {}",
        output.display()
    );
    Ok(summary)
}
