//! Standard 7z archives, read through `sevenz-rust`.
//!
//! Probing is nothing more than an attempt to open the file as a 7z archive; anything
//! the library refuses goes to the custom parser instead.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use sevenz_rust::{Password, SevenZReader};
use tracing::{debug, warn};

use super::materialize::{note_flat_target, place_file, resolve_output, Layout, Outcome};
use super::{Action, ArchiveReport, EntryReport, EntryStatus};
use crate::common::normalize_name;
use crate::error::CodecError;
use crate::fsx::{self as fs, File};
use crate::ArchiverError;

/// Opens `path` as a standard 7z archive. `Ok(None)` means the file is readable but is
/// not one.
pub fn open(path: &Path) -> Result<Option<SevenZReader<File>>, ArchiverError> {
    let file = File::open(path).map_err(|e| ArchiverError::access(path, e))?;
    let len = file
        .metadata()
        .map_err(|e| ArchiverError::access(path, e))?
        .len();
    match SevenZReader::new(file, len, Password::empty()) {
        Ok(reader) => Ok(Some(reader)),
        Err(e) => {
            debug!(archive = %path.display(), error = %e, "not a standard 7z archive");
            Ok(None)
        }
    }
}

fn kind_label(is_dir: bool) -> &'static str {
    if is_dir {
        "Dir"
    } else {
        "File"
    }
}

fn handle_entry(
    name: &str,
    is_dir: bool,
    data: &mut dyn Read,
    action: Action<'_>,
    placed: &mut HashSet<PathBuf>,
) -> Result<Outcome, ArchiverError> {
    if is_dir {
        return match action {
            Action::Extract { layout: Layout::Flat, .. } => Ok(Outcome::Skipped),
            Action::Extract { output, layout } => {
                let out = resolve_output(output, layout, name)?;
                fs::mkdir_recursive(&out).map_err(|e| ArchiverError::io(&out, e))?;
                Ok(Outcome::Done)
            }
            _ => Ok(Outcome::Done),
        };
    }

    // the library checks the CRC while the entry is read
    let mut content = Vec::new();
    data.read_to_end(&mut content).map_err(|_| ArchiverError::Codec {
        path: name.to_string(),
        source: CodecError::Corrupt,
    })?;
    if let Action::Extract { output, layout } = action {
        let out = resolve_output(output, layout, name)?;
        if layout == Layout::Flat {
            note_flat_target(placed, &out);
        }
        place_file(&out, &content)?;
    }
    Ok(Outcome::Done)
}

/// Lists, tests or extracts every entry of an opened standard archive into `report`.
pub fn run(mut reader: SevenZReader<File>, action: Action<'_>, report: &mut ArchiveReport) {
    if let Action::List = action {
        for entry in &reader.archive().files {
            report.entries.push(EntryReport {
                path: normalize_name(entry.name()),
                kind: kind_label(entry.is_directory()),
                size: entry.size(),
                compressed_size: 0,
                crc32: 0,
                link_target: None,
                status: EntryStatus::Ok,
            });
        }
        return;
    }

    let entries = &mut report.entries;
    let mut placed = HashSet::new();
    let result = reader.for_each_entries(|entry, data| {
        let name = normalize_name(entry.name());
        let status = match handle_entry(&name, entry.is_directory(), data, action, &mut placed) {
            Ok(outcome) => EntryStatus::from(outcome),
            Err(e) => {
                warn!(entry = %name, error = %e, "entry failed");
                EntryStatus::Failed(e)
            }
        };
        entries.push(EntryReport {
            path: name,
            kind: kind_label(entry.is_directory()),
            size: entry.size(),
            compressed_size: 0,
            crc32: 0,
            link_target: None,
            status,
        });
        Ok(true)
    });
    if let Err(e) = result {
        report.format_error = Some(ArchiverError::Format(format!("7z stream: {e}")));
    }
}
