//! # Extraction Module
//!
//! This module implements the read side of zlite: List, Test and Extract. Every operation
//! first probes the file as a standard 7z archive and falls back to the custom container
//! when the standard parser refuses it.
//!
//! Failures on one entry are recorded in that entry's report and processing continues
//! with the next one. Only a failure to read the container itself (missing file, bad
//! magic, truncated header) aborts the operation. A record that cannot be parsed ends the
//! iteration, but everything processed before it stays in the report.

pub mod materialize;
pub mod standard;

use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::archive::{ArchiveReader, Record};
use crate::codec::{Codec, Lzma2Codec};
use crate::fsx::{self as fs, File};
use crate::ArchiverError;

pub use materialize::{EntryMaterializer, Layout, Outcome};

/// Which parser ended up reading the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Standard,
    Custom,
}

/// The read-side operation to perform on every entry.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    List,
    /// Decode and check every entry without writing anything.
    Test,
    Extract { output: &'a Path, layout: Layout },
}

impl Action<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Test => "test",
            Action::Extract { .. } => "extract",
        }
    }
}

/// Result of one entry.
#[derive(Debug)]
pub enum EntryStatus {
    Ok,
    Skipped,
    Failed(ArchiverError),
}

impl EntryStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, EntryStatus::Failed(_))
    }
}

impl From<Outcome> for EntryStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => EntryStatus::Ok,
            Outcome::Skipped => EntryStatus::Skipped,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum StatusRepr<'a> {
    Ok,
    Skipped,
    Failed { error: &'a str, message: String },
}

impl Serialize for EntryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match self {
            EntryStatus::Ok => StatusRepr::Ok,
            EntryStatus::Skipped => StatusRepr::Skipped,
            EntryStatus::Failed(e) => StatusRepr::Failed {
                error: e.label(),
                message: e.to_string(),
            },
        };
        repr.serialize(serializer)
    }
}

/// One line of a listing, or the outcome of testing/extracting one entry.
#[derive(Debug, Serialize)]
pub struct EntryReport {
    pub path: String,
    pub kind: &'static str,
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
    pub status: EntryStatus,
}

impl EntryReport {
    fn from_record(record: &Record, status: EntryStatus) -> Self {
        Self {
            path: record.path().to_string(),
            kind: record.kind().label(),
            size: record.size(),
            compressed_size: record.compressed_size(),
            crc32: record.crc32(),
            link_target: record.link_target().map(str::to_string),
            status,
        }
    }
}

fn error_message<S: Serializer>(err: &Option<ArchiverError>, serializer: S) -> Result<S::Ok, S::Error> {
    match err {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Everything one List/Test/Extract run produced.
#[derive(Debug, Serialize)]
pub struct ArchiveReport {
    pub archive: PathBuf,
    pub format: ContainerFormat,
    pub operation: &'static str,
    /// Entry count from the custom header; standard archives do not announce one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared: Option<u32>,
    pub entries: Vec<EntryReport>,
    /// Structural failure that ended the iteration early.
    #[serde(serialize_with = "error_message", skip_serializing_if = "Option::is_none")]
    pub format_error: Option<ArchiverError>,
    /// Records announced by the header but never read.
    pub unread: u32,
}

impl ArchiveReport {
    fn new(archive: &Path, format: ContainerFormat, action: Action<'_>) -> Self {
        Self {
            archive: archive.to_path_buf(),
            format,
            operation: action.name(),
            declared: None,
            entries: Vec::new(),
            format_error: None,
            unread: 0,
        }
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_failed()).count()
    }

    /// True when every entry succeeded and the whole container was read.
    pub fn is_clean(&self) -> bool {
        self.format_error.is_none() && self.failed() == 0
    }

    pub fn entry(&self, path: &str) -> Option<&EntryReport> {
        self.entries.iter().find(|e| e.path == path)
    }
}

/// Tells which parser accepts `archive`. A file the standard parser refuses is reported
/// as custom without validating it further.
pub fn probe(archive: &Path) -> Result<ContainerFormat, ArchiverError> {
    Ok(match standard::open(archive)? {
        Some(_) => ContainerFormat::Standard,
        None => ContainerFormat::Custom,
    })
}

/// Creates the extraction root. Called only once the archive has been opened, so a
/// missing or unreadable archive leaves nothing behind.
fn prepare_output(action: Action<'_>) -> Result<(), ArchiverError> {
    if let Action::Extract { output, .. } = action {
        fs::mkdir_recursive(output).map_err(|e| ArchiverError::io(output, e))?;
    }
    Ok(())
}

fn run_custom<C: Codec>(
    archive: &Path,
    action: Action<'_>,
    codec: &C,
    report: &mut ArchiveReport,
) -> Result<(), ArchiverError> {
    let file = File::open(archive).map_err(|e| ArchiverError::access(archive, e))?;
    let mut reader = ArchiveReader::new(BufReader::new(file), archive)?;
    report.declared = Some(reader.declared());
    prepare_output(action)?;

    let mut materializer = match action {
        Action::List => None,
        Action::Test => Some(EntryMaterializer::verifier(codec)),
        Action::Extract { output, layout } => Some(EntryMaterializer::new(codec, output, layout)),
    };

    while let Some(item) = reader.next() {
        let record = match item {
            Ok(record) => record,
            Err(e) => {
                warn!(archive = %archive.display(), error = %e, "archive ends early");
                report.unread = reader.remaining();
                report.format_error = Some(e);
                break;
            }
        };
        let status = match materializer.as_mut() {
            None => EntryStatus::Ok,
            Some(m) => match m.materialize(&record) {
                Ok(outcome) => outcome.into(),
                Err(e) => {
                    warn!(entry = record.path(), error = %e, "entry failed");
                    EntryStatus::Failed(e)
                }
            },
        };
        report.entries.push(EntryReport::from_record(&record, status));
    }
    Ok(())
}

/// Runs `action` over every entry of `archive`, decoding custom payloads with `codec`.
pub fn run_with_codec<C: Codec>(archive: &Path, action: Action<'_>, codec: &C) -> Result<ArchiveReport, ArchiverError> {
    let report = match standard::open(archive)? {
        Some(reader) => {
            prepare_output(action)?;
            let mut report = ArchiveReport::new(archive, ContainerFormat::Standard, action);
            standard::run(reader, action, &mut report);
            report
        }
        None => {
            let mut report = ArchiveReport::new(archive, ContainerFormat::Custom, action);
            run_custom(archive, action, codec, &mut report)?;
            report
        }
    };

    info!(
        archive = %archive.display(),
        operation = report.operation,
        format = ?report.format,
        entries = report.entries.len(),
        failed = report.failed(),
        "done"
    );
    Ok(report)
}

pub fn run(archive: &Path, action: Action<'_>) -> Result<ArchiveReport, ArchiverError> {
    run_with_codec(archive, action, &Lzma2Codec::default())
}

/// Lists the entries of an archive without decoding any payload.
pub fn list(archive: &Path) -> Result<ArchiveReport, ArchiverError> {
    run(archive, Action::List)
}

/// Decodes and checks every entry without writing to disk.
pub fn test(archive: &Path) -> Result<ArchiveReport, ArchiverError> {
    run(archive, Action::Test)
}

/// Extracts every entry below `output`, creating it if needed.
pub fn extract(archive: &Path, output: &Path, layout: Layout) -> Result<ArchiveReport, ArchiverError> {
    run(archive, Action::Extract { output, layout })
}

/// Writes a human-readable table of `report`.
pub fn write_listing<W: Write>(report: &ArchiveReport, out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "Archive: {} ({:?}, {} entries)",
        report.archive.display(),
        report.format,
        report.entries.len()
    )?;
    writeln!(out, "{:<9} {:>14} {:>14}  Name", "Type", "Size", "Compressed")?;
    for entry in &report.entries {
        let name = match &entry.link_target {
            Some(target) => format!("{} -> {}", entry.path, target),
            None => entry.path.clone(),
        };
        write!(
            out,
            "{:<9} {:>14} {:>14}  {}",
            entry.kind, entry.size, entry.compressed_size, name
        )?;
        match &entry.status {
            EntryStatus::Failed(e) => writeln!(out, "  [FAILED: {e}]")?,
            EntryStatus::Skipped if report.operation != "list" => writeln!(out, "  [skipped]")?,
            _ => writeln!(out)?,
        }
    }
    if let Some(e) = &report.format_error {
        writeln!(out, "Archive ends early ({} entries unread): {e}", report.unread)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use tempfile::tempdir;

    fn write_records(path: &Path, records: &[Record]) {
        let mut writer = ArchiveWriter::new(Vec::new(), records.len()).unwrap();
        for r in records {
            writer.write_record(r).unwrap();
        }
        fs::write(path, writer.finish().unwrap()).unwrap();
    }

    fn packed(path: &str, content: &[u8]) -> Record {
        let codec = Lzma2Codec::default();
        let c = codec.compress(content, 1).unwrap();
        Record::regular(path.into(), content.len() as u64, c.property, &c.data)
    }

    #[test]
    fn listing_reports_every_record() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("a.7z");
        write_records(
            &archive,
            &[
                Record::Dir { path: "d".into() },
                packed("d/f", b"hello"),
                Record::Symlink { path: "d/l".into(), target: "f".into() },
            ],
        );

        let report = list(&archive).unwrap();
        assert_eq!(report.format, ContainerFormat::Custom);
        assert_eq!(report.declared, Some(3));
        assert!(report.is_clean());
        let kinds: Vec<_> = report.entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["Dir", "File", "Symlink"]);
        assert_eq!(report.entry("d/l").unwrap().link_target.as_deref(), Some("f"));

        let mut text = Vec::new();
        write_listing(&report, &mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("d/l -> f"));
        assert!(text.contains("Compressed"));
    }

    #[test]
    fn corrupted_entry_does_not_stop_the_others() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("a.7z");
        let mut bad = packed("bad", b"first");
        if let Record::Regular { payload, .. } = &mut bad {
            let last = payload.len() - 1;
            payload[last] ^= 0xff;
        }
        write_records(&archive, &[bad, packed("good", b"second")]);

        let out = dir.path().join("out");
        let report = extract(&archive, &out, Layout::FullPaths).unwrap();
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.entry("bad").unwrap().status,
            EntryStatus::Failed(ArchiverError::Integrity { .. })
        ));
        assert!(!out.join("bad").exists());
        assert_eq!(fs::read(out.join("good")).unwrap(), b"second");
    }

    #[test]
    fn missing_archive_is_fatal() {
        let dir = tempdir().unwrap();
        let err = list(&dir.path().join("nope.7z")).unwrap_err();
        assert!(matches!(err, ArchiverError::FileAccess { .. }));
    }

    #[test]
    fn failed_open_leaves_no_output_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let err = extract(&dir.path().join("nope.7z"), &out, Layout::FullPaths).unwrap_err();
        assert!(matches!(err, ArchiverError::FileAccess { .. }));
        assert!(!out.exists());

        let junk = dir.path().join("junk.7z");
        fs::write(&junk, b"neither 7z nor ours").unwrap();
        let err = extract(&junk, &out, Layout::FullPaths).unwrap_err();
        assert!(matches!(err, ArchiverError::Format(_)));
        assert!(!out.exists());
    }

    #[test]
    fn codec_failure_is_reported_by_label_and_message() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("a.7z");
        // valid CRC, but the stream is not LZMA2
        write_records(&archive, &[Record::regular("f".into(), 4, 0, b"\xff\xff\xff")]);

        let report = test(&archive).unwrap();
        assert!(matches!(
            report.entry("f").unwrap().status,
            EntryStatus::Failed(ArchiverError::Codec { .. })
        ));
        let json = serde_json::to_value(&report).unwrap();
        let failed = &json["entries"][0]["status"]["failed"];
        assert_eq!(failed["error"], "codec");
        assert!(failed["message"].as_str().unwrap().contains("corrupt"));
    }

    #[test]
    fn failed_status_serializes_with_label() {
        let report = EntryReport {
            path: "x".into(),
            kind: "File",
            size: 1,
            compressed_size: 2,
            crc32: 3,
            link_target: None,
            status: EntryStatus::Failed(ArchiverError::UnsafePath("../x".into())),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"]["failed"]["error"], "unsafe-path");
        assert_eq!(serde_json::to_value(&EntryStatus::Ok).unwrap(), "ok");
    }
}
