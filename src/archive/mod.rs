//! # Custom Archive Format
//!
//! This module defines the byte layout of zlite's own container and the streaming
//! writer/reader for it.
//!
//! ```text
//! header  : magic[6] = 37 7A BC AF 27 1C, entry_count: u32
//! record  : path_len: u32, path, kind: i32, size: u64, compressed_size: u64, crc32: u32
//!           Dir      -> nothing
//!           Symlink  -> target_len: u32, target
//!           Hardlink -> target_len: u32, first_path
//!           Regular  -> compressed_size payload bytes (property byte + raw LZMA2)
//! ```
//!
//! All integers are little-endian and fixed width. The magic is the 7z signature, so
//! both container flavors share one extension and are told apart by probing.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ArchiverError;

pub const MAGIC_BYTES: &[u8; 6] = b"7z\xBC\xAF\x27\x1C";
pub const HEADER_SIZE: usize = MAGIC_BYTES.len() + 4;

/// Record names and link targets longer than this are treated as corruption.
pub const MAX_NAME_LEN: u32 = 64 * 1024;

/// On-disk `kind` discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RecordKind {
    Regular = 0,
    Dir = 1,
    Symlink = 2,
    Hardlink = 3,
}

impl RecordKind {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(RecordKind::Regular),
            1 => Some(RecordKind::Dir),
            2 => Some(RecordKind::Symlink),
            3 => Some(RecordKind::Hardlink),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecordKind::Regular => "File",
            RecordKind::Dir => "Dir",
            RecordKind::Symlink => "Symlink",
            RecordKind::Hardlink => "Hardlink",
        }
    }
}

/// One archive entry, carrying exactly the fields its kind needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Dir {
        path: String,
    },
    Symlink {
        path: String,
        target: String,
    },
    Hardlink {
        path: String,
        /// Archive name of the earlier Regular record holding the data.
        first_path: String,
        size: u64,
    },
    Regular {
        path: String,
        /// Original content length.
        size: u64,
        /// CRC-32 of `payload`.
        crc32: u32,
        /// Property byte followed by the compressed stream.
        payload: Vec<u8>,
    },
}

impl Record {
    /// Builds a Regular record from codec output, computing the CRC over what will be
    /// stored.
    pub fn regular(path: String, size: u64, property: u8, stream: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(stream.len() + 1);
        payload.push(property);
        payload.extend_from_slice(stream);
        let crc32 = crc32fast::hash(&payload);
        Record::Regular { path, size, crc32, payload }
    }

    pub fn path(&self) -> &str {
        match self {
            Record::Dir { path }
            | Record::Symlink { path, .. }
            | Record::Hardlink { path, .. }
            | Record::Regular { path, .. } => path,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Dir { .. } => RecordKind::Dir,
            Record::Symlink { .. } => RecordKind::Symlink,
            Record::Hardlink { .. } => RecordKind::Hardlink,
            Record::Regular { .. } => RecordKind::Regular,
        }
    }

    /// Value of the `uncompressedSize` field.
    pub fn size(&self) -> u64 {
        match self {
            Record::Dir { .. } => 0,
            Record::Symlink { target, .. } => target.len() as u64,
            Record::Hardlink { size, .. } | Record::Regular { size, .. } => *size,
        }
    }

    /// Value of the `compressedSize` field.
    pub fn compressed_size(&self) -> u64 {
        match self {
            Record::Regular { payload, .. } => payload.len() as u64,
            _ => 0,
        }
    }

    pub fn crc32(&self) -> u32 {
        match self {
            Record::Regular { crc32, .. } => *crc32,
            _ => 0,
        }
    }

    /// Symlink target or hard-link back-reference.
    pub fn link_target(&self) -> Option<&str> {
        match self {
            Record::Symlink { target, .. } => Some(target),
            Record::Hardlink { first_path, .. } => Some(first_path),
            _ => None,
        }
    }
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let len = u32::try_from(s.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string longer than 4 GiB"))?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(s.as_bytes())
}

/// Serializes one record.
pub fn encode_record<W: Write>(w: &mut W, record: &Record) -> io::Result<()> {
    write_string(w, record.path())?;
    w.write_all(&(record.kind() as i32).to_le_bytes())?;
    w.write_all(&record.size().to_le_bytes())?;
    w.write_all(&record.compressed_size().to_le_bytes())?;
    w.write_all(&record.crc32().to_le_bytes())?;
    match record {
        Record::Dir { .. } => Ok(()),
        Record::Symlink { target, .. } => write_string(w, target),
        Record::Hardlink { first_path, .. } => write_string(w, first_path),
        Record::Regular { payload, .. } => w.write_all(payload),
    }
}

/// A streaming writer for the custom container.
///
/// The entry count is fixed up front and checked on [`ArchiveWriter::finish`], so a
/// finished archive always holds exactly as many records as its header announces.
pub struct ArchiveWriter<W: Write> {
    writer: W,
    declared: u32,
    written: u32,
}

impl<W: Write> ArchiveWriter<W> {
    /// Writes the header and returns a writer expecting `entry_count` records.
    pub fn new(mut writer: W, entry_count: usize) -> Result<Self, ArchiverError> {
        let declared = u32::try_from(entry_count).map_err(|_| {
            ArchiverError::Format(format!("{entry_count} entries do not fit a 32-bit count"))
        })?;
        let mut header = [0u8; HEADER_SIZE];
        header[..MAGIC_BYTES.len()].copy_from_slice(MAGIC_BYTES);
        header[MAGIC_BYTES.len()..].copy_from_slice(&declared.to_le_bytes());
        writer
            .write_all(&header)
            .map_err(|e| ArchiverError::io(PathBuf::new(), e))?;
        Ok(Self { writer, declared, written: 0 })
    }

    pub fn write_record(&mut self, record: &Record) -> Result<(), ArchiverError> {
        if self.written == self.declared {
            return Err(ArchiverError::Format(format!(
                "header declares {} records, refusing to write more",
                self.declared
            )));
        }
        encode_record(&mut self.writer, record)
            .map_err(|e| ArchiverError::io(PathBuf::from(record.path()), e))?;
        self.written += 1;
        debug!(path = record.path(), kind = record.kind().label(), "record written");
        Ok(())
    }

    /// Flushes and hands back the underlying writer.
    pub fn finish(mut self) -> Result<W, ArchiverError> {
        if self.written != self.declared {
            return Err(ArchiverError::Format(format!(
                "header declares {} records but {} were written",
                self.declared, self.written
            )));
        }
        self.writer
            .flush()
            .map_err(|e| ArchiverError::io(PathBuf::new(), e))?;
        Ok(self.writer)
    }
}

/// A streaming reader for the custom container, yielding one record at a time.
///
/// The first malformed or truncated record ends the iteration with an error; the
/// reader yields nothing after that.
pub struct ArchiveReader<R: Read> {
    reader: R,
    archive_path: PathBuf,
    declared: u32,
    read: u32,
    failed: bool,
}

impl<R: Read> ArchiveReader<R> {
    /// Validates the magic and reads the entry count. Failures here are fatal to the
    /// whole operation.
    pub fn new(mut reader: R, archive_path: &Path) -> Result<Self, ArchiverError> {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ArchiverError::Format("truncated archive header".into()),
            _ => ArchiverError::access(archive_path, e),
        })?;
        if &header[..MAGIC_BYTES.len()] != MAGIC_BYTES {
            return Err(ArchiverError::Format("magic bytes mismatch".into()));
        }
        let mut count = [0u8; 4];
        count.copy_from_slice(&header[MAGIC_BYTES.len()..]);
        Ok(Self {
            reader,
            archive_path: archive_path.to_path_buf(),
            declared: u32::from_le_bytes(count),
            read: 0,
            failed: false,
        })
    }

    /// Entry count announced by the header.
    pub fn declared(&self) -> u32 {
        self.declared
    }

    /// Records not yet handed out.
    pub fn remaining(&self) -> u32 {
        self.declared - self.read
    }

    fn read_exact(&mut self, buf: &mut [u8], what: &str) -> Result<(), ArchiverError> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                ArchiverError::Format(format!("record #{} truncated in {what}", self.read))
            }
            _ => ArchiverError::access(&self.archive_path, e),
        })
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, ArchiverError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf, what)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self, what: &str) -> Result<u64, ArchiverError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf, what)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_string(&mut self, what: &str) -> Result<String, ArchiverError> {
        let len = self.read_u32(what)?;
        if len > MAX_NAME_LEN {
            return Err(ArchiverError::Format(format!(
                "record #{}: {what} length {len} exceeds {MAX_NAME_LEN}",
                self.read
            )));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf, what)?;
        String::from_utf8(buf).map_err(|_| {
            ArchiverError::Format(format!("record #{}: {what} is not valid UTF-8", self.read))
        })
    }

    fn read_payload(&mut self, len: u64) -> Result<Vec<u8>, ArchiverError> {
        let mut payload = Vec::new();
        let got = (&mut self.reader)
            .take(len)
            .read_to_end(&mut payload)
            .map_err(|e| ArchiverError::access(&self.archive_path, e))?;
        if (got as u64) < len {
            return Err(ArchiverError::Format(format!(
                "record #{} truncated in payload ({got} of {len} bytes)",
                self.read
            )));
        }
        Ok(payload)
    }

    fn read_record(&mut self) -> Result<Record, ArchiverError> {
        let path = self.read_string("path")?;
        let mut raw_kind = [0u8; 4];
        self.read_exact(&mut raw_kind, "kind")?;
        let raw_kind = i32::from_le_bytes(raw_kind);
        let size = self.read_u64("size")?;
        let compressed_size = self.read_u64("compressed size")?;
        let crc32 = self.read_u32("crc32")?;

        let kind = RecordKind::from_raw(raw_kind).ok_or_else(|| {
            ArchiverError::Format(format!("record #{} ('{path}'): unknown kind {raw_kind}", self.read))
        })?;
        if kind != RecordKind::Regular && compressed_size != 0 {
            return Err(ArchiverError::Format(format!(
                "record #{} ('{path}'): {} record carries {compressed_size} payload bytes",
                self.read,
                kind.label()
            )));
        }

        let record = match kind {
            RecordKind::Dir => Record::Dir { path },
            RecordKind::Symlink => {
                let target = self.read_string("symlink target")?;
                Record::Symlink { path, target }
            }
            RecordKind::Hardlink => {
                let first_path = self.read_string("hard link target")?;
                Record::Hardlink { path, first_path, size }
            }
            RecordKind::Regular => {
                let payload = self.read_payload(compressed_size)?;
                Record::Regular { path, size, crc32, payload }
            }
        };
        Ok(record)
    }
}

impl<R: Read> Iterator for ArchiveReader<R> {
    type Item = Result<Record, ArchiverError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.read == self.declared {
            return None;
        }
        match self.read_record() {
            Ok(record) => {
                self.read += 1;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<Record> {
        vec![
            Record::Dir { path: "dir".into() },
            Record::regular("dir/a.txt".into(), 10, 0, b"\x01\x02\x03"),
            Record::Symlink { path: "dir/l".into(), target: "a.txt".into() },
            Record::Hardlink { path: "dir/b.txt".into(), first_path: "dir/a.txt".into(), size: 10 },
        ]
    }

    fn write_archive(records: &[Record]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Vec::new(), records.len()).unwrap();
        for r in records {
            writer.write_record(r).unwrap();
        }
        writer.finish().unwrap()
    }

    /// Tests that the header holds the magic and the little-endian entry count.
    #[test]
    fn test_header_layout() {
        let bytes = write_archive(&[]);
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..6], MAGIC_BYTES);
        assert_eq!(&bytes[6..10], &0u32.to_le_bytes());
    }

    /// Tests the exact byte layout of a directory record.
    #[test]
    fn test_dir_record_layout() {
        let mut buf = Vec::new();
        encode_record(&mut buf, &Record::Dir { path: "d".into() }).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.push(b'd');
        expected.extend_from_slice(&1i32.to_le_bytes());
        expected.extend_from_slice(&0u64.to_le_bytes());
        expected.extend_from_slice(&0u64.to_le_bytes());
        expected.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_regular_crc_covers_stored_payload() {
        let record = Record::regular("f".into(), 3, 7, b"abc");
        let Record::Regular { crc32, payload, .. } = &record else {
            panic!("not regular");
        };
        assert_eq!(payload, b"\x07abc");
        assert_eq!(*crc32, crc32fast::hash(b"\x07abc"));
        assert_eq!(record.compressed_size(), 4);
    }

    #[test]
    fn test_reader_returns_records_in_order() {
        let records = sample_records();
        let bytes = write_archive(&records);
        let reader = ArchiveReader::new(&bytes[..], Path::new("t.7z")).unwrap();
        assert_eq!(reader.declared(), 4);
        let back: Vec<Record> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(back, records);
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut bytes = write_archive(&sample_records());
        bytes[0] = b'X';
        let err = ArchiveReader::new(&bytes[..], Path::new("t.7z")).err().unwrap();
        assert!(matches!(err, ArchiverError::Format(_)));
    }

    #[test]
    fn test_short_header_is_format_error() {
        let err = ArchiveReader::new(&MAGIC_BYTES[..4], Path::new("t.7z")).err().unwrap();
        assert!(matches!(err, ArchiverError::Format(_)));
    }

    #[test]
    fn test_truncation_stops_iteration_after_good_records() {
        let bytes = write_archive(&sample_records());
        // drop the 54-byte hard link record and 20 bytes of the symlink record
        let cut = bytes.len() - 74;
        let mut reader = ArchiveReader::new(&bytes[..cut], Path::new("t.7z")).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, ArchiverError::Format(_)));
        assert!(reader.next().is_none());
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn test_unknown_kind_is_format_error() {
        let mut bytes = write_archive(&[Record::Dir { path: "d".into() }]);
        // kind sits after the 4-byte length and the 1-byte name
        bytes[HEADER_SIZE + 5..HEADER_SIZE + 9].copy_from_slice(&9i32.to_le_bytes());
        let mut reader = ArchiveReader::new(&bytes[..], Path::new("t.7z")).unwrap();
        assert!(matches!(reader.next(), Some(Err(ArchiverError::Format(_)))));
    }

    #[test]
    fn test_writer_rejects_count_mismatch() {
        let writer = ArchiveWriter::new(Vec::new(), 2).unwrap();
        assert!(writer.finish().is_err());

        let mut writer = ArchiveWriter::new(Vec::new(), 1).unwrap();
        writer.write_record(&Record::Dir { path: "a".into() }).unwrap();
        assert!(writer.write_record(&Record::Dir { path: "b".into() }).is_err());
    }
}
