use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `zlite` crate.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// A metadata query or open failed on an input path or on the archive itself.
    #[error("cannot access '{}': {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container is structurally invalid: bad magic, truncated header or record,
    /// unknown record kind.
    #[error("malformed archive: {0}")]
    Format(String),

    /// The stored CRC does not match the stored payload of a regular entry.
    #[error("CRC mismatch on '{path}': stored {expected:#010x}, computed {actual:#010x}")]
    Integrity { path: String, expected: u32, actual: u32 },

    /// The codec failed to compress or decompress one entry.
    #[error("codec failure on '{path}': {source}")]
    Codec {
        path: String,
        #[source]
        source: CodecError,
    },

    /// A symbolic or hard link could not be created.
    #[error("cannot create link '{}': {source}", path.display())]
    Link {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An archive name would resolve outside of the output directory.
    #[error("refusing to materialize unsafe path '{0}'")]
    UnsafePath(String),

    /// An I/O error occurred while writing output. Includes the path where it happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A compression option is out of range.
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

impl ArchiverError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiverError::Io { path: path.into(), source }
    }

    pub(crate) fn access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiverError::FileAccess { path: path.into(), source }
    }

    /// Short, stable label used in listings and JSON reports.
    pub fn label(&self) -> &'static str {
        match self {
            ArchiverError::FileAccess { .. } => "access",
            ArchiverError::Format(_) => "format",
            ArchiverError::Integrity { .. } => "integrity",
            ArchiverError::Codec { .. } => "codec",
            ArchiverError::Link { .. } => "link",
            ArchiverError::UnsafePath(_) => "unsafe-path",
            ArchiverError::Io { .. } => "io",
            ArchiverError::InvalidOption(_) => "option",
        }
    }
}

/// Failure reported by the compression codec.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("codec ran out of memory")]
    Memory,
    #[error("unsupported codec method or properties")]
    Unsupported,
    #[error("compressed data is corrupt")]
    Corrupt,
}
