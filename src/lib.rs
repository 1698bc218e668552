//! # zlite Core Library
//!
//! This crate provides the core functionality for the `zlite` archiver.
//!
//! It is designed to be used by the `zlite` command-line application, but its public API
//! can also be used to programmatically create, inspect, and extract archives.
//!
//! ## Key Modules
//!
//! - [`archive`]: Byte layout of the custom container, with a streaming writer and reader.
//! - [`codec`]: Raw LZMA2 compression of regular-file payloads.
//! - [`compress`]: The Add operation: file discovery, hard-link dedup, archive writing.
//! - [`extract`]: List, Test and Extract for standard 7z and custom archives.
//! - [`hardlink`]: Inode table used to store each multiply-linked file once.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use zlite::compress::{self, CompressOptions};
//! use zlite::extract::{self, Layout};
//!
//! let inputs = vec![PathBuf::from("dir")];
//! compress::run(&inputs, Path::new("out.7z"), &CompressOptions::default())?;
//! let report = extract::extract(Path::new("out.7z"), Path::new("restored"), Layout::FullPaths)?;
//! assert!(report.is_clean());
//! # Ok::<(), zlite::ArchiverError>(())
//! ```

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod codec;
pub mod common;
pub mod compress;
pub mod error;
pub mod extract;
pub mod hardlink;

// Cross-platform filesystem wrapper
pub mod fsx;

pub use error::ArchiverError;
