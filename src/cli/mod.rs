use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::compress::{CompressOptions, Method, LEVEL_DEFAULT};

#[derive(Parser, Debug)]
#[command(author, version, about = "LZMA2 archiver for 7z-signed archives", long_about = None)]
pub struct Args {
    /// Log every record processed (same as ZLITE_LOG=debug).
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create an archive from files and directories.
    #[command(alias = "a")]
    Add {
        /// The output archive file (e.g., backup.7z). Replaced only when the whole archive was written.
        #[arg(required = true)]
        archive: PathBuf,

        /// One or more input files or directories to add to the archive.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Compression level (0-9). Higher levels use larger dictionaries.
        #[arg(short, long, default_value_t = LEVEL_DEFAULT, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,

        /// Compression method.
        #[arg(short, long, value_enum, default_value_t = Method::Lzma2)]
        method: Method,

        /// Number of codec threads. [0 = auto-detect based on CPU cores]
        #[arg(short, long, env = "ZLITE_THREADS", default_value_t = 0)]
        threads: usize,

        /// `[IGNORED]` Volume size, e.g. 100M or 4G. Archives are never split.
        #[arg(short, long, value_parser = parse_volume_size)]
        volume: Option<u64>,
    },

    /// Extract an archive, recreating the stored directory structure.
    #[command(alias = "x")]
    Extract {
        /// The archive file to extract.
        #[arg(required = true)]
        archive: PathBuf,

        /// The directory where entries will be extracted. Defaults to the current directory.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Extract every file directly into the output directory, dropping stored directories.
    #[command(name = "extract-flat", alias = "e")]
    ExtractFlat {
        /// The archive file to extract.
        #[arg(required = true)]
        archive: PathBuf,

        /// The directory where files will be extracted. Defaults to the current directory.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// List the contents of an archive without extracting it.
    #[command(alias = "l")]
    List {
        /// The archive file to list contents of.
        #[arg(required = true)]
        archive: PathBuf,

        /// Print the listing as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Decode every entry and verify checksums without writing anything.
    #[command(alias = "t")]
    Test {
        /// The archive file to test.
        #[arg(required = true)]
        archive: PathBuf,

        /// Print the per-entry results as JSON.
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Compression settings of an `add` command; `None` for every other command.
    pub fn compress_options(&self) -> Option<CompressOptions> {
        match self {
            Commands::Add { level, method, threads, volume, .. } => Some(CompressOptions {
                level: *level,
                method: *method,
                threads: *threads,
                volume_size: volume.unwrap_or(0),
            }),
            _ => None,
        }
    }
}

/// Parses a volume size such as `1500`, `64K`, `100M` or `4G` (binary multiples).
pub fn parse_volume_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, multiplier) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => {
            let multiplier: u64 = match c.to_ascii_uppercase() {
                'B' => 1,
                'K' => 1 << 10,
                'M' => 1 << 20,
                'G' => 1 << 30,
                other => return Err(format!("unknown size suffix '{other}' (expected K, M or G)")),
            };
            (&s[..i], multiplier)
        }
        _ => (s, 1),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid volume size '{s}'"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("volume size '{s}' is too large"))
}

/// Parses command-line arguments using `clap`.
pub fn run() -> Result<Args, Box<dyn std::error::Error>> {
    Ok(Args::parse())
}
