//! Command-line interface definitions for blobtier.
//!
//! The binary is a thin harness over [`TwoTierCache`](crate::cache::TwoTierCache):
//! it stores files, reads them back, and reports usage.
//!
//! # Example
//!
//! ```bash
//! # Cache a downloaded response under its URL
//! blobtier put https://example.com/logo.png ./logo.png
//!
//! # Read it back
//! blobtier get https://example.com/logo.png -o /tmp/logo.png
//!
//! # Show usage against a 50 MB quota
//! blobtier --disk-quota 50MB stats
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Persistent two-tier blob cache.
#[derive(Debug, Parser)]
#[command(name = "blobtier")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Config file to load instead of the platform default
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory (overrides the config file)
    #[arg(long, global = true, value_name = "DIR", env = "BLOBTIER_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disk quota (e.g., 10MiB, 50MB)
    #[arg(long, global = true, value_name = "SIZE", value_parser = parse_size)]
    pub disk_quota: Option<u64>,

    /// Memory budget for cached payloads (e.g., 8MiB)
    #[arg(long, global = true, value_name = "SIZE", value_parser = parse_size)]
    pub memory_quota: Option<u64>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store bytes under a locator
    Put(PutArgs),
    /// Print the bytes cached under a locator
    Get(GetArgs),
    /// Show cache usage
    Stats(StatsArgs),
}

/// Arguments for the put subcommand.
#[derive(Debug, Args)]
pub struct PutArgs {
    /// Locator to store under (usually a URL)
    #[arg(value_name = "LOCATOR")]
    pub locator: String,

    /// File to read the payload from; stdin when omitted
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}

/// Arguments for the get subcommand.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Locator to look up
    #[arg(value_name = "LOCATOR")]
    pub locator: String,

    /// Write the payload to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for the stats subcommand.
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use blobtier::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("10MiB").unwrap(), 10_485_760);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    if num < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
