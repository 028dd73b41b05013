//! blobtier - Persistent Two-Tier Blob Cache
//!
//! A byte-blob cache for HTTP clients: payloads live in flat files indexed by
//! an SQLite database, hot payloads stay in memory, and least recently used
//! blobs are swept when disk usage passes a quota.
//!
//! Collaborators only need [`cache::TwoTierCache::get`] and
//! [`cache::TwoTierCache::put`].

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;

use std::fs;
use std::io::{self, Read, Write};

use anyhow::{Context, Result};
use bytesize::ByteSize;

use crate::cache::TwoTierCache;
use crate::cli::{Cli, Commands, GetArgs, PutArgs, StatsArgs};
use crate::config::Config;
use crate::error::ExitCode;

/// Run the CLI: load configuration, open the cache and execute the command.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let config = resolve_config(&cli)?;
    let cache = TwoTierCache::open(&config).context("Failed to open cache")?;

    let code = match cli.command {
        Commands::Put(args) => put(&cache, args)?,
        Commands::Get(args) => get(&cache, args)?,
        Commands::Stats(args) => stats(&cache, &args)?,
    };
    cache.flush();
    Ok(code)
}

/// Layer CLI flags over the file and environment configuration.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    if let Some(bytes) = cli.disk_quota {
        config.disk_quota_bytes = bytes;
    }
    if let Some(bytes) = cli.memory_quota {
        config.memory_quota_bytes = bytes;
    }
    Ok(config)
}

fn put(cache: &TwoTierCache, args: PutArgs) -> Result<ExitCode> {
    let payload = match &args.file {
        Some(path) => fs::read(path)
            .with_context(|| format!("Failed to read payload from {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read payload from stdin")?;
            buf
        }
    };

    let size = payload.len() as u64;
    cache.put(&args.locator, payload, || {
        log::info!("Stored {} ({})", args.locator, ByteSize::b(size));
    });
    Ok(ExitCode::Success)
}

fn get(cache: &TwoTierCache, args: GetArgs) -> Result<ExitCode> {
    let Some(payload) = cache.get(&args.locator) else {
        log::info!("No cached entry for {}", args.locator);
        return Ok(ExitCode::Miss);
    };

    match &args.output {
        Some(path) => fs::write(path, &payload)
            .with_context(|| format!("Failed to write payload to {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&payload)
                .and_then(|()| stdout.flush())
                .context("Failed to write payload to stdout")?;
        }
    }
    Ok(ExitCode::Success)
}

fn stats(cache: &TwoTierCache, args: &StatsArgs) -> Result<ExitCode> {
    let stats = cache.stats();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Location:  {}", cache.storage_dir().display());
        println!("Entries:   {}", stats.entries);
        println!(
            "Disk:      {} of {}",
            ByteSize::b(stats.disk_usage),
            ByteSize::b(stats.disk_quota)
        );
        println!(
            "Memory:    {} of {}",
            ByteSize::b(stats.memory_usage),
            ByteSize::b(stats.memory_quota)
        );
    }
    Ok(ExitCode::Success)
}
